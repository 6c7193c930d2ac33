use crate::error::Result;
use crate::policy::{compile_glob, ReleaseBranchPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "PROMOTER_CONFIG";

/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "promoter.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// PromoteConfig
// ---------------------------------------------------------------------------

/// How the promotion engine command is invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromoteConfig {
    #[serde(default = "default_command")]
    pub command: String,
    /// Leading arguments placed before `promote`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_command() -> String {
    "jx".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PromoteConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Namespace to watch when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,
    #[serde(default = "default_release_branches")]
    pub release_branches: Vec<String>,
    #[serde(default = "default_workflow_name")]
    pub default_workflow: String,
    /// Skip builds older than the newest one seen for the same pipeline.
    #[serde(default)]
    pub skip_superseded_builds: bool,
    #[serde(default)]
    pub promote: PromoteConfig,
}

fn default_resync_interval_secs() -> u64 {
    600
}

fn default_release_branches() -> Vec<String> {
    vec!["master".to_string()]
}

fn default_workflow_name() -> String {
    "default".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_interval_secs: default_resync_interval_secs(),
            release_branches: default_release_branches(),
            default_workflow: default_workflow_name(),
            skip_superseded_builds: false,
            promote: PromoteConfig::default(),
        }
    }
}

impl Config {
    /// Load from `$PROMOTER_CONFIG`, else `./promoter.yaml`, else defaults.
    pub fn load() -> Result<Self> {
        match Self::locate(std::env::var_os(CONFIG_ENV).map(PathBuf::from)) {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// The file [`Config::load`] reads, if any.
    pub fn locate(explicit: Option<PathBuf>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path);
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn release_policy(&self) -> Result<ReleaseBranchPolicy> {
        ReleaseBranchPolicy::new(&self.release_branches)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        for pattern in &self.release_branches {
            if let Err(e) = compile_glob(pattern) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: e.to_string(),
                });
            }
        }
        if self.release_branches.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "release_branches is empty; no build will ever be promoted".into(),
            });
        }

        if self.resync_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "resync_interval_secs must be greater than zero".into(),
            });
        }

        if self.default_workflow.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "default_workflow must not be empty".into(),
            });
        }

        if self.promote.command.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "promote.command must not be empty".into(),
            });
        }
        if self.promote.timeout_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "promote.timeout_secs is 0; every promotion will time out".into(),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
