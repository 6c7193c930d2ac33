use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use promoter_core::config::PromoteConfig;
use promoter_core::trigger::{PromoteRequest, PromotionEngine};
use promoter_core::PromoterError;
use tokio::process::Command;
use tracing::debug;

use crate::{EngineError, Result};

// ─── CommandEngine ────────────────────────────────────────────────────────

/// Promotes by running `<command> <args..> promote ...` and waiting for it.
///
/// Stdin is closed so the command can never prompt. Stderr is captured and
/// surfaced when the command fails; the child is killed on timeout.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandEngine {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &PromoteConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone(), config.timeout())
    }

    /// Run the command for one request.
    pub async fn run(&self, request: &PromoteRequest) -> Result<()> {
        let args = build_args(&self.args, request);
        debug!(command = %self.command, args = ?args, "running promote command");

        let mut cmd = Command::new(&self.command);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| EngineError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => return Err(EngineError::Timeout(self.timeout.as_secs())),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            debug!(environment = %request.environment, output = %stdout.trim(), "promote command output");
        }

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim();
        let msg = match output.status.code() {
            Some(code) if stderr.is_empty() => format!("promote command exited with code {code}"),
            Some(code) => format!("promote command exited with code {code}\nstderr: {stderr}"),
            None if stderr.is_empty() => "promote command terminated by signal".to_string(),
            None => format!("promote command terminated by signal\nstderr: {stderr}"),
        };
        Err(EngineError::Process(msg))
    }
}

#[async_trait]
impl PromotionEngine for CommandEngine {
    async fn promote(&self, request: &PromoteRequest) -> promoter_core::Result<()> {
        self.run(request).await.map_err(|e| PromoterError::Engine {
            environment: request.environment.clone(),
            message: e.to_string(),
        })
    }
}

// ─── Argument builder ─────────────────────────────────────────────────────

/// Arguments for one promotion, after any configured leading arguments.
pub fn build_args(leading: &[String], request: &PromoteRequest) -> Vec<String> {
    let mut args: Vec<String> = leading.to_vec();
    args.push("promote".into());

    for (flag, value) in [
        ("--app", &request.application),
        ("--env", &request.environment),
        ("--version", &request.version),
        ("--pipeline", &request.pipeline),
        ("--build", &request.build),
    ] {
        if !value.is_empty() {
            args.push(flag.into());
            args.push(value.clone());
        }
    }
    if let Some(namespace) = request.namespace.as_deref().filter(|ns| !ns.is_empty()) {
        args.push("--namespace".into());
        args.push(namespace.to_string());
    }

    // The promotion is tracked on the activity; never block polling the PR.
    args.push("--no-poll".into());
    if request.ignore_local_files {
        args.push("--ignore-local-file".into());
    }
    if request.batch_mode {
        args.push("--batch-mode".into());
    }
    args
}
