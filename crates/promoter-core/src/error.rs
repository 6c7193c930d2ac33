use thiserror::Error;

#[derive(Debug, Error)]
pub enum PromoterError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid release branch pattern '{pattern}': {source}")]
    InvalidBranchPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("resource store error during {operation}: {message}")]
    Store { operation: String, message: String },

    #[error("watch stream for {0} ended")]
    WatchEnded(String),

    #[error("cannot create default workflow in namespace {namespace}: {message}")]
    Bootstrap { namespace: String, message: String },

    #[error("promotion to environment '{environment}' failed: {message}")]
    Engine {
        environment: String,
        message: String,
    },

    #[error("no environments have been created yet in team namespace {0}")]
    NoEnvironments(String),

    #[error("unknown environment '{name}', available: {}", .available.join(", "))]
    UnknownEnvironment {
        name: String,
        available: Vec<String>,
    },

    #[error("environment {0} does not have a namespace associated with it")]
    EnvironmentWithoutNamespace(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PromoterError {
    /// Wrap a client-side failure with the operation that produced it.
    pub fn store(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        PromoterError::Store {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PromoterError>;
