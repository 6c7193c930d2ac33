use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("promote command timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Process(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
