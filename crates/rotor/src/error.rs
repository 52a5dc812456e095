// Error types for the executor pool

use thiserror::Error;

use crate::source::LoadError;

/// Result type alias for pool operations
pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors that can occur while running an executor pool
#[derive(Debug, Error)]
pub enum PoolError {
    /// An executable payload could not be retrieved
    #[error("source unavailable: {source}")]
    SourceUnavailable {
        #[from]
        source: LoadError,
    },

    /// Operation issued before initialization or after teardown
    #[error("pool is not ready")]
    PoolNotReady,

    /// Executor died or posted a malformed envelope
    ///
    /// Absorbed by the pool and logged; never returned to callers.
    #[error("executor {slot} fault: {reason}")]
    ExecutorFault { slot: usize, reason: String },

    /// Program instantiation or thread spawn failed during initialization
    #[error("failed to start executor {slot}: {reason}")]
    ExecutorSpawn { slot: usize, reason: String },

    /// Pool was initialized twice without teardown
    #[error("pool is already running")]
    AlreadyRunning,

    /// Configuration error
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The run id counter would overflow
    #[error("run id space exhausted")]
    RunIdsExhausted,
}

impl PoolError {
    pub(crate) fn spawn(slot: usize, err: impl std::fmt::Display) -> Self {
        Self::ExecutorSpawn {
            slot,
            reason: err.to_string(),
        }
    }
}
