use std::time::Duration;

use thiserror::Error;

use crate::adapter::core::ConfigError;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to start slot {slot}: {message}")]
    Spawn { slot: usize, message: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A worker sent something that is not a valid response.
    #[error("worker wire error: {0}")]
    Wire(String),

    #[error("slot {slot} failed ({kind}): {message}")]
    WorkerFailed {
        slot: usize,
        kind: String,
        message: String,
    },

    #[error("slot {slot} exited")]
    WorkerExited { slot: usize },

    #[error("slot {slot} did not reply within {after:?}")]
    Timeout { slot: usize, after: Duration },

    /// An earlier timeout or channel failure may have left a late reply
    /// queued on this slot. The pool must be rebuilt.
    #[error("slot {slot} is out of sync after an earlier failure; rebuild the pool")]
    OutOfSync { slot: usize },

    #[error("expected {expected} actions, got {got}")]
    ActionCount { expected: usize, got: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("pool closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, PoolError>;
