use std::time::Duration;

use thiserror::Error;

use crate::core::ConfigError;

/// Errors surfaced by the environment adapter.
///
/// A call that returns an error leaves the environment's observation, done
/// flags, frame stack and shaping context exactly as they were.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Connect failed or the transport dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The engine sent `max_protocol_errors` consecutive frames that do not
    /// decode.
    ///
    /// This poisons the session the same way [`Timeout`](Self::Timeout) does:
    /// a reply may have been among the dropped frames, so the stream position
    /// is unknown and the environment has to be recreated.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No reply within the configured reply timeout.
    #[error("no reply from engine within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("environment closed")]
    Closed,

    /// A request was started while another was still unresolved.
    #[error("a request is already in flight")]
    RequestInFlight,

    /// An earlier [`Timeout`](Self::Timeout) or [`Protocol`](Self::Protocol)
    /// failure left the session in an unknown state.
    #[error("session poisoned by an earlier failure: {0}")]
    Poisoned(String),

    #[error("episode has terminated; call reset()")]
    EpisodeTerminated,

    #[error("step() called before reset()")]
    NotReset,

    #[error("action index {index} out of range for {len} actions")]
    InvalidAction { index: usize, len: usize },

    /// The async runtime or its thread could not be started.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl AdapterError {
    /// Short machine-readable name, used on the worker wire.
    pub fn kind(&self) -> &'static str {
        match self {
            AdapterError::Connection(_) => "connection",
            AdapterError::Protocol(_) => "protocol",
            AdapterError::Timeout(_) => "timeout",
            AdapterError::Config(_) => "config",
            AdapterError::Closed => "closed",
            AdapterError::RequestInFlight => "request_in_flight",
            AdapterError::Poisoned(_) => "poisoned",
            AdapterError::EpisodeTerminated => "episode_terminated",
            AdapterError::NotReset => "not_reset",
            AdapterError::InvalidAction { .. } => "invalid_action",
            AdapterError::Runtime(_) => "runtime",
        }
    }

    /// True if the connection itself is gone and a reconnect could help.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, AdapterError::Connection(_))
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
