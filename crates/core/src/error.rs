use thiserror::Error;

/// Invalid construction parameters.
///
/// Raised once, at construction time. Values are never clamped into range
/// behind the caller's back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("max_blocks must be > 0")]
    InvalidMaxBlocks,

    #[error("frame stack depth must be > 0")]
    InvalidFrameStack,

    #[error("viewport {width}x{height} outside supported bounds")]
    ViewportOutOfRange { width: u32, height: u32 },

    #[error("invalid {field} range: min ({min}) > max ({max})")]
    InvalidRange {
        field: &'static str,
        min: u32,
        max: u32,
    },

    #[error("invalid value for {field}: {value} (must be finite and > 0)")]
    NonPositive { field: &'static str, value: f64 },

    #[error("invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("action table is empty")]
    EmptyActionTable,

    #[error("duplicate action label: {0}")]
    DuplicateAction(String),
}

/// Reject zero, negative, and non-finite values.
pub(crate) fn require_positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}
