use thiserror::Error;

/// Error kinds surfaced to callers of the coordination core (spec.md 7).
///
/// `InvalidState` and `ConfigError` are programmer errors raised before any
/// side effect takes place; `Timeout` is normal control flow; `Fatal`
/// indicates the session cannot continue and the process should abort.
#[derive(Debug, Error)]
pub enum HuskyError {
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("operation timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("fatal coordination error: {0}")]
    Fatal(String),
}

impl HuskyError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }
}
