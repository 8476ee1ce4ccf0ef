use thiserror::Error;

/// Errors surfaced by [`crate::Accessor`] and [`crate::Shuffler`].
#[derive(Debug, Error)]
pub enum AccessorError {
    #[error("accessor is not initialized; call init() before use")]
    NotInitialized,

    #[error("storage() called while a commit is in progress")]
    CommitInProgress,

    #[error("this thread already holds a visitor handle for this accessor this round")]
    DoubleAccess,
}
