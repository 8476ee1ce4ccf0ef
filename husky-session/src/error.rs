use thiserror::Error;

/// Errors surfaced while loading and validating a [`crate::SessionConfig`],
/// or while bringing a [`crate::SessionContext`] up (spec.md 7,
/// "ConfigError").
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{field} must be > 0")]
    MustBeNonZero { field: &'static str },

    #[error("bind_address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("this process's id {0} is not unique among the peer table")]
    DuplicateProcessId(u32),

    #[error("peer list must not name this process's own id ({0})")]
    SelfReferentialPeer(u32),

    #[error("could not connect to peer process {process_id} at {bind_address}: {source}")]
    PeerUnreachable {
        process_id: u32,
        bind_address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not bind the local receiver socket at {bind_address}: {source}")]
    BindFailed {
        bind_address: String,
        #[source]
        source: std::io::Error,
    },
}
