use thiserror::Error;

/// Errors surfaced by the mailbox, event loop, and channel factory.
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("recv({channel:?}, {progress:?}) called without a preceding positive poll")]
    RecvWithoutPoll {
        channel: husky_types::ChannelId,
        progress: husky_types::Progress,
    },

    #[error("channel {0:?} was registered with a different payload type")]
    ChannelTypeMismatch(husky_types::ChannelId),

    #[error("no route to process {0:?}; it was never registered as a peer")]
    UnknownPeer(husky_types::ProcessId),

    #[error("peer socket I/O error: {0}")]
    Fatal(String),
}
