use std::net::TcpStream;
use std::sync::Arc;

use husky_types::{ByteBatch, ChannelId, GlobalThreadId, ProcessId, Progress};

use crate::local_mailbox::LocalMailbox;

/// The four event types the event loop serializes (spec.md 4.7), plus the
/// registration and teardown events needed to get mailboxes and peer
/// streams into the loop thread without any other thread touching its
/// tables directly.
pub(crate) enum Event {
    OutBatch {
        dst: GlobalThreadId,
        channel: ChannelId,
        progress: Progress,
        batch: ByteBatch,
    },
    InBatch {
        dst: GlobalThreadId,
        channel: ChannelId,
        progress: Progress,
        batch: ByteBatch,
    },
    OutComplete {
        channel: ChannelId,
        progress: Progress,
    },
    InComplete {
        channel: ChannelId,
        progress: Progress,
    },
    RegisterMailbox {
        tid: GlobalThreadId,
        mailbox: Arc<LocalMailbox>,
    },
    RegisterPeer {
        process_id: ProcessId,
        stream: TcpStream,
    },
    Destroy,
}
