//! Thread identity, byte batches, and error types shared across the Husky
//! coordination core (mailbox, event loop, accessor, session registry).

mod batch;
mod error;
mod ids;

pub use batch::ByteBatch;
pub use error::HuskyError;
pub use ids::{ChannelId, GlobalThreadId, LocalThreadId, ProcessId, Progress};
