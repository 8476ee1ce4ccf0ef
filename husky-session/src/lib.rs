//! Loads a static process/thread topology, validates it, and brings up a
//! [`MailboxEventLoop`](husky_mailbox::MailboxEventLoop)-backed session from
//! it (spec.md 2, 7).

mod config;
mod context;
mod error;

pub use config::{PeerEntry, SessionConfig, ValidatedConfig};
pub use context::SessionContext;
pub use error::SessionError;
