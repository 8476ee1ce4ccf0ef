//! Single-owner, many-visitor collection handoff: [`Accessor`] for a plain
//! owner/visitor round, [`Shuffler`]/[`ShuffleCombiner`] for the
//! double-buffered variant that lets the owner fill the next round while
//! visitors still read the last one.

mod accessor;
mod error;
mod shuffler;

pub use accessor::{AccessGuard, Accessor, StorageGuard};
pub use error::AccessorError;
pub use shuffler::{ShuffleCombiner, Shuffler, WriteGuard};
