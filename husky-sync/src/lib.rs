//! Thread-synchronization primitives and the session lifecycle registry
//! that the mailbox, event loop, and accessor layers are built on.

mod concurrent_queue;
mod counter_barrier;
mod generation_lock;
mod reusable_barrier;
mod session_registry;

pub use concurrent_queue::ConcurrentQueue;
pub use counter_barrier::CounterBarrier;
pub use generation_lock::{CallOnceEachRound, GenerationLock};
pub use reusable_barrier::{DynamicBarrier, ReusableBarrier};
pub use session_registry::{Priority, SessionRegistry};
