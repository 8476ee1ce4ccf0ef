use std::fmt;

/// Globally unique id of a worker thread, stable across the whole session.
///
/// `GlobalThreadId in [0, N)` where `N` is the total thread count across all
/// processes (spec.md 3, "Thread identity").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GlobalThreadId(pub u32);

/// Id of a worker thread local to its hosting process, `[0, k_p)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalThreadId(pub u32);

/// Id of a process within the session, `[0, P)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u32);

/// Identifier of a logical channel, assigned once per application-level data
/// stream (spec.md 3, "Channel identifier").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub u32);

/// Monotonically non-decreasing round counter for a `(thread, channel)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Progress(pub u32);

macro_rules! impl_id {
    ($ty:ident) => {
        impl $ty {
            pub fn new(value: u32) -> Self {
                Self(value)
            }

            pub fn get(self) -> u32 {
                self.0
            }

            pub fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $ty {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

impl_id!(GlobalThreadId);
impl_id!(LocalThreadId);
impl_id!(ProcessId);
impl_id!(ChannelId);
impl_id!(Progress);

impl Progress {
    /// The previous progress value, if any. A reader observing
    /// `recv_complete` at `self` may reclaim the cell at `self.prev()`.
    pub fn prev(self) -> Option<Progress> {
        self.0.checked_sub(1).map(Progress)
    }
}
