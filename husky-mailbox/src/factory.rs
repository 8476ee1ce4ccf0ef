use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use husky_accessor::{Accessor, ShuffleCombiner};
use husky_types::ChannelId;

use crate::error::MailboxError;

struct Entry {
    value: Box<dyn Any + Send + Sync>,
    refcount: usize,
}

/// Lazily allocates per-`ChannelId` accessor and shuffle-combiner sets under
/// a double-checked lock, and frees them once every local thread has called
/// [`Factory::remove`] (spec.md 4.9).
///
/// Payload types are erased behind `Box<dyn Any>`; a lookup whose stored
/// type doesn't match the requested `T` is a [`MailboxError::ChannelTypeMismatch`],
/// not a panic — the set is still caller data, not loop state.
pub struct Factory {
    num_local_threads: usize,
    entries: Mutex<HashMap<ChannelId, Entry>>,
}

impl Factory {
    pub fn new(num_local_threads: usize) -> Self {
        Self {
            num_local_threads,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the `AccessorSet<T>` for `channel`: one [`Accessor<T>`] per
    /// local thread, each pre-initialized with `num_local_threads` as its
    /// commit-barrier target. Allocated on first call for this channel.
    pub fn accessors<T>(&self, channel: ChannelId) -> Result<Arc<Vec<Accessor<T>>>, MailboxError>
    where
        T: Send + Sync + 'static,
    {
        let num_local_threads = self.num_local_threads;
        self.get_or_create(channel, move || {
            let set: Vec<Accessor<T>> = (0..num_local_threads).map(|_| Accessor::new()).collect();
            for accessor in &set {
                accessor.init(num_local_threads);
            }
            set
        })
    }

    /// Returns the `ShuffleCombinerSet<T>` for `channel`: one
    /// [`ShuffleCombiner<T>`] per local thread, each with `num_units` lanes.
    pub fn shuffle_combiners<T>(
        &self,
        channel: ChannelId,
        num_units: usize,
    ) -> Result<Arc<Vec<ShuffleCombiner<T>>>, MailboxError>
    where
        T: Send + Sync + 'static,
    {
        let num_local_threads = self.num_local_threads;
        self.get_or_create(channel, move || {
            (0..num_local_threads)
                .map(|_| ShuffleCombiner::new(num_units))
                .collect()
        })
    }

    fn get_or_create<T, F>(&self, channel: ChannelId, build: F) -> Result<Arc<Vec<T>>, MailboxError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Vec<T>,
    {
        let mut entries = self.entries.lock().expect("factory poisoned");
        if let Some(entry) = entries.get(&channel) {
            return downcast(entry, channel);
        }
        let value: Arc<Vec<T>> = Arc::new(build());
        entries.insert(
            channel,
            Entry {
                value: Box::new(Arc::clone(&value)),
                refcount: self.num_local_threads,
            },
        );
        Ok(value)
    }

    /// Releases one local thread's reference to `channel`'s set. The set is
    /// freed once all `num_local_threads` releasers have called this.
    pub fn remove(&self, channel: ChannelId) {
        let mut entries = self.entries.lock().expect("factory poisoned");
        if let Some(entry) = entries.get_mut(&channel) {
            entry.refcount -= 1;
            if entry.refcount == 0 {
                entries.remove(&channel);
            }
        }
    }
}

fn downcast<T: Send + Sync + 'static>(
    entry: &Entry,
    channel: ChannelId,
) -> Result<Arc<Vec<T>>, MailboxError> {
    entry
        .value
        .downcast_ref::<Arc<Vec<T>>>()
        .cloned()
        .ok_or(MailboxError::ChannelTypeMismatch(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_are_allocated_once_and_shared_across_lookups() {
        let factory = Factory::new(2);
        let channel = ChannelId::new(1);
        let first = factory.accessors::<i32>(channel).unwrap();
        let second = factory.accessors::<i32>(channel).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn type_mismatch_is_reported_not_panicked() {
        let factory = Factory::new(1);
        let channel = ChannelId::new(1);
        factory.accessors::<i32>(channel).unwrap();
        assert!(matches!(
            factory.accessors::<u64>(channel),
            Err(MailboxError::ChannelTypeMismatch(_))
        ));
    }

    #[test]
    fn remove_frees_only_after_every_local_thread_releases() {
        let factory = Factory::new(2);
        let channel = ChannelId::new(3);
        let kept = factory.accessors::<i32>(channel).unwrap();
        factory.remove(channel);
        // still allocated: one more releaser outstanding
        let still_shared = factory.accessors::<i32>(channel).unwrap();
        assert!(Arc::ptr_eq(&kept, &still_shared));
        factory.remove(channel);
        // freed now; next lookup allocates a fresh set
        let fresh = factory.accessors::<i32>(channel).unwrap();
        assert!(!Arc::ptr_eq(&kept, &fresh));
    }
}
