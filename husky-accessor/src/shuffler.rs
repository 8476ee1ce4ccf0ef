use std::cell::RefCell;
use std::collections::HashSet;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard};

use husky_sync::{CounterBarrier, GenerationLock};

use crate::error::AccessorError;

thread_local! {
    static HOLDING: RefCell<HashSet<usize>> = RefCell::new(HashSet::new());
}

/// Double-buffered [`crate::Accessor`]: the owner's `storage()` writes into
/// a private buffer entirely independent of whatever visitors are currently
/// reading, so the owner can start filling round `k + 1` while visitors of
/// round `k` are still in `access()`/`leave()` — the defining difference
/// from a plain `Accessor`, which shares one collection between owner and
/// visitors and so cannot be written while visitors are out.
///
/// Because each `commit()` swaps a fresh value in rather than mutating a
/// shared slot in place, visitors hold an `Arc` snapshot rather than a lock
/// guard, decoupling their read from any lock the owner's next round takes.
pub struct Shuffler<T> {
    num_units: Mutex<Option<usize>>,
    commit_barrier: CounterBarrier,
    access_lock: GenerationLock,
    write: Mutex<Option<T>>,
    published: Mutex<Option<Arc<T>>>,
    in_access: Mutex<bool>,
}

impl<T> Shuffler<T> {
    pub fn new() -> Self {
        Self {
            num_units: Mutex::new(None),
            commit_barrier: CounterBarrier::new(),
            access_lock: GenerationLock::new(),
            write: Mutex::new(None),
            published: Mutex::new(None),
            in_access: Mutex::new(false),
        }
    }

    pub fn init(&self, num_units: usize) {
        let mut guard = self.num_units.lock().expect("shuffler poisoned");
        if guard.is_none() {
            *guard = Some(num_units);
            self.commit_barrier.set_target(num_units);
        }
    }

    fn require_init(&self) -> Result<(), AccessorError> {
        if self.num_units.lock().expect("shuffler poisoned").is_none() {
            Err(AccessorError::NotInitialized)
        } else {
            Ok(())
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Returns a mutable handle to the owner's write buffer. Never fails on
    /// account of an in-progress commit: the write buffer is disjoint from
    /// whatever visitors are currently reading.
    pub fn storage(&self) -> WriteGuard<'_, T>
    where
        T: Default,
    {
        let mut guard = self.write.lock().expect("shuffler poisoned");
        if guard.is_none() {
            *guard = Some(T::default());
        }
        WriteGuard { guard }
    }

    /// Swaps the write buffer into the published collection and notifies
    /// visitors. Fails with `CommitInProgress` if the previous round's
    /// visitors have not all left yet.
    pub fn commit(&self) -> Result<(), AccessorError>
    where
        T: Default,
    {
        self.require_init()?;
        let mut in_access = self.in_access.lock().expect("shuffler poisoned");
        if *in_access {
            return Err(AccessorError::CommitInProgress);
        }
        let value = self
            .write
            .lock()
            .expect("shuffler poisoned")
            .take()
            .unwrap_or_default();
        *self.published.lock().expect("shuffler poisoned") = Some(Arc::new(value));
        *in_access = true;
        drop(in_access);
        self.access_lock.notify();
        Ok(())
    }

    /// Publishes a caller-supplied collection, discarding any unfinished
    /// `storage()` edits.
    pub fn commit_with(&self, collection: T) -> Result<(), AccessorError> {
        self.require_init()?;
        let mut in_access = self.in_access.lock().expect("shuffler poisoned");
        if *in_access {
            return Err(AccessorError::CommitInProgress);
        }
        *self.write.lock().expect("shuffler poisoned") = None;
        *self.published.lock().expect("shuffler poisoned") = Some(Arc::new(collection));
        *in_access = true;
        drop(in_access);
        self.access_lock.notify();
        Ok(())
    }

    /// Blocks until the owner has committed this round, then returns the
    /// published snapshot. Fails with [`AccessorError::DoubleAccess`] if
    /// this thread already holds a visitor handle on this shuffler.
    pub fn access(&self) -> Result<Arc<T>, AccessorError> {
        self.require_init()?;
        let key = self.key();
        let already_holding = HOLDING.with(|h| !h.borrow_mut().insert(key));
        if already_holding {
            return Err(AccessorError::DoubleAccess);
        }
        self.access_lock.wait();
        let view = self
            .published
            .lock()
            .expect("shuffler poisoned")
            .clone()
            .expect("commit() always publishes before notify()");
        Ok(view)
    }

    /// Releases this thread's visitor handle. Once every visitor of the
    /// current round has left, the owner may `commit()` again.
    pub fn leave(&self) -> Result<(), AccessorError> {
        self.require_init()?;
        HOLDING.with(|h| {
            h.borrow_mut().remove(&self.key());
        });
        if self.commit_barrier.arrive(false) {
            *self.in_access.lock().expect("shuffler poisoned") = false;
        }
        Ok(())
    }
}

impl<T> Default for Shuffler<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable view into a [`Shuffler`]'s write buffer, held for the duration
/// of a `storage()` call.
pub struct WriteGuard<'a, T> {
    guard: MutexGuard<'a, Option<T>>,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.guard
            .as_ref()
            .expect("storage() ensures the write buffer is Some")
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard
            .as_mut()
            .expect("storage() ensures the write buffer is Some")
    }
}

/// A [`Shuffler`] per destination unit, each visited by exactly one
/// combining thread. Used to fan values keyed by destination out of a
/// single producer thread without per-unit locking beyond the shuffler
/// itself (spec.md 4.4).
pub struct ShuffleCombiner<T> {
    lanes: Vec<Shuffler<Vec<T>>>,
}

impl<T> ShuffleCombiner<T> {
    pub fn new(num_units: usize) -> Self {
        let lanes: Vec<Shuffler<Vec<T>>> = (0..num_units).map(|_| Shuffler::new()).collect();
        for lane in &lanes {
            lane.init(1);
        }
        Self { lanes }
    }

    pub fn storage(&self, idx: usize) -> WriteGuard<'_, Vec<T>> {
        self.lanes[idx].storage()
    }

    pub fn commit(&self, idx: usize) -> Result<(), AccessorError> {
        self.lanes[idx].commit()
    }

    pub fn access(&self, idx: usize) -> Result<Arc<Vec<T>>, AccessorError> {
        self.lanes[idx].access()
    }

    pub fn leave(&self, idx: usize) -> Result<(), AccessorError> {
        self.lanes[idx].leave()
    }

    pub fn num_units(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn owner_can_fill_the_next_round_while_a_visitor_still_holds_the_last_one() {
        let shuffler: Arc<Shuffler<Vec<i32>>> = Arc::new(Shuffler::new());
        shuffler.init(1);

        shuffler.storage().push(1);
        shuffler.commit().unwrap();

        // Visitor takes round 1's value and holds it open.
        let round1 = shuffler.access().unwrap();
        assert_eq!(*round1, vec![1]);

        // Owner starts filling round 2 before the round-1 visitor leaves;
        // this would fail on a plain Accessor (CommitInProgress).
        shuffler.storage().push(2);

        shuffler.leave().unwrap();
        shuffler.commit().unwrap();
        let round2 = shuffler.access().unwrap();
        assert_eq!(*round2, vec![2]);
        shuffler.leave().unwrap();
        // round1's snapshot is still valid even after round 2 published.
        assert_eq!(*round1, vec![1]);
    }

    #[test]
    fn shuffle_combiner_fans_values_out_by_destination_unit() {
        const UNITS: usize = 4;
        const PRODUCERS: usize = 3;

        let combiner = Arc::new(ShuffleCombiner::<i32>::new(UNITS));
        let start = Arc::new(Barrier::new(PRODUCERS));

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let combiner = Arc::clone(&combiner);
                let start = Arc::clone(&start);
                thread::spawn(move || {
                    start.wait();
                    for unit in 0..combiner.num_units() {
                        combiner.storage(unit).push(p as i32);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        for unit in 0..UNITS {
            combiner.commit(unit).unwrap();
        }
        for unit in 0..UNITS {
            let batch = combiner.access(unit).unwrap();
            let mut sorted = (*batch).clone();
            sorted.sort();
            assert_eq!(sorted, vec![0, 1, 2]);
            combiner.leave(unit).unwrap();
        }
    }
}
