use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

thread_local! {
    /// Per-thread generation counters, keyed by the address of the lock
    /// instance they belong to (mirrors the original's `thread_local`
    /// `unordered_map<GenerationBase*, ...>`, substituting a raw address
    /// for the C++ `this` pointer since Rust has no implicit object
    /// identity to hang a thread-local off of otherwise).
    static COUNTS: RefCell<HashMap<usize, u64>> = RefCell::new(HashMap::new());
}

fn bump_local_count(key: usize) -> u64 {
    COUNTS.with(|counts| {
        let mut counts = counts.borrow_mut();
        let count = counts.entry(key).or_insert(0);
        *count += 1;
        *count
    })
}

/// Asymmetric many-waiters / one-notifier synchronizer.
///
/// Each thread tracks how many times it has called [`GenerationLock::wait`]
/// on this lock. A `wait()` call blocks until at least as many `notify()`s
/// have happened as this thread has issued `wait()`s — the notifier need
/// not know how many waiters exist, or whether they have entered `wait()`
/// yet, which decouples cohort size from the moment of notification
/// (spec.md 4.2).
pub struct GenerationLock {
    generation: Mutex<u64>,
    notifier: Condvar,
}

impl GenerationLock {
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            notifier: Condvar::new(),
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    /// Bumps the global generation and wakes every waiter.
    pub fn notify(&self) {
        let mut generation = self.generation.lock().expect("generation lock poisoned");
        *generation += 1;
        self.notifier.notify_all();
    }

    /// Blocks until `notify()` has been called at least as many times as
    /// this thread has called `wait()`.
    pub fn wait(&self) {
        let count = bump_local_count(self.key());
        let mut generation = self.generation.lock().expect("generation lock poisoned");
        while count > *generation {
            generation = self
                .notifier
                .wait(generation)
                .expect("generation lock poisoned");
        }
    }
}

impl Default for GenerationLock {
    fn default() -> Self {
        Self::new()
    }
}

/// A `GenerationLock` variant used to run a per-round initializer exactly
/// once among a cohort of threads: in each round, the first thread whose
/// local counter runs ahead of the global generation executes the closure
/// and bumps the generation; every other thread in that round is a no-op.
pub struct CallOnceEachRound {
    generation: Mutex<u64>,
    exec: Mutex<()>,
}

impl CallOnceEachRound {
    pub fn new() -> Self {
        Self {
            generation: Mutex::new(0),
            exec: Mutex::new(()),
        }
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }

    pub fn call<F: FnOnce()>(&self, f: F) {
        let count = bump_local_count(self.key());
        let _guard = self.exec.lock().expect("call-once-each-round poisoned");
        let mut generation = self
            .generation
            .lock()
            .expect("call-once-each-round poisoned");
        if count > *generation {
            f();
            *generation += 1;
        }
    }
}

impl Default for CallOnceEachRound {
    fn default() -> Self {
        Self::new()
    }
}
