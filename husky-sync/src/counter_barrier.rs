use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};

struct Status {
    counter: usize,
    target: usize,
}

/// The primary synchronization primitive of the mailbox shim (spec.md 4.2).
///
/// Units call [`CounterBarrier::arrive`] to increment an internal counter;
/// once it reaches the configured target the barrier resets and wakes every
/// thread that chose to wait. Unlike [`crate::ReusableBarrier`], an arrival
/// may opt out of waiting (`should_wait = false`) and return immediately,
/// which the mailbox relies on for the owner side of an accessor commit.
pub struct CounterBarrier {
    status: Mutex<Status>,
    num_waiting: AtomicUsize,
    wake: Mutex<bool>,
    notifier: Condvar,
}

impl CounterBarrier {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(Status {
                counter: 0,
                target: 0,
            }),
            num_waiting: AtomicUsize::new(0),
            wake: Mutex::new(false),
            notifier: Condvar::new(),
        }
    }

    pub fn set_target(&self, target: usize) {
        self.status.lock().expect("counter barrier poisoned").target = target;
    }

    /// Arrives at the barrier. If this arrival completes the cohort, resets
    /// the counter, releases every waiter, and returns `true`. Otherwise,
    /// blocks until released when `should_wait` is set, or returns
    /// immediately; either way returns `false` since this caller did not
    /// complete the cohort.
    pub fn arrive(&self, should_wait: bool) -> bool {
        let mut status = self.status.lock().expect("counter barrier poisoned");
        status.counter += 1;
        if status.counter == status.target {
            status.counter = 0;
            drop(status);

            *self.wake.lock().expect("counter barrier poisoned") = true;
            self.notifier.notify_all();

            // Re-entrance guard: spin until every waiter woken by this
            // release has observed the wake flag and decremented
            // `num_waiting`, so an arrival belonging to the *next* round
            // cannot race with this round's pending wakeups. Keep notifying
            // each iteration: a waiter may not have reached the condvar wait
            // yet when the first notify_all fires.
            while self.num_waiting.load(Ordering::SeqCst) != 0 {
                self.notifier.notify_all();
                std::thread::yield_now();
            }
            *self.wake.lock().expect("counter barrier poisoned") = false;
            true
        } else if should_wait {
            self.num_waiting.fetch_add(1, Ordering::SeqCst);
            drop(status);
            let mut wake = self.wake.lock().expect("counter barrier poisoned");
            while !*wake {
                wake = self.notifier.wait(wake).expect("counter barrier poisoned");
            }
            self.num_waiting.fetch_sub(1, Ordering::SeqCst);
            false
        } else {
            false
        }
    }
}

impl Default for CounterBarrier {
    fn default() -> Self {
        Self::new()
    }
}
