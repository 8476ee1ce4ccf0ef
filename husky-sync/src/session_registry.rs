use std::cell::RefCell;
use std::sync::{Mutex, OnceLock};

/// Priority class for a thread-final callback; `High` runs before `Low`
/// (spec.md 4.1) so that dependent state (e.g. a mailbox a collection
/// refers to) finalizes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    High,
}

type Callback = Box<dyn Fn() + Send + Sync>;

fn initializers() -> &'static Mutex<Vec<Callback>> {
    static INITIALIZERS: OnceLock<Mutex<Vec<Callback>>> = OnceLock::new();
    INITIALIZERS.get_or_init(|| Mutex::new(Vec::new()))
}

fn finalizers() -> &'static Mutex<Vec<Callback>> {
    static FINALIZERS: OnceLock<Mutex<Vec<Callback>>> = OnceLock::new();
    FINALIZERS.get_or_init(|| Mutex::new(Vec::new()))
}

fn session_end() -> &'static Mutex<bool> {
    static SESSION_END: OnceLock<Mutex<bool>> = OnceLock::new();
    SESSION_END.get_or_init(|| Mutex::new(true))
}

thread_local! {
    static THREAD_FINALIZERS: RefCell<Vec<(Priority, Callback)>> = const { RefCell::new(Vec::new()) };
}

/// Process-wide init/finalize registry that bounds thread-local caches,
/// accessor maps, and worker-local aggregators to a session boundary, so a
/// process may host a sequence of independent sessions (spec.md 4.1).
pub struct SessionRegistry;

impl SessionRegistry {
    pub fn register_initializer(f: impl Fn() + Send + Sync + 'static) {
        initializers()
            .lock()
            .expect("session registry poisoned")
            .push(Box::new(f));
    }

    pub fn register_finalizer(f: impl Fn() + Send + Sync + 'static) {
        finalizers()
            .lock()
            .expect("session registry poisoned")
            .push(Box::new(f));
    }

    /// Registers a finalizer local to the calling thread; it runs during
    /// `thread_finalize()` on this thread only.
    pub fn register_thread_finalizer(priority: Priority, f: impl Fn() + Send + Sync + 'static) {
        THREAD_FINALIZERS.with(|list| list.borrow_mut().push((priority, Box::new(f))));
    }

    /// Runs init callbacks in registration order if the session had ended.
    pub fn initialize() {
        let mut ended = session_end().lock().expect("session registry poisoned");
        if *ended {
            for f in initializers()
                .lock()
                .expect("session registry poisoned")
                .iter()
            {
                f();
            }
            *ended = false;
        }
    }

    /// Runs finalizer callbacks in registration order if the session had
    /// not ended.
    pub fn finalize() {
        let mut ended = session_end().lock().expect("session registry poisoned");
        if !*ended {
            for f in finalizers()
                .lock()
                .expect("session registry poisoned")
                .iter()
            {
                f();
            }
            *ended = true;
        }
    }

    /// Runs this thread's final callbacks, sorted by priority descending
    /// (`High` first). A no-op once the session has ended.
    pub fn thread_finalize() {
        if *session_end().lock().expect("session registry poisoned") {
            return;
        }
        THREAD_FINALIZERS.with(|list| {
            let mut list = list.borrow_mut();
            list.sort_by_key(|(priority, _)| std::cmp::Reverse(*priority));
            for (_, f) in list.iter() {
                f();
            }
        });
    }

    pub fn is_session_end() -> bool {
        *session_end().lock().expect("session registry poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // SessionRegistry's initializer/finalizer lists are process-wide
    // singletons (spec.md 4.1 models them as static state), so both
    // behaviors are exercised in one test to avoid cross-test interference
    // under cargo's parallel test runner.
    #[test]
    fn registry_runs_hooks_once_per_session_and_orders_thread_finalizers() {
        let init_count = Arc::new(AtomicUsize::new(0));
        let fina_count = Arc::new(AtomicUsize::new(0));
        let init_count_clone = Arc::clone(&init_count);
        let fina_count_clone = Arc::clone(&fina_count);

        SessionRegistry::finalize(); // ensure clean starting state
        SessionRegistry::register_initializer(move || {
            init_count_clone.fetch_add(1, Ordering::SeqCst);
        });
        SessionRegistry::register_finalizer(move || {
            fina_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        SessionRegistry::initialize();
        SessionRegistry::initialize(); // second call is a no-op
        assert_eq!(init_count.load(Ordering::SeqCst), 1);

        let order = Arc::new(Mutex::new(Vec::new()));
        let order_low = Arc::clone(&order);
        let order_high = Arc::clone(&order);
        SessionRegistry::register_thread_finalizer(Priority::Low, move || {
            order_low.lock().unwrap().push("low");
        });
        SessionRegistry::register_thread_finalizer(Priority::High, move || {
            order_high.lock().unwrap().push("high");
        });
        SessionRegistry::thread_finalize();
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);

        SessionRegistry::finalize();
        SessionRegistry::finalize(); // second call is a no-op
        assert_eq!(fina_count.load(Ordering::SeqCst), 1);
    }
}
