use std::collections::VecDeque;
use std::sync::Mutex;

/// Unbounded MPMC FIFO guarded by a single mutex.
///
/// This is the only container that holds batch ownership while a batch is
/// in flight on the receiving side (spec.md 4.3); callers needing to block
/// on emptiness layer their own condition variable on top (the mailbox does
/// this with its notify lock).
pub struct ConcurrentQueue<T> {
    queue: Mutex<VecDeque<T>>,
}

impl<T> ConcurrentQueue<T> {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, element: T) {
        self.queue
            .lock()
            .expect("concurrent queue poisoned")
            .push_back(element);
    }

    pub fn pop(&self) -> Option<T> {
        self.queue
            .lock()
            .expect("concurrent queue poisoned")
            .pop_front()
    }

    pub fn size(&self) -> usize {
        self.queue.lock().expect("concurrent queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }
}

impl<T> Default for ConcurrentQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fifo_order_for_a_single_producer() {
        let queue = ConcurrentQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn loses_no_elements_under_concurrent_producers() {
        // property 6: #pops + #remaining == #pushes
        let queue = Arc::new(ConcurrentQueue::new());
        let producers = 8;
        let per_producer = 2_000;

        let handles: Vec<_> = (0..producers)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..per_producer {
                        queue.push(p * per_producer + i);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut popped = 0;
        while queue.pop().is_some() {
            popped += 1;
        }
        assert_eq!(popped, producers * per_producer);
        assert!(queue.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn pushes_equal_pops_plus_remaining(pushes in 0usize..500) {
            let queue = ConcurrentQueue::new();
            for i in 0..pushes {
                queue.push(i);
            }
            let mut popped = 0;
            while queue.pop().is_some() {
                popped += 1;
            }
            assert_eq!(popped, pushes);
        }
    }
}
