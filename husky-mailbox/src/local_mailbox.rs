use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use husky_types::{ByteBatch, ChannelId, GlobalThreadId, Progress};

use crate::error::MailboxError;
use crate::event::Event;
use crate::sparse_table::KeySparseTable;

#[derive(Default)]
struct Cell {
    queue: VecDeque<ByteBatch>,
    recv_complete: bool,
}

/// Per-thread façade over incoming and outgoing batch state for every
/// channel (spec.md 4.6). All mutation of a mailbox's own cells happens
/// either on the owning worker thread (reads via `poll`/`recv`) or on the
/// event loop thread (writes via [`LocalMailbox::deliver`] /
/// [`LocalMailbox::mark_complete`]), both serialized through `notify_lock`.
pub struct LocalMailbox {
    thread_id: GlobalThreadId,
    state: Mutex<KeySparseTable<Cell>>,
    notify: Condvar,
    to_loop: mpsc::Sender<Event>,
}

impl LocalMailbox {
    pub(crate) fn new(thread_id: GlobalThreadId, to_loop: mpsc::Sender<Event>) -> Self {
        Self {
            thread_id,
            state: Mutex::new(KeySparseTable::new()),
            notify: Condvar::new(),
            to_loop,
        }
    }

    pub fn thread_id(&self) -> GlobalThreadId {
        self.thread_id
    }

    /// Takes ownership of `batch` and posts an out-event; returns immediately.
    pub fn send(
        &self,
        dst: GlobalThreadId,
        channel: ChannelId,
        progress: Progress,
        batch: ByteBatch,
    ) {
        let _ = self.to_loop.send(Event::OutBatch {
            dst,
            channel,
            progress,
            batch,
        });
    }

    /// Declares this thread finished sending for `(channel, progress)`.
    pub fn send_complete(&self, channel: ChannelId, progress: Progress) {
        let _ = self.to_loop.send(Event::OutComplete { channel, progress });
    }

    /// Blocks until a batch is available or the pair is marked complete.
    /// Returns `true` iff a batch is available.
    pub fn poll(&self, channel: ChannelId, progress: Progress) -> bool {
        let mut state = self.state.lock().expect("mailbox poisoned");
        loop {
            let cell = state.get_mut(channel.as_usize(), progress.as_usize());
            if !cell.queue.is_empty() {
                return true;
            }
            if cell.recv_complete {
                break;
            }
            state = self.notify.wait(state).expect("mailbox poisoned");
        }
        reclaim_prev(&mut state, channel, progress);
        false
    }

    /// Snapshot-only: does not block or reclaim.
    pub fn poll_non_block(&self, channel: ChannelId, progress: Progress) -> bool {
        let mut state = self.state.lock().expect("mailbox poisoned");
        !state
            .get_mut(channel.as_usize(), progress.as_usize())
            .queue
            .is_empty()
    }

    /// Like [`LocalMailbox::poll`] but returns `false` once `timeout` elapses.
    pub fn poll_with_timeout(
        &self,
        channel: ChannelId,
        progress: Progress,
        timeout: Duration,
    ) -> bool {
        let mut state = self.state.lock().expect("mailbox poisoned");
        let deadline = Instant::now() + timeout;
        loop {
            {
                let cell = state.get_mut(channel.as_usize(), progress.as_usize());
                if !cell.queue.is_empty() {
                    return true;
                }
                if cell.recv_complete {
                    return false;
                }
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, result) = self
                .notify
                .wait_timeout(state, deadline - now)
                .expect("mailbox poisoned");
            state = guard;
            if result.timed_out() {
                return !state
                    .get_mut(channel.as_usize(), progress.as_usize())
                    .queue
                    .is_empty();
            }
        }
    }

    /// Selects across several `(channel, progress)` pairs; returns the index
    /// of one with an available batch, or `None` once all are complete.
    pub fn poll_many(&self, pairs: &[(ChannelId, Progress)]) -> Option<usize> {
        let mut state = self.state.lock().expect("mailbox poisoned");
        loop {
            for (i, (channel, progress)) in pairs.iter().enumerate() {
                if !state
                    .get_mut(channel.as_usize(), progress.as_usize())
                    .queue
                    .is_empty()
                {
                    return Some(i);
                }
            }
            if pairs.iter().all(|(channel, progress)| {
                state
                    .get_mut(channel.as_usize(), progress.as_usize())
                    .recv_complete
            }) {
                break;
            }
            state = self.notify.wait(state).expect("mailbox poisoned");
        }
        for (channel, progress) in pairs {
            reclaim_prev(&mut state, *channel, *progress);
        }
        None
    }

    /// Pops the oldest batch for `(channel, progress)`. Must be preceded by
    /// a `poll` that returned `true`.
    pub fn recv(&self, channel: ChannelId, progress: Progress) -> Result<ByteBatch, MailboxError> {
        let mut state = self.state.lock().expect("mailbox poisoned");
        state
            .get_mut(channel.as_usize(), progress.as_usize())
            .queue
            .pop_front()
            .ok_or(MailboxError::RecvWithoutPoll { channel, progress })
    }

    /// Enqueues `batch` for `(channel, progress)` and wakes waiters. Called
    /// only by the event loop thread.
    pub(crate) fn deliver(&self, channel: ChannelId, progress: Progress, batch: ByteBatch) {
        let mut state = self.state.lock().expect("mailbox poisoned");
        state
            .get_mut(channel.as_usize(), progress.as_usize())
            .queue
            .push_back(batch);
        drop(state);
        self.notify.notify_all();
    }

    /// Marks `(channel, progress)` complete and wakes waiters. Called only
    /// by the event loop thread.
    pub(crate) fn mark_complete(&self, channel: ChannelId, progress: Progress) {
        let mut state = self.state.lock().expect("mailbox poisoned");
        state
            .get_mut(channel.as_usize(), progress.as_usize())
            .recv_complete = true;
        drop(state);
        self.notify.notify_all();
    }
}

fn reclaim_prev(state: &mut KeySparseTable<Cell>, channel: ChannelId, progress: Progress) {
    if let Some(prev) = progress.prev() {
        state
            .get_mut(channel.as_usize(), prev.as_usize())
            .recv_complete = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn mailbox_with_sink() -> (LocalMailbox, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        (LocalMailbox::new(GlobalThreadId::new(0), tx), rx)
    }

    #[test]
    fn poll_blocks_until_delivery_then_recv_drains_fifo_order() {
        let (mailbox, _rx) = mailbox_with_sink();
        let mailbox = std::sync::Arc::new(mailbox);
        let channel = ChannelId::new(1);
        let progress = Progress::new(0);

        let reader = {
            let mailbox = mailbox.clone();
            thread::spawn(move || {
                assert!(mailbox.poll(channel, progress));
                mailbox.recv(channel, progress).unwrap()
            })
        };
        thread::sleep(Duration::from_millis(20));
        mailbox.deliver(channel, progress, ByteBatch::from_vec(b"abc".to_vec()));
        let batch = reader.join().unwrap();
        assert_eq!(batch.as_bytes(), b"abc");
    }

    #[test]
    fn poll_observes_completion_with_no_batch() {
        let (mailbox, _rx) = mailbox_with_sink();
        let channel = ChannelId::new(7);
        let progress = Progress::new(0);
        mailbox.mark_complete(channel, progress);
        assert!(!mailbox.poll(channel, progress));
    }

    #[test]
    fn poll_with_timeout_returns_false_without_delivery() {
        let (mailbox, _rx) = mailbox_with_sink();
        assert!(!mailbox.poll_with_timeout(
            ChannelId::new(0),
            Progress::new(0),
            Duration::from_millis(20)
        ));
    }

    #[test]
    fn poll_many_selects_the_ready_pair() {
        let (mailbox, _rx) = mailbox_with_sink();
        let pairs = [
            (ChannelId::new(0), Progress::new(0)),
            (ChannelId::new(1), Progress::new(0)),
        ];
        mailbox.deliver(
            ChannelId::new(1),
            Progress::new(0),
            ByteBatch::from_vec(b"y".to_vec()),
        );
        assert_eq!(mailbox.poll_many(&pairs), Some(1));
    }

    #[test]
    fn recv_without_poll_is_invalid_state() {
        let (mailbox, _rx) = mailbox_with_sink();
        assert!(mailbox.recv(ChannelId::new(0), Progress::new(0)).is_err());
    }
}
