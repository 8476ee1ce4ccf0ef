use std::collections::HashMap;
use std::io::Write;
use std::net::TcpStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use husky_types::{ChannelId, GlobalThreadId, ProcessId, Progress};

use crate::error::MailboxError;
use crate::event::Event;
use crate::local_mailbox::LocalMailbox;
use crate::wire::{self, PeerEnvelope};

/// The single dedicated thread per process that serializes every mailbox
/// state transition (spec.md 4.7). Worker threads and [`crate::CentralRecver`]
/// only ever post [`Event`]s to it; none of them touch its tables directly.
pub struct MailboxEventLoop {
    to_loop: mpsc::Sender<Event>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MailboxEventLoop {
    /// Spawns the event loop thread for `process_id`. `tid_to_pid` is the
    /// session-wide thread-to-process map; `num_processes` is the total
    /// process count (this process plus every peer); `peers` holds one
    /// already-open outgoing stream per remote process already known at
    /// construction time — more may be added later via
    /// [`MailboxEventLoop::register_peer`].
    pub fn new(
        process_id: ProcessId,
        num_local_threads: usize,
        tid_to_pid: HashMap<GlobalThreadId, ProcessId>,
        peers: HashMap<ProcessId, TcpStream>,
    ) -> Self {
        let num_processes = peers.len() + 1;
        Self::with_topology(
            process_id,
            num_local_threads,
            num_processes,
            tid_to_pid,
            peers,
        )
    }

    /// Like [`MailboxEventLoop::new`] but takes the full process count
    /// up front, for topologies where peer streams are registered after
    /// construction (each peer's bind address may depend on another
    /// process's `CentralRecver` having already bound its socket).
    pub fn with_topology(
        process_id: ProcessId,
        num_local_threads: usize,
        num_processes: usize,
        tid_to_pid: HashMap<GlobalThreadId, ProcessId>,
        peers: HashMap<ProcessId, TcpStream>,
    ) -> Self {
        let (to_loop, from_senders) = mpsc::channel();
        let handle = thread::Builder::new()
            .name(format!("husky-event-loop-{}", process_id.get()))
            .spawn(move || {
                run(
                    from_senders,
                    num_local_threads,
                    num_processes,
                    tid_to_pid,
                    peers,
                )
            })
            .expect("failed to spawn event loop thread");
        Self {
            to_loop,
            handle: Some(handle),
        }
    }

    /// Returns a sender clone; [`crate::LocalMailbox`] and
    /// [`crate::CentralRecver`] use this to post events without ever
    /// touching the loop's internal tables.
    pub(crate) fn sender(&self) -> mpsc::Sender<Event> {
        self.to_loop.clone()
    }

    /// Registers `mailbox` under `tid` so the loop can deliver to it.
    pub fn register_mailbox(&self, tid: GlobalThreadId, mailbox: Arc<LocalMailbox>) {
        let _ = self.to_loop.send(Event::RegisterMailbox { tid, mailbox });
    }

    /// Builds a [`crate::LocalMailbox`] already wired to this loop's sender.
    pub fn new_mailbox(&self, tid: GlobalThreadId) -> Arc<LocalMailbox> {
        let mailbox = Arc::new(LocalMailbox::new(tid, self.sender()));
        self.register_mailbox(tid, Arc::clone(&mailbox));
        mailbox
    }

    /// Registers an already-connected outgoing stream to `process_id`.
    pub fn register_peer(&self, process_id: ProcessId, stream: TcpStream) {
        let _ = self
            .to_loop
            .send(Event::RegisterPeer { process_id, stream });
    }
}

impl Drop for MailboxEventLoop {
    fn drop(&mut self) {
        let _ = self.to_loop.send(Event::Destroy);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(
    events: mpsc::Receiver<Event>,
    num_local_threads: usize,
    num_processes: usize,
    tid_to_pid: HashMap<GlobalThreadId, ProcessId>,
    mut peers: HashMap<ProcessId, TcpStream>,
) {
    let mut mailboxes: HashMap<GlobalThreadId, Arc<LocalMailbox>> = HashMap::new();
    let mut out_complete: HashMap<(ChannelId, Progress), usize> = HashMap::new();
    let mut in_complete: HashMap<(ChannelId, Progress), usize> = HashMap::new();

    for event in events {
        match event {
            Event::RegisterMailbox { tid, mailbox } => {
                mailboxes.insert(tid, mailbox);
            }
            Event::RegisterPeer { process_id, stream } => {
                peers.insert(process_id, stream);
            }
            Event::OutBatch {
                dst,
                channel,
                progress,
                batch,
            } => {
                if let Some(mailbox) = mailboxes.get(&dst) {
                    mailbox.deliver(channel, progress, batch);
                } else if let Some(pid) = tid_to_pid.get(&dst) {
                    if let Some(stream) = peers.get_mut(pid) {
                        let envelope = PeerEnvelope::Batch {
                            tid: dst,
                            channel,
                            progress,
                            batch,
                        };
                        if let Err(source) = wire::write_envelope(stream, &envelope) {
                            let error = MailboxError::Fatal(source.to_string());
                            tracing::error!(
                                %error,
                                process = pid.get(),
                                "peer socket write failed; session cannot continue"
                            );
                        }
                    } else {
                        let error = MailboxError::UnknownPeer(*pid);
                        tracing::error!(%error, dst = dst.get(), "no route to destination thread's process");
                    }
                } else {
                    tracing::error!(dst = dst.get(), "destination thread is not in the topology");
                }
            }
            Event::InBatch {
                dst,
                channel,
                progress,
                batch,
            } => {
                if let Some(mailbox) = mailboxes.get(&dst) {
                    mailbox.deliver(channel, progress, batch);
                } else {
                    tracing::error!(
                        dst = dst.get(),
                        "InBatch for a thread not hosted by this process"
                    );
                }
            }
            Event::OutComplete { channel, progress } => {
                let key = (channel, progress);
                let count = out_complete.entry(key).or_insert(0);
                *count += 1;
                if *count == num_local_threads {
                    out_complete.remove(&key);
                    for stream in peers.values_mut() {
                        let envelope = PeerEnvelope::PeerComplete { channel, progress };
                        if let Err(source) = wire::write_envelope(stream, &envelope) {
                            let error = MailboxError::Fatal(source.to_string());
                            tracing::error!(
                                %error,
                                "peer socket write failed broadcasting PeerComplete"
                            );
                        }
                    }
                    handle_in_complete(
                        &mut in_complete,
                        &mailboxes,
                        num_processes,
                        channel,
                        progress,
                    );
                }
            }
            Event::InComplete { channel, progress } => {
                handle_in_complete(
                    &mut in_complete,
                    &mailboxes,
                    num_processes,
                    channel,
                    progress,
                );
            }
            Event::Destroy => break,
        }
    }

    for mut stream in peers.into_values() {
        let _ = stream.flush();
    }
}

fn handle_in_complete(
    in_complete: &mut HashMap<(ChannelId, Progress), usize>,
    mailboxes: &HashMap<GlobalThreadId, Arc<LocalMailbox>>,
    num_processes: usize,
    channel: ChannelId,
    progress: Progress,
) {
    let key = (channel, progress);
    let count = in_complete.entry(key).or_insert(0);
    *count += 1;
    if *count == num_processes {
        in_complete.remove(&key);
        for mailbox in mailboxes.values() {
            mailbox.mark_complete(channel, progress);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use husky_types::ByteBatch;
    use std::time::Duration;

    #[test]
    fn single_process_echo_delivers_and_completes() {
        let event_loop =
            MailboxEventLoop::new(ProcessId::new(0), 1, HashMap::new(), HashMap::new());
        let tid = GlobalThreadId::new(0);
        let mailbox = event_loop.new_mailbox(tid);

        mailbox.send(
            tid,
            ChannelId::new(7),
            Progress::new(0),
            ByteBatch::from_vec(b"abc".to_vec()),
        );
        mailbox.send_complete(ChannelId::new(7), Progress::new(0));

        assert!(mailbox.poll_with_timeout(
            ChannelId::new(7),
            Progress::new(0),
            Duration::from_secs(2)
        ));
        let batch = mailbox.recv(ChannelId::new(7), Progress::new(0)).unwrap();
        assert_eq!(batch.as_bytes(), b"abc");
        assert!(!mailbox.poll_with_timeout(
            ChannelId::new(7),
            Progress::new(0),
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn two_local_threads_fan_into_one_mailbox() {
        let event_loop =
            MailboxEventLoop::new(ProcessId::new(0), 2, HashMap::new(), HashMap::new());
        let dst = GlobalThreadId::new(0);
        let src_a = GlobalThreadId::new(1);
        let src_b = GlobalThreadId::new(2);
        let inbox = event_loop.new_mailbox(dst);
        let mailbox_a = event_loop.new_mailbox(src_a);
        let mailbox_b = event_loop.new_mailbox(src_b);

        let channel = ChannelId::new(3);
        let progress = Progress::new(0);
        mailbox_a.send(dst, channel, progress, ByteBatch::from_vec(b"x".to_vec()));
        mailbox_a.send_complete(channel, progress);
        mailbox_b.send(dst, channel, progress, ByteBatch::from_vec(b"y".to_vec()));
        mailbox_b.send_complete(channel, progress);

        let mut seen = Vec::new();
        while inbox.poll_with_timeout(channel, progress, Duration::from_secs(2)) {
            seen.push(inbox.recv(channel, progress).unwrap().as_bytes().to_vec());
        }
        seen.sort();
        assert_eq!(seen, vec![b"x".to_vec(), b"y".to_vec()]);
    }
}
