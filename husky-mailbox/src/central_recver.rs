use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::event::Event;
use crate::event_loop::MailboxEventLoop;
use crate::wire::{self, PeerEnvelope};

/// Owns the one inbound socket a process exposes to its peers (spec.md 4.8).
/// Reads sentinel-prefixed envelopes and forwards them to the event loop as
/// [`Event::InBatch`]/[`Event::InComplete`]; a `-1` frame, sent to this same
/// address by [`CentralRecver::drop`], ends the accept loop.
pub struct CentralRecver {
    bind_addr: SocketAddr,
    handle: Option<thread::JoinHandle<()>>,
}

impl CentralRecver {
    pub fn bind(bind_addr: SocketAddr, event_loop: &MailboxEventLoop) -> io::Result<Self> {
        let to_loop = event_loop.sender();
        let listener = TcpListener::bind(bind_addr)?;
        listener.set_nonblocking(true)?;
        let actual_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("husky-central-recver".to_string())
            .spawn(move || accept_loop(listener, to_loop, shutdown))
            .expect("failed to spawn central recver thread");
        Ok(Self {
            bind_addr: actual_addr,
            handle: Some(handle),
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }
}

impl Drop for CentralRecver {
    fn drop(&mut self) {
        if let Ok(mut stream) = TcpStream::connect(self.bind_addr) {
            let _ = wire::write_envelope(&mut stream, &PeerEnvelope::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop(listener: TcpListener, to_loop: mpsc::Sender<Event>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, _)) => {
                let to_loop = to_loop.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || read_connection(stream, to_loop, shutdown));
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(Duration::from_millis(5));
            }
            Err(err) => {
                tracing::error!(
                    ?err,
                    "central recver accept failed; session cannot continue"
                );
                break;
            }
        }
    }
}

fn read_connection(mut stream: TcpStream, to_loop: mpsc::Sender<Event>, shutdown: Arc<AtomicBool>) {
    let _ = stream.set_nonblocking(false);
    loop {
        match wire::read_envelope(&mut stream) {
            Ok(PeerEnvelope::Shutdown) => {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Ok(PeerEnvelope::PeerComplete { channel, progress }) => {
                if to_loop
                    .send(Event::InComplete { channel, progress })
                    .is_err()
                {
                    break;
                }
            }
            Ok(PeerEnvelope::Batch {
                tid,
                channel,
                progress,
                batch,
            }) => {
                if to_loop
                    .send(Event::InBatch {
                        dst: tid,
                        channel,
                        progress,
                        batch,
                    })
                    .is_err()
                {
                    break;
                }
            }
            Err(_) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use husky_types::{ByteBatch, ChannelId, GlobalThreadId, Progress};
    use std::io::Write;

    #[test]
    fn forwards_batch_and_peer_complete_to_the_local_mailbox() {
        use husky_types::ProcessId;
        use std::collections::HashMap;
        use std::time::Duration;

        let event_loop =
            MailboxEventLoop::new(ProcessId::new(0), 1, HashMap::new(), HashMap::new());
        let recver = CentralRecver::bind("127.0.0.1:0".parse().unwrap(), &event_loop).unwrap();
        let inbox = event_loop.new_mailbox(GlobalThreadId::new(1));

        let mut stream = TcpStream::connect(recver.bind_addr()).unwrap();
        let channel = ChannelId::new(5);
        let progress = Progress::new(0);
        wire::write_envelope(
            &mut stream,
            &PeerEnvelope::Batch {
                tid: GlobalThreadId::new(1),
                channel,
                progress,
                batch: ByteBatch::from_vec(b"hello".to_vec()),
            },
        )
        .unwrap();
        wire::write_envelope(
            &mut stream,
            &PeerEnvelope::PeerComplete { channel, progress },
        )
        .unwrap();
        stream.flush().unwrap();

        assert!(inbox.poll_with_timeout(channel, progress, Duration::from_secs(2)));
        assert_eq!(inbox.recv(channel, progress).unwrap().as_bytes(), b"hello");
        assert!(!inbox.poll_with_timeout(channel, progress, Duration::from_secs(2)));
        drop(recver);
    }
}
