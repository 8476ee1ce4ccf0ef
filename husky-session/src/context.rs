use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::{Duration, Instant};

use husky_mailbox::{CentralRecver, Factory, LocalMailbox, MailboxEventLoop};
use husky_sync::SessionRegistry;
use husky_types::{GlobalThreadId, ProcessId};

use crate::config::ValidatedConfig;
use crate::error::SessionError;

/// A running session: the event loop, the central receiver, the per-channel
/// [`Factory`], and this process's local mailboxes, all brought up together
/// from one [`ValidatedConfig`] (spec.md 2, "bring-up").
///
/// Dropping a `SessionContext` tears things down in reverse order:
/// [`CentralRecver`] first (so no more inbound frames arrive), then the
/// event loop, then the session-wide finalizers.
pub struct SessionContext {
    process_id: ProcessId,
    event_loop: MailboxEventLoop,
    central_recver: CentralRecver,
    factory: Factory,
    mailboxes: HashMap<GlobalThreadId, Arc<LocalMailbox>>,
}

impl SessionContext {
    /// Binds the local receiver socket, connects to every peer (retrying
    /// until `connect_timeout_ms` elapses, since peers may not be listening
    /// yet at process start), and registers every local thread's mailbox.
    pub fn start(config: ValidatedConfig) -> Result<Self, SessionError> {
        SessionRegistry::initialize();

        let tid_to_pid = config.tid_to_pid();
        let num_processes = config.peers.len() + 1;
        let event_loop = MailboxEventLoop::with_topology(
            config.process_id,
            config.num_local_threads,
            num_processes,
            tid_to_pid,
            HashMap::new(),
        );

        let central_recver =
            CentralRecver::bind(config.bind_address, &event_loop).map_err(|source| {
                SessionError::BindFailed {
                    bind_address: config.bind_address.to_string(),
                    source,
                }
            })?;

        for (process_id, bind_address, _) in &config.peers {
            let stream = connect_with_retry(
                *bind_address,
                Duration::from_millis(config.connect_retry_ms),
                Duration::from_millis(config.connect_timeout_ms),
            )
            .map_err(|source| SessionError::PeerUnreachable {
                process_id: process_id.get(),
                bind_address: bind_address.to_string(),
                source,
            })?;
            event_loop.register_peer(*process_id, stream);
        }

        let factory = Factory::new(config.num_local_threads);
        let mailboxes = config
            .local_thread_ids()
            .into_iter()
            .map(|tid| (tid, event_loop.new_mailbox(tid)))
            .collect();

        Ok(Self {
            process_id: config.process_id,
            event_loop,
            central_recver,
            factory,
            mailboxes,
        })
    }

    pub fn process_id(&self) -> ProcessId {
        self.process_id
    }

    pub fn mailbox(&self, tid: GlobalThreadId) -> Option<&Arc<LocalMailbox>> {
        self.mailboxes.get(&tid)
    }

    pub fn local_thread_ids(&self) -> impl Iterator<Item = GlobalThreadId> + '_ {
        self.mailboxes.keys().copied()
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn central_recver_addr(&self) -> std::net::SocketAddr {
        self.central_recver.bind_addr()
    }

    /// Tears the session down: drops the receiver and event loop (each
    /// `Drop` impl already joins its thread), then runs session finalizers.
    pub fn shutdown(self) {
        let SessionContext {
            process_id: _,
            event_loop,
            central_recver,
            factory,
            mailboxes,
        } = self;
        drop(mailboxes);
        drop(central_recver);
        drop(event_loop);
        drop(factory);
        SessionRegistry::finalize();
    }
}

fn connect_with_retry(
    addr: std::net::SocketAddr,
    retry_interval: Duration,
    timeout: Duration,
) -> std::io::Result<TcpStream> {
    let deadline = Instant::now() + timeout;
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok(stream),
            Err(_) if Instant::now() < deadline => {
                std::thread::sleep(retry_interval);
            }
            Err(err) => return Err(err),
        }
    }
}
