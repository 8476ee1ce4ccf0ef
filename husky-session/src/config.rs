use std::collections::HashMap;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use husky_types::{GlobalThreadId, ProcessId};

use crate::error::SessionError;

/// One entry of the static topology table (spec.md 2: "a process id → host
/// map... fixed at session start"). Mirrors the original's `worker.info
/// hostname:thread_count` config lines (SPEC_FULL.md 11).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PeerEntry {
    pub process_id: u32,
    pub bind_address: String,
    pub num_local_threads: usize,
}

/// Session-wide configuration, loaded from YAML the way
/// `nullspace_node::Config` is (`serde_yaml`, matching the teacher's
/// `node/src/main.rs`). One instance is loaded per process; `process_id`
/// selects which row of the topology table this process plays.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    pub process_id: u32,
    pub bind_address: String,
    pub num_local_threads: usize,
    pub peers: Vec<PeerEntry>,

    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
    #[serde(default = "default_connect_retry_ms")]
    pub connect_retry_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_channel_buffer_size() -> usize {
    1024
}

fn default_connect_retry_ms() -> u64 {
    200
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A [`SessionConfig`] whose addresses have been resolved and whose
/// topology has been checked for internal consistency.
pub struct ValidatedConfig {
    pub process_id: ProcessId,
    pub bind_address: SocketAddr,
    pub num_local_threads: usize,
    pub peers: Vec<(ProcessId, SocketAddr, usize)>,
    pub channel_buffer_size: usize,
    pub connect_retry_ms: u64,
    pub connect_timeout_ms: u64,
    pub log_level: String,
}

impl SessionConfig {
    pub fn validate(self) -> Result<ValidatedConfig, SessionError> {
        if self.num_local_threads == 0 {
            return Err(SessionError::MustBeNonZero {
                field: "num_local_threads",
            });
        }
        if self.channel_buffer_size == 0 {
            return Err(SessionError::MustBeNonZero {
                field: "channel_buffer_size",
            });
        }

        let bind_address = parse_addr(&self.bind_address)?;

        let mut seen = HashMap::new();
        seen.insert(self.process_id, ());
        let mut peers = Vec::with_capacity(self.peers.len());
        for peer in &self.peers {
            if peer.process_id == self.process_id {
                return Err(SessionError::SelfReferentialPeer(peer.process_id));
            }
            if seen.insert(peer.process_id, ()).is_some() {
                return Err(SessionError::DuplicateProcessId(peer.process_id));
            }
            if peer.num_local_threads == 0 {
                return Err(SessionError::MustBeNonZero {
                    field: "peers[].num_local_threads",
                });
            }
            peers.push((
                ProcessId::new(peer.process_id),
                parse_addr(&peer.bind_address)?,
                peer.num_local_threads,
            ));
        }

        Ok(ValidatedConfig {
            process_id: ProcessId::new(self.process_id),
            bind_address,
            num_local_threads: self.num_local_threads,
            peers,
            channel_buffer_size: self.channel_buffer_size,
            connect_retry_ms: self.connect_retry_ms,
            connect_timeout_ms: self.connect_timeout_ms,
            log_level: self.log_level,
        })
    }
}

fn parse_addr(raw: &str) -> Result<SocketAddr, SessionError> {
    raw.parse()
        .map_err(|_| SessionError::InvalidBindAddress(raw.to_string()))
}

impl ValidatedConfig {
    /// Builds the session-wide global-thread-id → process-id map: processes
    /// are ordered by ascending `ProcessId`, and each contributes
    /// `num_local_threads` consecutive global ids (spec.md 3, "Thread
    /// identity").
    pub fn tid_to_pid(&self) -> HashMap<GlobalThreadId, ProcessId> {
        let mut rows: Vec<(ProcessId, usize)> =
            self.peers.iter().map(|(pid, _, n)| (*pid, *n)).collect();
        rows.push((self.process_id, self.num_local_threads));
        rows.sort_by_key(|(pid, _)| pid.get());

        let mut map = HashMap::new();
        let mut next_tid = 0u32;
        for (pid, count) in rows {
            for _ in 0..count {
                map.insert(GlobalThreadId::new(next_tid), pid);
                next_tid += 1;
            }
        }
        map
    }

    /// The global thread ids this process owns locally.
    pub fn local_thread_ids(&self) -> Vec<GlobalThreadId> {
        self.tid_to_pid()
            .into_iter()
            .filter(|(_, pid)| *pid == self.process_id)
            .map(|(tid, _)| tid)
            .collect()
    }
}
