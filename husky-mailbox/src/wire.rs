//! Peer-to-peer envelope codec (spec.md 6). Integers are 32-bit
//! little-endian; byte runs are length-prefixed with a 32-bit length.
//! Pointer-valued in-process events never reach this module — only bytes
//! that actually cross a process boundary are encoded this way.

use std::io::{self, Read, Write};

use husky_types::{ByteBatch, ChannelId, GlobalThreadId, Progress};

const SHUTDOWN: i32 = -1;
const PEER_COMPLETE: i32 = -2;

/// A single frame on a process's one inbound socket.
pub enum PeerEnvelope {
    /// `tid, c, p, bytes` — a regular batch destined for local thread `tid`.
    Batch {
        tid: GlobalThreadId,
        channel: ChannelId,
        progress: Progress,
        batch: ByteBatch,
    },
    /// `-2, c, p` — the sender has observed `send_complete(c, p)` from every
    /// one of its local threads.
    PeerComplete {
        channel: ChannelId,
        progress: Progress,
    },
    /// `-1` — shutdown signal; the reader should exit after this frame.
    Shutdown,
}

fn write_i32(w: &mut impl Write, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_i32(r: &mut impl Read) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn write_u32(w: &mut impl Write, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub fn write_envelope(w: &mut impl Write, envelope: &PeerEnvelope) -> io::Result<()> {
    match envelope {
        PeerEnvelope::Shutdown => write_i32(w, SHUTDOWN),
        PeerEnvelope::PeerComplete { channel, progress } => {
            write_i32(w, PEER_COMPLETE)?;
            write_u32(w, channel.get())?;
            write_u32(w, progress.get())
        }
        PeerEnvelope::Batch {
            tid,
            channel,
            progress,
            batch,
        } => {
            write_i32(w, tid.get() as i32)?;
            write_u32(w, channel.get())?;
            write_u32(w, progress.get())?;
            let bytes = batch.as_bytes();
            write_u32(w, bytes.len() as u32)?;
            w.write_all(bytes)
        }
    }
}

pub fn read_envelope(r: &mut impl Read) -> io::Result<PeerEnvelope> {
    let tag = read_i32(r)?;
    match tag {
        SHUTDOWN => Ok(PeerEnvelope::Shutdown),
        PEER_COMPLETE => {
            let channel = ChannelId::new(read_u32(r)?);
            let progress = Progress::new(read_u32(r)?);
            Ok(PeerEnvelope::PeerComplete { channel, progress })
        }
        tid if tid >= 0 => {
            let channel = ChannelId::new(read_u32(r)?);
            let progress = Progress::new(read_u32(r)?);
            let len = read_u32(r)? as usize;
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes)?;
            Ok(PeerEnvelope::Batch {
                tid: GlobalThreadId::new(tid as u32),
                channel,
                progress,
                batch: ByteBatch::from_vec(bytes),
            })
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown envelope tag {other}"),
        )),
    }
}
