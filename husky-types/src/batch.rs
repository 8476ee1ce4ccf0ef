use bytes::{Bytes, BytesMut};

/// An append/read ordered byte buffer passed between worker threads.
///
/// Ownership is single: once handed to [`crate::ChannelId`]-scoped transport
/// (the event loop, a peer socket), the producer forfeits access. `ByteBatch`
/// is built around [`bytes::Bytes`] so that a batch delivered locally never
/// needs to be copied; only batches crossing a process boundary are
/// serialized onto the wire.
#[derive(Debug, Clone)]
pub struct ByteBatch {
    data: Bytes,
}

impl ByteBatch {
    pub fn new() -> Self {
        Self { data: Bytes::new() }
    }

    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: Bytes::from(data),
        }
    }

    pub fn append(&mut self, extra: &[u8]) {
        let mut buf = BytesMut::with_capacity(self.data.len() + extra.len());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(extra);
        self.data = buf.freeze();
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

impl Default for ByteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for ByteBatch {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

impl From<&[u8]> for ByteBatch {
    fn from(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }
}
