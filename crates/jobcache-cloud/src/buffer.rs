//! Buffer management utilities

use bytes::{Bytes, BytesMut};

/// A write buffer that accumulates data before uploading
#[derive(Debug)]
pub(crate) struct WriteBuffer {
    /// The buffer
    buffer: BytesMut,
    /// Maximum capacity
    capacity: usize,
}

impl WriteBuffer {
    /// Create a new write buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the next write would not fit
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    pub fn remaining(&self) -> usize {
        self.capacity - self.buffer.len()
    }

    /// Write as much of `data` as fits, returning the number of bytes taken
    pub fn write(&mut self, data: &[u8]) -> usize {
        let to_write = data.len().min(self.remaining());
        self.buffer.extend_from_slice(&data[..to_write]);
        to_write
    }

    /// Take the buffer contents, leaving it empty
    pub fn take(&mut self) -> Bytes {
        self.buffer.split().freeze()
    }
}
