// SPDX-License-Identifier: MIT OR Apache-2.0
//! A bounded ring buffer retaining only the most recent bytes of a task's
//! combined stdout/stderr, per the 4 KiB tail budget.

pub const TAIL_CAPACITY: usize = 4096;

#[derive(Debug, Default, Clone)]
pub struct TailBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new() -> Self {
        Self::with_capacity(TAIL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity.min(64 * 1024)),
            capacity,
        }
    }

    /// Append `bytes`, discarding from the front once over capacity.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > self.capacity {
            let drop = self.buf.len() - self.capacity;
            self.buf.drain(0..drop);
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}
