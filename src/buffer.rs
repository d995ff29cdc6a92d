//! Fixed-capacity receive arena shared by the session and the framer.

use thiserror::Error;

use crate::framer::RECORD_SEPARATOR;

/// Default receive buffer capacity (8 MiB).
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Raised when a record outgrows the buffer before its delimiter arrives.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("receive buffer full ({capacity} bytes) before a record delimiter was seen")]
pub struct CapacityFault {
    pub capacity: usize,
}

/// Byte arena with a write cursor marking the filled-but-unframed prefix.
///
/// The backing storage is allocated once and reused across reconnects;
/// [`clear`](Self::clear) resets it in place. One byte past `capacity` is
/// reserved for the delimiter that closes a record of exactly `capacity`
/// bytes.
pub struct ReceiveBuffer {
    bytes: Box<[u8]>,
    capacity: usize,
    cursor: usize,
}

impl ReceiveBuffer {
    /// Allocate a buffer holding records of at most `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: vec![0u8; capacity + 1].into_boxed_slice(),
            capacity,
            cursor: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of filled bytes awaiting framing.
    pub fn len(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.cursor == 0
    }

    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.cursor)
    }

    /// The filled region.
    pub fn filled(&self) -> &[u8] {
        &self.bytes[..self.cursor]
    }

    /// Writable space after the cursor.
    ///
    /// A full buffer still offers the single delimiter slot. Fails with
    /// [`CapacityFault`] once that slot is taken, so a read never proceeds
    /// into a zero-length slice.
    pub fn spare_mut(&mut self) -> Result<&mut [u8], CapacityFault> {
        match self.remaining() {
            0 if self.cursor > self.capacity => Err(self.fault()),
            0 => Ok(&mut self.bytes[self.cursor..]),
            _ => Ok(&mut self.bytes[self.cursor..self.capacity]),
        }
    }

    /// Mark `count` bytes after the cursor as filled.
    pub fn advance(&mut self, count: usize) {
        let writable = self.bytes.len() - self.cursor;
        debug_assert!(count <= writable, "advance past capacity");
        self.cursor += count.min(writable);
    }

    /// Fail when the delimiter slot holds anything but a delimiter.
    ///
    /// The slot is only written once `capacity` bytes of one record are
    /// buffered, so any other byte there makes the record too long.
    pub fn check_overflow(&self) -> Result<(), CapacityFault> {
        if self.cursor > self.capacity && self.bytes[self.capacity] != RECORD_SEPARATOR {
            return Err(self.fault());
        }
        Ok(())
    }

    /// Copy `data` in after the cursor.
    pub fn extend_from_slice(&mut self, data: &[u8]) -> Result<(), CapacityFault> {
        if data.len() > self.remaining() {
            return Err(self.fault());
        }
        self.bytes[self.cursor..self.cursor + data.len()].copy_from_slice(data);
        self.cursor += data.len();
        Ok(())
    }

    /// Drop the first `count` filled bytes, moving the rest to the front.
    pub fn consume(&mut self, count: usize) {
        let count = count.min(self.cursor);
        if count == 0 {
            return;
        }
        self.bytes.copy_within(count..self.cursor, 0);
        self.cursor -= count;
        self.bytes[self.cursor..self.cursor + count].fill(0);
    }

    /// Zero the filled region and reset the cursor.
    pub fn clear(&mut self) {
        self.bytes[..self.cursor].fill(0);
        self.cursor = 0;
    }

    fn fault(&self) -> CapacityFault {
        CapacityFault {
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for ReceiveBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveBuffer")
            .field("capacity", &self.capacity())
            .field("cursor", &self.cursor)
            .finish()
    }
}
