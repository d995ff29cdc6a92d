//! Delimiter-based reassembly of records from partial socket reads.
//!
//! The feed concatenates JSON records separated by a single record-separator
//! byte (`0x1E`). Socket reads do not respect record boundaries: one read may
//! carry several records, and one record may span several reads. The framer
//! scans the filled region of a [`ReceiveBuffer`], emits every complete record
//! in byte order, and keeps the incomplete tail in the buffer for the next
//! pass. When the transport marks the end of a message, the tail is itself a
//! complete record.

use crate::buffer::ReceiveBuffer;
use crate::record::{DecodeError, DecodeRecord};

/// Byte separating consecutive records on the wire.
pub const RECORD_SEPARATOR: u8 = 0x1E;

/// Stateful splitter turning buffered bytes into records.
#[derive(Debug, Default)]
pub struct RecordFramer {
    /// Bytes at the start of the buffer already scanned without a delimiter.
    scanned: usize,
}

impl RecordFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget any partially scanned record.
    pub fn reset(&mut self) {
        self.scanned = 0;
    }

    /// Frame the buffer's filled region, passing each decoded record to `emit`.
    ///
    /// Returns the number of records emitted. On [`DecodeError`] the framer and
    /// the buffer are both reset; records emitted before the failing span are
    /// not retracted.
    pub fn drain<T, F>(
        &mut self,
        buffer: &mut ReceiveBuffer,
        end_of_message: bool,
        mut emit: F,
    ) -> Result<usize, DecodeError>
    where
        T: DecodeRecord,
        F: FnMut(T),
    {
        let outcome = scan(buffer.filled(), self.scanned, end_of_message, &mut emit);
        match outcome {
            Ok(pass) if end_of_message => {
                buffer.clear();
                self.scanned = 0;
                Ok(pass.emitted)
            }
            Ok(pass) => {
                buffer.consume(pass.consumed);
                self.scanned = buffer.len();
                Ok(pass.emitted)
            }
            Err(err) => {
                buffer.clear();
                self.scanned = 0;
                Err(err)
            }
        }
    }
}

struct Pass {
    emitted: usize,
    consumed: usize,
}

fn scan<T, F>(
    filled: &[u8],
    resume_at: usize,
    end_of_message: bool,
    emit: &mut F,
) -> Result<Pass, DecodeError>
where
    T: DecodeRecord,
    F: FnMut(T),
{
    let mut start = 0;
    let mut pos = resume_at.min(filled.len());
    let mut emitted = 0;

    while let Some(offset) = filled[pos..].iter().position(|&b| b == RECORD_SEPARATOR) {
        let end = pos + offset;
        emitted += emit_span(&filled[start..end], emit)?;
        start = end + 1;
        pos = start;
    }

    if end_of_message {
        emitted += emit_span(&filled[start..], emit)?;
        start = filled.len();
    }

    Ok(Pass {
        emitted,
        consumed: start,
    })
}

fn emit_span<T, F>(span: &[u8], emit: &mut F) -> Result<usize, DecodeError>
where
    T: DecodeRecord,
    F: FnMut(T),
{
    if is_blank(span) {
        return Ok(0);
    }
    emit(T::decode(span)?);
    Ok(1)
}

fn is_blank(span: &[u8]) -> bool {
    span.iter().all(u8::is_ascii_whitespace)
}

#[cfg(test)]
mod tests;
