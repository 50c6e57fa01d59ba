//! Bounded byte buffer between the scan path and the real-time consumer.
//!
//! A buffer holds `number_of_buffers` records. One record is one scan's worth
//! of data for one direction of one board:
//!
//! ```text
//! record   = samples_per_channel × channel_count × sample_size
//! capacity = number_of_buffers × record
//!
//! [ committed records ........ | partial | free ........................ ]
//!   ^ read cursor                        ^ write cursor                 ^ capacity
//! ```
//!
//! The producer obtains [`write_region`](AcquisitionBuffer::write_region),
//! copies raw bytes and commits them with
//! [`advance_buffer_index`](AcquisitionBuffer::advance_buffer_index). The
//! consumer reads or peeks the committed bytes and then calls
//! [`checkout_buffer`](AcquisitionBuffer::checkout_buffer) to hand complete
//! records back to the producer.
//!
//! The buffer does no locking. It is safe under a single-producer /
//! single-consumer discipline when the owner publishes cursor updates through
//! its own synchronisation (the connection manager keeps every board behind a
//! `parking_lot::Mutex`).

use daq_core::limits::MAX_BUFFER_BYTES;
use daq_core::signal::SignalDirection;
use tracing::trace;

use crate::error::{IomError, Result};

/// Byte ring with explicit write, read and checkout cursors.
#[derive(Debug, Default)]
pub struct AcquisitionBuffer {
    direction: SignalDirection,
    data: Vec<u8>,
    record_size: usize,
    write_index: usize,
    read_index: usize,
    initialised: bool,
}

impl AcquisitionBuffer {
    /// An empty, uninitialised buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate storage and reset the cursors.
    ///
    /// Fails if the buffer was already initialised, if `direction` is
    /// `None`, if any dimension is zero, or if the total size overflows the
    /// allocation limit.
    pub fn init(
        &mut self,
        direction: SignalDirection,
        number_of_buffers: u32,
        samples_per_channel: u32,
        channel_count: u32,
        sample_size: usize,
    ) -> Result<()> {
        if self.initialised {
            return Err(IomError::BufferAlreadyInitialised);
        }
        if !direction.is_valid() {
            return Err(IomError::InvalidDirection {
                operation: "buffer init",
            });
        }
        if number_of_buffers == 0 || samples_per_channel == 0 || channel_count == 0 || sample_size == 0
        {
            return Err(IomError::config(format!(
                "buffer dimensions must be non-zero (buffers={}, samples={}, channels={}, sample_size={})",
                number_of_buffers, samples_per_channel, channel_count, sample_size
            )));
        }

        let record_size = (samples_per_channel as usize)
            .checked_mul(channel_count as usize)
            .and_then(|n| n.checked_mul(sample_size))
            .ok_or_else(|| IomError::config("buffer record size overflows"))?;
        let capacity = record_size
            .checked_mul(number_of_buffers as usize)
            .filter(|&c| c <= MAX_BUFFER_BYTES)
            .ok_or_else(|| {
                IomError::config(format!(
                    "buffer of {} records × {} bytes exceeds {} bytes",
                    number_of_buffers, record_size, MAX_BUFFER_BYTES
                ))
            })?;

        self.direction = direction;
        self.data = vec![0; capacity];
        self.record_size = record_size;
        self.write_index = 0;
        self.read_index = 0;
        self.initialised = true;

        trace!(%direction, capacity, record_size, "Initialised acquisition buffer");
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised
    }

    pub fn direction(&self) -> SignalDirection {
        self.direction
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Size of one record in bytes.
    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Bytes committed by the producer and not yet checked out.
    pub fn committed_bytes(&self) -> usize {
        self.write_index
    }

    /// Committed bytes the consumer has not read yet.
    pub fn unread_bytes(&self) -> usize {
        self.write_index - self.read_index
    }

    /// Free bytes after the write cursor.
    pub fn free_bytes(&self) -> usize {
        self.capacity() - self.write_index
    }

    /// True iff `n_bytes` more bytes fit after the write cursor.
    pub fn check_available_space(&self, n_bytes: usize) -> bool {
        self.initialised
            && self
                .write_index
                .checked_add(n_bytes)
                .is_some_and(|end| end <= self.capacity())
    }

    fn ensure_space(&self, n_bytes: usize) -> Result<()> {
        if !self.initialised {
            return Err(IomError::BufferNotInitialised);
        }
        if !self.check_available_space(n_bytes) {
            return Err(IomError::BufferFull {
                requested: n_bytes,
                available: self.free_bytes(),
            });
        }
        Ok(())
    }

    /// Mutable view of the next `n_bytes` after the write cursor.
    ///
    /// Nothing becomes visible to the consumer until
    /// [`advance_buffer_index`](Self::advance_buffer_index) commits it.
    pub fn write_region(&mut self, n_bytes: usize) -> Result<&mut [u8]> {
        self.ensure_space(n_bytes)?;
        let start = self.write_index;
        Ok(&mut self.data[start..start + n_bytes])
    }

    /// Commit `n_bytes` written through [`write_region`](Self::write_region).
    ///
    /// Leaves the buffer untouched when the advance would pass the capacity.
    pub fn advance_buffer_index(&mut self, n_bytes: usize) -> Result<()> {
        self.ensure_space(n_bytes)?;
        self.write_index += n_bytes;
        Ok(())
    }

    /// Zero the next `n_bytes` after the write cursor without committing.
    pub fn zero_next_bytes(&mut self, n_bytes: usize) -> Result<()> {
        self.write_region(n_bytes)?.fill(0);
        Ok(())
    }

    /// Copy `src` after the write cursor and commit it.
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.write_region(src.len())?.copy_from_slice(src);
        self.write_index += src.len();
        Ok(())
    }

    /// True iff at least one full record is committed and unread.
    pub fn check_read_ready(&self) -> bool {
        self.initialised && self.record_size > 0 && self.unread_bytes() >= self.record_size
    }

    /// Borrow the next `n_bytes` committed bytes without consuming them.
    pub fn peek(&self, n_bytes: usize) -> Result<&[u8]> {
        if !self.initialised {
            return Err(IomError::BufferNotInitialised);
        }
        if n_bytes > self.unread_bytes() {
            return Err(IomError::BufferUnderrun {
                requested: n_bytes,
                available: self.unread_bytes(),
            });
        }
        Ok(&self.data[self.read_index..self.read_index + n_bytes])
    }

    /// Copy `n_bytes` from the read cursor into `destination`.
    ///
    /// With `consume == false` the read cursor stays put so the same samples
    /// can be extracted again for another channel.
    pub fn read_bytes(&mut self, n_bytes: usize, destination: &mut [u8], consume: bool) -> Result<()> {
        if destination.len() < n_bytes {
            return Err(IomError::DestinationTooSmall {
                required: n_bytes,
                actual: destination.len(),
            });
        }
        let src = self.peek(n_bytes)?;
        destination[..n_bytes].copy_from_slice(src);
        if consume {
            self.read_index += n_bytes;
        }
        Ok(())
    }

    /// Hand every complete committed record back to the producer.
    ///
    /// Everything after the released records moves to the front: a trailing
    /// partial record and any uncommitted bytes written through
    /// [`write_region`](Self::write_region) keep their offset from the write
    /// cursor, so a producer in the middle of a scan loses nothing.
    pub fn checkout_buffer(&mut self) {
        if !self.initialised || self.record_size == 0 {
            return;
        }
        let complete = (self.write_index / self.record_size) * self.record_size;
        if complete == 0 {
            return;
        }
        let capacity = self.capacity();
        self.data.copy_within(complete..capacity, 0);
        self.data[capacity - complete..].fill(0);
        self.write_index -= complete;
        self.read_index = self.read_index.saturating_sub(complete);
        trace!(
            direction = %self.direction,
            released = complete,
            "Checked out acquisition buffer"
        );
    }

    /// Drop all data, committed or partial, and rewind both cursors.
    pub fn reset_buffer(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
    }
}
