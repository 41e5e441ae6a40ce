//! Bounded audio byte buffer between the receive loop and the audio consumer.
//!
//! Packets arrive in bursts of varying size while a speech engine wants a
//! steady "read N bytes" stream. The ring is guarded by one mutex so cursor
//! and count updates are never observed half-done; two condition variables
//! park the writer when full and the reader when empty.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use ringbuf::{
    traits::{Consumer, Observer, Producer},
    HeapRb,
};

use crate::error::{Result, RtpError};

/// Default capacity: several packets of 16 kHz mono PCM16.
pub const DEFAULT_BUFFER_CAPACITY: usize = 65536;

struct BufferState {
    ring: HeapRb<u8>,
    closed: bool,
}

/// Fixed-capacity blocking byte ring buffer.
///
/// Designed for one producer and one consumer. Writes are all-or-nothing;
/// reads return whatever is available, like a stream.
pub struct AudioRingBuffer {
    state: Mutex<BufferState>,
    /// Signalled when bytes were added or the buffer closed
    readable: Condvar,
    /// Signalled when bytes were consumed or the buffer closed
    writable: Condvar,
    capacity: usize,
}

impl AudioRingBuffer {
    /// Create a buffer holding at most `capacity` unread bytes.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(RtpError::ZeroCapacity);
        }

        Ok(Self {
            state: Mutex::new(BufferState {
                ring: HeapRb::new(capacity),
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
            capacity,
        })
    }

    /// Append all of `data`, blocking while there is not enough free space.
    ///
    /// Fails with [`RtpError::BufferClosed`] if the buffer is closed before or
    /// while waiting, and with [`RtpError::WriteTooLarge`] if `data` could never
    /// fit. Nothing is written unless the whole slice is.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.check_len(data.len())?;

        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(RtpError::BufferClosed);
            }
            if state.ring.vacant_len() >= data.len() {
                break;
            }
            self.writable.wait(&mut state);
        }

        Self::push_all(&mut state, data);
        drop(state);

        self.readable.notify_all();
        Ok(())
    }

    /// Append all of `data` only if it fits right now.
    ///
    /// Returns `Ok(false)` without writing anything when the free space is too small.
    pub fn try_write(&self, data: &[u8]) -> Result<bool> {
        self.check_len(data.len())?;

        let mut state = self.state.lock();
        if state.closed {
            return Err(RtpError::BufferClosed);
        }
        if state.ring.vacant_len() < data.len() {
            return Ok(false);
        }

        Self::push_all(&mut state, data);
        drop(state);

        self.readable.notify_all();
        Ok(true)
    }

    /// Copy up to `buf.len()` bytes out, blocking until at least one is available.
    ///
    /// Returns 0 once the buffer is closed and drained (end of stream), or when
    /// `buf` is empty.
    pub fn read(&self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }

        let mut state = self.state.lock();
        while state.ring.is_empty() {
            if state.closed {
                return 0;
            }
            self.readable.wait(&mut state);
        }

        self.pop_into(state, buf)
    }

    /// Like [`read`](Self::read) but gives up after `timeout`.
    ///
    /// Returns `None` if no byte arrived in time and the buffer is still open.
    pub fn read_timeout(&self, buf: &mut [u8], timeout: Duration) -> Option<usize> {
        if buf.is_empty() {
            return Some(0);
        }

        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.ring.is_empty() {
            if state.closed {
                return Some(0);
            }
            if self.readable.wait_until(&mut state, deadline).timed_out() && state.ring.is_empty() {
                return if state.closed { Some(0) } else { None };
            }
        }

        Some(self.pop_into(state, buf))
    }

    /// Mark the buffer closed and wake every blocked reader and writer.
    ///
    /// Buffered bytes stay readable; afterwards reads report end of stream.
    /// Calling this more than once has no further effect.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);

        self.readable.notify_all();
        self.writable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Maximum number of unread bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of unread bytes.
    pub fn len(&self) -> usize {
        self.state.lock().ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn free_space(&self) -> usize {
        self.state.lock().ring.vacant_len()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.capacity {
            return Err(RtpError::WriteTooLarge {
                len,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn push_all(state: &mut BufferState, data: &[u8]) {
        let pushed = state.ring.push_slice(data);
        debug_assert_eq!(pushed, data.len());
    }

    fn pop_into(&self, mut state: parking_lot::MutexGuard<'_, BufferState>, buf: &mut [u8]) -> usize {
        let read = state.ring.pop_slice(buf);
        drop(state);

        self.writable.notify_all();
        read
    }
}

impl std::fmt::Debug for AudioRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("AudioRingBuffer")
            .field("capacity", &self.capacity)
            .field("buffered", &state.ring.occupied_len())
            .field("closed", &state.closed)
            .finish()
    }
}

/// Consumer handle over the shared audio buffer.
///
/// Implements [`io::Read`] so an audio engine can treat the RTP feed as an
/// ordinary input stream. `read` returns `Ok(0)` at end of stream.
#[derive(Clone, Debug)]
pub struct AudioStream {
    buffer: Arc<AudioRingBuffer>,
}

impl AudioStream {
    pub fn new(buffer: Arc<AudioRingBuffer>) -> Self {
        Self { buffer }
    }

    /// The underlying ring buffer.
    pub fn buffer(&self) -> &Arc<AudioRingBuffer> {
        &self.buffer
    }
}

impl io::Read for AudioStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.buffer.read(buf))
    }
}
