//! Stream module: the RTP receive loop and the audio buffer it feeds.
//!
//! Provides the blocking audio ring buffer (network → consumer), the
//! receiving client, and the diagnostic event sink.

pub mod buffer;
pub mod client;
pub mod events;

pub use buffer::*;
pub use client::*;
pub use events::*;

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Receiver statistics (lock-free atomic updates).
#[derive(Default)]
pub struct AtomicStats {
    pub packets_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub malformed_packets: AtomicU64,
    pub packets_dropped: AtomicU64,
    pub sequence_gaps: AtomicU64,
    pub last_ssrc: AtomicU32,
}

impl AtomicStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packets_received: self.packets_received.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            malformed_packets: self.malformed_packets.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
            sequence_gaps: self.sequence_gaps.load(Ordering::Relaxed),
            last_ssrc: self.last_ssrc.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of statistics (for non-atomic access).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Well-formed datagrams decoded
    pub packets_received: u64,
    /// Payload bytes written to the audio buffer
    pub bytes_received: u64,
    /// Datagrams rejected by the header decoder
    pub malformed_packets: u64,
    /// Payloads discarded because the buffer was full or they could never fit
    pub packets_dropped: u64,
    /// Datagrams whose sequence number did not follow the previous one
    pub sequence_gaps: u64,
    /// SSRC of the most recent packet
    pub last_ssrc: u32,
}
