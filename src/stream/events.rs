//! Diagnostic events raised by the receive loop.
//!
//! The client never logs directly; it calls into an [`EventSink`] handed over
//! at construction. [`LogSink`] forwards to the `log` facade.

use std::net::SocketAddrV4;

use crate::error::RtpError;
use crate::rtp::RtpHeader;

/// Receiver for lifecycle and per-packet diagnostics.
///
/// Called from the receive thread as well as the owning thread.
pub trait EventSink: Send + Sync {
    /// Socket bound and receive loop about to start.
    fn listening(&self, _addr: SocketAddrV4) {}

    /// A datagram's header was decoded. Only raised when header logging is on.
    fn header(&self, _header: &RtpHeader, _payload_len: usize) {}

    /// A datagram was rejected by the decoder.
    fn malformed(&self, _len: usize, _error: &RtpError) {}

    /// A payload was discarded because the audio buffer had only `free_space` bytes left.
    fn dropped(&self, _payload_len: usize, _free_space: usize) {}

    /// The receive loop ended; `cause` is `None` for a requested stop.
    fn loop_exited(&self, _port: u16, _cause: Option<&RtpError>) {}

    /// `stop()` completed.
    fn stopped(&self, _port: u16) {}
}

/// Event sink that writes to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn listening(&self, addr: SocketAddrV4) {
        log::info!("Listening for RTP packets on {}", addr);
    }

    fn header(&self, header: &RtpHeader, payload_len: usize) {
        log::debug!(
            "RTP v={} p={} x={} cc={} m={} pt={} seq={} ts={} ssrc={:#010x} payload={}",
            header.version,
            header.padding as u8,
            header.extension as u8,
            header.csrc_count,
            header.marker as u8,
            header.payload_type,
            header.sequence,
            header.timestamp,
            header.ssrc,
            payload_len
        );
    }

    fn malformed(&self, len: usize, error: &RtpError) {
        log::warn!("Dropping {}-byte datagram: {}", len, error);
    }

    fn dropped(&self, payload_len: usize, free_space: usize) {
        log::warn!(
            "Audio buffer full, dropping {}-byte payload ({} bytes free)",
            payload_len,
            free_space
        );
    }

    fn loop_exited(&self, port: u16, cause: Option<&RtpError>) {
        match cause {
            None => log::debug!("Receive loop on port {} stopped", port),
            Some(e) => log::debug!("Receive loop on port {} ended: {}", port, e),
        }
    }

    fn stopped(&self, port: u16) {
        log::info!("Stopped listening on port {}", port);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}
