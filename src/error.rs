//! Error types for the RTP audio client.

use std::io;

use thiserror::Error;

/// Errors that can occur while decoding, buffering or receiving RTP audio.
#[derive(Error, Debug)]
pub enum RtpError {
    #[error("failed to bind UDP port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("malformed RTP packet of {len} bytes")]
    MalformedPacket { len: usize },

    #[error("socket closed: {0}")]
    SocketClosed(#[source] io::Error),

    #[error("audio buffer closed")]
    BufferClosed,

    #[error("write of {len} bytes exceeds buffer capacity of {capacity}")]
    WriteTooLarge { len: usize, capacity: usize },

    #[error("audio buffer capacity must be non-zero")]
    ZeroCapacity,

    #[error("receiver already started")]
    AlreadyStarted,

    #[error("receiver was stopped; construct a new client to listen again")]
    NotRestartable,

    #[error("failed to spawn receive thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, RtpError>;

impl RtpError {
    /// True for the conditions that mean "no more data will arrive".
    pub fn is_closed(&self) -> bool {
        matches!(self, RtpError::BufferClosed | RtpError::SocketClosed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_error_message() {
        let err = RtpError::Bind {
            port: 5004,
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind UDP port 5004: in use");
    }

    #[test]
    fn test_closed_conditions() {
        assert!(RtpError::BufferClosed.is_closed());
        assert!(RtpError::SocketClosed(io::Error::from(io::ErrorKind::NotConnected)).is_closed());
        assert!(!RtpError::MalformedPacket { len: 3 }.is_closed());
    }
}
