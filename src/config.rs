//! Receiver configuration.
//!
//! A plain value handed to [`RtpClient::new`](crate::RtpClient::new). Nothing
//! here is global; two clients can run side by side with different settings.

use std::env;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, RtpError};
use crate::rtp::PayloadMode;
use crate::stream::DEFAULT_BUFFER_CAPACITY;

/// What the receive loop does when a payload does not fit in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Wait for the consumer to free space (backpressure).
    #[default]
    Block,
    /// Discard the whole payload and count it as dropped.
    DropPacket,
}

/// RTP client configuration.
#[derive(Debug, Clone)]
pub struct RtpClientConfig {
    /// UDP port to listen on (0 = any free port)
    pub port: u16,
    /// Local interface to bind (UNSPECIFIED = all interfaces)
    pub interface: Ipv4Addr,
    /// Audio buffer capacity in bytes
    pub buffer_capacity: usize,
    /// Report every decoded header to the event sink
    pub log_headers: bool,
    /// Behaviour when the audio buffer is full
    pub overflow: OverflowPolicy,
    /// Where the payload starts inside a datagram
    pub payload_mode: PayloadMode,
    /// Socket read timeout; bounds how long `stop()` waits for the loop
    pub poll_interval: Duration,
    /// Requested kernel receive buffer size in bytes (0 = OS default)
    pub recv_buffer_size: usize,
}

impl Default for RtpClientConfig {
    fn default() -> Self {
        Self {
            port: 0,
            interface: Ipv4Addr::UNSPECIFIED,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            log_headers: true,
            overflow: OverflowPolicy::Block,
            payload_mode: PayloadMode::FixedHeader,
            poll_interval: Duration::from_millis(10),
            recv_buffer_size: 1024 * 1024, // 1MB
        }
    }
}

impl RtpClientConfig {
    /// Default configuration listening on `port`.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Self::default()
        }
    }

    /// Defaults overlaid with `RTP_PORT`, `RTP_INTERFACE`, `RTP_BUFFER_SIZE`,
    /// `RTP_LOG_HEADERS` and `RTP_POLL_MS` when set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(port) = parse_var(&lookup, "RTP_PORT")? {
            config.port = port;
        }
        if let Some(interface) = parse_var(&lookup, "RTP_INTERFACE")? {
            config.interface = interface;
        }
        if let Some(capacity) = parse_var(&lookup, "RTP_BUFFER_SIZE")? {
            config.buffer_capacity = capacity;
        }
        if let Some(raw) = lookup("RTP_LOG_HEADERS") {
            config.log_headers = parse_flag(&raw)
                .ok_or_else(|| RtpError::Config(format!("RTP_LOG_HEADERS: invalid flag '{}'", raw)))?;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "RTP_POLL_MS")? {
            config.poll_interval = Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_interface(mut self, interface: Ipv4Addr) -> Self {
        self.interface = interface;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_log_headers(mut self, enabled: bool) -> Self {
        self.log_headers = enabled;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_payload_mode(mut self, mode: PayloadMode) -> Self {
        self.payload_mode = mode;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_recv_buffer_size(mut self, size: usize) -> Self {
        self.recv_buffer_size = size;
        self
    }

    /// Reject settings no client could run with.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(RtpError::Config("buffer capacity must be non-zero".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(RtpError::Config("poll interval must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RtpError::Config(format!("{}: cannot parse '{}'", key, raw))),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
