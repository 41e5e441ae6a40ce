//! rtp-audio-client: receive-only RTP audio feed for speech engines.
//!
//! Listens for RTP datagrams on a UDP port, strips the RTP header and
//! exposes the raw audio payload as a continuous, blocking byte stream.
//!
//! ```no_run
//! use std::io::Read;
//! use rtp_audio_client::{RtpClient, RtpClientConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = RtpClient::new(RtpClientConfig::new(5004))?;
//! client.start()?;
//!
//! let mut audio = client.audio_stream();
//! let mut frame = [0u8; 640];
//! let n = audio.read(&mut frame)?;
//! # let _ = n;
//!
//! client.stop();
//! client.dispose();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod rtp;
pub mod stream;

pub use config::{OverflowPolicy, RtpClientConfig};
pub use error::{Result, RtpError};
pub use rtp::{bit_range, payload_range, PayloadMode, RtpHeader, RtpPacket, RtpPacketBuilder, RTP_HEADER_LEN};
pub use stream::{
    AudioRingBuffer, AudioStream, EventSink, LogSink, NullSink, ReceiverState, RtpClient,
    StatsSnapshot, DEFAULT_BUFFER_CAPACITY,
};
