//! RTP (Real-time Transport Protocol) module.
//!
//! Provides RTP header decoding, payload location, packet building,
//! and the receive-only UDP socket.

pub mod header;
pub mod socket;

pub use header::*;
pub use socket::*;
