//! RTP header decoding and building.
//!
//! Implements the RFC 3550 fixed header. Every field is pulled out of the
//! 12-byte prefix by the same big-endian bit-range primitive, so the decoder
//! has no per-field masking code.

use std::ops::Range;

use crate::error::{Result, RtpError};

/// Size of the fixed RTP header in bytes.
pub const RTP_HEADER_LEN: usize = 12;

// Closed bit ranges, counted from the most-significant bit of byte 0.
const VERSION_BITS: (usize, usize) = (0, 1);
const PADDING_BITS: (usize, usize) = (2, 2);
const EXTENSION_BITS: (usize, usize) = (3, 3);
const CSRC_COUNT_BITS: (usize, usize) = (4, 7);
const MARKER_BITS: (usize, usize) = (8, 8);
const PAYLOAD_TYPE_BITS: (usize, usize) = (9, 15);
const SEQUENCE_BITS: (usize, usize) = (16, 31);
const TIMESTAMP_BITS: (usize, usize) = (32, 63);
const SSRC_BITS: (usize, usize) = (64, 95);

/// Read the closed bit range `[start_bit, end_bit]` as a big-endian unsigned value.
///
/// Bit 0 is the most-significant bit of `data[0]`. The leftmost bit of the
/// range becomes the most-significant bit of the result. Returns `None` when
/// the range is inverted, wider than 32 bits, or runs past the end of `data`.
pub fn bit_range(data: &[u8], start_bit: usize, end_bit: usize) -> Option<u32> {
    if end_bit < start_bit || end_bit - start_bit >= 32 || end_bit / 8 >= data.len() {
        return None;
    }

    let value = (start_bit..=end_bit).fold(0u32, |acc, bit| {
        let byte = data[bit / 8];
        let shift = 7 - (bit % 8);
        (acc << 1) | u32::from((byte >> shift) & 1)
    });

    Some(value)
}

/// How much of a datagram counts as header before the audio payload starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadMode {
    /// Always strip exactly the 12-byte fixed header.
    ///
    /// CSRC lists and header extensions end up in the audio stream if a
    /// sender uses them.
    #[default]
    FixedHeader,
    /// Skip the CSRC list and header extension, and drop trailing padding.
    Rfc3550,
}

/// RTP fixed header (12 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// RTP version (2 for RFC 3550 senders)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Extension flag
    pub extension: bool,
    /// CSRC count
    pub csrc_count: u8,
    /// Marker bit
    pub marker: bool,
    /// Payload type (0-127)
    pub payload_type: u8,
    /// Sequence number (wraps at 65535)
    pub sequence: u16,
    /// Timestamp
    pub timestamp: u32,
    /// Synchronization source identifier
    pub ssrc: u32,
}

impl RtpHeader {
    /// Decode the fixed header from the start of a datagram.
    ///
    /// Fails with [`RtpError::MalformedPacket`] when fewer than 12 bytes are given.
    /// The version is not validated.
    pub fn decode(packet: &[u8]) -> Result<Self> {
        let len = packet.len();
        if len < RTP_HEADER_LEN {
            return Err(RtpError::MalformedPacket { len });
        }

        let field = |(start, end): (usize, usize)| {
            bit_range(packet, start, end).ok_or(RtpError::MalformedPacket { len })
        };

        Ok(RtpHeader {
            version: field(VERSION_BITS)? as u8,
            padding: field(PADDING_BITS)? == 1,
            extension: field(EXTENSION_BITS)? == 1,
            csrc_count: field(CSRC_COUNT_BITS)? as u8,
            marker: field(MARKER_BITS)? == 1,
            payload_type: field(PAYLOAD_TYPE_BITS)? as u8,
            sequence: field(SEQUENCE_BITS)? as u16,
            timestamp: field(TIMESTAMP_BITS)?,
            ssrc: field(SSRC_BITS)?,
        })
    }

    /// Size of the header including the CSRC list.
    pub fn header_size(&self) -> usize {
        RTP_HEADER_LEN + (self.csrc_count as usize * 4)
    }

    /// Encode the fixed header into `buffer`.
    ///
    /// Returns the number of bytes written, 0 if `buffer` is too short.
    pub fn encode(&self, buffer: &mut [u8]) -> usize {
        if buffer.len() < RTP_HEADER_LEN {
            return 0;
        }

        let byte0 = ((self.version & 0x03) << 6)
            | if self.padding { 0x20 } else { 0 }
            | if self.extension { 0x10 } else { 0 }
            | (self.csrc_count & 0x0F);

        let byte1 = if self.marker { 0x80 } else { 0 } | (self.payload_type & 0x7F);

        buffer[0] = byte0;
        buffer[1] = byte1;
        buffer[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buffer[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buffer[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        RTP_HEADER_LEN
    }
}

/// Byte range of the audio payload inside `packet` for the given mode.
pub fn payload_range(packet: &[u8], header: &RtpHeader, mode: PayloadMode) -> Result<Range<usize>> {
    let len = packet.len();
    if len < RTP_HEADER_LEN {
        return Err(RtpError::MalformedPacket { len });
    }

    match mode {
        PayloadMode::FixedHeader => Ok(RTP_HEADER_LEN..len),
        PayloadMode::Rfc3550 => {
            let mut offset = header.header_size();

            if header.extension {
                if len < offset + 4 {
                    return Err(RtpError::MalformedPacket { len });
                }
                // Extension length is in 32-bit words
                let ext_words = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
                offset += 4 + ext_words * 4;
            }

            if offset > len {
                return Err(RtpError::MalformedPacket { len });
            }

            let end = if header.padding {
                let padding_len = packet[len - 1] as usize;
                if padding_len == 0 || padding_len > len - offset {
                    return Err(RtpError::MalformedPacket { len });
                }
                len - padding_len
            } else {
                len
            };

            Ok(offset..end)
        }
    }
}

/// Decoded RTP packet with header and payload reference.
#[derive(Debug)]
pub struct RtpPacket<'a> {
    /// Decoded header
    pub header: RtpHeader,
    /// Audio payload
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Decode the header and locate the payload according to `mode`.
    pub fn parse(data: &'a [u8], mode: PayloadMode) -> Result<Self> {
        let header = RtpHeader::decode(data)?;
        let range = payload_range(data, &header, mode)?;

        Ok(RtpPacket {
            header,
            payload: &data[range],
        })
    }
}

/// Builds consecutive RTP packets for a single sender.
pub struct RtpPacketBuilder {
    /// SSRC for this stream
    ssrc: u32,
    /// Current sequence number
    sequence: u16,
    /// Current timestamp
    timestamp: u32,
    /// Payload type
    payload_type: u8,
    /// Reused packet buffer
    buffer: Vec<u8>,
}

impl RtpPacketBuilder {
    /// Create a new packet builder with a pseudo-random SSRC.
    pub fn new(payload_type: u8) -> Self {
        let ssrc = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x12345678)
            ^ std::process::id();

        Self::with_ssrc(ssrc, payload_type)
    }

    /// Create a new packet builder with a specific SSRC.
    pub fn with_ssrc(ssrc: u32, payload_type: u8) -> Self {
        Self {
            ssrc,
            sequence: 0,
            timestamp: 0,
            payload_type,
            buffer: Vec::with_capacity(1500),
        }
    }

    /// Start numbering from `sequence`.
    pub fn set_sequence(&mut self, sequence: u16) {
        self.sequence = sequence;
    }

    /// Build an RTP packet around `payload` and advance sequence and timestamp.
    pub fn build_packet(&mut self, payload: &[u8], samples_per_packet: u32) -> &[u8] {
        let header = RtpHeader {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: self.payload_type,
            sequence: self.sequence,
            timestamp: self.timestamp,
            ssrc: self.ssrc,
        };

        self.buffer.clear();
        self.buffer.resize(RTP_HEADER_LEN, 0);
        header.encode(&mut self.buffer);
        self.buffer.extend_from_slice(payload);

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(samples_per_packet);

        &self.buffer
    }
}
