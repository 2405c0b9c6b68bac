//! Wire format serialization and deserialization.
//!
//! Fixed-width, big-endian framing: a one-byte message tag followed by the
//! variant body. Addresses travel as their 32-bit value; trust values are
//! IEEE-754 doubles serialized by bit pattern.
//!
//! ```text
//! REQUEST       (tag 1): dest u32 | source u32 | hop_count u32   (12 bytes)
//! REPLY         (tag 2): dest u32 | next_hop u32 | trust f64     (16 bytes)
//! ADVERTISEMENT (tag 3): dest u32 | next_hop u32 | trust f64 | hop_count u32
//! TRUST_UPDATE  (tag 4): trust f64                               (8 bytes)
//! ```

use std::net::Ipv4Addr;

use thiserror::Error;
use tracing::warn;

use crate::types::{RouteAdvertisement, RouteReply, RouteRequest, TrustUpdate};

// Message tags
pub const TAG_ROUTE_REQUEST: u8 = 1;
pub const TAG_ROUTE_REPLY: u8 = 2;
pub const TAG_ROUTE_ADVERTISEMENT: u8 = 3;
pub const TAG_TRUST_UPDATE: u8 = 4;

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    /// Empty datagram (not even a tag byte).
    #[error("empty datagram")]
    Empty,
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a new reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of bytes remaining.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Returns true if there are no more bytes to read.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        if self.pos >= self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    /// Read a fixed number of bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + len > self.buf.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    /// Read a u32 in big-endian format.
    pub fn read_u32_be(&mut self) -> Result<u32, DecodeError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a u64 in big-endian format.
    pub fn read_u64_be(&mut self) -> Result<u64, DecodeError> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    /// Read an f64 serialized by its big-endian bit pattern.
    pub fn read_f64_be(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_bits(self.read_u64_be()?))
    }

    /// Read an IPv4 address (4 bytes, network order).
    pub fn read_addr(&mut self) -> Result<Ipv4Addr, DecodeError> {
        Ok(Ipv4Addr::from(self.read_u32_be()?))
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create a new empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Returns the current length of written data.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if no data has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a slice of bytes.
    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    /// Write a u32 in big-endian format.
    pub fn write_u32_be(&mut self, v: u32) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write a u64 in big-endian format.
    pub fn write_u64_be(&mut self, v: u64) {
        self.write_bytes(&v.to_be_bytes());
    }

    /// Write an f64 by its big-endian bit pattern.
    pub fn write_f64_be(&mut self, v: f64) {
        self.write_u64_be(v.to_bits());
    }

    /// Write an IPv4 address (4 bytes, network order).
    pub fn write_addr(&mut self, addr: Ipv4Addr) {
        self.write_u32_be(u32::from(addr));
    }

    /// Finish writing and return the buffer.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Get the buffer as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    /// Encode this value to the writer.
    fn encode(&self, w: &mut Writer);

    /// Encode and return the bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    /// Decode a value from the reader.
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice.
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        Self::decode(&mut r)
    }
}

/// Wrapper enum for encoding/decoding top-level control messages.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    RouteRequest(RouteRequest),
    RouteReply(RouteReply),
    RouteAdvertisement(RouteAdvertisement),
    TrustUpdate(TrustUpdate),
}

impl Encode for RouteRequest {
    fn encode(&self, w: &mut Writer) {
        w.write_addr(self.dest);
        w.write_addr(self.source);
        w.write_u32_be(self.hop_count);
    }
}

impl Decode for RouteRequest {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let dest = r.read_addr()?;
        let source = r.read_addr()?;
        let hop_count = r.read_u32_be()?;

        Ok(RouteRequest {
            dest,
            source,
            hop_count,
        })
    }
}

impl Encode for RouteReply {
    fn encode(&self, w: &mut Writer) {
        w.write_addr(self.dest);
        w.write_addr(self.next_hop);
        w.write_f64_be(self.trust);
    }
}

impl Decode for RouteReply {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let dest = r.read_addr()?;
        let next_hop = r.read_addr()?;
        let trust = r.read_f64_be()?;

        Ok(RouteReply {
            dest,
            next_hop,
            trust,
        })
    }
}

impl Encode for RouteAdvertisement {
    fn encode(&self, w: &mut Writer) {
        w.write_addr(self.dest);
        w.write_addr(self.next_hop);
        w.write_f64_be(self.trust);
        w.write_u32_be(self.hop_count);
    }
}

impl Decode for RouteAdvertisement {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let dest = r.read_addr()?;
        let next_hop = r.read_addr()?;
        let trust = r.read_f64_be()?;
        let hop_count = r.read_u32_be()?;

        Ok(RouteAdvertisement {
            dest,
            next_hop,
            trust,
            hop_count,
        })
    }
}

impl Encode for TrustUpdate {
    fn encode(&self, w: &mut Writer) {
        w.write_f64_be(self.trust);
    }
}

impl Decode for TrustUpdate {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let trust = r.read_f64_be()?;
        Ok(TrustUpdate { trust })
    }
}

impl Encode for Message {
    fn encode(&self, w: &mut Writer) {
        match self {
            Message::RouteRequest(m) => {
                w.write_u8(TAG_ROUTE_REQUEST);
                m.encode(w);
            }
            Message::RouteReply(m) => {
                w.write_u8(TAG_ROUTE_REPLY);
                m.encode(w);
            }
            Message::RouteAdvertisement(m) => {
                w.write_u8(TAG_ROUTE_ADVERTISEMENT);
                m.encode(w);
            }
            Message::TrustUpdate(m) => {
                w.write_u8(TAG_TRUST_UPDATE);
                m.encode(w);
            }
        }
    }
}

impl Decode for Message {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let tag = r.read_u8().map_err(|_| DecodeError::Empty)?;
        match tag {
            TAG_ROUTE_REQUEST => Ok(Message::RouteRequest(RouteRequest::decode(r)?)),
            TAG_ROUTE_REPLY => Ok(Message::RouteReply(RouteReply::decode(r)?)),
            TAG_ROUTE_ADVERTISEMENT => {
                Ok(Message::RouteAdvertisement(RouteAdvertisement::decode(r)?))
            }
            TAG_TRUST_UPDATE => Ok(Message::TrustUpdate(TrustUpdate::decode(r)?)),
            other => {
                // Tolerant dispatch inherited from the source: an unknown
                // tag is treated as a route request. The body length check
                // still applies, so short garbage fails to decode.
                warn!(tag = other, "unknown message tag, treating as request");
                Ok(Message::RouteRequest(RouteRequest::decode(r)?))
            }
        }
    }
}
