//! Fixed-size binary ranging frame.
//!
//! ```text
//! offset  0      1..3        3..5         5..10   10..15  15..20
//!         type   source LE   dest LE      t1      t2      t3
//! ```
//!
//! Timestamps are 40-bit little-endian radio times. Slots a message type does
//! not use stay zero, so the frame is [`FRAME_LEN`] bytes for every type.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::address::NodeAddress;

pub const FRAME_LEN: usize = 20;

const SOURCE_OFFSET: usize = 1;
const DEST_OFFSET: usize = 3;
const TIMESTAMP_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {len} bytes, expected 20")]
    Truncated { len: usize },
    #[error("malformed frame: unknown message type 0x{0:02X}")]
    UnknownType(u8),
}

// ── Message types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MessageType {
    /// Tag → anchor: start of an exchange. t1 = poll tx
    Poll = 0,
    /// Anchor → tag. t1 = poll rx, t2 = ack tx
    PollAck = 1,
    /// Tag → anchor. t1 = poll tx, t2 = ack rx, t3 = range tx
    Range = 2,
    /// Anchor → tag. t1 carries the f32 distance bits
    RangeReport = 3,
    /// Anchor announce, or tag discovery request when broadcast by a tag
    Beacon = 127,
    /// Best-effort abort notice, never acknowledged
    RangeFailed = 255,
}

impl TryFrom<u8> for MessageType {
    type Error = FrameError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => Self::Poll,
            1 => Self::PollAck,
            2 => Self::Range,
            3 => Self::RangeReport,
            127 => Self::Beacon,
            255 => Self::RangeFailed,
            other => return Err(FrameError::UnknownType(other)),
        })
    }
}

// ── Radio timestamps ──────────────────────────────────────────────────────────

/// 40-bit radio timestamp in device ticks (1 tick = 1 / (128 × 499.2 MHz)).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const BITS: u32 = 40;
    pub const MASK: u64 = (1 << Self::BITS) - 1;
    pub const ZERO: Timestamp = Timestamp(0);
    pub const TICKS_PER_SECOND: u64 = 63_897_600_000;
    pub const TICKS_PER_MS: u64 = Self::TICKS_PER_SECOND / 1000;

    pub const fn new(ticks: u64) -> Self { Self(ticks & Self::MASK) }
    pub const fn ticks(self) -> u64 { self.0 }

    pub const fn wrapping_add(self, ticks: u64) -> Self { Self::new(self.0.wrapping_add(ticks)) }

    /// Ticks elapsed from `earlier` to `self`, modulo the 40-bit wrap
    pub const fn duration_since(self, earlier: Timestamp) -> u64 {
        self.0.wrapping_sub(earlier.0) & Self::MASK
    }

    pub fn ticks_to_seconds(ticks: f64) -> f64 { ticks / Self::TICKS_PER_SECOND as f64 }
}

// ── Frame ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub kind: MessageType,
    pub source: NodeAddress,
    pub destination: NodeAddress,
    pub timestamps: [Timestamp; 3],
}

impl Frame {
    pub fn new(kind: MessageType, source: NodeAddress, destination: NodeAddress) -> Self {
        Self { kind, source, destination, timestamps: [Timestamp::ZERO; 3] }
    }

    pub fn poll(source: NodeAddress, destination: NodeAddress, poll_tx: Timestamp) -> Self {
        Self { timestamps: [poll_tx, Timestamp::ZERO, Timestamp::ZERO], ..Self::new(MessageType::Poll, source, destination) }
    }

    pub fn poll_ack(source: NodeAddress, destination: NodeAddress, poll_rx: Timestamp, ack_tx: Timestamp) -> Self {
        Self { timestamps: [poll_rx, ack_tx, Timestamp::ZERO], ..Self::new(MessageType::PollAck, source, destination) }
    }

    pub fn range(
        source: NodeAddress,
        destination: NodeAddress,
        poll_tx: Timestamp,
        ack_rx: Timestamp,
        range_tx: Timestamp,
    ) -> Self {
        Self { timestamps: [poll_tx, ack_rx, range_tx], ..Self::new(MessageType::Range, source, destination) }
    }

    pub fn range_report(source: NodeAddress, destination: NodeAddress, distance_m: f32) -> Self {
        let bits = Timestamp::new(u64::from(distance_m.to_bits()));
        Self { timestamps: [bits, Timestamp::ZERO, Timestamp::ZERO], ..Self::new(MessageType::RangeReport, source, destination) }
    }

    pub fn beacon(source: NodeAddress, destination: NodeAddress) -> Self {
        Self::new(MessageType::Beacon, source, destination)
    }

    pub fn range_failed(source: NodeAddress, destination: NodeAddress) -> Self {
        Self::new(MessageType::RangeFailed, source, destination)
    }

    /// Distance carried by a `RANGE_REPORT`, `None` for other types
    pub fn reported_distance(&self) -> Option<f32> {
        match self.kind {
            MessageType::RangeReport => Some(f32::from_bits(self.timestamps[0].ticks() as u32)),
            _ => None,
        }
    }

    pub fn is_broadcast(&self) -> bool { self.destination == NodeAddress::BROADCAST }

    pub fn encode(&self) -> [u8; FRAME_LEN] {
        let mut out = [0u8; FRAME_LEN];
        let mut w = &mut out[..];
        w.put_u8(self.kind as u8);
        w.put_u16_le(self.source.raw());
        w.put_u16_le(self.destination.raw());
        for ts in &self.timestamps {
            w.put_uint_le(ts.ticks(), TIMESTAMP_LEN);
        }
        out
    }

    /// Decode the first [`FRAME_LEN`] bytes of `buf`
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < FRAME_LEN {
            return Err(FrameError::Truncated { len: buf.len() });
        }
        let mut r = &buf[..FRAME_LEN];
        let kind = MessageType::try_from(r.get_u8())?;
        let source = NodeAddress::from_raw(r.get_u16_le());
        let destination = NodeAddress::from_raw(r.get_u16_le());
        let mut timestamps = [Timestamp::ZERO; 3];
        for ts in &mut timestamps {
            *ts = Timestamp::new(r.get_uint_le(TIMESTAMP_LEN));
        }
        Ok(Self { kind, source, destination, timestamps })
    }
}

// ── Raw-buffer filters (no full decode) ──────────────────────────────────────

pub fn peek_type(buf: &[u8]) -> Result<MessageType, FrameError> {
    match buf.first() {
        Some(&b) => MessageType::try_from(b),
        None => Err(FrameError::Truncated { len: 0 }),
    }
}

pub fn matches_source(buf: &[u8], addr: NodeAddress) -> bool {
    buf.get(SOURCE_OFFSET..SOURCE_OFFSET + 2) == Some(&addr.to_le_bytes()[..])
}

pub fn matches_destination(buf: &[u8], addr: NodeAddress) -> bool {
    buf.get(DEST_OFFSET..DEST_OFFSET + 2) == Some(&addr.to_le_bytes()[..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frames() -> Vec<Frame> {
        let tag = NodeAddress::tag(1);
        let anchor = NodeAddress::anchor(3);
        vec![
            Frame::poll(tag, anchor, Timestamp::new(0x12_3456_789A)),
            Frame::poll_ack(anchor, tag, Timestamp::new(1), Timestamp::new(Timestamp::MASK)),
            Frame::range(tag, anchor, Timestamp::new(10), Timestamp::new(20), Timestamp::new(30)),
            Frame::range_report(anchor, tag, 4.25),
            Frame::beacon(anchor, NodeAddress::BROADCAST),
            Frame::range_failed(tag, anchor),
        ]
    }

    #[test]
    fn test_round_trip_every_type() {
        for f in sample_frames() {
            let bytes = f.encode();
            assert_eq!(bytes.len(), FRAME_LEN);
            assert_eq!(Frame::decode(&bytes).unwrap(), f);
        }
    }

    #[test]
    fn test_layout_is_little_endian() {
        let f = Frame::poll(NodeAddress::from_raw(0x8001), NodeAddress::from_raw(0x0203), Timestamp::new(0x01_0203_0405));
        let b = f.encode();
        assert_eq!(b[0], 0);
        assert_eq!(&b[1..5], &[0x01, 0x80, 0x03, 0x02]);
        assert_eq!(&b[5..10], &[0x05, 0x04, 0x03, 0x02, 0x01]);
        assert!(b[10..].iter().all(|&x| x == 0));
    }

    #[test]
    fn test_short_buffer_is_malformed() {
        let bytes = Frame::beacon(NodeAddress::anchor(1), NodeAddress::BROADCAST).encode();
        assert_eq!(Frame::decode(&bytes[..19]), Err(FrameError::Truncated { len: 19 }));
        assert_eq!(Frame::decode(&[]), Err(FrameError::Truncated { len: 0 }));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let mut bytes = Frame::beacon(NodeAddress::anchor(1), NodeAddress::BROADCAST).encode();
        bytes[0] = 42;
        assert_eq!(Frame::decode(&bytes), Err(FrameError::UnknownType(42)));
    }

    #[test]
    fn test_match_filters() {
        let tag = NodeAddress::tag(9);
        let anchor = NodeAddress::anchor(2);
        let bytes = Frame::poll(tag, anchor, Timestamp::ZERO).encode();
        assert!(matches_source(&bytes, tag));
        assert!(!matches_source(&bytes, anchor));
        assert!(matches_destination(&bytes, anchor));
        assert!(!matches_destination(&bytes, tag));
        assert!(!matches_destination(&bytes[..4], anchor));
        assert_eq!(peek_type(&bytes), Ok(MessageType::Poll));
    }

    #[test]
    fn test_timestamp_wraps_at_40_bits() {
        let late = Timestamp::new(Timestamp::MASK - 4);
        let early = late.wrapping_add(10);
        assert_eq!(early.ticks(), 5);
        assert_eq!(early.duration_since(late), 10);
        assert_eq!(Timestamp::new(u64::MAX).ticks(), Timestamp::MASK);
    }

    #[test]
    fn test_range_report_distance() {
        let f = Frame::range_report(NodeAddress::anchor(1), NodeAddress::tag(1), 12.5);
        let decoded = Frame::decode(&f.encode()).unwrap();
        assert_eq!(decoded.reported_distance(), Some(12.5));
        assert_eq!(Frame::beacon(NodeAddress::anchor(1), NodeAddress::BROADCAST).reported_distance(), None);
    }
}
