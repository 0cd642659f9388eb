//! Node ↔ host command protocol.
//!
//! The host writes a single command byte and then reads the reply:
//!
//! | command        | reply                                       |
//! |----------------|---------------------------------------------|
//! | `SCAN`         | none                                        |
//! | `DATA_READY`   | 1 status byte: [`STATUS_NODATA`] / [`STATUS_DATARD`] |
//! | `TYPE_ID`      | `2 × anchor_count` bytes, LE u16 addresses  |
//! | `TYPE_DIST`    | `4 × anchor_count` bytes, LE f32 metres     |

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;
use crate::measurement::Measurement;

/// Ranging round still running, ask again later
pub const STATUS_NODATA: u8 = 0b0111_1011;
/// Results are ready to be read
pub const STATUS_DATARD: u8 = 0b1000_0011;

/// Default I2C slave address of the ranging node
pub const DEFAULT_SLAVE_ADDR: u16 = 0x04;
/// Measurement slots in the reference deployment
pub const DEFAULT_ANCHOR_COUNT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum Command {
    None = 0,
    Scan = 1,
    DataReady = 2,
    TypeId = 3,
    TypeDist = 4,
}

impl Command {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::Scan),
            2 => Some(Self::DataReady),
            3 => Some(Self::TypeId),
            4 => Some(Self::TypeDist),
            _ => None,
        }
    }

    /// Reply length for a table of `anchor_count` slots
    pub fn reply_len(self, anchor_count: usize) -> usize {
        match self {
            Self::None | Self::Scan => 0,
            Self::DataReady => 1,
            Self::TypeId => 2 * anchor_count,
            Self::TypeDist => 4 * anchor_count,
        }
    }
}

// ── Table encoding ────────────────────────────────────────────────────────────

pub fn encode_ids(slots: &[Measurement]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * slots.len());
    for m in slots {
        out.put_u16_le(m.anchor.raw());
    }
    out
}

pub fn encode_distances(slots: &[Measurement]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 * slots.len());
    for m in slots {
        out.put_f32_le(m.distance_m);
    }
    out
}

pub fn decode_ids(mut buf: &[u8]) -> Vec<NodeAddress> {
    let mut ids = Vec::with_capacity(buf.len() / 2);
    while buf.remaining() >= 2 {
        ids.push(NodeAddress::from_raw(buf.get_u16_le()));
    }
    ids
}

pub fn decode_distances(mut buf: &[u8]) -> Vec<f32> {
    let mut dists = Vec::with_capacity(buf.len() / 4);
    while buf.remaining() >= 4 {
        dists.push(buf.get_f32_le());
    }
    dists
}
