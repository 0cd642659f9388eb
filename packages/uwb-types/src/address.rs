//! Node addressing: 16-bit addresses with role and spatial-group bits.
//!
//! ```text
//!  15   14   13   12 ............................ 0
//! TAG RIGHT LEFT  base id (13 bits)
//! ```
//!
//! Anchors clear `FLAG_TAG`, tags set it. Address 0 is "nobody": never a
//! session peer, and used as the broadcast destination.

use serde::{Deserialize, Serialize};

/// Set on every tag address
pub const FLAG_TAG: u16 = 1 << 15;
/// Anchor belongs to the right-hand scheduling group
pub const MASK_RIGHT: u16 = 1 << 14;
/// Anchor belongs to the left-hand scheduling group
pub const MASK_LEFT: u16 = 1 << 13;
/// Bits that carry the numeric identifier
pub const MASK_BASE_ID: u16 = !(FLAG_TAG | MASK_RIGHT | MASK_LEFT);
/// Reserved "no address"
pub const ID_NONE: u16 = 0;

/// Spatial group derived from the two mask bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialGroup {
    None,
    Left,
    Right,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddress(u16);

impl NodeAddress {
    pub const NONE: NodeAddress = NodeAddress(ID_NONE);
    /// Destination of frames meant for every listener
    pub const BROADCAST: NodeAddress = NodeAddress(ID_NONE);

    pub const fn from_raw(raw: u16) -> Self { Self(raw) }

    /// Anchor address for a numeric id (role bits cleared)
    pub const fn anchor(id: u16) -> Self { Self(id & MASK_BASE_ID) }

    /// Tag address for a numeric id
    pub const fn tag(id: u16) -> Self { Self((id & MASK_BASE_ID) | FLAG_TAG) }

    pub const fn with_group(self, group: SpatialGroup) -> Self {
        let cleared = self.0 & !(MASK_RIGHT | MASK_LEFT);
        let bits = match group {
            SpatialGroup::None => 0,
            SpatialGroup::Left => MASK_LEFT,
            SpatialGroup::Right => MASK_RIGHT,
            SpatialGroup::Both => MASK_LEFT | MASK_RIGHT,
        };
        Self(cleared | bits)
    }

    pub const fn raw(self) -> u16 { self.0 }
    pub const fn is_none(self) -> bool { self.0 == ID_NONE }

    pub const fn is_tag(self) -> bool {
        !self.is_none() && self.0 & FLAG_TAG != 0
    }

    pub const fn is_anchor(self) -> bool {
        !self.is_none() && self.0 & FLAG_TAG == 0
    }

    pub const fn spatial_group(self) -> SpatialGroup {
        match (self.0 & MASK_LEFT != 0, self.0 & MASK_RIGHT != 0) {
            (false, false) => SpatialGroup::None,
            (true, false) => SpatialGroup::Left,
            (false, true) => SpatialGroup::Right,
            (true, true) => SpatialGroup::Both,
        }
    }

    /// Numeric identifier with the role and group bits cleared
    pub const fn base_id(self) -> u16 { self.0 & MASK_BASE_ID }

    pub fn to_le_bytes(self) -> [u8; 2] { self.0.to_le_bytes() }
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self { Self(u16::from_le_bytes(bytes)) }
}

impl From<u16> for NodeAddress {
    fn from(raw: u16) -> Self { Self(raw) }
}

impl std::fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let role = if self.is_tag() { "tag" } else if self.is_anchor() { "anchor" } else { "none" };
        write!(f, "{role}#{} (0x{:04X})", self.base_id(), self.0)
    }
}
