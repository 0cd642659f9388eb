//! # uwb-types
//!
//! Shared UWB ranging structures for the anchor/tag positioning system.
//!
//! These types are used by:
//! - `uwb-node`: the ranging state machine that runs on every radio node
//! - `uwb-host`: the aggregation host that reads measurements and solves for position
//!
//! ## Coordinate Conventions
//!
//! - **World frame**: right-hand Cartesian, metres, Z = up
//! - Anchor positions come from the deployment file (`anchorId,x,y,z`)
//!
//! ## Wire invariants
//! - Every ranging frame is exactly [`FRAME_LEN`] bytes, whatever its type
//! - Multi-byte integers on the wire are little-endian
//! - Radio timestamps are 40 bits and wrap

use serde::{Deserialize, Serialize};

pub mod address;
pub mod frame;
pub mod measurement;
pub mod wire;

pub use address::{NodeAddress, SpatialGroup};
pub use frame::{Frame, FrameError, MessageType, Timestamp, FRAME_LEN};
pub use measurement::{Measurement, MeasurementSet};

// ── 3D Vector ─────────────────────────────────────────────────────────────────

/// 3D vector (metres)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self { Self { x, y, z } }
    pub const fn zero() -> Self { Self { x: 0.0, y: 0.0, z: 0.0 } }

    pub fn dist(&self, other: &Vec3) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2)).sqrt()
    }
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
    pub fn scale(&self, s: f64) -> Vec3 {
        Vec3::new(self.x * s, self.y * s, self.z * s)
    }
    pub fn norm(&self) -> f64 { self.dist(&Vec3::zero()) }

    /// Component-wise minimum
    pub fn min(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }
    /// Component-wise maximum
    pub fn max(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from(v: [f64; 3]) -> Self { Vec3::new(v[0], v[1], v[2]) }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

// ── Physical constants ────────────────────────────────────────────────────────

/// Propagation speed of the radio signal in air (m/s)
pub const SPEED_OF_LIGHT_MPS: f64 = 299_702_547.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec3_dist_and_bounds() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(3.0, 4.0, 0.0);
        assert!((a.dist(&b) - 5.0).abs() < 1e-12);
        assert_eq!(a.min(&b), a);
        assert_eq!(a.max(&b), b);
        assert_eq!(b.sub(&a).scale(2.0), Vec3::new(6.0, 8.0, 0.0));
    }
}
