//! Protocol timing table and node configuration.

use serde::{Deserialize, Serialize};
use uwb_types::wire::DEFAULT_ANCHOR_COUNT;
use uwb_types::{NodeAddress, Timestamp};

use crate::twr::TwrMode;

/// Per-state deadlines and scheduling constants, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    /// Anchor in PONG waiting for the tag's POLL; also the tag's SCAN silence limit
    pub pong_timeout_ms: u64,
    /// Tag waiting for POLL_ACK
    pub pollack_timeout_ms: u64,
    /// Anchor waiting for RANGE
    pub range_timeout_ms: u64,
    /// Tag waiting for RANGE_REPORT
    pub rangereport_timeout_ms: u64,
    /// Upper bound of the anchor's random reply slot after a discovery beacon
    pub pending_pong_timeout_ms: u64,
    /// Fixed turnaround between a reception and the timed reply
    pub reply_delay_ms: u64,
    /// Longest a tag scan cycle may stay open
    pub reset_timeout_ms: u64,
    pub beacon_period_ms: u64,
    pub beacon_jitter_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            pong_timeout_ms: 100,
            pollack_timeout_ms: 10,
            range_timeout_ms: 10,
            rangereport_timeout_ms: 10,
            pending_pong_timeout_ms: 10,
            reply_delay_ms: 3,
            reset_timeout_ms: 1000,
            beacon_period_ms: 500,
            beacon_jitter_ms: 10,
        }
    }
}

impl Timing {
    pub fn reply_delay_ticks(&self) -> u64 {
        self.reply_delay_ms * Timestamp::TICKS_PER_MS
    }
}

/// Everything a node needs besides its radio
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub address: NodeAddress,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub twr_mode: TwrMode,
    /// Size of the tag's measurement table
    #[serde(default = "default_anchor_count")]
    pub anchor_count: usize,
    /// Seed for beacon jitter and reply slots
    #[serde(default)]
    pub seed: u64,
}

fn default_anchor_count() -> usize { DEFAULT_ANCHOR_COUNT }

impl NodeConfig {
    pub fn new(address: NodeAddress) -> Self {
        Self {
            address,
            timing: Timing::default(),
            twr_mode: TwrMode::default(),
            anchor_count: DEFAULT_ANCHOR_COUNT,
            seed: u64::from(address.raw()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_timing_keeps_defaults() {
        let t: Timing = toml::from_str("pong_timeout_ms = 250\n").unwrap();
        assert_eq!(t.pong_timeout_ms, 250);
        assert_eq!(t.reply_delay_ms, 3);
        assert_eq!(t.reset_timeout_ms, 1000);
    }

    #[test]
    fn test_reply_delay_in_ticks() {
        assert_eq!(Timing::default().reply_delay_ticks(), 3 * 63_897_600);
    }
}
