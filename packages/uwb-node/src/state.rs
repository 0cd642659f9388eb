//! Ranging states and the events a node reports to its owner.

use serde::Serialize;
use uwb_types::{Measurement, NodeAddress};

use crate::error::RangingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Idle,
    /// Tag: listening for anchor beacons during an open scan cycle
    Scan,
    /// Anchor: directed beacon sent, waiting for the tag's POLL
    Pong,
    /// Anchor: picking the next queued tag
    RoundRobin,
    /// Tag: POLL sent, waiting for POLL_ACK
    Poll,
    /// Anchor: scheduling the timed POLL_ACK
    PollAck,
    /// Tag: RANGE sent, waiting for RANGE_REPORT. Anchor: waiting for RANGE.
    Range,
    /// Tag: finalizing the reported distance
    RangeReport,
    /// Anchor: waiting out its random reply slot after a discovery beacon
    PendingPong,
}

impl State {
    /// States whose deadline means a peer went quiet
    pub fn awaits_peer(self) -> bool {
        matches!(self, State::Pong | State::Poll | State::Range)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeEvent {
    StateChanged { from: State, to: State },
    Measurement(Measurement),
    SessionFailed { peer: NodeAddress, error: RangingError },
    /// Tag scan cycle closed with this many valid measurements
    CycleComplete { valid: usize },
}
