//! Two-way ranging arithmetic.
//!
//! ```text
//!   tag                     anchor
//!   poll_tx  ── POLL ──▶    poll_rx
//!   ack_rx   ◀─ POLL_ACK ── ack_tx
//!   range_tx ── RANGE ──▶   range_rx
//! ```
//!
//! Round trips and replies are each measured on a single clock, so clock
//! offsets cancel. The double-sided form also cancels first-order drift.

use serde::{Deserialize, Serialize};
use uwb_types::{Timestamp, SPEED_OF_LIGHT_MPS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwrMode {
    /// `(round1 − reply1) / 2`: two messages' worth of timestamps
    SingleSided,
    /// Asymmetric double-sided formula over all six timestamps
    #[default]
    DoubleSided,
}

/// The six timestamps of one ranging exchange
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwrTimestamps {
    pub poll_tx: Timestamp,
    pub poll_rx: Timestamp,
    pub ack_tx: Timestamp,
    pub ack_rx: Timestamp,
    pub range_tx: Timestamp,
    pub range_rx: Timestamp,
}

impl TwrTimestamps {
    /// Tag clock: POLL out to POLL_ACK back
    pub fn round1(&self) -> f64 { self.ack_rx.duration_since(self.poll_tx) as f64 }
    /// Anchor clock: POLL in to POLL_ACK out
    pub fn reply1(&self) -> f64 { self.ack_tx.duration_since(self.poll_rx) as f64 }
    /// Anchor clock: POLL_ACK out to RANGE in
    pub fn round2(&self) -> f64 { self.range_rx.duration_since(self.ack_tx) as f64 }
    /// Tag clock: POLL_ACK in to RANGE out
    pub fn reply2(&self) -> f64 { self.range_tx.duration_since(self.ack_rx) as f64 }

    /// Time of flight in ticks, `None` when the exchange is degenerate
    pub fn time_of_flight(&self, mode: TwrMode) -> Option<f64> {
        match mode {
            TwrMode::SingleSided => Some((self.round1() - self.reply1()) / 2.0),
            TwrMode::DoubleSided => {
                let (round1, reply1, round2, reply2) = (self.round1(), self.reply1(), self.round2(), self.reply2());
                let denom = round1 + round2 + reply1 + reply2;
                if denom <= 0.0 {
                    return None;
                }
                Some((round1 * round2 - reply1 * reply2) / denom)
            }
        }
    }

    pub fn distance_m(&self, mode: TwrMode) -> Option<f64> {
        self.time_of_flight(mode)
            .map(|tof| Timestamp::ticks_to_seconds(tof) * SPEED_OF_LIGHT_MPS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOF: u64 = 213; // ≈ 1 m
    const REPLY: u64 = 3 * Timestamp::TICKS_PER_MS;

    fn symmetric(start: u64) -> TwrTimestamps {
        let poll_tx = Timestamp::new(start);
        let poll_rx = Timestamp::new(start + 1_000_000 + TOF);
        let ack_tx = poll_rx.wrapping_add(REPLY);
        let ack_rx = poll_tx.wrapping_add(REPLY + 2 * TOF);
        let range_tx = ack_rx.wrapping_add(REPLY);
        let range_rx = ack_tx.wrapping_add(REPLY + 2 * TOF);
        TwrTimestamps { poll_tx, poll_rx, ack_tx, ack_rx, range_tx, range_rx }
    }

    #[test]
    fn test_symmetric_exchange_matches_half_round_trip() {
        let ts = symmetric(5_000);
        let expected = SPEED_OF_LIGHT_MPS * Timestamp::ticks_to_seconds((ts.round1() - ts.reply1()) / 2.0);
        for mode in [TwrMode::SingleSided, TwrMode::DoubleSided] {
            let d = ts.distance_m(mode).unwrap();
            assert!((d - expected).abs() < 1e-6, "{mode:?}: {d} vs {expected}");
        }
        assert!((expected - 0.999).abs() < 0.01);
    }

    #[test]
    fn test_exchange_across_timestamp_wrap() {
        let ts = symmetric(Timestamp::MASK - 10);
        assert!((ts.time_of_flight(TwrMode::DoubleSided).unwrap() - TOF as f64).abs() < 1e-6);
    }

    #[test]
    fn test_double_sided_cancels_drift() {
        // Anchor clock runs 20 ppm fast: every anchor-side interval stretches
        let drift = 1.0 + 20e-6;
        let reply_anchor = (REPLY as f64 * drift) as u64;
        let poll_tx = Timestamp::new(0);
        let poll_rx = Timestamp::new(777);
        let ack_tx = poll_rx.wrapping_add(reply_anchor);
        let ack_rx = poll_tx.wrapping_add(REPLY + 2 * TOF);
        let range_tx = ack_rx.wrapping_add(REPLY);
        let round2_anchor = ((REPLY + 2 * TOF) as f64 * drift) as u64;
        let range_rx = ack_tx.wrapping_add(round2_anchor);
        let ts = TwrTimestamps { poll_tx, poll_rx, ack_tx, ack_rx, range_tx, range_rx };

        let ds = ts.time_of_flight(TwrMode::DoubleSided).unwrap();
        let ss = ts.time_of_flight(TwrMode::SingleSided).unwrap();
        assert!((ds - TOF as f64).abs() < 2.0, "double-sided {ds}");
        assert!((ss - TOF as f64).abs() > 100.0, "single-sided {ss}");
    }
}
