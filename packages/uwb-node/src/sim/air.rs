//! air.rs — simulated radio medium
//!
//! Every node owns a free-running 40-bit clock with its own offset and drift.
//! A transmission reaches every other node within range after the true time
//! of flight; the receiver timestamps it on its own clock, plus Gaussian
//! timestamp noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};
use serde::Deserialize;
use uwb_types::{Timestamp, Vec3, SPEED_OF_LIGHT_MPS};

use crate::error::RadioError;
use crate::radio::Radio;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AirConfig {
    /// One-sigma receive timestamp noise, expressed as range (m)
    pub timestamp_sigma_m: f64,
    /// Frames do not reach nodes further apart than this
    pub max_range_m: f64,
    /// Clock offsets are drawn from [0, clock_offset_max_s]
    pub clock_offset_max_s: f64,
    /// Clock drifts are drawn from ±drift_ppm_max
    pub drift_ppm_max: f64,
}

impl Default for AirConfig {
    fn default() -> Self {
        Self {
            timestamp_sigma_m: 0.02,
            max_range_m: 60.0,
            clock_offset_max_s: 5.0,
            drift_ppm_max: 20.0,
        }
    }
}

// ── Node clock ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeClock {
    pub offset_s: f64,
    pub drift_ppm: f64,
}

impl NodeClock {
    pub fn random(cfg: &AirConfig, rng: &mut impl Rng) -> Self {
        let offset_s = if cfg.clock_offset_max_s > 0.0 { rng.gen_range(0.0..cfg.clock_offset_max_s) } else { 0.0 };
        let drift_ppm = if cfg.drift_ppm_max > 0.0 {
            rng.gen_range(-cfg.drift_ppm_max..cfg.drift_ppm_max)
        } else {
            0.0
        };
        Self { offset_s, drift_ppm }
    }

    fn rate(&self) -> f64 { 1.0 + self.drift_ppm * 1e-6 }

    /// Unwrapped local clock reading at true time `true_s`
    pub fn local_ticks(&self, true_s: f64) -> f64 {
        (true_s * self.rate() + self.offset_s) * Timestamp::TICKS_PER_SECOND as f64
    }

    pub fn timestamp(&self, true_s: f64) -> Timestamp {
        wrap_ticks(self.local_ticks(true_s))
    }

    /// True time at which this clock will read `at`, `Err` if that is in the past
    pub fn true_time_of(&self, at: Timestamp, now_s: f64) -> Result<f64, RadioError> {
        let now = self.timestamp(now_s);
        let ahead = at.duration_since(now);
        if ahead > Timestamp::MASK / 2 {
            return Err(RadioError::TxTooLate { late_by_ticks: now.duration_since(at) });
        }
        Ok(now_s + ahead as f64 / (Timestamp::TICKS_PER_SECOND as f64 * self.rate()))
    }
}

fn wrap_ticks(ticks: f64) -> Timestamp {
    Timestamp::new((ticks.round() as i64).rem_euclid(1 << Timestamp::BITS) as u64)
}

// ── Radio ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Transmission {
    pub bytes: Vec<u8>,
    pub true_tx_s: f64,
}

/// Radio handed to a simulated node; transmissions wait in `outbox` for the air
#[derive(Debug, Clone)]
pub struct SimRadio {
    pub clock: NodeClock,
    pub now_s: f64,
    pub online: bool,
    outbox: Vec<Transmission>,
}

impl SimRadio {
    pub fn new(clock: NodeClock) -> Self {
        Self { clock, now_s: 0.0, online: true, outbox: Vec::new() }
    }

    pub fn take_outbox(&mut self) -> Vec<Transmission> {
        std::mem::take(&mut self.outbox)
    }
}

impl Radio for SimRadio {
    fn system_time(&self) -> Timestamp {
        self.clock.timestamp(self.now_s)
    }

    fn send(&mut self, frame: &[u8], at: Option<Timestamp>) -> Result<Timestamp, RadioError> {
        if !self.online {
            return Err(RadioError::Offline);
        }
        let (true_tx_s, tx_time) = match at {
            Some(at) => (self.clock.true_time_of(at, self.now_s)?, at),
            None => (self.now_s, self.system_time()),
        };
        self.outbox.push(Transmission { bytes: frame.to_vec(), true_tx_s });
        Ok(tx_time)
    }
}

// ── Medium ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Arrival {
    pub to: usize,
    pub arrival_s: f64,
    pub bytes: Vec<u8>,
}

pub struct Air {
    cfg: AirConfig,
    noise: Normal<f64>,
    rng: StdRng,
    in_flight: Vec<Arrival>,
}

impl Air {
    pub fn new(cfg: AirConfig, seed: u64) -> Result<Self, NormalError> {
        let noise = Normal::new(0.0, cfg.timestamp_sigma_m)?;
        Ok(Self { cfg, noise, rng: StdRng::seed_from_u64(seed), in_flight: Vec::new() })
    }

    pub fn config(&self) -> &AirConfig { &self.cfg }
    pub fn in_flight(&self) -> usize { self.in_flight.len() }

    /// Put a transmission from node `from` on the air
    pub fn propagate(&mut self, from: usize, positions: &[Vec3], tx: Transmission) {
        for (to, pos) in positions.iter().enumerate() {
            if to == from {
                continue;
            }
            let d = positions[from].dist(pos);
            if d > self.cfg.max_range_m {
                continue;
            }
            self.in_flight.push(Arrival {
                to,
                arrival_s: tx.true_tx_s + d / SPEED_OF_LIGHT_MPS,
                bytes: tx.bytes.clone(),
            });
        }
    }

    /// Remove and return everything that has arrived by `now_s`, earliest first
    pub fn due(&mut self, now_s: f64) -> Vec<Arrival> {
        let (mut due, pending): (Vec<Arrival>, Vec<Arrival>) =
            std::mem::take(&mut self.in_flight).into_iter().partition(|a| a.arrival_s <= now_s);
        self.in_flight = pending;
        due.sort_by(|a, b| a.arrival_s.total_cmp(&b.arrival_s));
        due
    }

    /// Receive timestamp on `clock` for a frame arriving at `arrival_s`
    pub fn rx_timestamp(&mut self, clock: &NodeClock, arrival_s: f64, noise_scale: f64) -> Timestamp {
        let noise_s = self.noise.sample(&mut self.rng) * noise_scale / SPEED_OF_LIGHT_MPS;
        wrap_ticks(clock.local_ticks(arrival_s) + noise_s * Timestamp::TICKS_PER_SECOND as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delayed_send_lands_on_requested_tick() {
        let clock = NodeClock { offset_s: 1.25, drift_ppm: 15.0 };
        let mut radio = SimRadio::new(clock);
        radio.now_s = 2.0;
        let at = radio.system_time().wrapping_add(3 * Timestamp::TICKS_PER_MS);
        assert_eq!(radio.send(&[0; 20], Some(at)).unwrap(), at);

        let tx = radio.take_outbox().remove(0);
        let landed = clock.local_ticks(tx.true_tx_s);
        assert!((landed - clock.local_ticks(2.0) - (3 * Timestamp::TICKS_PER_MS) as f64).abs() < 1.0);
    }

    #[test]
    fn test_send_in_the_past_is_rejected() {
        let mut radio = SimRadio::new(NodeClock { offset_s: 0.5, drift_ppm: 0.0 });
        radio.now_s = 1.0;
        let past = Timestamp::new(radio.system_time().ticks() - 1_000);
        assert!(matches!(radio.send(&[0; 20], Some(past)), Err(RadioError::TxTooLate { late_by_ticks: 1_000 })));
        radio.online = false;
        assert_eq!(radio.send(&[0; 20], None), Err(RadioError::Offline));
    }

    #[test]
    fn test_propagation_respects_range_and_order() {
        let cfg = AirConfig { max_range_m: 20.0, timestamp_sigma_m: 0.0, ..AirConfig::default() };
        let mut air = Air::new(cfg, 1).unwrap();
        let positions = [Vec3::zero(), Vec3::new(15.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0), Vec3::new(50.0, 0.0, 0.0)];
        air.propagate(0, &positions, Transmission { bytes: vec![1], true_tx_s: 1.0 });
        assert_eq!(air.in_flight(), 2);

        assert!(air.due(1.0).is_empty());
        let due = air.due(1.001);
        assert_eq!(due.iter().map(|a| a.to).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(air.in_flight(), 0);
    }

    #[test]
    fn test_noiseless_rx_timestamp_matches_clock() {
        let mut air = Air::new(AirConfig { timestamp_sigma_m: 0.0, ..AirConfig::default() }, 1).unwrap();
        let clock = NodeClock { offset_s: 0.1, drift_ppm: -4.0 };
        assert_eq!(air.rx_timestamp(&clock, 0.75, 1.0), clock.timestamp(0.75));
    }
}
