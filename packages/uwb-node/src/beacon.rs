//! Anchor beacon cadence: `period ± jitter`, seeded for reproducible runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct BeaconScheduler {
    period_ms: u64,
    jitter_ms: u64,
    rng: StdRng,
    next_due_ms: u64,
    last_beacon_ms: Option<u64>,
}

impl BeaconScheduler {
    /// First beacon falls one jittered period after `now_ms`
    pub fn new(period_ms: u64, jitter_ms: u64, seed: u64, now_ms: u64) -> Self {
        let mut s = Self {
            period_ms,
            jitter_ms,
            rng: StdRng::seed_from_u64(seed),
            next_due_ms: now_ms,
            last_beacon_ms: None,
        };
        s.next_due_ms = now_ms + s.draw_interval();
        s
    }

    /// True when a beacon is due; the next one is scheduled from `now_ms`
    pub fn poll(&mut self, now_ms: u64) -> bool {
        if now_ms < self.next_due_ms {
            return false;
        }
        self.last_beacon_ms = Some(now_ms);
        self.next_due_ms = now_ms + self.draw_interval();
        true
    }

    pub fn next_due_ms(&self) -> u64 { self.next_due_ms }
    pub fn last_beacon_ms(&self) -> Option<u64> { self.last_beacon_ms }

    fn draw_interval(&mut self) -> u64 {
        let jitter = self.jitter_ms.min(self.period_ms.saturating_sub(1)) as i64;
        let offset = if jitter > 0 { self.rng.gen_range(-jitter..=jitter) } else { 0 };
        (self.period_ms as i64 + offset).max(1) as u64
    }
}
