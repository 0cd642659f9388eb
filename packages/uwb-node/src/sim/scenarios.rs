//! scenarios.rs — fault scenarios for the simulated ranging network
//!
//! Each scenario reproduces one field failure mode. None of them may leave a
//! node stuck: the network has to recover once the fault clears.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Periodically silence some anchors (power loss, antenna blocked)
    AnchorDropout,
    /// Scale timestamp noise up (multipath-heavy room)
    HighNoise,
    /// Step one anchor's clock forward at a fixed time
    ClockSlip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    /// Base ids of the anchors that drop out
    pub dropout_anchor_ids: Vec<u16>,
    pub dropout_period_ms: u64,
    /// Silent part of each dropout period
    pub dropout_duration_ms: u64,
    pub noise_multiplier: f64,
    pub clock_slip_anchor_id: u16,
    pub clock_slip_at_ms: u64,
    pub clock_slip_ms: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            dropout_anchor_ids: vec![],
            dropout_period_ms: 4_000,
            dropout_duration_ms: 1_500,
            noise_multiplier: 5.0,
            clock_slip_anchor_id: 0,
            clock_slip_at_ms: 2_000,
            clock_slip_ms: 5.0,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: ScenarioType) -> bool {
        self.active.contains(&s)
    }

    pub fn is_anchor_dropped(&self, base_id: u16, now_ms: u64) -> bool {
        if !self.has(ScenarioType::AnchorDropout) || !self.dropout_anchor_ids.contains(&base_id) {
            return false;
        }
        now_ms % self.dropout_period_ms.max(1) < self.dropout_duration_ms
    }

    pub fn noise_scale(&self) -> f64 {
        if self.has(ScenarioType::HighNoise) { self.noise_multiplier } else { 1.0 }
    }

    /// Clock step (s) to apply to anchor `base_id` at exactly `now_ms`
    pub fn clock_slip(&self, base_id: u16, now_ms: u64) -> Option<f64> {
        (self.has(ScenarioType::ClockSlip) && base_id == self.clock_slip_anchor_id && now_ms == self.clock_slip_at_ms)
            .then_some(self.clock_slip_ms / 1000.0)
    }

    /// Preset by name, as accepted on the `uwb-sim` command line
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::default()),
            "dropout" => Some(preset_anchor_dropout()),
            "noise" => Some(preset_high_noise()),
            "clock-slip" => Some(preset_clock_slip()),
            _ => None,
        }
    }
}

pub fn preset_anchor_dropout() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::AnchorDropout],
        dropout_anchor_ids: vec![2],
        ..Default::default()
    }
}

pub fn preset_high_noise() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::HighNoise],
        ..Default::default()
    }
}

pub fn preset_clock_slip() -> ScenarioConfig {
    ScenarioConfig {
        active: vec![ScenarioType::ClockSlip],
        clock_slip_anchor_id: 3,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_window() {
        let s = preset_anchor_dropout();
        assert!(s.is_anchor_dropped(2, 100));
        assert!(!s.is_anchor_dropped(2, 1_500));
        assert!(s.is_anchor_dropped(2, 4_100));
        assert!(!s.is_anchor_dropped(1, 100));
        assert!(!ScenarioConfig::default().is_anchor_dropped(2, 100));
    }

    #[test]
    fn test_clock_slip_fires_once() {
        let s = preset_clock_slip();
        assert_eq!(s.clock_slip(3, 2_000), Some(0.005));
        assert_eq!(s.clock_slip(3, 2_001), None);
        assert_eq!(s.clock_slip(1, 2_000), None);
    }

    #[test]
    fn test_presets_by_name() {
        assert!(ScenarioConfig::preset("noise").unwrap().has(ScenarioType::HighNoise));
        assert!(ScenarioConfig::preset("bogus").is_none());
    }
}
