//! Host configuration (`config.toml`).
//!
//! Every field has a default; environment variables override the transport
//! defaults so a deployment can be retargeted without editing the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::info;
use uwb_types::wire::{DEFAULT_ANCHOR_COUNT, DEFAULT_SLAVE_ADDR};

use crate::error::ConfigError;
use crate::mlat::SolverConfig;

const BUNDLED_CONFIG: &str = include_str!("../config.toml");

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub transport: TransportConfig,
    pub cycle: CycleConfig,
    pub solver: SolverConfig,
    pub anchors_file: AnchorsFile,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// I2C character device (default /dev/i2c-1)
    pub device: PathBuf,
    /// Slave address of the ranging node (default 0x04)
    pub slave_addr: u16,
    /// Measurement slots served by the node (default 5)
    pub anchor_count: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device: std::env::var("UWB_I2C_DEVICE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/dev/i2c-1")),
            slave_addr: std::env::var("UWB_I2C_ADDR")
                .ok().and_then(|v| parse_int(&v)).unwrap_or(DEFAULT_SLAVE_ADDR),
            anchor_count: DEFAULT_ANCHOR_COUNT,
        }
    }
}

/// Timing of one aggregation cycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    /// Wait after SCAN before the first DATA_READY poll
    pub scan_wait_ms: u64,
    /// Extra DATA_READY polls while the node reports NODATA
    pub busy_retries: u32,
    pub busy_retry_ms: u64,
    /// Pause between cycles in `run` mode
    pub idle_ms: u64,
}

impl Default for CycleConfig {
    fn default() -> Self {
        // The node closes a scan cycle after at most 1000 ms; 300 + 10 × 100 covers it.
        Self {
            scan_wait_ms: 300,
            busy_retries: 10,
            busy_retry_ms: 100,
            idle_ms: 200,
        }
    }
}

impl CycleConfig {
    pub fn scan_wait(&self) -> Duration { Duration::from_millis(self.scan_wait_ms) }
    pub fn busy_retry(&self) -> Duration { Duration::from_millis(self.busy_retry_ms) }
    pub fn idle(&self) -> Duration { Duration::from_millis(self.idle_ms) }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct AnchorsFile(pub PathBuf);

impl Default for AnchorsFile {
    fn default() -> Self {
        Self(std::env::var("UWB_ANCHORS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("anchors.csv")))
    }
}

impl HostConfig {
    /// Load `path`, or the bundled defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let text = match path {
            Some(p) => {
                info!("Loading host config from {}", p.display());
                std::fs::read_to_string(p)
                    .map_err(|source| ConfigError::Read { path: p.to_path_buf(), source })?
            }
            None => BUNDLED_CONFIG.to_string(),
        };
        Ok(toml::from_str(&text)?)
    }
}

/// Accepts decimal or `0x`-prefixed hex
pub fn parse_int(s: &str) -> Option<u16> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_config_parses() {
        let cfg = HostConfig::load(None).unwrap();
        assert_eq!(cfg.transport.anchor_count, 5);
        assert_eq!(cfg.transport.slave_addr, 0x04);
        assert!((cfg.solver.ceiling_m - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: HostConfig = toml::from_str("[cycle]\nscan_wait_ms = 50\n").unwrap();
        assert_eq!(cfg.cycle.scan_wait_ms, 50);
        assert_eq!(cfg.cycle.busy_retries, CycleConfig::default().busy_retries);
        assert_eq!(cfg.solver.max_iterations, 100);
    }

    #[test]
    fn test_explicit_bounds_from_toml() {
        let cfg: HostConfig = toml::from_str(
            "[solver.bounds]\nmin = { x = 0.0, y = 0.0, z = 0.0 }\nmax = { x = 5.0, y = 5.0, z = 2.0 }\n",
        )
        .unwrap();
        assert_eq!(cfg.solver.bounds.unwrap().max.z, 2.0);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("0x04"), Some(4));
        assert_eq!(parse_int("17"), Some(17));
        assert_eq!(parse_int("zz"), None);
    }
}
