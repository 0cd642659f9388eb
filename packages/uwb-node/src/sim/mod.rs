//! # sim
//!
//! Simulated ranging network: one tag, its anchors and the air between them,
//! plus host transports that reach the tag through its bridge.

pub mod air;
pub mod config;
pub mod network;
pub mod scenarios;
pub mod transport;

use std::path::PathBuf;

use thiserror::Error;

pub use air::{AirConfig, NodeClock, SimRadio};
pub use config::{NodeSpec, SimConfig};
pub use network::{SimNetwork, SimStats};
pub use scenarios::{ScenarioConfig, ScenarioType};
pub use transport::{BridgeRequest, ChannelTransport, SimTransport};

#[derive(Debug, Error)]
pub enum SimError {
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid simulation config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("anchor id {0} listed twice")]
    DuplicateAnchor(u16),
    #[error("timestamp noise: {0}")]
    Noise(#[from] rand_distr::NormalError),
    #[error(transparent)]
    Anchors(#[from] uwb_host::ConfigError),
}
