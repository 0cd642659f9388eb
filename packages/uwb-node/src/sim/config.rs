use std::path::Path;

use serde::Deserialize;
use tracing::info;
use uwb_types::wire::DEFAULT_ANCHOR_COUNT;
use uwb_types::{NodeAddress, SpatialGroup, Vec3};

use super::air::AirConfig;
use super::scenarios::ScenarioConfig;
use super::SimError;
use crate::timing::Timing;
use crate::twr::TwrMode;

const BUNDLED_CONFIG: &str = include_str!("../../config.toml");

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub seed: u64,
    pub twr_mode: TwrMode,
    pub anchor_count: usize,
    pub timing: Timing,
    pub air: AirConfig,
    pub scenario: ScenarioConfig,
    pub tag: NodeSpec,
    pub anchors: Vec<NodeSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeSpec {
    pub id: u16,
    #[serde(default)]
    pub group: Option<SpatialGroup>,
    pub position: Vec3,
}

impl NodeSpec {
    fn new(id: u16, x: f64, y: f64, z: f64) -> Self {
        Self { id, group: None, position: Vec3::new(x, y, z) }
    }

    pub fn tag_address(&self) -> NodeAddress {
        NodeAddress::tag(self.id)
    }

    pub fn anchor_address(&self) -> NodeAddress {
        let addr = NodeAddress::anchor(self.id);
        self.group.map_or(addr, |g| addr.with_group(g))
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            twr_mode: TwrMode::default(),
            anchor_count: DEFAULT_ANCHOR_COUNT,
            timing: Timing::default(),
            air: AirConfig::default(),
            scenario: ScenarioConfig::default(),
            tag: NodeSpec::new(1, 3.0, 2.0, 1.0),
            anchors: vec![
                NodeSpec::new(1, 0.0, 0.0, 2.5),
                NodeSpec::new(2, 8.0, 0.0, 0.4),
                NodeSpec::new(3, 8.0, 6.0, 2.6),
                NodeSpec::new(4, 0.0, 6.0, 0.5),
            ],
        }
    }
}

impl SimConfig {
    /// Load `path`, or the bundled layout when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, SimError> {
        let text = match path {
            Some(p) => {
                info!("Loading simulation config from {}", p.display());
                std::fs::read_to_string(p).map_err(|source| SimError::Read { path: p.to_path_buf(), source })?
            }
            None => BUNDLED_CONFIG.to_string(),
        };
        Ok(toml::from_str(&text)?)
    }
}
