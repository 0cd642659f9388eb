//! Anchor deployment file: one `anchorId,x,y,z` row per anchor.
//!
//! No header row. Blank lines are skipped. Loaded once at startup and
//! read-only afterwards; any malformed row is fatal.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;
use uwb_types::{NodeAddress, Vec3};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorEntry {
    pub id: u16,
    pub position: Vec3,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorConfig {
    entries: Vec<AnchorEntry>,
}

impl AnchorConfig {
    /// Build from already-parsed entries; ids must be unique
    pub fn new(entries: Vec<AnchorEntry>) -> Result<Self, ConfigError> {
        for (i, e) in entries.iter().enumerate() {
            if entries[..i].iter().any(|prev| prev.id == e.id) {
                return Err(ConfigError::DuplicateAnchor { source_name: "anchors".into(), line: i + 1, id: e.id });
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let cfg = Self::parse(&text, &path.display().to_string())?;
        info!("Loaded {} anchors from {}", cfg.len(), path.display());
        Ok(cfg)
    }

    pub fn parse(text: &str, source_name: &str) -> Result<Self, ConfigError> {
        let mut entries: Vec<AnchorEntry> = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let row = raw.trim();
            if row.is_empty() {
                continue;
            }
            let err = |reason: String| ConfigError::Row { source_name: source_name.to_string(), line, reason };

            let fields: Vec<&str> = row.split(',').map(str::trim).collect();
            if fields.len() != 4 {
                return Err(err(format!("expected 4 fields (id,x,y,z), found {}", fields.len())));
            }
            let id: u16 = fields[0]
                .parse()
                .map_err(|e| err(format!("bad anchor id {:?}: {e}", fields[0])))?;
            let mut coords = [0.0f64; 3];
            for (axis, (slot, field)) in coords.iter_mut().zip(&fields[1..]).enumerate() {
                *slot = field
                    .parse()
                    .map_err(|e| err(format!("bad coordinate {} {:?}: {e}", ["x", "y", "z"][axis], field)))?;
                if !slot.is_finite() {
                    return Err(err(format!("non-finite coordinate {field:?}")));
                }
            }
            if entries.iter().any(|e| e.id == id) {
                return Err(ConfigError::DuplicateAnchor { source_name: source_name.to_string(), line, id });
            }
            entries.push(AnchorEntry { id, position: Vec3::from(coords) });
        }
        Ok(Self { entries })
    }

    /// Position of the anchor reporting as `addr`.
    ///
    /// The full address is tried first, then the base id so that files may
    /// list anchors without their group bits.
    pub fn position_of(&self, addr: NodeAddress) -> Option<Vec3> {
        self.entries
            .iter()
            .find(|e| e.id == addr.raw())
            .or_else(|| self.entries.iter().find(|e| e.id == addr.base_id()))
            .map(|e| e.position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AnchorEntry> { self.entries.iter() }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
