//! Node side of the host command protocol.
//!
//! The host writes one command byte; the bridge acts on the tag node and
//! returns the reply bytes the host will read back.

use tracing::{debug, warn};
use uwb_types::wire::{self, Command, STATUS_DATARD, STATUS_NODATA};

use crate::node::Node;
use crate::radio::Radio;

#[derive(Debug, Clone)]
pub struct HostBridge {
    anchor_count: usize,
}

impl HostBridge {
    pub fn new(anchor_count: usize) -> Self {
        Self { anchor_count }
    }

    pub fn anchor_count(&self) -> usize { self.anchor_count }

    /// Execute `command` against `tag` and produce the reply
    pub fn handle<R: Radio>(&self, tag: &mut Node<R>, now_ms: u64, command: u8) -> Vec<u8> {
        let Some(cmd) = Command::from_u8(command) else {
            warn!("Unknown host command 0x{:02X}", command);
            return Vec::new();
        };
        debug!("Host command {:?}", cmd);
        match cmd {
            Command::None => Vec::new(),
            Command::Scan => {
                tag.trigger_scan(now_ms);
                Vec::new()
            }
            Command::DataReady => {
                vec![if tag.cycle_open() { STATUS_NODATA } else { STATUS_DATARD }]
            }
            Command::TypeId => wire::encode_ids(&tag.measurements().to_slots(self.anchor_count)),
            Command::TypeDist => wire::encode_distances(&tag.measurements().to_slots(self.anchor_count)),
        }
    }
}
