//! # uwb-node
//!
//! Two-way ranging between one mobile tag and fixed anchors.
//!
//! - [`node`]: the per-node ranging state machine (tag and anchor roles)
//! - [`beacon`]: anchor beacon cadence
//! - [`twr`]: time-of-flight arithmetic
//! - [`bridge`]: the tag's side of the host command protocol
//! - [`sim`]: a simulated radio network for running the whole system on one machine

pub mod beacon;
pub mod bridge;
pub mod error;
pub mod node;
pub mod radio;
pub mod sim;
pub mod state;
pub mod timing;
pub mod twr;

pub use beacon::BeaconScheduler;
pub use bridge::HostBridge;
pub use error::{RadioError, RangingError};
pub use node::Node;
pub use radio::{Radio, RxFrame, RxQueue};
pub use state::{NodeEvent, State};
pub use timing::{NodeConfig, Timing};
pub use twr::{TwrMode, TwrTimestamps};
