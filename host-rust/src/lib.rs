//! # uwb-host
//!
//! Aggregation host for the UWB ranging node: reads measurement tables over
//! the node command protocol, pairs them with the anchor deployment file and
//! solves for the tag position.

pub mod anchors;
pub mod config;
pub mod controller;
pub mod error;
pub mod mlat;
pub mod poll_loop;

pub use anchors::{AnchorConfig, AnchorEntry};
pub use config::HostConfig;
pub use controller::{Controller, I2cDevice, Transport};
pub use error::{ConfigError, HostError, SolveError, TransportError};
pub use mlat::{solve, AnchorRange, Bounds, PositionEstimate, SolverConfig};
pub use poll_loop::{CycleReport, PollLoop, RunStats};
