//! # error
//!
//! Error taxonomy of the aggregation host.
//!
//! Transport and solve errors are per-cycle: the loop reports them and keeps
//! running. Only [`ConfigError`] is fatal, and only at startup.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Ranging still in progress. Not a failure: retry after a short delay.
    #[error("no data yet (ranging in progress)")]
    Busy,
    #[error("unexpected status byte 0b{received:08b} (expected 0b{expected:08b})")]
    Protocol { received: u8, expected: u8 },
    #[error("short read for {command}: got {got} of {expected} bytes")]
    ShortRead { command: &'static str, expected: usize, got: usize },
    #[error("transport I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{source_name}:{line}: {reason}")]
    Row { source_name: String, line: usize, reason: String },
    #[error("{source_name}:{line}: duplicate anchor id {id}")]
    DuplicateAnchor { source_name: String, line: usize, id: u16 },
    #[error("could not read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("invalid host config: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("need at least 3 valid anchors, got {valid}")]
    InsufficientAnchors { valid: usize },
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Solve(#[from] SolveError),
}

impl HostError {
    /// Process exit status for the CLI
    pub fn exit_code(&self) -> u8 {
        match self {
            HostError::Transport(TransportError::Busy) => 16,
            HostError::Transport(TransportError::Protocol { .. }) => 71,
            HostError::Transport(TransportError::ShortRead { .. }) => 71,
            HostError::Transport(TransportError::Io(_)) => 5,
            HostError::Solve(SolveError::InsufficientAnchors { .. }) => 61,
            HostError::Config(_) => 78,
        }
    }

    /// Whether the periodic loop should simply try again next cycle
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, HostError::Config(_))
    }
}
