use thiserror::Error;
use uwb_types::{FrameError, NodeAddress};

use crate::state::State;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RadioError {
    /// A delayed transmission was requested for a time that has already passed
    #[error("transmit time already passed ({late_by_ticks} ticks late)")]
    TxTooLate { late_by_ticks: u64 },
    #[error("radio is not accepting frames")]
    Offline,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangingError {
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),
    #[error("frame from {got} while talking to {expected}")]
    AddressMismatch { expected: NodeAddress, got: NodeAddress },
    #[error("no reply from {peer} in {state:?}")]
    SessionTimeout { state: State, peer: NodeAddress },
    #[error("{peer} aborted the session")]
    PeerAborted { peer: NodeAddress },
    #[error("radio: {0}")]
    Radio(#[from] RadioError),
}
