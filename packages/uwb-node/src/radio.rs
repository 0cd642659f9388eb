//! Radio seam: everything the state machine needs from the transceiver.
//!
//! Received frames never go through this trait. The receive interrupt pushes
//! them onto an [`RxQueue`], which the node drains at the top of each step.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use uwb_types::Timestamp;

use crate::error::RadioError;

pub trait Radio {
    /// Current value of the radio's 40-bit system clock
    fn system_time(&self) -> Timestamp;

    /// Transmit `frame`, immediately or at the radio time `at`.
    ///
    /// Returns the transmit timestamp. A delayed transmission goes out exactly
    /// at `at`, so the caller can embed that time in the frame it sends.
    fn send(&mut self, frame: &[u8], at: Option<Timestamp>) -> Result<Timestamp, RadioError>;
}

/// A received frame with its arrival timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxFrame {
    pub bytes: Vec<u8>,
    pub rx_time: Timestamp,
}

/// Hand-off between the receive interrupt and the node loop
#[derive(Debug, Clone, Default)]
pub struct RxQueue {
    inner: Arc<Mutex<VecDeque<RxFrame>>>,
}

impl RxQueue {
    pub fn new() -> Self { Self::default() }

    pub fn push(&self, frame: RxFrame) {
        self.lock().push_back(frame);
    }

    pub fn drain(&self) -> Vec<RxFrame> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize { self.lock().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RxFrame>> {
        // A panic while holding the lock leaves the queue itself intact
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_shared_between_handles() {
        let q = RxQueue::new();
        let isr = q.clone();
        isr.push(RxFrame { bytes: vec![1], rx_time: Timestamp::new(5) });
        isr.push(RxFrame { bytes: vec![2], rx_time: Timestamp::new(6) });
        assert_eq!(q.len(), 2);
        let drained = q.drain();
        assert_eq!(drained[0].bytes, vec![1]);
        assert!(isr.is_empty());
    }
}
