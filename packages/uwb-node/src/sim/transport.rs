//! Host transports backed by the simulated network.
//!
//! [`SimTransport`] owns the network and runs it in lockstep with the host:
//! idling advances virtual time. [`ChannelTransport`] talks to a network
//! running on its own Tokio task, for real-time runs.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use uwb_host::Transport;

use super::network::SimNetwork;

pub struct SimTransport {
    network: SimNetwork,
    reply: VecDeque<u8>,
}

impl SimTransport {
    pub fn new(network: SimNetwork) -> Self {
        Self { network, reply: VecDeque::new() }
    }

    pub fn network(&self) -> &SimNetwork { &self.network }
    pub fn network_mut(&mut self) -> &mut SimNetwork { &mut self.network }
}

impl Transport for SimTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        for &command in bytes {
            self.reply = self.network.host_request(command).into();
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.reply.len());
        for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn idle(&mut self, duration: Duration) {
        self.network.run_for(duration.as_millis() as u64);
    }
}

// ── Real-time bridge ──────────────────────────────────────────────────────────

/// One host command for the network task; the reply comes back on `reply`
#[derive(Debug)]
pub struct BridgeRequest {
    pub command: u8,
    pub reply: oneshot::Sender<Vec<u8>>,
}

/// Blocking side of the bridge. Must not be used from inside the runtime.
pub struct ChannelTransport {
    requests: mpsc::Sender<BridgeRequest>,
    reply: VecDeque<u8>,
    speed: f64,
}

impl ChannelTransport {
    /// `speed` scales host waits to match the network's pacing
    pub fn new(requests: mpsc::Sender<BridgeRequest>, speed: f64) -> Self {
        Self { requests, reply: VecDeque::new(), speed: speed.max(1e-3) }
    }
}

impl Transport for ChannelTransport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let closed = || io::Error::new(io::ErrorKind::BrokenPipe, "simulated network stopped");
        for &command in bytes {
            let (tx, rx) = oneshot::channel();
            self.requests
                .blocking_send(BridgeRequest { command, reply: tx })
                .map_err(|_| closed())?;
            self.reply = rx.blocking_recv().map_err(|_| closed())?.into();
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.reply.len());
        for (slot, byte) in buf.iter_mut().zip(self.reply.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn idle(&mut self, duration: Duration) {
        std::thread::sleep(duration.div_f64(self.speed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimConfig;
    use uwb_types::wire::{Command, STATUS_DATARD, STATUS_NODATA};

    #[test]
    fn test_idle_advances_virtual_time() {
        let net = SimNetwork::new(&SimConfig::default()).unwrap();
        let mut t = SimTransport::new(net);
        t.idle(Duration::from_millis(250));
        assert_eq!(t.network().now_ms(), 250);
    }

    #[test]
    fn test_status_follows_scan_cycle() {
        let net = SimNetwork::new(&SimConfig::default()).unwrap();
        let mut t = SimTransport::new(net);
        let mut status = [0u8; 1];

        t.write(&[Command::Scan as u8]).unwrap();
        t.write(&[Command::DataReady as u8]).unwrap();
        assert_eq!(t.read(&mut status).unwrap(), 1);
        assert_eq!(status[0], STATUS_NODATA);

        t.idle(Duration::from_millis(300));
        t.write(&[Command::DataReady as u8]).unwrap();
        t.read(&mut status).unwrap();
        assert_eq!(status[0], STATUS_DATARD);
    }

    #[test]
    fn test_channel_transport_round_trip() {
        let (tx, mut rx) = mpsc::channel::<BridgeRequest>(1);
        let server = std::thread::spawn(move || {
            while let Some(req) = rx.blocking_recv() {
                let _ = req.reply.send(vec![req.command, 0xAA]);
            }
        });
        let mut t = ChannelTransport::new(tx, 1.0);
        t.write(&[3]).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 0xAA]);
        drop(t);
        server.join().unwrap();
    }
}
