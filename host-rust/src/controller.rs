//! # controller
//!
//! Host side of the node command protocol.
//!
//! A [`Transport`] moves raw bytes (the Linux I2C character device in the
//! field, an in-process bridge under simulation). [`Controller`] speaks the
//! command protocol on top of it and turns the two reply tables into a
//! [`MeasurementSet`].
//!
//! The device handle is owned by the transport and closed when it is dropped,
//! whichever way a cycle ends.

use std::io;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, trace};
use uwb_types::wire::{self, Command, STATUS_DATARD, STATUS_NODATA};
use uwb_types::{Measurement, MeasurementSet, NodeAddress};

use crate::error::TransportError;

// ── Transport ─────────────────────────────────────────────────────────────────

pub trait Transport {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to `buf.len()` bytes, returning how many arrived
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Let `duration` pass on the other side of the link
    fn idle(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> { (**self).write(bytes) }
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> { (**self).read(buf) }
    fn idle(&mut self, duration: Duration) { (**self).idle(duration) }
}

/// Linux `/dev/i2c-N` device bound to one slave address
pub struct I2cDevice {
    file: std::fs::File,
}

#[cfg(target_os = "linux")]
const I2C_SLAVE: libc::c_ulong = 0x0703;

impl I2cDevice {
    #[cfg(target_os = "linux")]
    pub fn open(path: &Path, slave_addr: u16) -> io::Result<Self> {
        use std::os::fd::AsRawFd;

        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        // SAFETY: the descriptor is open for the duration of the call and
        // I2C_SLAVE takes the address by value.
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), I2C_SLAVE as _, libc::c_ulong::from(slave_addr)) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("Opened {} (slave 0x{:02X})", path.display(), slave_addr);
        Ok(Self { file })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(path: &Path, _slave_addr: u16) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("I2C device {} requires Linux", path.display()),
        ))
    }
}

impl Transport for I2cDevice {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.file, bytes)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.file, buf)
    }
}

// ── Controller ────────────────────────────────────────────────────────────────

pub struct Controller<T: Transport> {
    transport: T,
    anchor_count: usize,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T, anchor_count: usize) -> Self {
        Self { transport, anchor_count }
    }

    pub fn anchor_count(&self) -> usize { self.anchor_count }
    pub fn transport_mut(&mut self) -> &mut T { &mut self.transport }
    pub fn into_inner(self) -> T { self.transport }

    pub fn idle(&mut self, duration: Duration) {
        self.transport.idle(duration);
    }

    /// Ask the node to start a ranging round
    pub fn trigger_scan(&mut self) -> Result<(), TransportError> {
        debug!("Triggering scan");
        self.transport.write(&[Command::Scan as u8])?;
        Ok(())
    }

    /// `Ok` once results are ready, `Busy` while the round is still running
    pub fn check_ready(&mut self) -> Result<(), TransportError> {
        let reply = self.request(Command::DataReady, "DATA_READY")?;
        match reply[0] {
            STATUS_DATARD => Ok(()),
            STATUS_NODATA => Err(TransportError::Busy),
            received => Err(TransportError::Protocol { received, expected: STATUS_DATARD }),
        }
    }

    pub fn anchor_ids(&mut self) -> Result<Vec<NodeAddress>, TransportError> {
        let reply = self.request(Command::TypeId, "TYPE_ID")?;
        Ok(wire::decode_ids(&reply))
    }

    pub fn distances(&mut self) -> Result<Vec<f32>, TransportError> {
        let reply = self.request(Command::TypeDist, "TYPE_DIST")?;
        Ok(wire::decode_distances(&reply))
    }

    /// DATA_READY, then both tables, one entry per node slot (empty slots included)
    pub fn read_slots(&mut self) -> Result<Vec<Measurement>, TransportError> {
        self.check_ready()?;
        let ids = self.anchor_ids()?;
        let dists = self.distances()?;
        let slots: Vec<Measurement> = ids
            .into_iter()
            .zip(dists)
            .map(|(anchor, distance_m)| Measurement::new(anchor, distance_m))
            .collect();
        for m in &slots {
            trace!("slot: {} → {:.3} m", m.anchor, m.distance_m);
        }
        Ok(slots)
    }

    /// Same as [`read_slots`](Self::read_slots), merged by anchor in slot order
    pub fn read_measurements(&mut self) -> Result<MeasurementSet, TransportError> {
        Ok(self.read_slots()?.into_iter().collect())
    }

    fn request(&mut self, cmd: Command, name: &'static str) -> Result<Vec<u8>, TransportError> {
        let expected = cmd.reply_len(self.anchor_count);
        self.transport.write(&[cmd as u8])?;
        let mut buf = vec![0u8; expected];
        let mut got = 0;
        while got < expected {
            let n = self.transport.read(&mut buf[got..])?;
            if n == 0 {
                break;
            }
            got += n;
        }
        if got != expected {
            return Err(TransportError::ShortRead { command: name, expected, got });
        }
        Ok(buf)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays scripted replies, one per command written
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        pub written: Vec<u8>,
        pub replies: VecDeque<Vec<u8>>,
        pending: Vec<u8>,
        pub idled: Duration,
    }

    impl ScriptedTransport {
        pub fn with_replies(replies: impl IntoIterator<Item = Vec<u8>>) -> Self {
            Self { replies: replies.into_iter().collect(), ..Self::default() }
        }
    }

    impl Transport for ScriptedTransport {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.written.extend_from_slice(bytes);
            if bytes.first() != Some(&(Command::Scan as u8)) {
                self.pending = self.replies.pop_front().unwrap_or_default();
            }
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.drain(..n);
            Ok(n)
        }

        fn idle(&mut self, duration: Duration) {
            self.idled += duration;
        }
    }

    pub(crate) fn table(entries: &[(u16, f32)], width: usize) -> (Vec<u8>, Vec<u8>) {
        let set: MeasurementSet = entries
            .iter()
            .map(|&(id, d)| Measurement::new(NodeAddress::from_raw(id), d))
            .collect();
        let slots = set.to_slots(width);
        (wire::encode_ids(&slots), wire::encode_distances(&slots))
    }

    #[test]
    fn test_status_byte_mapping() {
        let mut ctl = Controller::new(ScriptedTransport::with_replies([vec![STATUS_NODATA]]), 5);
        assert!(matches!(ctl.check_ready(), Err(TransportError::Busy)));

        let mut ctl = Controller::new(ScriptedTransport::with_replies([vec![0x55]]), 5);
        assert!(matches!(
            ctl.check_ready(),
            Err(TransportError::Protocol { received: 0x55, expected: STATUS_DATARD })
        ));

        let mut ctl = Controller::new(ScriptedTransport::with_replies([vec![STATUS_DATARD]]), 5);
        assert!(ctl.check_ready().is_ok());
        assert_eq!(ctl.into_inner().written, vec![Command::DataReady as u8]);
    }

    #[test]
    fn test_read_measurements_decodes_tables() {
        let (ids, dists) = table(&[(1, 2.5), (0x4002, 3.0), (3, 0.0)], 5);
        let t = ScriptedTransport::with_replies([vec![STATUS_DATARD], ids, dists]);
        let mut ctl = Controller::new(t, 5);
        let set = ctl.read_measurements().unwrap();

        let valid: Vec<(u16, f32)> = set.valid().map(|m| (m.anchor.raw(), m.distance_m)).collect();
        assert_eq!(valid, vec![(1, 2.5), (0x4002, 3.0)]);
        assert_eq!(ctl.into_inner().written, vec![2, 3, 4]);
    }

    #[test]
    fn test_read_slots_keeps_empty_slots() {
        let (ids, dists) = table(&[(1, 2.5), (2, 4.0)], 5);
        let t = ScriptedTransport::with_replies([vec![STATUS_DATARD], ids, dists]);
        let mut ctl = Controller::new(t, 5);
        let slots = ctl.read_slots().unwrap();

        assert_eq!(slots.len(), 5);
        assert_eq!(slots[0], Measurement::new(NodeAddress::anchor(1), 2.5));
        assert!(slots[2..].iter().all(|m| m.anchor == NodeAddress::NONE && !m.is_valid()));
    }

    #[test]
    fn test_short_reply_is_an_error() {
        let t = ScriptedTransport::with_replies([vec![STATUS_DATARD], vec![1, 0, 2]]);
        let mut ctl = Controller::new(t, 5);
        assert!(matches!(
            ctl.read_measurements(),
            Err(TransportError::ShortRead { command: "TYPE_ID", expected: 10, got: 3 })
        ));
    }

    #[test]
    fn test_scan_sends_single_byte() {
        let mut ctl = Controller::new(ScriptedTransport::default(), 5);
        ctl.trigger_scan().unwrap();
        assert_eq!(ctl.into_inner().written, vec![Command::Scan as u8]);
    }
}
