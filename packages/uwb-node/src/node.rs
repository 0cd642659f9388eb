//! # node
//!
//! The ranging state machine of one radio node, tag or anchor.
//!
//! Sans-IO: the owner pushes received frames onto the node's [`RxQueue`] and
//! calls [`Node::step`] with the current time. Each step drains the queue,
//! then checks the session deadline, then runs the role's periodic work
//! (tag: scan-cycle bookkeeping, anchor: beacons and the waiting queue).
//! Outgoing frames go straight to the [`Radio`].
//!
//! One session at a time. Peers that show up while a session is running are
//! queued in arrival order and served afterwards.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};
use uwb_types::frame::{matches_destination, matches_source, peek_type};
use uwb_types::{Frame, Measurement, MeasurementSet, MessageType, NodeAddress, Timestamp};

use crate::beacon::BeaconScheduler;
use crate::error::{RadioError, RangingError};
use crate::radio::{Radio, RxFrame, RxQueue};
use crate::state::{NodeEvent, State};
use crate::timing::{NodeConfig, Timing};
use crate::twr::{TwrMode, TwrTimestamps};

#[derive(Debug, Clone, Copy)]
struct ScanCycle {
    opened_ms: u64,
}

pub struct Node<R: Radio> {
    address: NodeAddress,
    radio: R,
    timing: Timing,
    twr_mode: TwrMode,
    rx: RxQueue,

    state: State,
    deadline_ms: Option<u64>,
    peer: NodeAddress,
    ts: TwrTimestamps,
    /// Tag: anchors heard but not yet ranged. Anchor: tags waiting for a turn.
    waiting: VecDeque<NodeAddress>,

    // Tag only
    measurements: MeasurementSet,
    cycle: Option<ScanCycle>,

    // Anchor only
    beacon: Option<BeaconScheduler>,
    rng: StdRng,

    now_ms: u64,
    events: Vec<NodeEvent>,
}

impl<R: Radio> Node<R> {
    pub fn new(config: NodeConfig, radio: R, now_ms: u64) -> Self {
        let beacon = config.address.is_anchor().then(|| {
            BeaconScheduler::new(
                config.timing.beacon_period_ms,
                config.timing.beacon_jitter_ms,
                config.seed,
                now_ms,
            )
        });
        Self {
            address: config.address,
            radio,
            twr_mode: config.twr_mode,
            rx: RxQueue::new(),
            state: State::Idle,
            deadline_ms: None,
            peer: NodeAddress::NONE,
            ts: TwrTimestamps::default(),
            waiting: VecDeque::new(),
            measurements: MeasurementSet::with_capacity(config.anchor_count),
            cycle: None,
            beacon,
            rng: StdRng::seed_from_u64(config.seed.rotate_left(17) ^ u64::from(config.address.raw())),
            now_ms,
            events: Vec::new(),
            timing: config.timing,
        }
    }

    pub fn address(&self) -> NodeAddress { self.address }
    pub fn is_tag(&self) -> bool { self.address.is_tag() }
    pub fn state(&self) -> State { self.state }
    pub fn peer(&self) -> NodeAddress { self.peer }
    pub fn deadline_ms(&self) -> Option<u64> { self.deadline_ms }
    pub fn waiting(&self) -> impl Iterator<Item = &NodeAddress> { self.waiting.iter() }
    pub fn measurements(&self) -> &MeasurementSet { &self.measurements }
    pub fn cycle_open(&self) -> bool { self.cycle.is_some() }
    pub fn radio(&self) -> &R { &self.radio }
    pub fn radio_mut(&mut self) -> &mut R { &mut self.radio }

    /// Handle for the receive interrupt
    pub fn rx_queue(&self) -> RxQueue { self.rx.clone() }

    /// Advance the node to `now_ms` and collect what happened
    pub fn step(&mut self, now_ms: u64) -> Vec<NodeEvent> {
        self.now_ms = now_ms;
        for rx in self.rx.drain() {
            self.on_receive(rx);
        }
        if let Some(deadline) = self.deadline_ms {
            if now_ms >= deadline {
                self.deadline_ms = None;
                self.on_deadline();
            }
        }
        if self.is_tag() {
            self.tag_tick();
        } else {
            self.anchor_tick();
        }
        std::mem::take(&mut self.events)
    }

    // ── Shared plumbing ───────────────────────────────────────────────────────

    fn enter(&mut self, to: State, timeout_ms: Option<u64>) {
        if to != self.state {
            debug!("{}: {:?} → {:?}", self.address, self.state, to);
            self.events.push(NodeEvent::StateChanged { from: self.state, to });
            self.state = to;
        }
        self.deadline_ms = timeout_ms.map(|t| self.now_ms + t);
    }

    fn transmit(&mut self, frame: Frame, at: Option<Timestamp>) -> Result<Timestamp, RadioError> {
        trace!("{}: tx {:?} → {}", self.address, frame.kind, frame.destination);
        self.radio.send(&frame.encode(), at)
    }

    fn check_peer(&self, rx: &RxFrame, source: NodeAddress) -> Result<(), RangingError> {
        if matches_source(&rx.bytes, self.peer) {
            Ok(())
        } else {
            Err(RangingError::AddressMismatch { expected: self.peer, got: source })
        }
    }

    /// Only BEACONs may be broadcast; every other type must name this node
    fn addressed_to_self(&self, rx: &RxFrame, kind: MessageType) -> bool {
        matches_destination(&rx.bytes, self.address)
            || (kind == MessageType::Beacon && matches_destination(&rx.bytes, NodeAddress::BROADCAST))
    }

    fn on_receive(&mut self, rx: RxFrame) {
        match peek_type(&rx.bytes) {
            Ok(kind) if self.addressed_to_self(&rx, kind) => {}
            Ok(kind) => {
                trace!("{}: {:?} not addressed to us", self.address, kind);
                return;
            }
            Err(e) => {
                trace!("{}: dropping frame: {}", self.address, RangingError::from(e));
                return;
            }
        }
        let frame = match Frame::decode(&rx.bytes) {
            Ok(f) => f,
            Err(e) => {
                trace!("{}: dropping frame: {}", self.address, RangingError::from(e));
                return;
            }
        };
        // Tags only talk to anchors and vice versa
        if frame.source.is_none() || frame.source.is_tag() == self.is_tag() {
            trace!("{}: ignoring {:?} from {}", self.address, frame.kind, frame.source);
            return;
        }
        if self.is_tag() {
            self.tag_on_frame(frame, &rx);
        } else {
            self.anchor_on_frame(frame, &rx);
        }
    }

    fn on_deadline(&mut self) {
        match self.state {
            State::Scan => self.close_cycle("no anchors heard"),
            State::PendingPong => self.send_pong(),
            state if state.awaits_peer() => {
                let peer = self.peer;
                if let Err(e) = self.transmit(Frame::range_failed(self.address, peer), None) {
                    warn!("{}: could not send RANGE_FAILED to {}: {}", self.address, peer, e);
                }
                self.fail_session(RangingError::SessionTimeout { state, peer });
            }
            _ => {}
        }
    }

    fn fail_session(&mut self, error: RangingError) {
        let peer = self.peer;
        debug!("{}: session with {} failed: {}", self.address, peer, error);
        self.events.push(NodeEvent::SessionFailed { peer, error });
        self.peer = NodeAddress::NONE;
        self.enter(State::Idle, None);
    }

    fn in_session_with(&self, source: NodeAddress) -> bool {
        source == self.peer && self.state != State::Idle && self.state != State::Scan
    }

    // ── Tag ───────────────────────────────────────────────────────────────────

    /// Open a scan cycle: clear the table and announce the tag.
    ///
    /// Ignored while a cycle is already running.
    pub fn trigger_scan(&mut self, now_ms: u64) {
        self.now_ms = now_ms;
        if !self.is_tag() {
            warn!("{}: scan requested on an anchor", self.address);
            return;
        }
        if self.cycle.is_some() {
            debug!("{}: scan already running", self.address);
            return;
        }
        self.measurements.clear();
        self.waiting.clear();
        self.cycle = Some(ScanCycle { opened_ms: now_ms });
        info!("{}: scan cycle opened", self.address);
        if let Err(e) = self.transmit(Frame::beacon(self.address, NodeAddress::BROADCAST), None) {
            warn!("{}: discovery beacon failed: {}", self.address, e);
        }
        self.enter(State::Scan, Some(self.timing.pong_timeout_ms));
    }

    fn tag_on_frame(&mut self, frame: Frame, rx: &RxFrame) {
        let rx_time = rx.rx_time;
        match frame.kind {
            MessageType::Beacon => {
                if self.cycle.is_none() {
                    return;
                }
                self.note_anchor(frame.source);
                if self.state == State::Scan {
                    self.enter(State::Scan, Some(self.timing.pong_timeout_ms));
                }
            }
            MessageType::PollAck if self.state == State::Poll => {
                if let Err(e) = self.check_peer(rx, frame.source) {
                    trace!("{}: {}", self.address, e);
                    return;
                }
                self.ts.ack_rx = rx_time;
                self.ts.poll_rx = frame.timestamps[0];
                self.ts.ack_tx = frame.timestamps[1];
                let range_at = rx_time.wrapping_add(self.timing.reply_delay_ticks());
                let range = Frame::range(self.address, self.peer, self.ts.poll_tx, rx_time, range_at);
                match self.transmit(range, Some(range_at)) {
                    Ok(tx) => {
                        self.ts.range_tx = tx;
                        self.enter(State::Range, Some(self.timing.rangereport_timeout_ms));
                    }
                    Err(e) => self.fail_session(e.into()),
                }
            }
            MessageType::RangeReport if self.state == State::Range => {
                if let Err(e) = self.check_peer(rx, frame.source) {
                    trace!("{}: {}", self.address, e);
                    return;
                }
                self.enter(State::RangeReport, None);
                let distance_m = frame.reported_distance().unwrap_or(0.0);
                let m = Measurement::new(self.peer, distance_m);
                if !self.measurements.record(m) {
                    warn!("{}: measurement table full, dropping {}", self.address, self.peer);
                }
                info!("{}: {} at {:.3} m", self.address, self.peer, distance_m);
                self.events.push(NodeEvent::Measurement(m));
                self.peer = NodeAddress::NONE;
                self.enter(State::Idle, None);
            }
            MessageType::RangeFailed if self.in_session_with(frame.source) => {
                self.fail_session(RangingError::PeerAborted { peer: frame.source });
            }
            _ => trace!("{}: unexpected {:?} from {} in {:?}", self.address, frame.kind, frame.source, self.state),
        }
    }

    fn note_anchor(&mut self, anchor: NodeAddress) {
        if anchor == self.peer || self.measurements.contains(anchor) || self.waiting.contains(&anchor) {
            return;
        }
        debug!("{}: heard {}", self.address, anchor);
        self.waiting.push_back(anchor);
    }

    fn tag_tick(&mut self) {
        let Some(cycle) = self.cycle else { return };
        if !matches!(self.state, State::Idle | State::Scan) {
            return;
        }
        if self.measurements.is_full() {
            self.close_cycle("table full");
        } else if self.now_ms.saturating_sub(cycle.opened_ms) >= self.timing.reset_timeout_ms {
            self.close_cycle("reset timeout");
        } else if let Some(anchor) = self.waiting.pop_front() {
            self.enter(State::Scan, None);
            self.start_session(anchor);
        } else if self.state == State::Idle {
            self.enter(State::Scan, Some(self.timing.pong_timeout_ms));
        }
    }

    fn start_session(&mut self, anchor: NodeAddress) {
        self.peer = anchor;
        self.ts = TwrTimestamps::default();
        let poll = Frame::poll(self.address, anchor, self.radio.system_time());
        match self.transmit(poll, None) {
            Ok(tx) => {
                self.ts.poll_tx = tx;
                self.enter(State::Poll, Some(self.timing.pollack_timeout_ms));
            }
            Err(e) => self.fail_session(e.into()),
        }
    }

    fn close_cycle(&mut self, reason: &str) {
        self.cycle = None;
        self.waiting.clear();
        self.peer = NodeAddress::NONE;
        self.enter(State::Idle, None);
        let valid = self.measurements.valid_count();
        info!("{}: scan cycle closed ({}), {} ranges", self.address, reason, valid);
        self.events.push(NodeEvent::CycleComplete { valid });
    }

    // ── Anchor ────────────────────────────────────────────────────────────────

    fn anchor_on_frame(&mut self, frame: Frame, rx: &RxFrame) {
        let rx_time = rx.rx_time;
        let tag = frame.source;
        match frame.kind {
            MessageType::Beacon => {
                if self.state == State::Idle {
                    self.peer = tag;
                    let slot = self.rng.gen_range(1..=self.timing.pending_pong_timeout_ms.max(1));
                    self.enter(State::PendingPong, Some(slot));
                } else if tag != self.peer {
                    self.enqueue(tag);
                }
            }
            MessageType::Poll => match self.state {
                State::Idle => self.begin_ranging(tag, rx_time),
                _ if tag == self.peer => {
                    if self.state == State::Range {
                        debug!("{}: repeated POLL from {}, restarting", self.address, tag);
                    }
                    self.begin_ranging(tag, rx_time);
                }
                _ => self.enqueue(tag),
            },
            MessageType::Range if self.state == State::Range => {
                if let Err(e) = self.check_peer(rx, tag) {
                    trace!("{}: {}", self.address, e);
                    return;
                }
                self.ts.poll_tx = frame.timestamps[0];
                self.ts.ack_rx = frame.timestamps[1];
                self.ts.range_tx = frame.timestamps[2];
                self.ts.range_rx = rx_time;
                self.finish_ranging();
            }
            MessageType::RangeFailed if self.in_session_with(tag) => {
                self.fail_session(RangingError::PeerAborted { peer: tag });
            }
            _ => trace!("{}: unexpected {:?} from {} in {:?}", self.address, frame.kind, tag, self.state),
        }
    }

    fn enqueue(&mut self, tag: NodeAddress) {
        if !self.waiting.contains(&tag) {
            debug!("{}: busy, queueing {}", self.address, tag);
            self.waiting.push_back(tag);
        }
    }

    fn begin_ranging(&mut self, tag: NodeAddress, poll_rx: Timestamp) {
        self.waiting.retain(|t| *t != tag);
        self.peer = tag;
        self.ts = TwrTimestamps { poll_rx, ..TwrTimestamps::default() };
        self.enter(State::PollAck, None);
        let ack_at = poll_rx.wrapping_add(self.timing.reply_delay_ticks());
        match self.transmit(Frame::poll_ack(self.address, tag, poll_rx, ack_at), Some(ack_at)) {
            Ok(tx) => {
                self.ts.ack_tx = tx;
                self.enter(State::Range, Some(self.timing.range_timeout_ms));
            }
            Err(e) => self.fail_session(e.into()),
        }
    }

    fn finish_ranging(&mut self) {
        let tag = self.peer;
        match self.ts.distance_m(self.twr_mode) {
            Some(d) => {
                let distance_m = d as f32;
                if let Err(e) = self.transmit(Frame::range_report(self.address, tag, distance_m), None) {
                    warn!("{}: RANGE_REPORT to {} failed: {}", self.address, tag, e);
                }
                info!("{}: {} at {:.3} m", self.address, tag, distance_m);
                self.events.push(NodeEvent::Measurement(Measurement::new(tag, distance_m)));
            }
            None => warn!("{}: degenerate timestamps from {}, no range", self.address, tag),
        }
        self.peer = NodeAddress::NONE;
        self.enter(State::RoundRobin, None);
        self.serve_next();
    }

    /// Hand the channel to the next queued tag, or go idle
    fn serve_next(&mut self) {
        match self.waiting.pop_front() {
            Some(tag) => {
                self.peer = tag;
                self.send_pong();
            }
            None => self.enter(State::Idle, None),
        }
    }

    fn send_pong(&mut self) {
        match self.transmit(Frame::beacon(self.address, self.peer), None) {
            Ok(_) => self.enter(State::Pong, Some(self.timing.pong_timeout_ms)),
            Err(e) => self.fail_session(e.into()),
        }
    }

    fn anchor_tick(&mut self) {
        if self.state != State::Idle {
            return;
        }
        if !self.waiting.is_empty() {
            self.enter(State::RoundRobin, None);
            self.serve_next();
            return;
        }
        let due = self.beacon.as_mut().is_some_and(|b| b.poll(self.now_ms));
        if due {
            if let Err(e) = self.transmit(Frame::beacon(self.address, NodeAddress::BROADCAST), None) {
                debug!("{}: beacon failed: {}", self.address, e);
            }
        }
    }
}
