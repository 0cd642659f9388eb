//! # poll_loop
//!
//! One aggregation cycle: trigger scan → wait → read (with busy retries) →
//! keep valid measurements → resolve anchor positions → solve. The read and
//! solve half also runs on its own for a round started elsewhere.
//!
//! `run` repeats cycles forever (or for a fixed count). A failed cycle is
//! reported with a status line and the next one starts after `idle_ms`;
//! nothing inside the loop is fatal.

use serde::Serialize;
use tracing::{debug, info, warn};
use uwb_types::MeasurementSet;

use crate::anchors::AnchorConfig;
use crate::config::CycleConfig;
use crate::controller::{Controller, Transport};
use crate::error::{HostError, TransportError};
use crate::mlat::{self, AnchorRange, PositionEstimate, SolverConfig};

/// Output of a successful cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub measurements: MeasurementSet,
    pub estimate: PositionEstimate,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub cycles: u64,
    pub estimates: u64,
    pub failures: u64,
}

pub struct PollLoop<T: Transport> {
    controller: Controller<T>,
    anchors: AnchorConfig,
    cycle: CycleConfig,
    solver: SolverConfig,
    completed: u64,
}

impl<T: Transport> PollLoop<T> {
    pub fn new(controller: Controller<T>, anchors: AnchorConfig, cycle: CycleConfig, solver: SolverConfig) -> Self {
        Self { controller, anchors, cycle, solver, completed: 0 }
    }

    pub fn controller_mut(&mut self) -> &mut Controller<T> { &mut self.controller }
    pub fn into_controller(self) -> Controller<T> { self.controller }

    /// Poll DATA_READY until the node answers DATARD or the retry budget runs out
    pub fn read_with_retry(&mut self) -> Result<MeasurementSet, TransportError> {
        let mut attempt = 0;
        loop {
            match self.controller.read_measurements() {
                Err(TransportError::Busy) if attempt < self.cycle.busy_retries => {
                    attempt += 1;
                    debug!("Node busy, retry {}/{}", attempt, self.cycle.busy_retries);
                    self.controller.idle(self.cycle.busy_retry());
                }
                other => return other,
            }
        }
    }

    /// Pair valid measurements with configured positions and solve.
    ///
    /// Anchors missing from the deployment file are skipped.
    pub fn locate(&self, set: &MeasurementSet) -> Result<PositionEstimate, HostError> {
        let ranges: Vec<AnchorRange> = set
            .valid()
            .filter_map(|m| match self.anchors.position_of(m.anchor) {
                Some(position) => Some(AnchorRange {
                    anchor: m.anchor,
                    position,
                    distance_m: f64::from(m.distance_m),
                }),
                None => {
                    warn!("No position configured for {}, ignoring its range", m.anchor);
                    None
                }
            })
            .collect();
        Ok(mlat::solve(&ranges, &self.solver)?)
    }

    /// Full cycle: scan, wait, then [`read_and_locate`](Self::read_and_locate)
    pub fn run_cycle(&mut self) -> Result<CycleReport, HostError> {
        self.controller.trigger_scan()?;
        self.controller.idle(self.cycle.scan_wait());
        self.read_and_locate()
    }

    /// Solve from the round the node already holds; no scan is triggered
    pub fn read_and_locate(&mut self) -> Result<CycleReport, HostError> {
        let measurements = self.read_with_retry()?;
        for m in measurements.valid() {
            debug!("range {} = {:.3} m", m.anchor, m.distance_m);
        }
        let estimate = self.locate(&measurements)?;
        self.completed += 1;
        Ok(CycleReport { cycle: self.completed, measurements, estimate })
    }

    /// Run `max_cycles` cycles (unbounded when `None`), handing every estimate to `on_report`
    pub fn run(&mut self, max_cycles: Option<u64>, mut on_report: impl FnMut(&CycleReport)) -> RunStats {
        let mut stats = RunStats::default();
        while max_cycles.map_or(true, |max| stats.cycles < max) {
            stats.cycles += 1;
            match self.run_cycle() {
                Ok(report) => {
                    stats.estimates += 1;
                    let p = report.estimate.position;
                    info!(
                        "cycle {}: ({:.3}, {:.3}, {:.3}) from {} anchors, rms {:.3} m",
                        stats.cycles, p.x, p.y, p.z, report.estimate.n_anchors, report.estimate.rms_residual_m
                    );
                    on_report(&report);
                }
                Err(e) => {
                    stats.failures += 1;
                    warn!("cycle {} skipped: {}", stats.cycles, e);
                }
            }
            self.controller.idle(self.cycle.idle());
        }
        stats
    }
}
