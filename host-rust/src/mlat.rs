//! mlat.rs — bounded Levenberg–Marquardt multilateration
//!
//! Minimises
//!   J(p) = Σ_i (‖p − a_i‖ − d_i)²
//! over a box of admissible positions. The search is seeded at the box
//! centroid and every iterate is clamped back into the box, so coplanar
//! anchor layouts cannot push the estimate off to infinity along the normal.

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uwb_types::{NodeAddress, Vec3};

use crate::error::SolveError;

/// Fewer pairs than this leave the position undetermined
pub const MIN_ANCHORS: usize = 3;

const LAMBDA_INITIAL: f64 = 1e-3;
const LAMBDA_MIN: f64 = 1e-12;
const LAMBDA_MAX: f64 = 1e10;
// Keeps the damped normal matrix positive definite when an axis has no gradient
const DIAG_FLOOR: f64 = 1e-9;

// ── Types ─────────────────────────────────────────────────────────────────────

/// One anchor with the distance measured to it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnchorRange {
    pub anchor: NodeAddress,
    pub position: Vec3,
    pub distance_m: f64,
}

/// Axis-aligned search box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Bounding box of the anchors with the vertical upper bound replaced by `ceiling_m`
    pub fn around<'a>(positions: impl IntoIterator<Item = &'a Vec3>, ceiling_m: f64) -> Self {
        let mut it = positions.into_iter();
        let first = it.next().copied().unwrap_or_default();
        let (mut min, mut max) = (first, first);
        for p in it {
            min = min.min(p);
            max = max.max(p);
        }
        max.z = ceiling_m;
        min.z = min.z.min(ceiling_m);
        Self { min, max }
    }

    pub fn centroid(&self) -> Vec3 {
        self.min.add(&self.max).scale(0.5)
    }

    pub fn clamp(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            p.x.max(self.min.x).min(self.max.x),
            p.y.max(self.min.y).min(self.max.y),
            p.z.max(self.min.z).min(self.max.z),
        )
    }

    pub fn contains(&self, p: &Vec3) -> bool {
        self.clamp(*p) == *p
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: u32,
    /// Stop once an accepted step lowers the cost by less than this (m²)
    pub tolerance: f64,
    /// Vertical upper bound used when no explicit bounds are given (m)
    pub ceiling_m: f64,
    pub bounds: Option<Bounds>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-12,
            ceiling_m: 3.0,
            bounds: None,
        }
    }
}

/// Result of one solve
#[derive(Debug, Clone, Serialize)]
pub struct PositionEstimate {
    pub position: Vec3,
    pub bounds: Bounds,
    /// RMS of range residuals at `position` (m)
    pub rms_residual_m: f64,
    pub iterations: u32,
    pub converged: bool,
    pub n_anchors: usize,
}

// ── Solver ────────────────────────────────────────────────────────────────────

fn to_na(v: Vec3) -> Vector3<f64> { Vector3::new(v.x, v.y, v.z) }
fn from_na(v: Vector3<f64>) -> Vec3 { Vec3::new(v.x, v.y, v.z) }

fn cost_at(p: &Vector3<f64>, ranges: &[AnchorRange]) -> f64 {
    ranges
        .iter()
        .map(|r| {
            let residual = (p - to_na(r.position)).norm() - r.distance_m;
            residual * residual
        })
        .sum()
}

/// JᵀJ and Jᵀr for residuals r_i = ‖p − a_i‖ − d_i
fn normal_equations(p: &Vector3<f64>, ranges: &[AnchorRange]) -> (Matrix3<f64>, Vector3<f64>) {
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();
    for r in ranges {
        let diff = p - to_na(r.position);
        let dist = diff.norm();
        if dist < 1e-9 {
            // Sitting on the anchor: no usable direction
            continue;
        }
        let j = diff / dist;
        let residual = dist - r.distance_m;
        jtj += j * j.transpose();
        jtr += j * residual;
    }
    (jtj, jtr)
}

/// Estimate a position from at least [`MIN_ANCHORS`] anchor ranges.
///
/// Returns the best point found even when the iteration budget runs out.
pub fn solve(ranges: &[AnchorRange], cfg: &SolverConfig) -> Result<PositionEstimate, SolveError> {
    if ranges.len() < MIN_ANCHORS {
        return Err(SolveError::InsufficientAnchors { valid: ranges.len() });
    }

    let bounds = cfg
        .bounds
        .unwrap_or_else(|| Bounds::around(ranges.iter().map(|r| &r.position), cfg.ceiling_m));

    let mut p = to_na(bounds.centroid());
    let mut cost = cost_at(&p, ranges);
    let mut lambda = LAMBDA_INITIAL;
    let mut iterations = 0u32;
    let mut converged = false;

    for iter in 0..cfg.max_iterations {
        iterations = iter + 1;
        let (jtj, jtr) = normal_equations(&p, ranges);

        let mut accepted = None;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj;
            for k in 0..3 {
                damped[(k, k)] += lambda * (jtj[(k, k)] + DIAG_FLOOR);
            }
            let step = match damped.cholesky() {
                Some(chol) => chol.solve(&(-jtr)),
                None => {
                    lambda *= 10.0;
                    continue;
                }
            };
            let candidate = to_na(bounds.clamp(from_na(p + step)));
            let candidate_cost = cost_at(&candidate, ranges);
            if candidate_cost < cost {
                accepted = Some((candidate, candidate_cost));
                lambda = (lambda / 10.0).max(LAMBDA_MIN);
                break;
            }
            lambda *= 10.0;
        }

        match accepted {
            Some((candidate, candidate_cost)) => {
                let improvement = cost - candidate_cost;
                p = candidate;
                cost = candidate_cost;
                if improvement < cfg.tolerance {
                    converged = true;
                    break;
                }
            }
            None => {
                // No damping level improves the cost: a (possibly boundary) minimum
                converged = true;
                break;
            }
        }
    }

    let rms_residual_m = (cost / ranges.len() as f64).sqrt();
    debug!(
        "mlat: {} anchors, {} iterations, rms={:.4}m, converged={}",
        ranges.len(), iterations, rms_residual_m, converged
    );

    Ok(PositionEstimate {
        position: from_na(p),
        bounds,
        rms_residual_m,
        iterations,
        converged,
        n_anchors: ranges.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_to(target: Vec3, anchors: &[Vec3]) -> Vec<AnchorRange> {
        anchors
            .iter()
            .enumerate()
            .map(|(i, a)| AnchorRange {
                anchor: NodeAddress::anchor(i as u16 + 1),
                position: *a,
                distance_m: a.dist(&target),
            })
            .collect()
    }

    #[test]
    fn test_exact_planar_data_converges() {
        let anchors = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)];
        let target = Vec3::new(3.0, 4.0, 0.0);
        let est = solve(&ranges_to(target, &anchors), &SolverConfig::default()).unwrap();
        assert!(est.position.dist(&target) < 1e-2, "got {}", est.position);
        assert!(est.rms_residual_m < 1e-3);
        assert_eq!(est.n_anchors, 3);
    }

    #[test]
    fn test_exact_3d_data_converges() {
        let anchors = [
            Vec3::new(0.0, 0.0, 0.3),
            Vec3::new(8.0, 0.0, 2.8),
            Vec3::new(8.0, 6.0, 0.5),
            Vec3::new(0.0, 6.0, 2.6),
        ];
        let target = Vec3::new(2.5, 3.5, 1.2);
        let est = solve(&ranges_to(target, &anchors), &SolverConfig::default()).unwrap();
        assert!(est.position.dist(&target) < 1e-2, "got {}", est.position);
        assert!(est.converged);
    }

    #[test]
    fn test_insufficient_anchors() {
        let anchors = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0)];
        let r = solve(&ranges_to(Vec3::new(1.0, 1.0, 0.0), &anchors), &SolverConfig::default());
        assert_eq!(r.unwrap_err(), SolveError::InsufficientAnchors { valid: 2 });
    }

    #[test]
    fn test_default_bounds_use_ceiling() {
        let anchors = [Vec3::new(-1.0, 2.0, 0.0), Vec3::new(4.0, -3.0, 0.5), Vec3::new(1.0, 7.0, 0.2)];
        let b = Bounds::around(anchors.iter(), 3.0);
        assert_eq!(b.min, Vec3::new(-1.0, -3.0, 0.0));
        assert_eq!(b.max, Vec3::new(4.0, 7.0, 3.0));

        // Anchors above the ceiling never produce an inverted box
        let high = [Vec3::new(0.0, 0.0, 4.0), Vec3::new(1.0, 1.0, 5.0)];
        let b = Bounds::around(high.iter(), 3.0);
        assert!(b.min.z <= b.max.z);
    }

    #[test]
    fn test_result_stays_inside_bounds_with_inconsistent_ranges() {
        let anchors = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)];
        let mut ranges = ranges_to(Vec3::new(3.0, 4.0, 0.0), &anchors);
        for r in &mut ranges {
            r.distance_m *= 4.0;
        }
        let est = solve(&ranges, &SolverConfig::default()).unwrap();
        assert!(est.bounds.contains(&est.position));
        assert!(est.rms_residual_m > 1.0);
    }

    #[test]
    fn test_explicit_bounds_override_default() {
        let anchors = [Vec3::new(0.0, 0.0, 0.0), Vec3::new(10.0, 0.0, 0.0), Vec3::new(0.0, 10.0, 0.0)];
        let bounds = Bounds { min: Vec3::new(0.0, 0.0, 0.0), max: Vec3::new(2.0, 2.0, 1.0) };
        let cfg = SolverConfig { bounds: Some(bounds), ..SolverConfig::default() };
        let est = solve(&ranges_to(Vec3::new(3.0, 4.0, 0.0), &anchors), &cfg).unwrap();
        assert_eq!(est.bounds, bounds);
        assert!(bounds.contains(&est.position));
    }
}
