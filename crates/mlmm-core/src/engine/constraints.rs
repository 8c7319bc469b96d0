//! SHAKE position and RATTLE velocity corrections for distance constraints.

use crate::core::forcefield::potentials::minimum_image;
use crate::engine::forces::DistanceConstraint;
use nalgebra::{Point3, Vector3};

pub const DEFAULT_TOLERANCE: f64 = 1e-8;
pub const DEFAULT_MAX_ITERATIONS: usize = 500;

/// Iterative constraint solver. Particles with zero inverse mass never move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintSolver {
    /// Relative tolerance on squared bond lengths.
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for ConstraintSolver {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl ConstraintSolver {
    /// Moves `positions` so that every constraint holds, correcting along the bond
    /// vectors of `reference`.
    ///
    /// Returns the number of sweeps used, or `None` if the solver did not converge.
    pub fn apply_positions(
        &self,
        constraints: &[DistanceConstraint],
        inverse_masses: &[f64],
        reference: &[Point3<f64>],
        positions: &mut [Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Option<usize> {
        if constraints.is_empty() {
            return Some(0);
        }
        for sweep in 1..=self.max_iterations {
            let mut converged = true;
            for c in constraints {
                let [i, j] = c.atoms;
                let (wi, wj) = (inverse_masses[i], inverse_masses[j]);
                if wi + wj == 0.0 {
                    continue;
                }
                let target = c.distance * c.distance;
                let s = minimum_image(positions[j] - positions[i], periodic_box);
                let diff = target - s.norm_squared();
                if diff.abs() <= 2.0 * self.tolerance * target {
                    continue;
                }
                converged = false;
                let r = minimum_image(reference[j] - reference[i], periodic_box);
                let dot = r.dot(&s);
                if dot.abs() < f64::EPSILON {
                    return None;
                }
                let g = diff / (2.0 * (wi + wj) * dot);
                positions[i] -= g * wi * r;
                positions[j] += g * wj * r;
            }
            if converged {
                return Some(sweep);
            }
        }
        None
    }

    /// Removes velocity components along constrained bonds.
    pub fn apply_velocities(
        &self,
        constraints: &[DistanceConstraint],
        inverse_masses: &[f64],
        positions: &[Point3<f64>],
        velocities: &mut [Vector3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Option<usize> {
        if constraints.is_empty() {
            return Some(0);
        }
        for sweep in 1..=self.max_iterations {
            let mut converged = true;
            for c in constraints {
                let [i, j] = c.atoms;
                let (wi, wj) = (inverse_masses[i], inverse_masses[j]);
                if wi + wj == 0.0 {
                    continue;
                }
                let r = minimum_image(positions[j] - positions[i], periodic_box);
                let r2 = r.norm_squared();
                let projection = r.dot(&(velocities[j] - velocities[i]));
                if projection.abs() <= self.tolerance * r2.sqrt() {
                    continue;
                }
                converged = false;
                let k = projection / (r2 * (wi + wj));
                velocities[i] += k * wi * r;
                velocities[j] -= k * wj * r;
            }
            if converged {
                return Some(sweep);
            }
        }
        None
    }
}
