//! Force definitions and the assembled force system.
//!
//! A [`Force`] adds its contribution to a shared force buffer and returns its energy.
//! [`ForceSystem`] owns the forces together with particle masses, distance constraints
//! and the periodic box; it is what an integration context evaluates every step.

pub mod bonded;
pub mod nonbonded;

use crate::core::forcefield::params::ForceField;
use crate::engine::embedding::backend::BackendError;
use crate::engine::parameters::{ParameterError, ParameterSpec, ParameterTable};
use nalgebra::{Point3, Vector3};
use std::fmt::Debug;
use thiserror::Error;

pub use bonded::{HarmonicAngleForce, HarmonicBondForce, PeriodicTorsionForce};
pub use nonbonded::NonbondedForce;

#[derive(Debug, Error)]
pub enum ForceError {
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    #[error("Energy backend failed: {0}")]
    Backend(#[from] BackendError),
    #[error("Force '{force}' produced a non-finite energy")]
    NonFinite { force: String },
    #[error("Force '{force}' is invalid: {message}")]
    Invalid { force: String, message: String },
}

/// Read-only state handed to every force evaluation.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    /// Positions in nm.
    pub positions: &'a [Point3<f64>],
    pub periodic_box: Option<&'a Vector3<f64>>,
    pub parameters: &'a ParameterTable,
    /// Integration step counter of the evaluating context.
    pub step: u64,
}

pub trait Force: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Global parameters this force reads.
    fn parameters(&self) -> Vec<ParameterSpec> {
        Vec::new()
    }

    /// Checks that every atom this force references exists.
    fn validate(&self, atom_count: usize) -> Result<(), ForceError>;

    /// Accumulates forces (kJ/mol/nm) into `forces` and returns the energy in kJ/mol.
    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError>;
}

/// A holonomic distance constraint in nm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceConstraint {
    pub atoms: [usize; 2],
    pub distance: f64,
}

/// Masses, forces, constraints and box of one simulation.
#[derive(Debug, Default)]
pub struct ForceSystem {
    masses: Vec<f64>,
    forces: Vec<Box<dyn Force>>,
    constraints: Vec<DistanceConstraint>,
    periodic_box: Option<Vector3<f64>>,
}

impl ForceSystem {
    pub fn new(masses: Vec<f64>, periodic_box: Option<Vector3<f64>>) -> Self {
        Self {
            masses,
            forces: Vec::new(),
            constraints: Vec::new(),
            periodic_box,
        }
    }

    /// Builds the classical part of a system: bonds, angles, torsions and nonbonded terms.
    pub fn from_forcefield(
        masses: Vec<f64>,
        periodic_box: Option<Vector3<f64>>,
        forcefield: &ForceField,
        cutoff: Option<f64>,
    ) -> Self {
        let mut system = Self::new(masses, periodic_box);
        system.add_force(Box::new(HarmonicBondForce::new(forcefield.bonds.clone())));
        system.add_force(Box::new(HarmonicAngleForce::new(forcefield.angles.clone())));
        system.add_force(Box::new(PeriodicTorsionForce::new(
            forcefield.torsions.clone(),
        )));
        system.add_force(Box::new(NonbondedForce::new(
            forcefield.nonbonded.clone(),
            cutoff,
        )));
        system
    }

    pub fn atom_count(&self) -> usize {
        self.masses.len()
    }

    pub fn masses(&self) -> &[f64] {
        &self.masses
    }

    /// Sets a particle mass. A mass of zero makes the particle immovable.
    pub fn set_mass(&mut self, index: usize, mass: f64) {
        if let Some(m) = self.masses.get_mut(index) {
            *m = mass;
        }
    }

    pub fn is_fixed(&self, index: usize) -> bool {
        self.masses.get(index).is_some_and(|&m| m == 0.0)
    }

    /// Appends a force and returns its index.
    pub fn add_force(&mut self, force: Box<dyn Force>) -> usize {
        self.forces.push(force);
        self.forces.len() - 1
    }

    pub fn forces(&self) -> &[Box<dyn Force>] {
        &self.forces
    }

    pub fn forces_mut(&mut self) -> &mut [Box<dyn Force>] {
        &mut self.forces
    }

    pub fn force_names(&self) -> Vec<String> {
        self.forces.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn add_constraint(&mut self, constraint: DistanceConstraint) {
        self.constraints.push(constraint);
    }

    pub fn constraints(&self) -> &[DistanceConstraint] {
        &self.constraints
    }

    /// Drops constraints between two immovable particles.
    pub fn prune_fixed_constraints(&mut self) -> usize {
        let before = self.constraints.len();
        let masses = &self.masses;
        self.constraints
            .retain(|c| !(masses[c.atoms[0]] == 0.0 && masses[c.atoms[1]] == 0.0));
        before - self.constraints.len()
    }

    pub fn periodic_box(&self) -> Option<&Vector3<f64>> {
        self.periodic_box.as_ref()
    }

    /// Degrees of freedom of the movable particles after removing constraints.
    pub fn degrees_of_freedom(&self) -> usize {
        let mobile = self.masses.iter().filter(|&&m| m > 0.0).count();
        (3 * mobile).saturating_sub(self.constraints.len())
    }

    /// Checks every force and constraint against the particle count.
    pub fn validate(&self) -> Result<(), ForceError> {
        let n = self.atom_count();
        for force in &self.forces {
            force.validate(n)?;
        }
        for c in &self.constraints {
            if c.atoms[0] >= n || c.atoms[1] >= n || c.atoms[0] == c.atoms[1] {
                return Err(ForceError::Invalid {
                    force: "constraints".to_string(),
                    message: format!("bad constraint between atoms {:?}", c.atoms),
                });
            }
        }
        Ok(())
    }

    /// Evaluates all forces. Returns the total energy and the energy of each force.
    pub fn evaluate(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<(f64, Vec<f64>), ForceError> {
        forces.iter_mut().for_each(|f| *f = Vector3::zeros());
        let mut total = 0.0;
        let mut breakdown = Vec::with_capacity(self.forces.len());
        for force in &mut self.forces {
            let energy = force.compute(input, forces)?;
            if !energy.is_finite() {
                return Err(ForceError::NonFinite {
                    force: force.name().to_string(),
                });
            }
            total += energy;
            breakdown.push(energy);
        }
        Ok((total, breakdown))
    }
}

/// Returns an [`ForceError::Invalid`] if any index is `>= atom_count`.
pub(crate) fn check_indices<'a, I>(force: &str, atom_count: usize, indices: I) -> Result<(), ForceError>
where
    I: IntoIterator<Item = &'a usize>,
{
    for &index in indices {
        if index >= atom_count {
            return Err(ForceError::Invalid {
                force: force.to_string(),
                message: format!("atom index {index} is out of range for {atom_count} atoms"),
            });
        }
    }
    Ok(())
}
