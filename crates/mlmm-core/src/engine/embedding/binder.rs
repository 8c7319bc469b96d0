use super::backend::EnergyBackend;
use super::engine::EmbeddingEngine;
use super::region::RegionSelection;
use super::{EmbeddingError, EmbeddingMethod};
use crate::core::forcefield::params::ForceField;
use crate::core::models::system::MolecularSystem;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

/// Charge residual below which no boundary correction is needed.
const CHARGE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub selection: RegionSelection,
    pub method: EmbeddingMethod,
    /// Radius around the region within which MM charges are sent to the backend, in nm.
    pub cutoff: f64,
    /// Number of steps between neighbour-list rebuilds.
    pub neighbour_list_frequency: u64,
}

impl EmbeddingConfig {
    pub fn new(selection: RegionSelection) -> Self {
        Self {
            selection,
            method: EmbeddingMethod::default(),
            cutoff: 0.75,
            neighbour_list_frequency: 20,
        }
    }

    fn validate(&self) -> Result<(), EmbeddingError> {
        if !(self.cutoff.is_finite() && self.cutoff > 0.0) {
            return Err(EmbeddingError::InvalidConfig(format!(
                "embedding cutoff must be positive, got {}",
                self.cutoff
            )));
        }
        if self.neighbour_list_frequency == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "neighbour list frequency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// The classical force field with the region carved out, and the engine that replaces it.
#[derive(Debug)]
pub struct BoundSystem {
    pub forcefield: ForceField,
    pub engine: EmbeddingEngine,
    pub region: Vec<usize>,
    /// Bonds with exactly one atom in the region, as `(region atom, MM atom)`.
    pub boundary_bonds: Vec<(usize, usize)>,
    /// Classical charge of the region before binding.
    pub removed_charge: f64,
}

/// Binds an energy backend to a region of `system`.
///
/// The backend is validated before anything else so that a misconfiguration is reported
/// before any work is done.
///
/// # Errors
///
/// Returns [`EmbeddingError`] if the backend is misconfigured, the region cannot be
/// resolved, or the force field does not describe the system.
pub fn bind(
    system: &MolecularSystem,
    forcefield: &ForceField,
    config: &EmbeddingConfig,
    backend: Box<dyn EnergyBackend>,
) -> Result<BoundSystem, EmbeddingError> {
    backend.validate()?;
    config.validate()?;

    if forcefield.atom_count() != system.atom_count() {
        return Err(EmbeddingError::SizeMismatch {
            system: system.atom_count(),
            forcefield: forcefield.atom_count(),
        });
    }
    let region = config.selection.resolve(system)?;
    let members: HashSet<usize> = region.iter().copied().collect();

    let boundary_bonds: Vec<(usize, usize)> = system
        .bonds()
        .iter()
        .filter_map(|&(a, b)| match (members.contains(&a), members.contains(&b)) {
            (true, false) => Some((a, b)),
            (false, true) => Some((b, a)),
            _ => None,
        })
        .collect();

    let mut augmented = forcefield.clone();
    let (bonds, angles, torsions) = augmented.remove_bonded_terms_within(&members);
    augmented.exclude_pairs_within(&region);

    let removed_charge: f64 = region.iter().map(|&i| forcefield.nonbonded.charges[i]).sum();
    let qm_charge = removed_charge.round() as i32;

    if config.method == EmbeddingMethod::Electrostatic {
        augmented.zero_charges(&members);
        redistribute_residual(
            &mut augmented,
            removed_charge - f64::from(qm_charge),
            &boundary_bonds,
        );
    }

    info!(
        atoms = region.len(),
        method = %config.method,
        backend = backend.name(),
        qm_charge,
        bonds,
        angles,
        torsions,
        boundary_bonds = boundary_bonds.len(),
        "Bound embedding region"
    );

    let atomic_numbers: Vec<u8> = system.atoms().iter().map(|a| a.atomic_number).collect();
    let engine = EmbeddingEngine::new(
        region.clone(),
        &atomic_numbers,
        augmented.nonbonded.charges.clone(),
        qm_charge,
        config.method,
        config.cutoff,
        config.neighbour_list_frequency,
        backend,
    );

    Ok(BoundSystem {
        forcefield: augmented,
        engine,
        region,
        boundary_bonds,
        removed_charge,
    })
}

/// Spreads the non-integer part of the removed region charge over the MM atoms bonded to
/// the region so that the total charge of the system is unchanged.
fn redistribute_residual(
    forcefield: &mut ForceField,
    residual: f64,
    boundary_bonds: &[(usize, usize)],
) {
    if residual.abs() < CHARGE_TOLERANCE {
        return;
    }
    let partners: BTreeSet<usize> = boundary_bonds.iter().map(|&(_, mm)| mm).collect();
    if partners.is_empty() {
        warn!(
            residual,
            "Region charge is not an integer and no boundary atoms can absorb the residual"
        );
        return;
    }
    let share = residual / partners.len() as f64;
    for &mm in &partners {
        forcefield.nonbonded.charges[mm] += share;
    }
    info!(
        residual,
        atoms = partners.len(),
        "Redistributed boundary charge"
    );
}
