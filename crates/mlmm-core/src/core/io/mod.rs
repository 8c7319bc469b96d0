//! Input/output for AMBER inputs and DCD trajectories.
//!
//! Topologies and restart files are read through the [`traits::InputFile`] interface;
//! trajectories are written frame by frame through [`traits::FrameSink`].

pub mod dcd;
pub mod prmtop;
pub mod rst7;
pub mod traits;

use crate::core::forcefield::params::ForceField;
use crate::core::models::system::MolecularSystem;
use prmtop::{AmberError, PrmtopFile};
use rst7::Rst7File;
use std::path::Path;
use traits::InputFile;
use tracing::{debug, info};

/// Loads an AMBER topology/coordinate pair into a system and its force field.
///
/// A periodic box in the coordinate file takes precedence over `BOX_DIMENSIONS` in the
/// topology.
pub fn load_amber(
    topology_path: &Path,
    coordinates_path: &Path,
) -> Result<(MolecularSystem, ForceField), AmberError> {
    let topology = PrmtopFile::read_from_path(topology_path)?;
    debug!(
        atoms = topology.atoms.len(),
        residues = topology.residues.len(),
        bonds = topology.bonds.len(),
        "Parsed topology {}",
        topology_path.display()
    );
    let coordinates = Rst7File::read_from_path(coordinates_path)?;
    if coordinates.positions.len() != topology.atoms.len() {
        return Err(AmberError::Inconsistent(format!(
            "coordinate file has {} atoms but topology has {}",
            coordinates.positions.len(),
            topology.atoms.len()
        )));
    }

    let periodic_box = coordinates.periodic_box.or(topology.periodic_box);
    let system = MolecularSystem::new(
        topology.atoms,
        topology.residues,
        topology.bonds,
        coordinates.positions,
    )?
    .with_periodic_box(periodic_box)
    .with_velocities(coordinates.velocities)?;

    info!(
        atoms = system.atom_count(),
        molecules = system.molecules().len(),
        periodic = periodic_box.is_some(),
        "Loaded AMBER system"
    );
    Ok((system, topology.forcefield))
}
