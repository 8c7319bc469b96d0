//! # Core Models Module
//!
//! Data structures describing a molecular system as loaded from an AMBER topology: atoms,
//! residues, bonds, coordinates and the optional periodic box.
//!
//! ## Key Components
//!
//! - [`atom`] - Per-atom identity and physical properties
//! - [`residue`] - Contiguous atom ranges grouped into residues
//! - [`system`] - The complete `MolecularSystem`, including the derived molecule partition
//!
//! Atoms are addressed by their zero-based position in the topology. This index is the same
//! one used by region selections, restraint definitions and trajectory frames.

pub mod atom;
pub mod residue;
pub mod system;
