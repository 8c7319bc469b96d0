//! # Core Module
//!
//! Fundamental building blocks for ML/MM simulations: the molecular representation, force
//! field parameters, pure potential functions, unit conversions and file formats.
//!
//! ## Architecture
//!
//! - **Molecular Representation** ([`models`]) - Atoms, residues, bonds and the `MolecularSystem`
//! - **Force Field** ([`forcefield`]) - Parameter records and analytic potentials with derivatives
//! - **File I/O** ([`io`]) - AMBER topology/coordinate readers and DCD trajectory I/O
//! - **Units** ([`units`]) - Conversion constants between AMBER, QM and internal units
//!
//! Internally every quantity is expressed in nm, ps, kJ/mol, amu and elementary charges.

pub mod elements;
pub mod forcefield;
pub mod io;
pub mod models;
pub mod units;
