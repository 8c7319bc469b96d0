//! # Force Field Module
//!
//! Classical molecular mechanics parameters and the analytic potentials evaluated by the
//! engine's force terms.
//!
//! ## Key Components
//!
//! - [`params`] - Bonded and nonbonded parameter records in internal units, plus the editing
//!   operations the embedding binder uses to carve out an ML/QM region
//! - [`potentials`] - Pure functions returning energies and their radial/angular derivatives
//!
//! All parameters follow the AMBER functional forms: harmonic terms without the 1/2 prefactor,
//! periodic torsions `k(1 + cos(nφ - γ))`, and Lennard-Jones in A/B coefficient form.

pub mod params;
pub mod potentials;
