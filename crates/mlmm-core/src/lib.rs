//! # mlmm Core Library
//!
//! Hybrid machine-learning/molecular-mechanics (ML/MM) and QM/MM molecular dynamics with
//! collective-variable restraints, built around pluggable external energy backends.
//!
//! ## Architectural Philosophy
//!
//! The library follows a strict layering so that each piece can be tested in isolation:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`MolecularSystem`), force field
//!   parameter records, pure potentials, unit conversions and file I/O (AMBER topologies and
//!   restarts, DCD trajectories).
//!
//! - **[`engine`]: The Logic Core.** The stateful simulation layer: force terms, the global
//!   parameter table, the weighted-distance restraint, ML/QM region binding, integrators, the
//!   integration `Context`, the `Dynamics` driver and the frame sampling loop.
//!
//! - **[`analysis`]: Post-processing.** Error statistics comparing reference QM energies with
//!   embedding-model predictions.
//!
//! - **[`workflows`]: The Public API.** End-to-end procedures tying `core` and `engine`
//!   together, such as a restrained production run writing a trajectory.

pub mod analysis;
pub mod core;
pub mod engine;
pub mod workflows;
