//! # Engine Module
//!
//! The stateful simulation layer: everything that turns a loaded system and force field
//! into a running, restrained, optionally embedded molecular dynamics trajectory.
//!
//! ## Architecture
//!
//! - **Forces** ([`forces`], [`restraint`]) - The [`forces::Force`] trait, classical force
//!   terms and the weighted-distance collective-variable restraint
//! - **Global parameters** ([`parameters`]) - Named values such as `k` and `r0` that forces
//!   read at every evaluation and that can be changed on a live context
//! - **Embedding** ([`embedding`]) - Binding an ML/QM region to an external energy backend
//! - **Integration** ([`integrator`], [`constraints`], [`context`]) - Langevin and
//!   velocity-Verlet stepping with SHAKE/RATTLE constraints
//! - **Driving** ([`dynamics`], [`sampling`]) - The dynamics driver with its explicit export
//!   for force injection, and the frame-writing sampling loop
//! - **Configuration and errors** ([`config`], [`error`], [`progress`])

pub mod config;
pub mod constraints;
pub mod context;
pub mod dynamics;
pub mod embedding;
pub mod error;
pub mod forces;
pub mod integrator;
pub mod parameters;
pub mod progress;
pub mod restraint;
pub mod sampling;
