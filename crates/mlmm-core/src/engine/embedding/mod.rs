//! ML/QM region embedding.
//!
//! A region of the system is handed to an [`backend::EnergyBackend`] at every force
//! evaluation. [`binder::bind`] validates the backend, resolves the region, removes
//! the classical interactions the backend replaces and returns an
//! [`engine::EmbeddingEngine`] that acts as an ordinary force.

pub mod backend;
pub mod binder;
pub mod engine;
pub mod external;
pub mod region;
pub mod server;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub use backend::{BackendError, Device, EnergyBackend};
pub use binder::{BoundSystem, EmbeddingConfig, bind};
pub use engine::EmbeddingEngine;
pub use region::{RegionError, RegionSelection};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Invalid region: {0}")]
    Region(#[from] RegionError),
    #[error("Backend misconfigured: {0}")]
    Backend(#[from] BackendError),
    #[error("Force field describes {forcefield} atoms but the system has {system}")]
    SizeMismatch { system: usize, forcefield: usize },
    #[error("Invalid embedding configuration: {0}")]
    InvalidConfig(String),
}

/// How the region couples to its classical surroundings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingMethod {
    /// The backend sees surrounding point charges; classical region charges are removed.
    #[default]
    Electrostatic,
    /// The backend sees the region in vacuum; region–environment electrostatics stay
    /// classical.
    Mechanical,
}

impl EmbeddingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electrostatic => "electrostatic",
            Self::Mechanical => "mechanical",
        }
    }
}

impl FromStr for EmbeddingMethod {
    type Err = EmbeddingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "electrostatic" => Ok(Self::Electrostatic),
            "mechanical" => Ok(Self::Mechanical),
            other => Err(EmbeddingError::InvalidConfig(format!(
                "unknown embedding method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EmbeddingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
