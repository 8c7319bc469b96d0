use thiserror::Error;

use super::config::ConfigError;
use super::embedding::EmbeddingError;
use super::forces::ForceError;
use super::parameters::ParameterError;
use super::restraint::RestraintError;
use crate::core::io::dcd::DcdError;
use crate::core::io::prmtop::AmberError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Initialization failed: {0}")]
    Initialization(String),

    #[error("Invalid configuration: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Failed to load AMBER input: {source}")]
    Amber {
        #[from]
        source: AmberError,
    },

    #[error("Trajectory error: {source}")]
    Trajectory {
        #[from]
        source: DcdError,
    },

    #[error("Embedding setup failed: {source}")]
    Embedding {
        #[from]
        source: EmbeddingError,
    },

    #[error("Restraint setup failed: {source}")]
    Restraint {
        #[from]
        source: RestraintError,
    },

    #[error(transparent)]
    Parameter(#[from] ParameterError),

    #[error("Force evaluation failed at step {step}: {source}")]
    Force {
        step: u64,
        #[source]
        source: ForceError,
    },

    #[error("Constraints did not converge within {iterations} iterations at step {step}")]
    ConstraintFailure { step: u64, iterations: usize },

    #[error("Simulation became unstable at step {step}: {reason}")]
    Unstable { step: u64, reason: String },

    #[error("Failed to write trajectory frame {frame}: {message}")]
    FrameWrite { frame: usize, message: String },

    #[error("Cancelled after {frames} frame(s)")]
    Cancelled { frames: usize },

    #[error("Internal logic error: {0}")]
    Internal(String),
}
