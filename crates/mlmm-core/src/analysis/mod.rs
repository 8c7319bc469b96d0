//! Post-processing of embedding-model accuracy.
//!
//! Compares reference QM static and induced embedding energies with the values predicted
//! by an embedding model and reports the root-mean-square error of each component and of
//! their sum.

pub mod results;
pub mod rmse;

use thiserror::Error;

pub use results::load_comparison;
pub use rmse::{EnergyComparison, RmseReport, rmse};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Series have different lengths ({left} vs {right})")]
    LengthMismatch { left: usize, right: usize },
    #[error("No samples to compare")]
    Empty,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read MAT-file: {0}")]
    Mat(String),
    #[error("Results file has no array named '{0}'")]
    MissingKey(String),
    #[error("Array '{0}' is not a real numeric array")]
    NotNumeric(String),
    #[error("Cannot read CSV table: {0}")]
    Csv(#[from] csv::Error),
    #[error("Unsupported results file '{0}' (expected .mat or .csv)")]
    UnsupportedFormat(String),
}

impl PartialEq for AnalysisError {
    fn eq(&self, other: &Self) -> bool {
        use AnalysisError::*;
        match (self, other) {
            (
                LengthMismatch { left: a, right: b },
                LengthMismatch { left: c, right: d },
            ) => a == c && b == d,
            (Empty, Empty) => true,
            (Mat(a), Mat(b))
            | (MissingKey(a), MissingKey(b))
            | (NotNumeric(a), NotNumeric(b))
            | (UnsupportedFormat(a), UnsupportedFormat(b)) => a == b,
            _ => false,
        }
    }
}
