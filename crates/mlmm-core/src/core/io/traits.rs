use nalgebra::{Point3, Vector3};
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Defines the interface for read-only text input formats.
pub trait InputFile {
    /// The parsed representation of the file.
    type Output;

    /// The error type for I/O operations.
    type Error: Error + From<io::Error>;

    /// Parses the file from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or I/O operations encounter issues.
    fn read_from(reader: &mut impl BufRead) -> Result<Self::Output, Self::Error>;

    /// Opens and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or parsing fails.
    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self::Output, Self::Error> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }
}

/// A destination for trajectory frames.
///
/// Positions are in nm. Implementors convert to their own on-disk units.
pub trait FrameSink {
    type Error: Error + Send + Sync + 'static;

    /// Appends one frame.
    fn write_frame(
        &mut self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Result<(), Self::Error>;

    /// Number of frames written so far.
    fn frames_written(&self) -> usize;
}
