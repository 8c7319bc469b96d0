//! CHARMM/OpenMM-style DCD trajectories.
//!
//! Layout (little endian, every block framed as a Fortran record):
//! 1. 84-byte header: `CORD` followed by 20 `i32` control words. Word 9 holds the
//!    timestep as an `f32` in AKMA units.
//! 2. Title block: number of 80-byte lines, then the lines.
//! 3. Atom count.
//! 4. Per frame: an optional unit-cell record of six `f64`, then X, Y and Z blocks of
//!    `f32` coordinates in Å.

use super::traits::FrameSink;
use crate::core::units::{AKMA_TIME_PS, NM_TO_ANGSTROM};
use nalgebra::{Point3, Vector3};
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

const HEADER_BYTES: usize = 84;
const TITLE_LINE_BYTES: usize = 80;
const CHARMM_VERSION: i32 = 24;

// Byte offsets of header words that are rewritten after every frame.
const NSET_OFFSET: u64 = 8;
const LAST_STEP_OFFSET: u64 = 20;

// Control word indices.
const ICNTRL_NSET: usize = 0;
const ICNTRL_ISTART: usize = 1;
const ICNTRL_NSAVC: usize = 2;
const ICNTRL_DELTA: usize = 9;
const ICNTRL_UNIT_CELL: usize = 10;
const ICNTRL_VERSION: usize = 19;

#[derive(Debug, Error)]
pub enum DcdError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Not a DCD file: {0}")]
    NotDcd(String),
    #[error("Frame has {actual} atoms, trajectory expects {expected}")]
    AtomCount { expected: usize, actual: usize },
    #[error("Corrupt DCD file: {0}")]
    Corrupt(String),
    #[error("Trajectory declares a unit cell but frame {0} has no periodic box")]
    MissingUnitCell(usize),
    #[error("{field} = {value} does not fit in a DCD header word")]
    HeaderOverflow { field: &'static str, value: u64 },
}

fn header_word(field: &'static str, value: u64) -> Result<i32, DcdError> {
    i32::try_from(value).map_err(|_| DcdError::HeaderOverflow { field, value })
}

/// Metadata fixed when a trajectory is created.
#[derive(Debug, Clone, PartialEq)]
pub struct DcdHeader {
    pub atoms: usize,
    /// Integration step of the first frame.
    pub first_step: u64,
    /// Integration steps between consecutive frames.
    pub interval: u64,
    /// Integration timestep in ps.
    pub timestep_ps: f64,
    /// Whether each frame carries a unit-cell record.
    pub unit_cell: bool,
    pub title: String,
}

/// Header information of an existing trajectory.
#[derive(Debug, Clone, PartialEq)]
pub struct DcdSummary {
    pub atoms: usize,
    pub frames: usize,
    pub first_step: u64,
    pub interval: u64,
    pub timestep_ps: f64,
    pub has_unit_cell: bool,
    pub title: String,
}

fn write_record<W: Write>(w: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = (payload.len() as u32).to_le_bytes();
    w.write_all(&len)?;
    w.write_all(payload)?;
    w.write_all(&len)
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_record<R: Read>(r: &mut R) -> Result<Vec<u8>, DcdError> {
    let len = read_u32(r)? as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    let end = read_u32(r)? as usize;
    if end != len {
        return Err(DcdError::Corrupt(format!(
            "record length markers differ ({len} vs {end})"
        )));
    }
    Ok(payload)
}

fn word(bytes: &[u8], index: usize) -> [u8; 4] {
    let mut w = [0u8; 4];
    w.copy_from_slice(&bytes[index * 4..index * 4 + 4]);
    w
}

/// Streams frames into a DCD file.
///
/// The header frame count is rewritten after every frame, so the file on disk is a valid
/// trajectory after each successful [`DcdWriter::append`]. Dropping the writer without
/// calling [`DcdWriter::finish`] still flushes buffered data.
#[derive(Debug)]
pub struct DcdWriter {
    path: PathBuf,
    file: Option<BufWriter<File>>,
    header: DcdHeader,
    frames: usize,
    x: Vec<u8>,
    y: Vec<u8>,
    z: Vec<u8>,
}

impl DcdWriter {
    /// Creates (truncating) a trajectory file and writes its header.
    pub fn create(path: &Path, header: DcdHeader) -> Result<Self, DcdError> {
        let first_step = header_word("first step", header.first_step)?;
        let interval = header_word("interval", header.interval)?;
        let atoms = header_word("atoms", header.atoms as u64)?;
        let mut file = BufWriter::new(File::create(path)?);

        let mut icntrl = [0i32; 20];
        icntrl[ICNTRL_ISTART] = first_step;
        icntrl[ICNTRL_NSAVC] = interval;
        icntrl[ICNTRL_UNIT_CELL] = i32::from(header.unit_cell);
        icntrl[ICNTRL_VERSION] = CHARMM_VERSION;
        let mut block = Vec::with_capacity(HEADER_BYTES);
        block.extend_from_slice(b"CORD");
        for (index, value) in icntrl.iter().enumerate() {
            if index == ICNTRL_DELTA {
                let delta = (header.timestep_ps / AKMA_TIME_PS) as f32;
                block.extend_from_slice(&delta.to_le_bytes());
            } else {
                block.extend_from_slice(&value.to_le_bytes());
            }
        }
        write_record(&mut file, &block)?;

        let mut title = Vec::with_capacity(4 + 2 * TITLE_LINE_BYTES);
        title.extend_from_slice(&2i32.to_le_bytes());
        for text in [header.title.as_str(), "Created by mlmm"] {
            let mut line = [b' '; TITLE_LINE_BYTES];
            let bytes = text.as_bytes();
            let n = bytes.len().min(TITLE_LINE_BYTES);
            line[..n].copy_from_slice(&bytes[..n]);
            title.extend_from_slice(&line);
        }
        write_record(&mut file, &title)?;
        write_record(&mut file, &atoms.to_le_bytes())?;
        file.flush()?;

        debug!(path = %path.display(), atoms = header.atoms, "Created DCD trajectory");
        let bytes = header.atoms * 4;
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            header,
            frames: 0,
            x: Vec::with_capacity(bytes),
            y: Vec::with_capacity(bytes),
            z: Vec::with_capacity(bytes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &DcdHeader {
        &self.header
    }

    /// Appends one frame of positions in nm.
    pub fn append(
        &mut self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Result<(), DcdError> {
        if positions.len() != self.header.atoms {
            return Err(DcdError::AtomCount {
                expected: self.header.atoms,
                actual: positions.len(),
            });
        }
        let frames = header_word("frame count", self.frames as u64 + 1)?;
        let last_step = self
            .header
            .interval
            .checked_mul(self.frames as u64)
            .and_then(|offset| offset.checked_add(self.header.first_step))
            .unwrap_or(u64::MAX);
        let last_step = header_word("last step", last_step)?;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| DcdError::Corrupt("trajectory already finished".to_string()))?;

        if self.header.unit_cell {
            let edges = periodic_box.ok_or(DcdError::MissingUnitCell(self.frames))? * NM_TO_ANGSTROM;
            let cell = [edges.x, 90.0, edges.y, 90.0, 90.0, edges.z];
            let mut block = Vec::with_capacity(48);
            for value in cell {
                block.extend_from_slice(&value.to_le_bytes());
            }
            write_record(file, &block)?;
        }

        self.x.clear();
        self.y.clear();
        self.z.clear();
        for p in positions {
            let a = p.coords * NM_TO_ANGSTROM;
            self.x.extend_from_slice(&(a.x as f32).to_le_bytes());
            self.y.extend_from_slice(&(a.y as f32).to_le_bytes());
            self.z.extend_from_slice(&(a.z as f32).to_le_bytes());
        }
        write_record(file, &self.x)?;
        write_record(file, &self.y)?;
        write_record(file, &self.z)?;

        self.frames += 1;
        file.seek(SeekFrom::Start(NSET_OFFSET))?;
        file.write_all(&frames.to_le_bytes())?;
        file.seek(SeekFrom::Start(LAST_STEP_OFFSET))?;
        file.write_all(&last_step.to_le_bytes())?;
        file.seek(SeekFrom::End(0))?;
        file.flush()?;
        Ok(())
    }

    /// Flushes and closes the trajectory, returning the number of frames written.
    pub fn finish(mut self) -> Result<usize, DcdError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        debug!(path = %self.path.display(), frames = self.frames, "Closed DCD trajectory");
        Ok(self.frames)
    }
}

impl Drop for DcdWriter {
    fn drop(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!(path = %self.path.display(), "Failed to flush trajectory on drop: {}", e);
            }
        }
    }
}

impl FrameSink for DcdWriter {
    type Error = DcdError;

    fn write_frame(
        &mut self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Result<(), DcdError> {
        self.append(positions, periodic_box)
    }

    fn frames_written(&self) -> usize {
        self.frames
    }
}

/// Sequential reader over an existing trajectory.
pub struct DcdReader<R: Read> {
    reader: R,
    summary: DcdSummary,
    frames_read: usize,
}

impl DcdReader<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, DcdError> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read> DcdReader<R> {
    pub fn new(mut reader: R) -> Result<Self, DcdError> {
        let marker = read_u32(&mut reader).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => {
                DcdError::NotDcd("file is shorter than a DCD header".to_string())
            }
            _ => DcdError::Io(e),
        })?;
        if marker as usize != HEADER_BYTES {
            return Err(DcdError::NotDcd(format!("unexpected header length {marker}")));
        }
        let mut header = [0u8; HEADER_BYTES];
        reader.read_exact(&mut header)?;
        if read_u32(&mut reader)? as usize != HEADER_BYTES || &header[0..4] != b"CORD" {
            return Err(DcdError::NotDcd("missing CORD header".to_string()));
        }
        let control = &header[4..];
        let int = |index: usize| i32::from_le_bytes(word(control, index));
        let delta = f32::from_le_bytes(word(control, ICNTRL_DELTA));

        let title_block = read_record(&mut reader)?;
        let title = title_block
            .get(4..4 + TITLE_LINE_BYTES)
            .map(|line| String::from_utf8_lossy(line).trim().to_string())
            .unwrap_or_default();

        let natom = read_record(&mut reader)?;
        if natom.len() != 4 {
            return Err(DcdError::Corrupt("unexpected atom count record".to_string()));
        }
        let atoms = i32::from_le_bytes(word(&natom, 0));

        let summary = DcdSummary {
            atoms: atoms.max(0) as usize,
            frames: int(ICNTRL_NSET).max(0) as usize,
            first_step: int(ICNTRL_ISTART).max(0) as u64,
            interval: int(ICNTRL_NSAVC).max(0) as u64,
            timestep_ps: f64::from(delta) * AKMA_TIME_PS,
            has_unit_cell: int(ICNTRL_UNIT_CELL) != 0,
            title,
        };
        Ok(Self {
            reader,
            summary,
            frames_read: 0,
        })
    }

    pub fn summary(&self) -> &DcdSummary {
        &self.summary
    }

    /// Reads the next frame, returning positions in nm and the box edges in nm if present.
    pub fn read_frame(
        &mut self,
    ) -> Result<Option<(Vec<Point3<f64>>, Option<Vector3<f64>>)>, DcdError> {
        if self.frames_read >= self.summary.frames {
            return Ok(None);
        }
        let periodic_box = if self.summary.has_unit_cell {
            let cell = read_record(&mut self.reader)?;
            if cell.len() != 48 {
                return Err(DcdError::Corrupt("unit-cell record is not 48 bytes".to_string()));
            }
            let value = |index: usize| {
                let mut b = [0u8; 8];
                b.copy_from_slice(&cell[index * 8..index * 8 + 8]);
                f64::from_le_bytes(b)
            };
            Some(Vector3::new(value(0), value(2), value(5)) / NM_TO_ANGSTROM)
        } else {
            None
        };

        let mut axes = Vec::with_capacity(3);
        for _ in 0..3 {
            let block = read_record(&mut self.reader)?;
            if block.len() != 4 * self.summary.atoms {
                return Err(DcdError::AtomCount {
                    expected: self.summary.atoms,
                    actual: block.len() / 4,
                });
            }
            let values: Vec<f64> = block
                .chunks_exact(4)
                .map(|b| f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])) / NM_TO_ANGSTROM)
                .collect();
            axes.push(values);
        }
        let positions = (0..self.summary.atoms)
            .map(|i| Point3::new(axes[0][i], axes[1][i], axes[2][i]))
            .collect();
        self.frames_read += 1;
        Ok(Some((positions, periodic_box)))
    }
}
