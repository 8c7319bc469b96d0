//! Energy backend that runs a user-supplied command once per evaluation.
//!
//! The command receives on stdin
//!
//! ```text
//! <n_qm> <n_mm> <qm_charge>
//! <Z> <x> <y> <z>          (n_qm lines, Å)
//! <q> <x> <y> <z>          (n_mm lines, e and Å)
//! ```
//!
//! and must print on stdout the energy in Hartree followed by one gradient line per QM
//! atom and then per MM atom, in Hartree/Bohr. Blank lines and lines starting with `#`
//! are ignored. The model path, device and embedding method are passed through the
//! `MLMM_MODEL`, `MLMM_DEVICE` and `MLMM_METHOD` environment variables.

use super::EmbeddingMethod;
use super::backend::{
    BackendError, BackendRequest, BackendResult, Device, EnergyBackend, device_check_disabled,
};
use crate::core::units::{HARTREE_TO_KJ_PER_MOL, NM_TO_ANGSTROM, hartree_per_bohr_to_kj_per_nm};
use nalgebra::Vector3;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, trace};

pub const MODEL_ENV: &str = "MLMM_MODEL";
pub const DEVICE_ENV: &str = "MLMM_DEVICE";
pub const METHOD_ENV: &str = "MLMM_METHOD";

#[derive(Debug, Clone, PartialEq)]
pub struct ExternalCalculatorConfig {
    /// Program followed by its arguments.
    pub command: Vec<String>,
    /// Serialized model weights, if the backend needs them.
    pub model: Option<PathBuf>,
    pub device: Device,
    pub method: EmbeddingMethod,
    /// Root under which the per-run scratch directory is created.
    pub scratch_root: Option<PathBuf>,
    /// Extra environment variables for the command.
    pub environment: Vec<(String, String)>,
}

impl ExternalCalculatorConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            model: None,
            device: Device::Cpu,
            method: EmbeddingMethod::Electrostatic,
            scratch_root: None,
            environment: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ExternalCalculator {
    config: ExternalCalculatorConfig,
    scratch: Option<TempDir>,
    calls: u64,
}

impl ExternalCalculator {
    pub fn new(config: ExternalCalculatorConfig) -> Self {
        Self {
            config,
            scratch: None,
            calls: 0,
        }
    }

    pub fn config(&self) -> &ExternalCalculatorConfig {
        &self.config
    }

    /// Number of completed evaluations.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn scratch_dir(&mut self) -> Result<PathBuf, BackendError> {
        if let Some(dir) = &self.scratch {
            return Ok(dir.path().to_path_buf());
        }
        let dir = match &self.config.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                tempfile::Builder::new().prefix("mlmm-").tempdir_in(root)?
            }
            None => tempfile::Builder::new().prefix("mlmm-").tempdir()?,
        };
        debug!(path = %dir.path().display(), "Created backend scratch directory");
        let path = dir.path().to_path_buf();
        self.scratch = Some(dir);
        Ok(path)
    }

    fn run(&mut self, input: String) -> Result<String, BackendError> {
        let dir = self.scratch_dir()?;
        let (program, args) = self
            .config
            .command
            .split_first()
            .ok_or(BackendError::EmptyCommand)?;

        let mut expression = duct::cmd(program, args)
            .dir(&dir)
            .env(DEVICE_ENV, self.config.device.as_str())
            .env(METHOD_ENV, self.config.method.as_str())
            .stdin_bytes(input)
            .stdout_capture()
            .stderr_capture()
            .unchecked();
        if let Some(model) = &self.config.model {
            expression = expression.env(MODEL_ENV, model);
        }
        for (key, value) in &self.config.environment {
            expression = expression.env(key, value);
        }

        let output = expression.run().map_err(|source| BackendError::Spawn {
            command: self.config.command.join(" "),
            source,
        })?;
        if !output.status.success() {
            return Err(BackendError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl EnergyBackend for ExternalCalculator {
    fn name(&self) -> &str {
        self.config
            .command
            .first()
            .map_or("external", |program| program.as_str())
    }

    fn validate(&self) -> Result<(), BackendError> {
        let program = self
            .config
            .command
            .first()
            .filter(|p| !p.trim().is_empty())
            .ok_or(BackendError::EmptyCommand)?;
        if program.contains(std::path::MAIN_SEPARATOR) && !Path::new(program).exists() {
            return Err(BackendError::Spawn {
                command: program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "program not found"),
            });
        }
        if let Some(model) = &self.config.model {
            if !model.is_file() {
                return Err(BackendError::ModelNotFound(model.clone()));
            }
        }
        self.config.device.check_available(device_check_disabled())
    }

    fn compute(&mut self, request: &BackendRequest<'_>) -> Result<BackendResult, BackendError> {
        let input = render_request(request);
        trace!(bytes = input.len(), "Sending request to external backend");
        let output = self.run(input)?;
        let result = parse_response(
            &output,
            request.qm_positions.len(),
            request.mm_positions.len(),
        )?;
        self.calls += 1;
        Ok(result)
    }
}

/// Formats a request in the stdin protocol, converting to Å.
pub fn render_request(request: &BackendRequest<'_>) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "{} {} {}",
        request.qm_positions.len(),
        request.mm_positions.len(),
        request.qm_charge
    );
    for (z, p) in request.qm_atomic_numbers.iter().zip(request.qm_positions) {
        let a = p.coords * NM_TO_ANGSTROM;
        let _ = writeln!(text, "{z} {:.8} {:.8} {:.8}", a.x, a.y, a.z);
    }
    for (q, p) in request.mm_charges.iter().zip(request.mm_positions) {
        let a = p.coords * NM_TO_ANGSTROM;
        let _ = writeln!(text, "{q:.8} {:.8} {:.8} {:.8}", a.x, a.y, a.z);
    }
    text
}

/// Parses the stdout protocol into internal units.
pub fn parse_response(text: &str, n_qm: usize, n_mm: usize) -> Result<BackendResult, BackendError> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let energy_line = lines
        .next()
        .ok_or_else(|| BackendError::Parse("missing energy line".to_string()))?;
    let energy: f64 = energy_line
        .split_whitespace()
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| BackendError::Parse(format!("invalid energy '{energy_line}'")))?;

    let mut read_forces = |count: usize, label: &str| -> Result<Vec<Vector3<f64>>, BackendError> {
        let mut forces = Vec::with_capacity(count);
        for index in 0..count {
            let line = lines.next().ok_or_else(|| {
                BackendError::Parse(format!("expected {count} {label} gradients, got {index}"))
            })?;
            let values: Vec<f64> = line
                .split_whitespace()
                .map(str::parse)
                .collect::<Result<_, _>>()
                .map_err(|_| BackendError::Parse(format!("invalid gradient '{line}'")))?;
            if values.len() != 3 {
                return Err(BackendError::Parse(format!(
                    "gradient line '{line}' does not have three components"
                )));
            }
            let gradient = Vector3::new(values[0], values[1], values[2]);
            forces.push(-hartree_per_bohr_to_kj_per_nm(1.0) * gradient);
        }
        Ok(forces)
    };
    let qm_forces = read_forces(n_qm, "QM")?;
    let mm_forces = read_forces(n_mm, "MM")?;

    let result = BackendResult {
        energy: energy * HARTREE_TO_KJ_PER_MOL,
        qm_forces,
        mm_forces,
    };
    if !result.is_finite() {
        return Err(BackendError::NonFinite);
    }
    Ok(result)
}
