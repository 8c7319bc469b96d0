use nalgebra::{Point3, Vector3};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Environment toggle that skips the accelerator availability check.
pub const SKIP_DEVICE_CHECK_ENV: &str = "MLMM_SKIP_DEVICE_CHECK";

const CUDA_DEVICE_NODES: [&str; 2] = ["/dev/nvidiactl", "/dev/nvidia0"];

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("No command configured for the energy backend")]
    EmptyCommand,
    #[error("Model file not found: {0}")]
    ModelNotFound(PathBuf),
    #[error("Unsupported device '{0}' (expected 'cpu' or 'cuda')")]
    UnsupportedDevice(String),
    #[error("Device '{0}' is not available on this machine (set MLMM_SKIP_DEVICE_CHECK=1 to skip this check)")]
    DeviceUnavailable(String),
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Backend exited with status {status:?}: {stderr}")]
    Failed { status: Option<i32>, stderr: String },
    #[error("Malformed backend output: {0}")]
    Parse(String),
    #[error("Backend returned non-finite values")]
    NonFinite,
    #[error("Prediction server exited during startup with status {0:?}")]
    ServerExited(Option<i32>),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Where the backend should run its model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
        }
    }

    /// Fails if the device is not usable, unless `skip_check` is set.
    pub fn check_available(&self, skip_check: bool) -> Result<(), BackendError> {
        match self {
            Self::Cpu => Ok(()),
            Self::Cuda if skip_check => Ok(()),
            Self::Cuda => {
                if CUDA_DEVICE_NODES.iter().any(|node| Path::new(node).exists()) {
                    Ok(())
                } else {
                    Err(BackendError::DeviceUnavailable(self.as_str().to_string()))
                }
            }
        }
    }
}

impl FromStr for Device {
    type Err = BackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            other => Err(BackendError::UnsupportedDevice(other.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns whether the device check was disabled through the environment.
pub fn device_check_disabled() -> bool {
    std::env::var(SKIP_DEVICE_CHECK_ENV).is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

/// One energy/force request for the ML/QM region and its surroundings.
///
/// Positions are in nm, charges in e.
#[derive(Debug, Clone, Copy)]
pub struct BackendRequest<'a> {
    pub qm_atomic_numbers: &'a [u8],
    pub qm_positions: &'a [Point3<f64>],
    /// Net integer charge assigned to the region.
    pub qm_charge: i32,
    pub mm_charges: &'a [f64],
    pub mm_positions: &'a [Point3<f64>],
}

/// Energy in kJ/mol and forces in kJ/mol/nm.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendResult {
    pub energy: f64,
    pub qm_forces: Vec<Vector3<f64>>,
    pub mm_forces: Vec<Vector3<f64>>,
}

impl BackendResult {
    pub fn is_finite(&self) -> bool {
        self.energy.is_finite()
            && self
                .qm_forces
                .iter()
                .chain(&self.mm_forces)
                .all(|f| f.iter().all(|x| x.is_finite()))
    }
}

/// An energy-prediction engine for the ML/QM region.
pub trait EnergyBackend: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Checks the configuration before any integration step is taken.
    fn validate(&self) -> Result<(), BackendError>;

    fn compute(&mut self, request: &BackendRequest<'_>) -> Result<BackendResult, BackendError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Harmonic tether of every region atom to the origin, with no MM coupling.
    #[derive(Debug, Default)]
    pub(crate) struct TetherBackend {
        pub k: f64,
        pub calls: usize,
        pub last_mm_count: usize,
    }

    impl EnergyBackend for TetherBackend {
        fn name(&self) -> &str {
            "tether"
        }

        fn validate(&self) -> Result<(), BackendError> {
            Ok(())
        }

        fn compute(&mut self, request: &BackendRequest<'_>) -> Result<BackendResult, BackendError> {
            self.calls += 1;
            self.last_mm_count = request.mm_positions.len();
            let mut energy = 0.0;
            let mut qm_forces = Vec::with_capacity(request.qm_positions.len());
            for p in request.qm_positions {
                energy += self.k * p.coords.norm_squared();
                qm_forces.push(-2.0 * self.k * p.coords);
            }
            Ok(BackendResult {
                energy,
                qm_forces,
                mm_forces: vec![Vector3::zeros(); request.mm_positions.len()],
            })
        }
    }

    #[derive(Debug)]
    pub(crate) struct MisconfiguredBackend;

    impl EnergyBackend for MisconfiguredBackend {
        fn name(&self) -> &str {
            "misconfigured"
        }

        fn validate(&self) -> Result<(), BackendError> {
            Err(BackendError::ModelNotFound(PathBuf::from("missing.model")))
        }

        fn compute(&mut self, _: &BackendRequest<'_>) -> Result<BackendResult, BackendError> {
            Err(BackendError::EmptyCommand)
        }
    }

    #[test]
    fn device_parses_case_insensitively() {
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda);
        assert_eq!(" cpu ".parse::<Device>().unwrap(), Device::Cpu);
        assert!(matches!(
            "tpu".parse::<Device>(),
            Err(BackendError::UnsupportedDevice(_))
        ));
    }

    #[test]
    fn cpu_is_always_available() {
        assert!(Device::Cpu.check_available(false).is_ok());
    }

    #[test]
    fn skipped_check_accepts_cuda() {
        assert!(Device::Cuda.check_available(true).is_ok());
    }

    #[test]
    fn non_finite_results_are_detected() {
        let result = BackendResult {
            energy: 1.0,
            qm_forces: vec![Vector3::new(0.0, f64::NAN, 0.0)],
            mm_forces: vec![],
        };
        assert!(!result.is_finite());
    }
}
