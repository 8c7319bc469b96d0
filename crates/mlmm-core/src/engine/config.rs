use nalgebra::Point3;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{name}': {message}")]
    InvalidParameter { name: &'static str, message: String },
}

/// Which bonds are held rigid during integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConstraintPolicy {
    #[default]
    None,
    /// Every bond involving a hydrogen atom.
    HBonds,
}

impl FromStr for ConstraintPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "none" => Ok(Self::None),
            "h-bonds" | "hbonds" => Ok(Self::HBonds),
            other => Err(ConfigError::InvalidParameter {
                name: "constraints",
                message: format!("unknown constraint policy '{other}' (expected 'none' or 'h-bonds')"),
            }),
        }
    }
}

impl fmt::Display for ConstraintPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::HBonds => "h-bonds",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegratorKind {
    /// Langevin dynamics with the thermostat applied between two half drifts.
    #[default]
    LangevinMiddle,
    /// Constant-energy velocity Verlet.
    VelocityVerlet,
}

impl FromStr for IntegratorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "langevin-middle" | "langevin" => Ok(Self::LangevinMiddle),
            "velocity-verlet" | "verlet" => Ok(Self::VelocityVerlet),
            other => Err(ConfigError::InvalidParameter {
                name: "integrator",
                message: format!(
                    "unknown integrator '{other}' (expected 'langevin-middle' or 'velocity-verlet')"
                ),
            }),
        }
    }
}

impl fmt::Display for IntegratorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LangevinMiddle => "langevin-middle",
            Self::VelocityVerlet => "velocity-verlet",
        })
    }
}

/// Reference point of a [`FixedAtomSphere`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SphereCentre {
    /// A fixed point in nm.
    Point(Point3<f64>),
    /// The starting position of an atom.
    Atom(usize),
}

/// Atoms further than `radius` (nm) from the centre are held immovable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedAtomSphere {
    pub centre: SphereCentre,
    pub radius: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DynamicsConfig {
    pub timestep_fs: f64,
    pub constraints: ConstraintPolicy,
    pub integrator: IntegratorKind,
    /// Thermostat temperature in K. Also used to draw initial velocities.
    pub temperature: f64,
    /// Langevin collision rate in 1/ps.
    pub friction: f64,
    /// Worker threads for force evaluation; `None` uses the global pool.
    pub threads: Option<usize>,
    pub fixed_atoms: Option<FixedAtomSphere>,
    pub seed: Option<u64>,
    /// Nonbonded cutoff in nm; `None` evaluates every pair.
    pub cutoff: Option<f64>,
}

#[derive(Default)]
pub struct DynamicsConfigBuilder {
    timestep_fs: Option<f64>,
    constraints: Option<ConstraintPolicy>,
    integrator: Option<IntegratorKind>,
    temperature: Option<f64>,
    friction: Option<f64>,
    threads: Option<usize>,
    fixed_atoms: Option<FixedAtomSphere>,
    seed: Option<u64>,
    cutoff: Option<f64>,
}

impl DynamicsConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestep_fs(mut self, timestep: f64) -> Self {
        self.timestep_fs = Some(timestep);
        self
    }
    pub fn constraints(mut self, policy: ConstraintPolicy) -> Self {
        self.constraints = Some(policy);
        self
    }
    pub fn integrator(mut self, kind: IntegratorKind) -> Self {
        self.integrator = Some(kind);
        self
    }
    pub fn temperature(mut self, kelvin: f64) -> Self {
        self.temperature = Some(kelvin);
        self
    }
    pub fn friction(mut self, per_ps: f64) -> Self {
        self.friction = Some(per_ps);
        self
    }
    pub fn threads(mut self, threads: Option<usize>) -> Self {
        self.threads = threads;
        self
    }
    pub fn fixed_atoms(mut self, sphere: Option<FixedAtomSphere>) -> Self {
        self.fixed_atoms = sphere;
        self
    }
    pub fn seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
    pub fn cutoff(mut self, cutoff_nm: Option<f64>) -> Self {
        self.cutoff = cutoff_nm;
        self
    }

    pub fn build(self) -> Result<DynamicsConfig, ConfigError> {
        let timestep_fs = self
            .timestep_fs
            .ok_or(ConfigError::MissingParameter("timestep"))?;
        positive("timestep", timestep_fs)?;

        let temperature = self
            .temperature
            .ok_or(ConfigError::MissingParameter("temperature"))?;
        if !(temperature.is_finite() && temperature >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "temperature",
                message: format!("must be a non-negative number of kelvin, got {temperature}"),
            });
        }

        let friction = self.friction.unwrap_or(1.0);
        if !(friction.is_finite() && friction >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "friction",
                message: format!("must be non-negative, got {friction}"),
            });
        }

        if self.threads == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "threads",
                message: "must be at least 1".to_string(),
            });
        }
        if let Some(sphere) = &self.fixed_atoms {
            positive("fixed-sphere radius", sphere.radius)?;
        }
        if let Some(cutoff) = self.cutoff {
            positive("cutoff", cutoff)?;
        }

        Ok(DynamicsConfig {
            timestep_fs,
            constraints: self.constraints.unwrap_or_default(),
            integrator: self.integrator.unwrap_or_default(),
            temperature,
            friction,
            threads: self.threads,
            fixed_atoms: self.fixed_atoms,
            seed: self.seed,
            cutoff: self.cutoff,
        })
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            name,
            message: format!("must be positive, got {value}"),
        })
    }
}
