use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileInputConfig {
    pub topology: Option<PathBuf>,
    pub coordinates: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileOutputConfig {
    pub trajectory: Option<PathBuf>,
    pub title: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileFixedAtomsConfig {
    /// Sphere centre in nm.
    pub centre: Option<[f64; 3]>,
    /// Atom whose starting position is the sphere centre.
    pub centre_atom: Option<usize>,
    pub radius_nm: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileDynamicsConfig {
    pub timestep_fs: Option<f64>,
    pub temperature: Option<f64>,
    pub friction: Option<f64>,
    pub integrator: Option<String>,
    pub constraints: Option<String>,
    pub cutoff_nm: Option<f64>,
    pub seed: Option<u64>,
    pub fixed_atoms: Option<FileFixedAtomsConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileSamplingConfig {
    pub frames: Option<usize>,
    pub steps_per_frame: Option<u64>,
    pub initial_frame: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileRestraintConfig {
    /// Pairs written as `I-J:WEIGHT`.
    pub pairs: Option<Vec<String>>,
    /// Force constant in kcal/mol/Å².
    pub force_constant: Option<f64>,
    /// Target collective-variable value in Å.
    pub target: Option<f64>,
    pub force_constant_name: Option<String>,
    pub target_name: Option<String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileServerConfig {
    pub start: Option<Vec<String>>,
    pub stop: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub startup_wait_secs: Option<f64>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileEmbeddingConfig {
    /// Index list such as `1804-1822,2083-2132`, or `molecule:<n>`.
    pub region: Option<String>,
    pub method: Option<String>,
    pub cutoff_nm: Option<f64>,
    pub neighbour_list_frequency: Option<u64>,
    pub command: Option<Vec<String>>,
    pub model: Option<PathBuf>,
    pub device: Option<String>,
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    pub server: Option<FileServerConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FileConfig {
    pub input: Option<FileInputConfig>,
    pub output: Option<FileOutputConfig>,
    pub dynamics: Option<FileDynamicsConfig>,
    pub sampling: Option<FileSamplingConfig>,
    pub restraint: Option<FileRestraintConfig>,
    pub embedding: Option<FileEmbeddingConfig>,
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::parse_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    pub fn parse_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
