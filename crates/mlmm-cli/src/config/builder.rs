use super::defaults::DefaultsConfig;
use super::file::{
    FileConfig, FileDynamicsConfig, FileEmbeddingConfig, FileFixedAtomsConfig,
    FileRestraintConfig, FileServerConfig,
};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser::{self, ParseError};
use mlmm::engine::config::{
    ConstraintPolicy, DynamicsConfig, DynamicsConfigBuilder, FixedAtomSphere, IntegratorKind,
    SphereCentre,
};
use mlmm::engine::embedding::external::ExternalCalculatorConfig;
use mlmm::engine::embedding::server::ServerConfig;
use mlmm::engine::embedding::{Device, EmbeddingConfig, EmbeddingMethod, RegionSelection};
use mlmm::engine::restraint::{RestraintConfig, WeightedPair};
use mlmm::engine::sampling::SamplingPlan;
use mlmm::workflows::simulate::{EmbeddingSetup, SimulationConfig};
use nalgebra::Point3;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub fn build_config(args: &RunArgs, threads: Option<usize>) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();
    let file_config = FileConfig::from_file(&args.config)?;
    let file_config = apply_set_values(file_config, &args.set_values)?;
    let base_dir = args
        .config
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let core_config = merge(file_config, args, threads, &base_dir, &defaults)?;
    Ok(AppConfig {
        core_config,
        config_path: args.config.clone(),
    })
}

fn merge(
    mut file_config: FileConfig,
    args: &RunArgs,
    threads: Option<usize>,
    base_dir: &Path,
    defaults: &DefaultsConfig,
) -> Result<SimulationConfig> {
    let input = file_config.input.take().unwrap_or_default();
    let topology_path = resolve_existing(input.topology.as_deref(), "input.topology", base_dir)?;
    let coordinates_path =
        resolve_existing(input.coordinates.as_deref(), "input.coordinates", base_dir)?;

    let output = file_config.output.take().unwrap_or_default();
    let trajectory_path = match (&args.output, output.trajectory) {
        (Some(cli_path), _) => cli_path.clone(),
        (None, Some(file_path)) => base_dir.join(file_path),
        (None, None) => base_dir.join(&defaults.trajectory),
    };
    let title = output.title.unwrap_or_else(|| defaults.title.clone());

    let dynamics = merge_dynamics(
        file_config.dynamics.take().unwrap_or_default(),
        args.seed,
        threads,
        defaults,
    )?;

    let sampling_file = file_config.sampling.take().unwrap_or_default();
    let frames = args
        .frames
        .or(sampling_file.frames)
        .unwrap_or(defaults.frames);
    let steps_per_frame = args
        .steps_per_frame
        .or(sampling_file.steps_per_frame)
        .unwrap_or(defaults.steps_per_frame);
    if steps_per_frame == 0 {
        return Err(CliError::Config(
            "`sampling.steps-per-frame` must be at least 1".to_string(),
        ));
    }
    let initial_frame = match (args.initial_frame.initial_frame, args.initial_frame.no_initial_frame) {
        (true, false) => true,
        (false, true) => false,
        _ => sampling_file.initial_frame.unwrap_or(defaults.initial_frame),
    };
    let sampling = SamplingPlan::new(steps_per_frame, frames).with_initial_frame(initial_frame);

    let restraint = file_config.restraint.take().map(merge_restraint).transpose()?;
    let embedding = file_config
        .embedding
        .take()
        .map(|e| merge_embedding(e, base_dir, defaults))
        .transpose()?;

    debug!(
        topology = %topology_path.display(),
        coordinates = %coordinates_path.display(),
        trajectory = %trajectory_path.display(),
        frames,
        steps_per_frame,
        embedded = embedding.is_some(),
        restrained = restraint.is_some(),
        "Merged run configuration"
    );

    Ok(SimulationConfig {
        topology_path,
        coordinates_path,
        trajectory_path,
        embedding,
        restraint,
        dynamics,
        sampling,
        title,
    })
}

fn resolve_existing(path: Option<&Path>, key: &str, base_dir: &Path) -> Result<PathBuf> {
    let path = path.ok_or_else(|| {
        CliError::Config(format!("A value for `{}` is required in the config file.", key))
    })?;
    let resolved = base_dir.join(path);
    if !resolved.exists() {
        return Err(CliError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Provided path does not exist: {}", resolved.display()),
        )));
    }
    Ok(resolved)
}

fn merge_dynamics(
    file: FileDynamicsConfig,
    cli_seed: Option<u64>,
    threads: Option<usize>,
    defaults: &DefaultsConfig,
) -> Result<DynamicsConfig> {
    let integrator: IntegratorKind = file
        .integrator
        .as_deref()
        .unwrap_or(defaults.integrator.as_str())
        .parse()
        .map_err(|e| CliError::Config(format!("{}", e)))?;
    let constraints: ConstraintPolicy = file
        .constraints
        .as_deref()
        .unwrap_or(defaults.constraints.as_str())
        .parse()
        .map_err(|e| CliError::Config(format!("{}", e)))?;
    let fixed_atoms = file.fixed_atoms.map(merge_fixed_atoms).transpose()?;

    DynamicsConfigBuilder::new()
        .timestep_fs(file.timestep_fs.unwrap_or(defaults.timestep_fs))
        .temperature(file.temperature.unwrap_or(defaults.temperature))
        .friction(file.friction.unwrap_or(defaults.friction))
        .integrator(integrator)
        .constraints(constraints)
        .cutoff(file.cutoff_nm)
        .seed(cli_seed.or(file.seed))
        .threads(threads)
        .fixed_atoms(fixed_atoms)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))
}

fn merge_fixed_atoms(file: FileFixedAtomsConfig) -> Result<FixedAtomSphere> {
    let centre = match (file.centre, file.centre_atom) {
        (Some([x, y, z]), None) => SphereCentre::Point(Point3::new(x, y, z)),
        (None, Some(atom)) => SphereCentre::Atom(atom),
        _ => {
            return Err(CliError::Config(
                "`dynamics.fixed-atoms` requires exactly one of `centre` or `centre-atom`"
                    .to_string(),
            ));
        }
    };
    let radius = file.radius_nm.ok_or_else(|| {
        CliError::Config("`dynamics.fixed-atoms` requires `radius-nm`".to_string())
    })?;
    Ok(FixedAtomSphere { centre, radius })
}

fn merge_restraint(file: FileRestraintConfig) -> Result<RestraintConfig> {
    let pairs = file
        .pairs
        .ok_or_else(|| CliError::Config("`restraint` requires `pairs`".to_string()))?
        .iter()
        .map(|p| {
            parser::parse_weighted_pair(p).map(|(atoms, weight)| WeightedPair { atoms, weight })
        })
        .collect::<std::result::Result<Vec<_>, ParseError>>()
        .map_err(|e| CliError::Config(e.to_string()))?;
    let force_constant = file.force_constant.ok_or_else(|| {
        CliError::Config("`restraint` requires `force-constant` (kcal/mol/Å²)".to_string())
    })?;
    let target = file
        .target
        .ok_or_else(|| CliError::Config("`restraint` requires `target` (Å)".to_string()))?;

    let mut config = RestraintConfig::new(pairs, force_constant, target);
    if let Some(name) = file.force_constant_name {
        config.force_constant_name = name;
    }
    if let Some(name) = file.target_name {
        config.target_name = name;
    }
    Ok(config)
}

fn merge_embedding(
    file: FileEmbeddingConfig,
    base_dir: &Path,
    defaults: &DefaultsConfig,
) -> Result<EmbeddingSetup> {
    let selection: RegionSelection = file
        .region
        .as_deref()
        .ok_or_else(|| CliError::Config("`embedding` requires `region`".to_string()))?
        .parse()
        .map_err(|e| CliError::Config(format!("`embedding.region`: {}", e)))?;
    let method: EmbeddingMethod = file
        .method
        .as_deref()
        .unwrap_or(defaults.embedding_method.as_str())
        .parse()
        .map_err(|e| CliError::Config(format!("`embedding.method`: {}", e)))?;
    let device: Device = file
        .device
        .as_deref()
        .unwrap_or(defaults.device.as_str())
        .parse()
        .map_err(|e| CliError::Config(format!("`embedding.device`: {}", e)))?;
    let command = file
        .command
        .filter(|c| !c.is_empty())
        .ok_or_else(|| CliError::Config("`embedding` requires a non-empty `command`".to_string()))?;

    let mut region = EmbeddingConfig::new(selection);
    region.method = method;
    region.cutoff = file.cutoff_nm.unwrap_or(defaults.embedding_cutoff_nm);
    region.neighbour_list_frequency = file
        .neighbour_list_frequency
        .unwrap_or(defaults.neighbour_list_frequency);

    let mut calculator = ExternalCalculatorConfig::new(command);
    calculator.model = file.model.map(|m| base_dir.join(m));
    calculator.device = device;
    calculator.method = method;
    calculator.scratch_root = file.scratch_dir.map(|d| base_dir.join(d));
    calculator.environment = file.environment.into_iter().collect();

    let server = file
        .server
        .map(|s| merge_server(s, base_dir, defaults))
        .transpose()?;

    Ok(EmbeddingSetup {
        region,
        calculator,
        server,
    })
}

fn merge_server(
    file: FileServerConfig,
    base_dir: &Path,
    defaults: &DefaultsConfig,
) -> Result<ServerConfig> {
    let start = file
        .start
        .filter(|c| !c.is_empty())
        .ok_or_else(|| {
            CliError::Config("`embedding.server` requires a non-empty `start`".to_string())
        })?;
    let wait = file
        .startup_wait_secs
        .unwrap_or(defaults.server_startup_wait_secs);
    if !(wait.is_finite() && wait >= 0.0) {
        return Err(CliError::Config(format!(
            "`embedding.server.startup-wait-secs` must be non-negative, got {}",
            wait
        )));
    }

    let mut config = ServerConfig::new(start);
    config.stop = file.stop.filter(|c| !c.is_empty());
    config.working_dir = file.working_dir.map(|d| base_dir.join(d));
    config.log_file = file.log_file.map(|f| base_dir.join(f));
    config.startup_wait = Duration::from_secs_f64(wait);
    config.environment = file.environment.into_iter().collect();
    Ok(config)
}

fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let (key, value) =
            parser::parse_key_value(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
        let config_error = |e: ParseError| CliError::Config(e.to_string());

        match key {
            "dynamics.timestep-fs" => {
                config.dynamics.get_or_insert_with(Default::default).timestep_fs =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "dynamics.temperature" => {
                config.dynamics.get_or_insert_with(Default::default).temperature =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "dynamics.friction" => {
                config.dynamics.get_or_insert_with(Default::default).friction =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "dynamics.cutoff-nm" => {
                config.dynamics.get_or_insert_with(Default::default).cutoff_nm =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "dynamics.seed" => {
                config.dynamics.get_or_insert_with(Default::default).seed =
                    Some(parser::parse_value(key, value, "integer").map_err(config_error)?);
            }
            "dynamics.integrator" => {
                config.dynamics.get_or_insert_with(Default::default).integrator =
                    Some(value.to_string());
            }
            "dynamics.constraints" => {
                config.dynamics.get_or_insert_with(Default::default).constraints =
                    Some(value.to_string());
            }
            "sampling.frames" => {
                config.sampling.get_or_insert_with(Default::default).frames =
                    Some(parser::parse_value(key, value, "integer").map_err(config_error)?);
            }
            "sampling.steps-per-frame" => {
                config.sampling.get_or_insert_with(Default::default).steps_per_frame =
                    Some(parser::parse_value(key, value, "integer").map_err(config_error)?);
            }
            "sampling.initial-frame" => {
                config.sampling.get_or_insert_with(Default::default).initial_frame =
                    Some(parser::parse_value(key, value, "boolean").map_err(config_error)?);
            }
            "restraint.force-constant" => {
                config.restraint.get_or_insert_with(Default::default).force_constant =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "restraint.target" => {
                config.restraint.get_or_insert_with(Default::default).target =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            "embedding.region" => {
                config.embedding.get_or_insert_with(Default::default).region =
                    Some(value.to_string());
            }
            "embedding.method" => {
                config.embedding.get_or_insert_with(Default::default).method =
                    Some(value.to_string());
            }
            "embedding.device" => {
                config.embedding.get_or_insert_with(Default::default).device =
                    Some(value.to_string());
            }
            "embedding.cutoff-nm" => {
                config.embedding.get_or_insert_with(Default::default).cutoff_nm =
                    Some(parser::parse_value(key, value, "float").map_err(config_error)?);
            }
            _ => {
                return Err(CliError::Config(format!(
                    "Unsupported configuration key for --set: '{}'",
                    key
                )));
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("system.prmtop"), "").unwrap();
        fs::write(dir.path().join("system.rst7"), "").unwrap();
        dir
    });

    const MINIMAL: &str = r#"
        [input]
        topology = "system.prmtop"
        coordinates = "system.rst7"
    "#;

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut args = vec![
            "mlmm".to_string(),
            "run".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(args).command {
            Commands::Run(run_args) => run_args,
            _ => panic!("Expected 'run' subcommand"),
        }
    }

    #[test]
    fn minimal_file_is_completed_with_defaults() {
        let path = write_config_file("minimal.toml", MINIMAL);
        let config = build_config(&run_args(&path, &[]), None).unwrap().core_config;

        assert_eq!(config.topology_path, TEST_DIR.path().join("system.prmtop"));
        assert_eq!(config.trajectory_path, TEST_DIR.path().join("trajectory.dcd"));
        assert_eq!(config.sampling, SamplingPlan::new(100, 300));
        assert_eq!(config.dynamics.integrator, IntegratorKind::LangevinMiddle);
        assert_eq!(config.dynamics.constraints, ConstraintPolicy::None);
        assert_eq!(config.dynamics.temperature, 300.0);
        assert!(config.restraint.is_none());
        assert!(config.embedding.is_none());
    }

    #[test]
    fn cli_arguments_override_file_values() {
        let content = format!(
            "{MINIMAL}
            [dynamics]
            seed = 1
            [sampling]
            frames = 10
            steps-per-frame = 5
            initial-frame = true
            "
        );
        let path = write_config_file("override.toml", &content);
        let args = run_args(
            &path,
            &[
                "--frames",
                "500",
                "--seed",
                "99",
                "--no-initial-frame",
                "-o",
                "/tmp/out.dcd",
            ],
        );
        let config = build_config(&args, Some(8)).unwrap().core_config;

        assert_eq!(config.sampling.frames, 500);
        assert_eq!(config.sampling.steps_per_frame, 5);
        assert!(!config.sampling.write_initial_frame);
        assert_eq!(config.dynamics.seed, Some(99));
        assert_eq!(config.dynamics.threads, Some(8));
        assert_eq!(config.trajectory_path, PathBuf::from("/tmp/out.dcd"));
    }

    #[test]
    fn set_values_override_file_and_defaults() {
        let content = format!(
            "{MINIMAL}
            [dynamics]
            temperature = 280.0
            "
        );
        let path = write_config_file("set.toml", &content);
        let args = run_args(
            &path,
            &[
                "-S",
                "dynamics.temperature=310",
                "-S",
                "dynamics.constraints=h-bonds",
                "-S",
                "sampling.steps-per-frame=1",
            ],
        );
        let config = build_config(&args, None).unwrap().core_config;

        assert_eq!(config.dynamics.temperature, 310.0);
        assert_eq!(config.dynamics.constraints, ConstraintPolicy::HBonds);
        assert_eq!(config.sampling.steps_per_frame, 1);
    }

    #[test]
    fn unsupported_set_key_is_rejected() {
        let path = write_config_file("bad_set.toml", MINIMAL);
        let args = run_args(&path, &["-S", "dynamics.colour=blue"]);
        match build_config(&args, None) {
            Err(CliError::Config(msg)) => assert!(msg.contains("dynamics.colour")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn restraint_and_embedding_sections_are_converted() {
        let content = format!(
            r#"{MINIMAL}
            [restraint]
            pairs = ["4-14:0.7", "6-16:0.3"]
            force-constant = 125.0
            target = 3.0

            [embedding]
            region = "1804-1822,2083-2132"
            method = "mechanical"
            command = ["python", "calc.py"]
            model = "ani2x.model"
            device = "cuda"

            [embedding.server]
            start = ["server", "--port", "10000"]
            startup-wait-secs = 0.5
            "#
        );
        let path = write_config_file("full.toml", &content);
        let config = build_config(&run_args(&path, &[]), None).unwrap().core_config;

        let restraint = config.restraint.unwrap();
        assert_eq!(restraint.pairs[0], WeightedPair { atoms: [4, 14], weight: 0.7 });
        assert!((restraint.force_constant() - 52_300.0).abs() < 1e-6);
        assert!((restraint.target() - 0.3).abs() < 1e-12);

        let embedding = config.embedding.unwrap();
        assert_eq!(
            embedding.region.selection,
            RegionSelection::AtomIndices("1804-1822,2083-2132".to_string())
        );
        assert_eq!(embedding.region.method, EmbeddingMethod::Mechanical);
        assert_eq!(embedding.calculator.method, EmbeddingMethod::Mechanical);
        assert_eq!(embedding.calculator.device, Device::Cuda);
        assert_eq!(
            embedding.calculator.model,
            Some(TEST_DIR.path().join("ani2x.model"))
        );
        let server = embedding.server.unwrap();
        assert_eq!(server.startup_wait, Duration::from_millis(500));
    }

    #[test]
    fn missing_input_is_a_config_error() {
        let path = write_config_file("no_input.toml", "[sampling]\nframes = 3\n");
        match build_config(&run_args(&path, &[]), None) {
            Err(CliError::Config(msg)) => assert!(msg.contains("input.topology")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn nonexistent_input_is_an_io_error() {
        let content = r#"
            [input]
            topology = "absent.prmtop"
            coordinates = "system.rst7"
        "#;
        let path = write_config_file("absent_input.toml", content);
        assert!(matches!(
            build_config(&run_args(&path, &[]), None),
            Err(CliError::Io(_))
        ));
    }

    #[test]
    fn restraint_without_target_is_rejected() {
        let content = format!(
            "{MINIMAL}
            [restraint]
            pairs = [\"0-1:1.0\"]
            force-constant = 10.0
            "
        );
        let path = write_config_file("no_target.toml", &content);
        match build_config(&run_args(&path, &[]), None) {
            Err(CliError::Config(msg)) => assert!(msg.contains("target")),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn fixed_atoms_needs_exactly_one_centre() {
        let content = format!(
            "{MINIMAL}
            [dynamics.fixed-atoms]
            centre = [1.0, 1.0, 1.0]
            centre-atom = 3
            radius-nm = 1.5
            "
        );
        let path = write_config_file("two_centres.toml", &content);
        assert!(matches!(
            build_config(&run_args(&path, &[]), None),
            Err(CliError::Config(_))
        ));
    }

    #[test]
    fn invalid_dynamics_values_surface_builder_errors() {
        let path = write_config_file("bad_timestep.toml", MINIMAL);
        let args = run_args(&path, &["-S", "dynamics.timestep-fs=-1"]);
        assert!(matches!(build_config(&args, None), Err(CliError::Config(_))));
    }
}
