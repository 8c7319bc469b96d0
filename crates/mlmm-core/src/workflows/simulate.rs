use crate::core::io::dcd::{DcdHeader, DcdWriter};
use crate::core::io::load_amber;
use crate::engine::config::DynamicsConfig;
use crate::engine::dynamics::Dynamics;
use crate::engine::embedding::external::{ExternalCalculator, ExternalCalculatorConfig};
use crate::engine::embedding::server::{ServerConfig, ServerProcess};
use crate::engine::embedding::{EmbeddingConfig, EmbeddingError, EnergyBackend, bind};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::restraint::{RestraintConfig, WeightedDistanceRestraint};
use crate::engine::sampling::{self, SamplingPlan, SamplingSummary};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing::{info, instrument, warn};

/// The ML/QM region and the backend that evaluates it.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSetup {
    pub region: EmbeddingConfig,
    pub calculator: ExternalCalculatorConfig,
    /// Prediction server kept alive for the duration of the run.
    pub server: Option<ServerConfig>,
}

/// Everything a restrained production run needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    pub topology_path: PathBuf,
    pub coordinates_path: PathBuf,
    pub trajectory_path: PathBuf,
    pub embedding: Option<EmbeddingSetup>,
    pub restraint: Option<RestraintConfig>,
    pub dynamics: DynamicsConfig,
    pub sampling: SamplingPlan,
    /// First title line of the trajectory.
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub trajectory_path: PathBuf,
    pub atoms: usize,
    pub region_atoms: usize,
    pub sampling: SamplingSummary,
    /// Restraint parameters in effect during sampling, in kJ/mol/nm² and nm.
    pub restraint_parameters: Option<(f64, f64)>,
}

/// Runs the full pipeline: load, embed, restrain, integrate and write the trajectory.
///
/// A prediction server, if configured, is started before the backend is bound and
/// stopped when the run ends, whether it succeeded or not.
#[instrument(skip_all, name = "simulation_workflow")]
pub fn run(
    config: &SimulationConfig,
    reporter: &ProgressReporter,
    cancel: &AtomicBool,
) -> Result<SimulationResult, EngineError> {
    let server = match config.embedding.as_ref().and_then(|e| e.server.as_ref()) {
        Some(server_config) => {
            reporter.report(Progress::PhaseStart {
                name: "Starting prediction server",
            });
            let server = ServerProcess::start(server_config).map_err(EmbeddingError::from)?;
            reporter.report(Progress::PhaseFinish);
            Some(server)
        }
        None => None,
    };

    let backend = config.embedding.as_ref().map(|e| {
        Box::new(ExternalCalculator::new(e.calculator.clone())) as Box<dyn EnergyBackend>
    });
    let result = run_with_backend(config, backend, reporter, cancel);

    if let Some(server) = server {
        if let Err(e) = server.stop() {
            warn!("Prediction server did not stop cleanly: {}", e);
        }
    }
    result
}

/// Same as [`run`] but with a caller-supplied backend and no server management.
///
/// `backend` is only used when `config.embedding` is set.
#[instrument(skip_all, name = "simulation_workflow")]
pub fn run_with_backend(
    config: &SimulationConfig,
    backend: Option<Box<dyn EnergyBackend>>,
    reporter: &ProgressReporter,
    cancel: &AtomicBool,
) -> Result<SimulationResult, EngineError> {
    // === Phase 1: Load inputs ===
    reporter.report(Progress::PhaseStart { name: "Loading" });
    let (system, forcefield) = load_amber(&config.topology_path, &config.coordinates_path)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Bind the embedding region ===
    let (forcefield, engine) = match (&config.embedding, backend) {
        (Some(setup), Some(backend)) => {
            reporter.report(Progress::PhaseStart { name: "Binding" });
            let bound = bind(&system, &forcefield, &setup.region, backend)?;
            reporter.report(Progress::PhaseFinish);
            (bound.forcefield, Some(bound.engine))
        }
        (Some(_), None) => {
            return Err(EngineError::Initialization(
                "embedding is configured but no backend was supplied".to_string(),
            ));
        }
        (None, _) => (forcefield, None),
    };
    let region_atoms = engine.as_ref().map_or(0, |e| e.region().len());

    // === Phase 3: Build dynamics and inject the restraint ===
    reporter.report(Progress::PhaseStart { name: "Preparing dynamics" });
    let mut dynamics = Dynamics::new(&system, &forcefield, engine, config.dynamics.clone())?;
    let mut restraint_parameters = None;
    if let Some(restraint_config) = &config.restraint {
        let restraint = WeightedDistanceRestraint::new(restraint_config)?;
        restraint.check_atoms(system.atom_count())?;
        let (k_name, r0_name) = (
            restraint.force_constant_name().to_string(),
            restraint.target_name().to_string(),
        );

        let mut exported = dynamics.export();
        exported.add_force(Box::new(restraint));
        dynamics = Dynamics::from_exported(exported, config.dynamics.clone())?;

        let context = dynamics.context_mut();
        context.set_parameter(&k_name, restraint_config.force_constant())?;
        context.set_parameter(&r0_name, restraint_config.target())?;
        restraint_parameters = Some((context.parameter(&k_name)?, context.parameter(&r0_name)?));
        info!(
            k = restraint_config.force_constant(),
            r0 = restraint_config.target(),
            pairs = restraint_config.pairs.len(),
            "Injected collective-variable restraint"
        );
    }
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Sample ===
    reporter.report(Progress::PhaseStart { name: "Sampling" });
    let context = dynamics.context_mut();
    let interval = config.sampling.steps_per_frame;
    let first_step = if config.sampling.write_initial_frame {
        context.current_step()
    } else {
        context.current_step() + interval
    };
    let header = DcdHeader {
        atoms: system.atom_count(),
        first_step,
        interval,
        timestep_ps: context.integrator().timestep(),
        unit_cell: context.periodic_box().is_some(),
        title: config.title.clone(),
    };
    let mut writer = DcdWriter::create(&config.trajectory_path, header)?;
    let outcome = sampling::run(context, &mut writer, &config.sampling, reporter, cancel);
    let frames_on_disk = writer.finish();
    reporter.report(Progress::PhaseFinish);

    let summary = outcome?;
    let frames_on_disk = frames_on_disk?;
    if frames_on_disk != summary.frames_written {
        return Err(EngineError::Internal(format!(
            "wrote {} frames but the trajectory holds {}",
            summary.frames_written, frames_on_disk
        )));
    }

    info!(
        path = %config.trajectory_path.display(),
        frames = summary.frames_written,
        "Simulation finished"
    );
    Ok(SimulationResult {
        trajectory_path: config.trajectory_path.clone(),
        atoms: system.atom_count(),
        region_atoms,
        sampling: summary,
        restraint_parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::dcd::DcdReader;
    use crate::core::io::prmtop::tests::water_and_ion_prmtop;
    use crate::core::io::rst7::tests::water_and_ion_rst7;
    use crate::engine::config::{ConstraintPolicy, DynamicsConfigBuilder};
    use crate::engine::embedding::backend::tests::{MisconfiguredBackend, TetherBackend};
    use crate::engine::embedding::{EmbeddingMethod, RegionSelection};
    use crate::engine::restraint::WeightedPair;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> SimulationConfig {
        let topology_path = dir.path().join("system.prmtop");
        let coordinates_path = dir.path().join("system.rst7");
        std::fs::write(&topology_path, water_and_ion_prmtop()).unwrap();
        std::fs::write(&coordinates_path, water_and_ion_rst7()).unwrap();
        SimulationConfig {
            topology_path,
            coordinates_path,
            trajectory_path: dir.path().join("traj.dcd"),
            embedding: None,
            restraint: Some(RestraintConfig::new(
                vec![
                    WeightedPair {
                        atoms: [0, 3],
                        weight: 0.7,
                    },
                    WeightedPair {
                        atoms: [1, 3],
                        weight: 0.3,
                    },
                ],
                125.0,
                8.5,
            )),
            dynamics: DynamicsConfigBuilder::new()
                .timestep_fs(0.5)
                .temperature(300.0)
                .seed(Some(11))
                .build()
                .unwrap(),
            sampling: SamplingPlan::new(2, 5),
            title: "workflow test".to_string(),
        }
    }

    fn embedding() -> EmbeddingSetup {
        EmbeddingSetup {
            region: EmbeddingConfig::new(RegionSelection::Molecule(0)),
            calculator: ExternalCalculatorConfig::new(vec!["unused".to_string()]),
            server: None,
        }
    }

    #[test]
    fn restrained_run_writes_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let result = run(&config, &ProgressReporter::new(), &AtomicBool::new(false)).unwrap();

        assert_eq!(result.atoms, 4);
        assert_eq!(result.region_atoms, 0);
        assert_eq!(result.sampling.frames_written, 5);
        assert_eq!(result.sampling.steps_taken, 10);
        let (k, r0) = result.restraint_parameters.unwrap();
        assert!((k - 52_300.0).abs() < 1e-6);
        assert!((r0 - 0.85).abs() < 1e-12);

        let reader = DcdReader::open(&config.trajectory_path).unwrap();
        let summary = reader.summary();
        assert_eq!(summary.frames, 5);
        assert_eq!(summary.atoms, 4);
        assert_eq!(summary.first_step, 2);
        assert_eq!(summary.interval, 2);
        assert!(!summary.has_unit_cell);
    }

    #[test]
    fn embedded_run_consults_the_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.embedding = Some(embedding());
        config.dynamics.constraints = ConstraintPolicy::HBonds;
        let backend = Box::new(TetherBackend {
            k: 10.0,
            ..Default::default()
        });
        let result = run_with_backend(
            &config,
            Some(backend),
            &ProgressReporter::new(),
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(result.region_atoms, 3);
        assert_eq!(result.sampling.frames_written, 5);
    }

    #[test]
    fn misconfigured_backend_fails_before_any_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.embedding = Some(embedding());
        let result = run_with_backend(
            &config,
            Some(Box::new(MisconfiguredBackend)),
            &ProgressReporter::new(),
            &AtomicBool::new(false),
        );
        assert!(matches!(result, Err(EngineError::Embedding { .. })));
        assert!(!config.trajectory_path.exists());
    }

    #[test]
    fn mechanical_embedding_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        let mut setup = embedding();
        setup.region.method = EmbeddingMethod::Mechanical;
        config.embedding = Some(setup);
        let result = run_with_backend(
            &config,
            Some(Box::new(TetherBackend::default())),
            &ProgressReporter::new(),
            &AtomicBool::new(false),
        )
        .unwrap();
        assert_eq!(result.region_atoms, 3);
    }

    #[test]
    fn cancelled_run_leaves_a_valid_trajectory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.sampling = SamplingPlan::new(1, 50).with_initial_frame(true);
        let cancel = AtomicBool::new(false);
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Frame { index: 3, .. } = event {
                cancel.store(true, Ordering::Relaxed);
            }
        }));
        let result = run(&config, &reporter, &cancel);
        assert!(matches!(result, Err(EngineError::Cancelled { frames: 4 })));

        let reader = DcdReader::open(&config.trajectory_path).unwrap();
        assert_eq!(reader.summary().frames, 4);
        assert_eq!(reader.summary().first_step, 0);
    }

    #[test]
    fn phases_are_reported_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let phases = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PhaseStart { name } = event {
                phases.lock().unwrap().push(name);
            }
        }));
        run(&config, &reporter, &AtomicBool::new(false)).unwrap();
        assert_eq!(
            *phases.lock().unwrap(),
            vec!["Loading", "Preparing dynamics", "Sampling"]
        );
    }

    #[test]
    fn missing_topology_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(&dir);
        config.topology_path = dir.path().join("absent.prmtop");
        let result = run(&config, &ProgressReporter::new(), &AtomicBool::new(false));
        assert!(matches!(result, Err(EngineError::Amber { .. })));
    }
}
