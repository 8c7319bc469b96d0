use crate::cli::RunArgs;
use crate::config::build_config;
use crate::error::{CliError, Result};
use crate::ui::{CliProgressHandler, UiEvent};
use mlmm::engine::error::EngineError;
use mlmm::engine::progress::ProgressReporter;
use mlmm::workflows::simulate::{self, SimulationConfig, SimulationResult};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn run(
    args: RunArgs,
    threads: Option<usize>,
    ui_sender: mpsc::Sender<UiEvent>,
) -> Result<()> {
    info!("Merging configuration from file and CLI arguments...");
    let app_config = build_config(&args, threads)?;
    let config = app_config.core_config;
    info!(
        "Loaded run configuration from {}",
        app_config.config_path.display()
    );
    println!("{}", describe(&config));

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current frame.");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let handler = CliProgressHandler::new(ui_sender);
    let worker_config = config.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let reporter = ProgressReporter::with_callback(handler.get_callback());
        simulate::run(&worker_config, &reporter, &cancel)
    })
    .await
    .map_err(|e| CliError::Other(anyhow::anyhow!("Simulation task failed: {}", e)))?;
    signal_task.abort();

    match outcome {
        Ok(result) => {
            println!("{}", summarize(&result));
            Ok(())
        }
        Err(EngineError::Cancelled { frames }) => Err(CliError::Interrupted(format!(
            "stopped after {} frame(s); {} holds a valid trajectory",
            frames,
            config.trajectory_path.display()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn describe(config: &SimulationConfig) -> String {
    let mut lines = vec![format!(
        "Running {} frame(s) x {} step(s) at {} fs, {} K ({})",
        config.sampling.total_frames(),
        config.sampling.steps_per_frame,
        config.dynamics.timestep_fs,
        config.dynamics.temperature,
        config.dynamics.integrator
    )];
    if let Some(embedding) = &config.embedding {
        lines.push(format!(
            "  Embedding: {} region '{}' via '{}'",
            embedding.region.method,
            embedding.region.selection,
            embedding.calculator.command.join(" ")
        ));
    }
    if let Some(restraint) = &config.restraint {
        lines.push(format!(
            "  Restraint: {} pair(s), k = {} kcal/mol/Å², r0 = {} Å",
            restraint.pairs.len(),
            restraint.force_constant_kcal_per_mol_a2,
            restraint.target_angstrom
        ));
    }
    lines.join("\n")
}

fn summarize(result: &SimulationResult) -> String {
    format!(
        "✓ Wrote {} frame(s) ({} steps) to {}\n  Final potential energy: {:.3} kJ/mol\n  Final temperature: {:.2} K",
        result.sampling.frames_written,
        result.sampling.steps_taken,
        result.trajectory_path.display(),
        result.sampling.final_potential_energy,
        result.sampling.final_temperature
    )
}
