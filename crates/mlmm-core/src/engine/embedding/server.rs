use super::backend::BackendError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// A long-lived prediction server started before a run and stopped afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Program and arguments that start the server.
    pub start: Vec<String>,
    /// Optional program and arguments that ask the server to shut down.
    pub stop: Option<Vec<String>>,
    pub working_dir: Option<PathBuf>,
    /// File that receives the server's stdout and stderr.
    pub log_file: Option<PathBuf>,
    /// How long to wait after launching before the server is considered up.
    pub startup_wait: Duration,
    pub environment: Vec<(String, String)>,
}

impl ServerConfig {
    pub fn new(start: Vec<String>) -> Self {
        Self {
            start,
            stop: None,
            working_dir: None,
            log_file: None,
            startup_wait: Duration::from_secs(2),
            environment: Vec::new(),
        }
    }
}

/// Handle to a running server process.
///
/// The process is killed when the handle is dropped without calling
/// [`ServerProcess::stop`].
#[derive(Debug)]
pub struct ServerProcess {
    handle: Option<duct::Handle>,
    stop: Option<Vec<String>>,
    working_dir: Option<PathBuf>,
    name: String,
}

fn expression(
    command: &[String],
    working_dir: Option<&PathBuf>,
) -> Result<duct::Expression, BackendError> {
    let (program, args) = command.split_first().ok_or(BackendError::EmptyCommand)?;
    let mut expression = duct::cmd(program, args).unchecked();
    if let Some(dir) = working_dir {
        expression = expression.dir(dir);
    }
    Ok(expression)
}

impl ServerProcess {
    /// Launches the server and waits `startup_wait` for it to come up.
    ///
    /// # Errors
    ///
    /// Fails if the command cannot be spawned or the process exits during the wait.
    pub fn start(config: &ServerConfig) -> Result<Self, BackendError> {
        let name = config.start.join(" ");
        let mut expr = expression(&config.start, config.working_dir.as_ref())?;
        for (key, value) in &config.environment {
            expr = expr.env(key, value);
        }
        expr = match &config.log_file {
            Some(path) => expr.stdout_path(path).stderr_to_stdout(),
            None => expr.stdout_null().stderr_null(),
        };

        let handle = expr.start().map_err(|source| BackendError::Spawn {
            command: name.clone(),
            source,
        })?;
        info!(command = %name, "Started prediction server");

        std::thread::sleep(config.startup_wait);
        match handle.try_wait() {
            Ok(None) => {}
            Ok(Some(output)) => return Err(BackendError::ServerExited(output.status.code())),
            Err(e) => {
                if let Err(kill_error) = handle.kill() {
                    warn!("Failed to kill prediction server: {}", kill_error);
                }
                return Err(e.into());
            }
        }

        Ok(Self {
            handle: Some(handle),
            stop: config.stop.clone(),
            working_dir: config.working_dir.clone(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|h| matches!(h.try_wait(), Ok(None)))
    }

    /// Runs the stop command, if any, then makes sure the process is gone.
    ///
    /// The process is killed even when the stop command fails; that failure is still
    /// returned.
    pub fn stop(mut self) -> Result<(), BackendError> {
        let requested = match &self.stop {
            Some(stop) => run_stop_command(stop, self.working_dir.as_ref()),
            None => Ok(()),
        };
        let Some(handle) = self.handle.take() else {
            return requested;
        };
        match handle.try_wait() {
            Ok(Some(_)) => {}
            _ => handle.kill()?,
        }
        info!(command = %self.name, "Stopped prediction server");
        requested
    }
}

fn run_stop_command(stop: &[String], working_dir: Option<&PathBuf>) -> Result<(), BackendError> {
    let output = expression(stop, working_dir)?
        .stdout_capture()
        .stderr_capture()
        .run()
        .map_err(|source| BackendError::Spawn {
            command: stop.join(" "),
            source,
        })?;
    if !output.status.success() {
        warn!(
            status = ?output.status.code(),
            "Server stop command failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Ok(None) = handle.try_wait() {
                warn!(command = %self.name, "Killing prediction server that was not stopped");
                if let Err(e) = handle.kill() {
                    warn!("Failed to kill prediction server: {}", e);
                }
            }
        }
    }
}
