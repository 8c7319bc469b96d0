use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "mlmm - restrained ML/MM and QM/MM molecular dynamics with external embedding backends.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Set the number of threads for parallel force evaluation.
    /// Defaults to the number of available logical cores.
    #[arg(short = 'j', long, global = true, value_name = "NUM")]
    pub threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run restrained molecular dynamics and write a DCD trajectory.
    Run(RunArgs),
    /// Report the RMSE of embedding-model energies against QM references.
    Analyze(AnalyzeArgs),
    /// Print the header of a DCD trajectory.
    Inspect(InspectArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the run configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the number of frames to write.
    #[arg(long, value_name = "INT")]
    pub frames: Option<usize>,

    /// Override the number of integration steps between frames.
    #[arg(long, value_name = "INT")]
    pub steps_per_frame: Option<u64>,

    /// Override the output trajectory path.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Seed for the thermostat and initial velocities.
    #[arg(long, value_name = "INT")]
    pub seed: Option<u64>,

    /// Override `sampling.initial-frame` from the config file.
    #[command(flatten)]
    pub initial_frame: InitialFrame,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S dynamics.temperature=310
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Mutually exclusive flags for writing the starting structure as frame 0.
#[derive(Args, Debug, Clone, Copy)]
#[group(required = false, multiple = false)]
pub struct InitialFrame {
    /// Write the starting positions before the first integration step.
    #[arg(long)]
    pub initial_frame: bool,
    /// Do not write the starting positions.
    #[arg(long)]
    pub no_initial_frame: bool,
}

/// Arguments for the `analyze` subcommand.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Results file with `e_static_qm`, `e_static_emle`, `e_ind_qm` and `e_ind_emle`
    /// (MATLAB `.mat` or `.csv`).
    #[arg(required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Multiply every energy by this factor before comparing (e.g. 627.5 for
    /// Hartree to kcal/mol).
    #[arg(long, value_name = "FLOAT", default_value_t = 1.0)]
    pub scale: f64,

    /// Unit label printed next to the errors.
    #[arg(long, value_name = "LABEL", default_value = "Eh")]
    pub units: String,
}

/// Arguments for the `inspect` subcommand.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Trajectory to inspect.
    #[arg(required = true, value_name = "PATH")]
    pub trajectory: PathBuf,
}
