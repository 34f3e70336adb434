//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// tumorseg - volumetric tumor segmentation pipeline
#[derive(Parser, Debug)]
#[command(
    name = "tumorseg",
    author,
    version,
    about = "Volumetric tumor segmentation pipeline",
    long_about = "Segments multimodal 3-D imaging series into tissue classes, measures \n\
                  per-class volumes, persists masks and metrics per job, and tracks \n\
                  job lifecycle and per-clinician statistics."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "TUMORSEG_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "TUMORSEG_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a batch of segmentation jobs from a manifest
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),

    /// Write synthetic phantom volumes into a storage root
    Synth(SynthArgs),

    /// Inspect or validate job records
    Job(JobArgs),

    /// Per-clinician statistics
    Stats(StatsArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(short, long, default_value = "config.toml", env = "TUMORSEG_CONFIG")]
    pub config: PathBuf,

    /// Batch manifest listing patients and jobs (TOML or JSON)
    #[arg(short, long, env = "TUMORSEG_MANIFEST")]
    pub manifest: PathBuf,

    /// Override the artifact output directory
    #[arg(long, env = "TUMORSEG_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Override the job record directory
    #[arg(long, env = "TUMORSEG_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Jobs processed concurrently
    #[arg(long, default_value = "2", env = "TUMORSEG_MAX_CONCURRENT_JOBS")]
    pub max_concurrent_jobs: usize,

    /// Batch timeout in seconds (0 = no timeout)
    #[arg(long, default_value = "0", env = "TUMORSEG_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and manifest, then exit
    #[arg(long)]
    pub dry_run: bool,

    /// Channel buffer size for job events
    #[arg(long, default_value = "100", env = "TUMORSEG_BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Metrics server port (0 = disabled)
    #[arg(long, default_value = "0", env = "TUMORSEG_METRICS_PORT")]
    pub metrics_port: u16,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show sink configuration
    #[arg(long)]
    pub sinks: bool,
}

/// Arguments for the `synth` command
#[derive(Parser, Debug)]
pub struct SynthArgs {
    /// Storage root; defaults to `loader.storage_root` of the configuration
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Configuration supplying the modality list and storage root
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "phantom-001")]
    pub patient: String,

    #[arg(long, default_value = "series-001")]
    pub series: String,

    /// Volume dimensions
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [32, 32, 32])]
    pub shape: Vec<usize>,

    /// Voxel spacing in mm
    #[arg(long, num_args = 3, value_names = ["X", "Y", "Z"], default_values_t = [1.0, 1.0, 1.0])]
    pub spacing: Vec<f64>,

    /// Modalities to write (overrides the configuration)
    #[arg(long, value_delimiter = ',')]
    pub modalities: Vec<String>,

    /// Deterministic texture amplitude
    #[arg(long, default_value = "0.0")]
    pub texture: f32,

    /// Also write the ground-truth mask next to the series
    #[arg(long)]
    pub truth: bool,
}

/// Arguments for the `job` command
#[derive(Parser, Debug)]
pub struct JobArgs {
    /// Configuration naming the job record directory
    #[arg(short, long, default_value = "config.toml", global = true, env = "TUMORSEG_CONFIG")]
    pub config: PathBuf,

    /// Override the job record directory
    #[arg(long, global = true, env = "TUMORSEG_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: JobCommand,
}

#[derive(Subcommand, Debug)]
pub enum JobCommand {
    /// Show a job's lifecycle status
    Status { job_id: String },

    /// Show a completed job's metrics
    Result { job_id: String },

    /// Accept a completed job as its assigned clinician
    Validate {
        job_id: String,

        #[arg(long)]
        clinician: String,
    },

    /// List jobs, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
}

/// Arguments for the `stats` command
#[derive(Parser, Debug)]
pub struct StatsArgs {
    /// Configuration naming the job record directory
    #[arg(short, long, default_value = "config.toml", env = "TUMORSEG_CONFIG")]
    pub config: PathBuf,

    /// Override the job record directory
    #[arg(long, env = "TUMORSEG_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    #[arg(long)]
    pub clinician: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}
