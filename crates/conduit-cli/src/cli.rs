use std::path::PathBuf;

use clap::{Parser, Subcommand};

use conduit_core::domain::{JobKind, JobStatus};

#[derive(Parser)]
#[command(name = "conduit")]
#[command(about = "Integration job lifecycle: inspect, sweep and run jobs in a SQLite job store.")]
pub(crate) struct Cli {
    /// YAML config file (defaults apply when omitted).
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    /// SQLite database; overrides `store.sqlite_path` (default: conduit.db).
    #[arg(long, global = true)]
    pub(crate) db: Option<PathBuf>,

    /// Log as JSON lines on stderr.
    #[arg(long, global = true)]
    pub(crate) json_logs: bool,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the status of one job.
    Status {
        /// Job id (job-<ULID>).
        job_id: String,
    },
    /// List jobs in one status, oldest first.
    List {
        #[arg(long, default_value = "PROCESSING")]
        status: JobStatus,

        /// Only jobs of this kind (EXPORT, IMPORT, FILE_IMPORT).
        #[arg(long)]
        kind: Option<JobKind>,

        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Number of jobs per status.
    Counts,
    /// Cancel a PENDING or PROCESSING job.
    Cancel { job_id: String },
    /// Run one stuck-job sweep and exit.
    Sweep,
    /// Run one retention purge and exit.
    Purge,
    /// Run the reclaimer loops until Ctrl+C.
    Serve,
    /// Submit sample jobs against a simulated partner and wait for them.
    Demo {
        /// Calls the simulated partner fails before it starts succeeding.
        #[arg(long, default_value_t = 1)]
        failures: u32,

        /// Simulated partner latency in milliseconds.
        #[arg(long, default_value_t = 200)]
        latency_ms: u64,
    },
}
