use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "music-sync")]
#[command(about = "Collect music from backup folders into one deduplicated incoming directory", long_about = None)]
pub struct Cli {
    /// Path to config.yaml (default: working directory, then next to the executable)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Sync every configured source into the incoming directory (default)
    Sync,
    /// Show ledger counts per result
    Status,
    /// Show the most recent processing records
    History {
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
        /// Show every record for one source path instead
        #[arg(long)]
        path: Option<String>,
    },
    /// List resolved DRM plugins
    Plugins,
    /// Verify ffmpeg and ffprobe are runnable
    CheckTools,
    /// Print configuration values
    PrintConfig,
    /// Delete failed records so those files are retried even if unchanged
    ForgetFailures,
    /// Truncate all ledger tables
    ResetLedger,
}
