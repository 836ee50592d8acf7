pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod outcome;
pub mod plugins;
pub mod processor;
pub mod progress;
pub mod transfer;

pub use config::{DrmPluginConfig, SyncConfig};
pub use engine::{SyncEngine, SyncReport};
pub use error::Error;
pub use fingerprint::{AudioTool, FfmpegTool, Fingerprinter};
pub use ledger::Ledger;
pub use outcome::Outcome;
pub use plugins::{PluginRegistry, PluginRunner};
pub use processor::FileProcessor;
pub use progress::{ProgressReporter, SilentReporter};
