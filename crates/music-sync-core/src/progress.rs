use crate::engine::SyncReport;
use crate::outcome::Outcome;
use std::path::Path;

/// Trait for reporting sync progress.
///
/// The CLI implements it with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_sync_start(&self, _source_count: usize) {}
    fn on_source_start(&self, _root: &str, _file_count: usize) {}
    fn on_source_missing(&self, _root: &str) {}
    fn on_file_processed(&self, _path: &Path, _outcome: &Outcome) {}
    fn on_source_complete(&self, _root: &str, _file_count: usize, _duration_secs: f64) {}
    fn on_sync_complete(&self, _report: &SyncReport) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
