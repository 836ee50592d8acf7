use indicatif::{ProgressBar, ProgressStyle};
use music_sync_core::{Outcome, ProgressReporter, SyncReport};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// CLI progress reporter: one bar per source root, sized from the walk.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.guard();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.guard().take() {
            pb.finish_and_clear();
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.cyan} {prefix} [{bar:30.cyan/dim}] {pos}/{len} files ({eta} remaining)",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
}

impl ProgressReporter for CliReporter {
    fn on_source_start(&self, root: &str, file_count: usize) {
        let pb = ProgressBar::new(file_count as u64);
        pb.set_style(bar_style());
        pb.set_prefix(root.to_string());
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_source_missing(&self, root: &str) {
        eprintln!("  \x1b[33m!\x1b[0m Source directory not found: {}", root);
    }

    fn on_file_processed(&self, _path: &Path, _outcome: &Outcome) {
        if let Some(pb) = self.guard().as_ref() {
            pb.inc(1);
        }
    }

    fn on_source_complete(&self, root: &str, file_count: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {}: {} files in {:.2}s",
            root, file_count, duration_secs
        );
    }

    fn on_sync_complete(&self, _report: &SyncReport) {
        self.finish_bar();
    }
}
