use crate::config::SyncConfig;
use crate::error::Error;
use crate::fingerprint::{AudioTool, FfmpegTool, Fingerprinter};
use crate::ledger::Ledger;
use crate::outcome::Outcome;
use crate::plugins::{self, PluginRegistry, PluginRunner, ProcessPluginRunner};
use crate::processor::FileProcessor;
use crate::progress::ProgressReporter;
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

pub struct SyncEngine {
    config: SyncConfig,
    audio_tool: Arc<dyn AudioTool>,
    plugin_runner: Arc<dyn PluginRunner>,
    plugin_search_dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub duration: Duration,
    pub files_seen: usize,
    pub copied: usize,
    pub decrypted: usize,
    pub skipped_unchanged: usize,
    pub duplicates: usize,
    pub unsupported: usize,
    pub failed: usize,
    pub missing_sources: usize,
}

impl SyncReport {
    fn tally(&mut self, outcome: &Outcome) {
        self.files_seen += 1;
        match outcome {
            Outcome::CopySuccess => self.copied += 1,
            Outcome::DedrmSuccess => self.decrypted += 1,
            Outcome::SkipPathMtimeExists => self.skipped_unchanged += 1,
            Outcome::SkipMusicHashExists | Outcome::SkipMusicHashRecorded => self.duplicates += 1,
            Outcome::UnsupportedType => self.unsupported += 1,
            _ => self.failed += 1,
        }
    }

    /// Files newly placed in the incoming directory.
    pub fn ingested(&self) -> usize {
        self.copied + self.decrypted
    }
}

impl SyncEngine {
    /// Expects an already normalized config.
    pub fn new(config: SyncConfig) -> Self {
        let audio_tool = Arc::new(FfmpegTool::new(&config.ffmpeg_path, &config.ffprobe_path));
        Self {
            config,
            audio_tool,
            plugin_runner: Arc::new(ProcessPluginRunner::default()),
            plugin_search_dirs: None,
        }
    }

    pub fn with_audio_tool(mut self, tool: Arc<dyn AudioTool>) -> Self {
        self.audio_tool = tool;
        self
    }

    pub fn with_plugin_runner(mut self, runner: Arc<dyn PluginRunner>) -> Self {
        self.plugin_runner = runner;
        self
    }

    pub fn with_plugin_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.plugin_search_dirs = Some(dirs);
        self
    }

    pub fn resolve_plugins(&self) -> PluginRegistry {
        let search_dirs = match &self.plugin_search_dirs {
            Some(dirs) => dirs.clone(),
            None => plugins::default_search_dirs(self.config.plugin_dir.as_deref()),
        };
        debug!("DRM plugin search path: {:?}", search_dirs);
        PluginRegistry::resolve(&self.config.drm_plugins, &search_dirs)
    }

    /// One full pass over every configured source root:
    /// 1. Create the incoming directory and open the ledger (fatal on failure)
    /// 2. Resolve DRM plugins
    /// 3. Walk each root and run every file through the processor
    ///
    /// Per-file failures end up in the report, never in the returned error.
    pub fn sync(&self, reporter: &dyn ProgressReporter) -> Result<SyncReport, Error> {
        let start = Instant::now();
        info!("--- Starting music synchronization ---");

        let incoming = PathBuf::from(&self.config.music_incoming_dir);
        fs::create_dir_all(&incoming).map_err(|source| Error::IncomingDir {
            path: self.config.music_incoming_dir.clone(),
            source,
        })?;

        let ledger = Ledger::open(&self.config.database_file)?;
        let registry = self.resolve_plugins();
        let fingerprinter = Fingerprinter::new(self.audio_tool.clone());
        let processor = FileProcessor::new(
            &ledger,
            &registry,
            &fingerprinter,
            self.plugin_runner.as_ref(),
            &self.config,
        );

        let pool = if self.config.workers > 1 {
            info!("Processing with {} workers", self.config.workers);
            Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(self.config.workers)
                    .build()
                    .map_err(|e| Error::Other(format!("Cannot start worker pool: {}", e)))?,
            )
        } else {
            None
        };

        let mut report = SyncReport::default();
        reporter.on_sync_start(self.config.music_sources.len());

        for source in &self.config.music_sources {
            let root = Path::new(source);
            if !root.is_dir() {
                warn!("Source directory not found: {}. Skipping.", source);
                report.missing_sources += 1;
                reporter.on_source_missing(source);
                continue;
            }

            info!("--- Processing files from: {} ---", source);
            let source_start = Instant::now();
            let files = collect_files(root);
            reporter.on_source_start(source, files.len());

            let outcomes: Vec<Outcome> = match &pool {
                Some(pool) => pool.install(|| {
                    files
                        .par_iter()
                        .map(|file| {
                            let outcome = processor.process_file(file, root);
                            reporter.on_file_processed(file, &outcome);
                            outcome
                        })
                        .collect()
                }),
                None => files
                    .iter()
                    .map(|file| {
                        let outcome = processor.process_file(file, root);
                        reporter.on_file_processed(file, &outcome);
                        outcome
                    })
                    .collect(),
            };

            for outcome in &outcomes {
                report.tally(outcome);
            }
            reporter.on_source_complete(
                source,
                files.len(),
                source_start.elapsed().as_secs_f64(),
            );
        }

        report.duration = start.elapsed();
        info!(
            "--- Music synchronization complete: {} ingested, {} duplicates, {} failed in {:.2}s ---",
            report.ingested(),
            report.duplicates,
            report.failed,
            report.duration.as_secs_f64()
        );
        reporter.on_sync_complete(&report);
        Ok(report)
    }
}

/// Every regular file under `root`, in a stable order. Unreadable entries are
/// logged and skipped.
pub fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("Error walking {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| {
            entry.file_type().is_file() || (entry.path_is_symlink() && entry.path().is_file())
        })
        .map(|entry| entry.into_path())
        .collect()
}
