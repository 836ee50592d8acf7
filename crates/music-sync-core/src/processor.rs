//! Per-file decision pipeline:
//! skip-check → route (DRM or plain) → fingerprint → dedup-check → move/copy → record.
//!
//! Nothing in here returns an error to the caller. Every failure becomes an
//! [`Outcome`] that is logged and, where applicable, written to the ledger.

use crate::config::{normalize_extension, SyncConfig};
use crate::fingerprint::Fingerprinter;
use crate::ledger::Ledger;
use crate::outcome::{is_success_tag, Outcome};
use crate::plugins::{self, DrmPlugin, PluginRegistry, PluginRunner};
use crate::transfer::{self, StagedFile};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, error, info, warn};

pub struct FileProcessor<'a> {
    ledger: &'a Ledger,
    plugins: &'a PluginRegistry,
    fingerprinter: &'a Fingerprinter,
    runner: &'a dyn PluginRunner,
    config: &'a SyncConfig,
    incoming: PathBuf,
}

/// Whole seconds since the epoch, truncated toward zero.
pub fn modification_time(path: &Path) -> io::Result<i64> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    })
}

/// Lowercase extension with its dot, empty when the file has none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| normalize_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl<'a> FileProcessor<'a> {
    pub fn new(
        ledger: &'a Ledger,
        plugins: &'a PluginRegistry,
        fingerprinter: &'a Fingerprinter,
        runner: &'a dyn PluginRunner,
        config: &'a SyncConfig,
    ) -> Self {
        Self {
            ledger,
            plugins,
            fingerprinter,
            runner,
            config,
            incoming: PathBuf::from(&config.music_incoming_dir),
        }
    }

    /// Run one discovered file through the pipeline. `source_root` is the
    /// configured root it was found under; it determines the destination layout.
    pub fn process_file(&self, path: &Path, source_root: &Path) -> Outcome {
        let path_str = path.to_string_lossy().into_owned();

        let mtime = match modification_time(path) {
            Ok(mtime) => mtime,
            Err(e) => {
                warn!("Cannot read modification time of {}: {}", path_str, e);
                let outcome = Outcome::StatFail(format!("{:?}", e.kind()));
                info!(path = path_str.as_str(), result = outcome.tag().as_str(), "LOG");
                return outcome;
            }
        };

        match self.ledger.previous_result(&path_str, mtime) {
            Ok(Some(prev)) if is_success_tag(&prev) => {
                return self.finish(&path_str, mtime, None, Outcome::SkipPathMtimeExists);
            }
            Ok(Some(prev)) => {
                info!(
                    "File {} was previously processed with result '{}'. Retrying.",
                    file_name(path),
                    prev
                );
            }
            Ok(None) => {}
            Err(e) => {
                error!("Ledger lookup failed for {}: {}", path_str, e);
                return Outcome::LedgerFail;
            }
        }

        let ext = extension_of(path);
        if let Some(plugin) = self.plugins.lookup(&ext) {
            self.handle_drm(path, &path_str, mtime, source_root, plugin)
        } else if self.config.is_music_extension(&ext) {
            self.handle_regular(path, &path_str, mtime, source_root)
        } else {
            info!("Skipping unsupported file type: {}", path_str);
            self.finish(&path_str, mtime, None, Outcome::UnsupportedType)
        }
    }

    fn handle_drm(
        &self,
        path: &Path,
        path_str: &str,
        mtime: i64,
        source_root: &Path,
        plugin: &DrmPlugin,
    ) -> Outcome {
        info!("Detecting DRM file ({}): {}", extension_of(path), path_str);

        let decrypted =
            match plugins::decrypt(self.runner, plugin, path, &self.config.music_extensions) {
                Ok(Some(decrypted)) => decrypted,
                Ok(None) => {
                    error!("No supported music file produced for {}", path_str);
                    return self.finish(path_str, mtime, None, Outcome::DedrmNoMusicFound);
                }
                Err(e) => {
                    error!("DRM plugin {} failed for {}: {}", plugin.name, file_name(path), e);
                    return self.finish(path_str, mtime, None, e.outcome());
                }
            };

        debug!(
            "Plugin {} produced {} in {}",
            plugin.name,
            file_name(decrypted.path()),
            decrypted.scratch_dir().display()
        );

        let content_hash = match self.fingerprinter.fingerprint(decrypted.path()) {
            Ok(hash) => hash,
            Err(_) => return self.finish(path_str, mtime, None, Outcome::Md5FailDedrm),
        };

        match self.ledger.has_ingested(&content_hash) {
            Ok(true) => return self.duplicate(path, path_str, mtime, &content_hash),
            Ok(false) => {}
            Err(e) => {
                error!("Ledger lookup failed for {}: {}", path_str, e);
                return Outcome::LedgerFail;
            }
        }

        let dest = transfer::decrypted_destination(
            &self.incoming,
            path,
            source_root,
            &decrypted.extension(),
        );
        let staged = match decrypted.stage_to(&dest) {
            Ok(staged) => staged,
            Err(e) => {
                error!(
                    "Unexpected error moving decrypted output of {} to {}: {}",
                    file_name(path),
                    dest.display(),
                    e
                );
                return self.finish(
                    path_str,
                    mtime,
                    Some(&content_hash),
                    Outcome::DedrmUnexpectedError(format!("{:?}", e.kind())),
                );
            }
        };

        self.commit(path, path_str, mtime, &content_hash, Outcome::DedrmSuccess, staged)
    }

    fn handle_regular(&self, path: &Path, path_str: &str, mtime: i64, source_root: &Path) -> Outcome {
        info!("Detecting music file: {}", path_str);

        let content_hash = match self.fingerprinter.fingerprint(path) {
            Ok(hash) => hash,
            Err(_) => return self.finish(path_str, mtime, None, Outcome::Md5FailCopy),
        };

        match self.ledger.has_ingested(&content_hash) {
            Ok(true) => return self.duplicate(path, path_str, mtime, &content_hash),
            Ok(false) => {}
            Err(e) => {
                error!("Ledger lookup failed for {}: {}", path_str, e);
                return Outcome::LedgerFail;
            }
        }

        let dest = transfer::copy_destination(&self.incoming, path, source_root);
        let staged = match transfer::stage_copy(path, &dest) {
            Ok(staged) => staged,
            Err(e) => {
                error!("Error copying {}: {}", file_name(path), e);
                return self.finish(
                    path_str,
                    mtime,
                    Some(&content_hash),
                    Outcome::CopyFail(format!("{:?}", e.kind())),
                );
            }
        };

        self.commit(path, path_str, mtime, &content_hash, Outcome::CopySuccess, staged)
    }

    /// Record hash + success atomically, then rename the staged file into
    /// place. A worker that loses the race for the hash drops its own staged
    /// file and reports a duplicate; the destination is never touched.
    fn commit(
        &self,
        path: &Path,
        path_str: &str,
        mtime: i64,
        content_hash: &str,
        outcome: Outcome,
        staged: StagedFile,
    ) -> Outcome {
        match self
            .ledger
            .commit_ingest(path_str, mtime, content_hash, &outcome.tag())
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("Discarding staged copy {}", staged.path().display());
                drop(staged);
                return self.duplicate(path, path_str, mtime, content_hash);
            }
            Err(e) => {
                error!("Ledger write failed for {}: {}", path_str, e);
                return Outcome::LedgerFail;
            }
        }

        let dest = staged.destination().to_path_buf();
        match staged.commit() {
            Ok(()) => {
                info!(
                    "Successfully {} {} to {}",
                    if outcome == Outcome::DedrmSuccess {
                        "decrypted and moved"
                    } else {
                        "copied"
                    },
                    file_name(path),
                    dest.display()
                );
                outcome
            }
            Err(e) => {
                error!(
                    "Could not move {} into place at {}: {}",
                    file_name(path),
                    dest.display(),
                    e
                );
                if let Err(e) = self.ledger.revoke_ingested(content_hash) {
                    error!("Could not revoke hash {}: {}", content_hash, e);
                }
                let kind = format!("{:?}", e.kind());
                let failed = if outcome == Outcome::DedrmSuccess {
                    Outcome::DedrmUnexpectedError(kind)
                } else {
                    Outcome::CopyFail(kind)
                };
                self.finish(path_str, mtime, Some(content_hash), failed)
            }
        }
    }

    fn duplicate(&self, path: &Path, path_str: &str, mtime: i64, content_hash: &str) -> Outcome {
        info!("Skipping already processed music (by hash): {}", file_name(path));
        let outcome = if self.config.persist_hash_skips {
            Outcome::SkipMusicHashRecorded
        } else {
            Outcome::SkipMusicHashExists
        };
        self.finish(path_str, mtime, Some(content_hash), outcome)
    }

    fn finish(&self, path_str: &str, mtime: i64, content_hash: Option<&str>, outcome: Outcome) -> Outcome {
        if let Err(e) = self.ledger.log_operation(
            path_str,
            mtime,
            content_hash,
            &outcome.tag(),
            outcome.is_persisted(),
        ) {
            error!("Ledger write failed for {} ({}): {}", path_str, outcome, e);
        }
        outcome
    }
}
