use super::DrmPlugin;
use crate::command::{run_with_timeout, RunError};
use crate::config::normalize_extension;
use crate::outcome::Outcome;
use crate::transfer::{self, StagedFile};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, error};
use walkdir::WalkDir;

pub const PLUGIN_TIMEOUT: Duration = Duration::from_secs(120);
const SCRATCH_PREFIX: &str = "drm_output_";

#[derive(Error, Debug)]
pub enum DecryptError {
    #[error("plugin exited with code {code}: {stderr}")]
    PluginError { code: i32, stderr: String },

    #[error("plugin script '{0}' not found or not executable")]
    ScriptNotFound(String),

    #[error("plugin timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected error: {0}")]
    Unexpected(#[from] io::Error),
}

impl DecryptError {
    pub fn outcome(&self) -> Outcome {
        match self {
            DecryptError::PluginError { code, .. } => Outcome::DedrmFailPluginError(*code),
            DecryptError::ScriptNotFound(_) => Outcome::PluginScriptNotFound,
            DecryptError::Timeout(_) => Outcome::DedrmTimeout,
            DecryptError::Unexpected(e) => Outcome::DedrmUnexpectedError(format!("{:?}", e.kind())),
        }
    }
}

/// Invokes a plugin as `<executable> <source> <output_dir>`.
pub trait PluginRunner: Send + Sync {
    fn run(&self, plugin: &DrmPlugin, source: &Path, output_dir: &Path) -> Result<(), DecryptError>;
}

#[derive(Debug, Clone)]
pub struct ProcessPluginRunner {
    timeout: Duration,
}

impl Default for ProcessPluginRunner {
    fn default() -> Self {
        Self {
            timeout: PLUGIN_TIMEOUT,
        }
    }
}

impl ProcessPluginRunner {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl PluginRunner for ProcessPluginRunner {
    fn run(&self, plugin: &DrmPlugin, source: &Path, output_dir: &Path) -> Result<(), DecryptError> {
        debug!("Running DRM plugin {} on {}", plugin.name, source.display());
        let output = run_with_timeout(
            Command::new(&plugin.executable).arg(source).arg(output_dir),
            self.timeout,
        )
        .map_err(|e| match e {
            RunError::NotFound(_) => {
                DecryptError::ScriptNotFound(plugin.executable.display().to_string())
            }
            RunError::Timeout(after) => DecryptError::Timeout(after),
            RunError::Io(e) => DecryptError::Unexpected(e),
        })?;

        if !output.stdout.trim().is_empty() {
            debug!("  Plugin stdout: {}", output.stdout.trim());
        }
        if !output.stderr.trim().is_empty() {
            debug!("  Plugin stderr: {}", output.stderr.trim());
        }

        if !output.success() {
            let stderr = output.error_excerpt();
            error!("Error calling DRM plugin {} for {}: {}", plugin.name, source.display(), stderr);
            return Err(DecryptError::PluginError {
                code: exit_code(&output.status),
                stderr,
            });
        }
        Ok(())
    }
}

/// Signal deaths are reported as the negated signal number.
fn exit_code(status: &ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

/// A plugin output still inside its scratch directory. The directory is
/// removed when this value is dropped, whether or not the file was moved out.
#[derive(Debug)]
pub struct DecryptedFile {
    path: PathBuf,
    scratch: TempDir,
}

impl DecryptedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Extension of the produced file including the dot, as written by the plugin.
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Move the output beside `dest` under a staging name, then drop the
    /// scratch directory.
    pub fn stage_to(self, dest: &Path) -> io::Result<StagedFile> {
        transfer::stage_move(&self.path, dest)
    }
}

/// Run `plugin` on `source` in a fresh scratch directory and pick the best
/// recognized audio output. `Ok(None)` means the plugin succeeded but left no
/// usable file; the scratch directory is already gone in that case.
pub fn decrypt(
    runner: &dyn PluginRunner,
    plugin: &DrmPlugin,
    source: &Path,
    music_extensions: &[String],
) -> Result<Option<DecryptedFile>, DecryptError> {
    let scratch = tempfile::Builder::new().prefix(SCRATCH_PREFIX).tempdir()?;
    runner.run(plugin, source, scratch.path())?;

    Ok(pick_output(scratch.path(), music_extensions).map(|path| DecryptedFile { path, scratch }))
}

/// Recognized file with the best-ranked extension; path order breaks ties.
pub fn pick_output(dir: &Path, music_extensions: &[String]) -> Option<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let ext = entry
                .path()
                .extension()
                .map(|e| normalize_extension(&e.to_string_lossy()))?;
            let rank = music_extensions.iter().position(|m| *m == ext)?;
            Some((rank, entry.into_path()))
        })
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)))
        .map(|(_, path)| path)
}
