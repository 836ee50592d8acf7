use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Clone, Deserialize)]
pub struct DrmPluginConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub music_sources: Vec<String>,
    #[serde(default = "default_incoming_dir")]
    pub music_incoming_dir: String,
    #[serde(default = "default_database_file")]
    pub database_file: String,
    #[serde(default)]
    pub drm_plugins: Vec<DrmPluginConfig>,
    /// Ordered: earlier entries win when a plugin leaves several outputs.
    #[serde(default)]
    pub music_extensions: Vec<String>,
    #[serde(default)]
    pub plugin_dir: Option<String>,
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: String,
    /// Record duplicate-content skips durably so later runs stop at the path/mtime check.
    #[serde(default)]
    pub persist_hash_skips: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_incoming_dir() -> String {
    "music_incoming".to_string()
}

fn default_database_file() -> String {
    "music_sync.db".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe_path() -> String {
    "ffprobe".to_string()
}

fn default_workers() -> usize {
    1
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            music_sources: Vec::new(),
            music_incoming_dir: default_incoming_dir(),
            database_file: default_database_file(),
            drm_plugins: Vec::new(),
            music_extensions: Vec::new(),
            plugin_dir: None,
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            persist_hash_skips: false,
            workers: default_workers(),
        }
    }
}

impl SyncConfig {
    /// Lowercase and dot-prefix every extension, collapse nested source roots
    /// and clamp the worker count.
    pub fn normalized(mut self) -> Self {
        self.music_extensions = dedup_extensions(&self.music_extensions);
        for plugin in &mut self.drm_plugins {
            plugin.extensions = dedup_extensions(&plugin.extensions);
        }
        self.music_sources = non_overlapping_directories(self.music_sources);
        self.workers = self.workers.max(1);
        self
    }

    pub fn is_music_extension(&self, ext: &str) -> bool {
        self.extension_rank(ext).is_some()
    }

    /// Position of `ext` in the preference order, `None` when unrecognized.
    pub fn extension_rank(&self, ext: &str) -> Option<usize> {
        let ext = normalize_extension(ext);
        self.music_extensions.iter().position(|e| *e == ext)
    }
}

/// `"MP3"`, `".Mp3"` and `"mp3"` all become `".mp3"`.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim().to_lowercase();
    if trimmed.is_empty() || trimmed.starts_with('.') {
        trimmed
    } else {
        format!(".{}", trimmed)
    }
}

fn dedup_extensions(exts: &[String]) -> Vec<String> {
    let mut result: Vec<String> = Vec::with_capacity(exts.len());
    for ext in exts {
        let ext = normalize_extension(ext);
        if !ext.is_empty() && !result.contains(&ext) {
            result.push(ext);
        }
    }
    result
}

/// Explicit path first, then the working directory, then next to the executable.
pub fn find_config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let mut possible: Vec<PathBuf> = Vec::new();
    if let Some(path) = explicit {
        possible.push(path.to_path_buf());
    }
    if let Ok(cwd) = env::current_dir() {
        possible.push(cwd.join(CONFIG_FILE_NAME));
    }
    if let Some(exe_dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        possible.push(exe_dir.join(CONFIG_FILE_NAME));
    }

    for path in &possible {
        if path.is_file() {
            return Ok(path.clone());
        }
        debug!("No configuration at {}", path.display());
    }

    let tried: Vec<String> = possible.iter().map(|p| p.display().to_string()).collect();
    Err(ConfigError::Message(format!(
        "{} not found. Tried: {}",
        CONFIG_FILE_NAME,
        tried.join(", ")
    )))
}

pub fn load_configuration(explicit: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let path = find_config_path(explicit)?;
    info!("Loading configuration from: {}", path.display());
    load_configuration_from(&path)
}

pub fn load_configuration_from(path: &Path) -> Result<SyncConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path).required(true))
        .add_source(Environment::with_prefix("MUSIC_SYNC").separator("__"))
        .build()?;
    let config = builder.try_deserialize::<SyncConfig>()?;
    Ok(config.normalized())
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<String>) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();

    for dir in dirs {
        let dir_path = Path::new(&dir);

        if result.iter().any(|kept| dir_path.starts_with(Path::new(kept))) {
            continue;
        }

        result.retain(|kept| !Path::new(kept).starts_with(dir_path));
        result.push(dir);
    }

    result
}
