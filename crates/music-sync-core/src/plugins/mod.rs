//! DRM decryption plugins: external executables looked up by file extension.

pub mod runner;

use crate::config::{normalize_extension, DrmPluginConfig};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use runner::{decrypt, DecryptError, DecryptedFile, PluginRunner, ProcessPluginRunner};

const SCRIPT_SUFFIXES: [&str; 3] = ["", ".sh", ".bash"];
pub const DEFAULT_PLUGIN_DIR: &str = "drm_plugins";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrmPlugin {
    pub name: String,
    pub extensions: BTreeSet<String>,
    pub executable: PathBuf,
}

/// Extension → plugin map, built once before any file is processed.
#[derive(Debug, Default, Clone)]
pub struct PluginRegistry {
    by_extension: HashMap<String, Arc<DrmPlugin>>,
    plugins: Vec<Arc<DrmPlugin>>,
    unresolved: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every enabled plugin against `search_dirs`, in order.
    /// Plugins without an executable are dropped with a warning.
    pub fn resolve(configs: &[DrmPluginConfig], search_dirs: &[PathBuf]) -> Self {
        let mut registry = Self::new();

        for cfg in configs {
            if !cfg.enabled || cfg.name.trim().is_empty() {
                debug!("Skipping disabled DRM plugin '{}'", cfg.name);
                continue;
            }

            let Some(executable) = find_executable(&cfg.name, search_dirs) else {
                warn!("DRM plugin script for '{}' not found. Skipping.", cfg.name);
                registry.unresolved.push(cfg.name.clone());
                continue;
            };

            info!(
                "Loaded DRM plugin: {} ({})",
                cfg.name,
                executable
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default()
            );
            registry.register(DrmPlugin {
                name: cfg.name.clone(),
                extensions: cfg.extensions.iter().map(|e| normalize_extension(e)).collect(),
                executable,
            });
        }

        registry
    }

    /// Later registrations take over extensions claimed earlier.
    pub fn register(&mut self, plugin: DrmPlugin) {
        let plugin = Arc::new(plugin);
        for ext in &plugin.extensions {
            if let Some(previous) = self.by_extension.insert(ext.clone(), plugin.clone()) {
                if previous.name != plugin.name {
                    warn!(
                        "Extension {} claimed by '{}' and '{}'; using '{}'",
                        ext, previous.name, plugin.name, plugin.name
                    );
                }
            }
        }
        self.plugins.push(plugin);
    }

    pub fn lookup(&self, ext: &str) -> Option<&DrmPlugin> {
        self.by_extension
            .get(&normalize_extension(ext))
            .map(|p| p.as_ref())
    }

    pub fn needs_decryption(&self, ext: &str) -> bool {
        self.lookup(ext).is_some()
    }

    pub fn plugins(&self) -> impl Iterator<Item = &DrmPlugin> {
        self.plugins.iter().map(|p| p.as_ref())
    }

    pub fn unresolved(&self) -> &[String] {
        &self.unresolved
    }

    pub fn is_empty(&self) -> bool {
        self.by_extension.is_empty()
    }
}

/// Working directory first, then the plugin directory.
pub fn default_search_dirs(plugin_dir: Option<&str>) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        dirs.push(cwd);
    }
    match plugin_dir {
        Some(dir) => dirs.push(PathBuf::from(dir)),
        None => {
            if let Some(exe_dir) = env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf))
            {
                dirs.push(exe_dir.join(DEFAULT_PLUGIN_DIR));
            }
        }
    }
    dirs
}

/// `name`, `name.sh`, `name.bash` in each directory, first executable match wins.
pub fn find_executable(name: &str, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    search_dirs.iter().find_map(|dir| {
        SCRIPT_SUFFIXES
            .iter()
            .map(|suffix| dir.join(format!("{}{}", name, suffix)))
            .find(|candidate| is_executable(candidate))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
