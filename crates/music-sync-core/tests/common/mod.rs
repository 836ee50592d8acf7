//! Fakes and fixtures shared by the integration tests.
//!
//! Fake audio files are plain text:
//!   `AUDIO:<payload>`            audio-only, hashed byte-for-byte
//!   `AUDIO:<payload>|ART:<img>`  has cover art, hashed as `AUDIO:<payload>`
//!   `CORRUPT...`                 cannot be decoded
//! Fake DRM files are `DRM:<ext>:<content>` and decrypt to `<content>` in a
//! file with extension `<ext>`. `DRM-FAIL:<code>`, `DRM-TIMEOUT` and
//! `DRM-EMPTY` simulate plugin failures.
#![allow(dead_code)]

use filetime::FileTime;
use music_sync_core::config::{DrmPluginConfig, SyncConfig};
use music_sync_core::fingerprint::{AudioTool, FingerprintError};
use music_sync_core::plugins::{DecryptError, DrmPlugin, PluginRunner};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub struct FakeAudioTool;

impl AudioTool for FakeAudioTool {
    fn is_audio_only(&self, path: &Path) -> Result<bool, FingerprintError> {
        let content = fs::read_to_string(path)?;
        Ok(content.starts_with("AUDIO:") && !content.contains("|ART:"))
    }

    fn decode_audio_md5(&self, path: &Path) -> Result<String, FingerprintError> {
        let content = fs::read_to_string(path)?;
        if !content.starts_with("AUDIO:") {
            return Err(FingerprintError::Failed {
                tool: "ffmpeg".to_string(),
                code: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        let audio = content.split("|ART:").next().unwrap_or_default();
        Ok(format!("MD5={}\n", hash_bytes_md5(audio.as_bytes())))
    }
}

/// Counts invocations so tests can tell whether a plugin ran at all.
#[derive(Default)]
pub struct FakePluginRunner {
    pub calls: AtomicUsize,
}

impl FakePluginRunner {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PluginRunner for FakePluginRunner {
    fn run(&self, _plugin: &DrmPlugin, source: &Path, output_dir: &Path) -> Result<(), DecryptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = fs::read_to_string(source)?;

        if let Some(code) = content.strip_prefix("DRM-FAIL:") {
            return Err(DecryptError::PluginError {
                code: code.trim().parse().unwrap_or(1),
                stderr: "decryption failed".to_string(),
            });
        }
        if content.starts_with("DRM-TIMEOUT") {
            return Err(DecryptError::Timeout(Duration::from_secs(120)));
        }
        if content.starts_with("DRM-EMPTY") {
            fs::write(output_dir.join("notes.txt"), b"nothing to see")?;
            return Ok(());
        }

        let rest = content.strip_prefix("DRM:").unwrap_or(&content);
        let (ext, payload) = rest.split_once(':').unwrap_or((".mp3", rest));
        fs::write(output_dir.join(format!("decrypted{}", ext)), payload)?;
        Ok(())
    }
}

pub fn hash_bytes_md5(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

pub fn write_file(path: &Path, content: &str, mtime: i64) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
    set_mtime(path, mtime);
    path.to_path_buf()
}

pub fn set_mtime(path: &Path, mtime: i64) {
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime, 0)).unwrap();
}

pub fn audio_md5(payload: &str) -> String {
    hash_bytes_md5(format!("AUDIO:{}", payload).as_bytes())
}

/// A plugin config whose executable exists, so registry resolution succeeds.
pub fn install_fake_plugin(dir: &Path, name: &str) {
    let path = dir.join(format!("{}.sh", name));
    fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
}

pub fn test_config(root: &Path, sources: &[&Path]) -> SyncConfig {
    SyncConfig {
        music_sources: sources
            .iter()
            .map(|s| s.to_string_lossy().into_owned())
            .collect(),
        music_incoming_dir: root.join("incoming").to_string_lossy().into_owned(),
        database_file: root.join("ledger.db").to_string_lossy().into_owned(),
        drm_plugins: vec![DrmPluginConfig {
            name: "ncmdump".to_string(),
            enabled: true,
            extensions: vec![".ncm".to_string()],
        }],
        music_extensions: vec![".flac".into(), ".mp3".into(), ".m4a".into(), ".ogg".into()],
        ..SyncConfig::default()
    }
    .normalized()
}
