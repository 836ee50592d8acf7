//! Content fingerprints that ignore cover art and container metadata.
//!
//! Files whose stream listing reports no video/image streams are hashed byte-for-byte.
//! Everything else goes through the decoder, which hashes the audio stream
//! alone, so two files that differ only in embedded artwork share a key.

pub mod ffmpeg;
pub mod hash;

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

pub use ffmpeg::FfmpegTool;

#[derive(Error, Debug)]
pub enum FingerprintError {
    #[error("{0} not found. Please ensure it's installed and in your PATH")]
    ToolMissing(String),

    #[error("{tool} timed out after {after:?}")]
    Timeout { tool: String, after: Duration },

    #[error("{tool} exited with {code:?}: {stderr}")]
    Failed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("no MD5 token in decoder output: {0}")]
    NoHashToken(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The external stream-inspection and decode service.
pub trait AudioTool: Send + Sync {
    /// `true` when the file carries no video or image streams.
    fn is_audio_only(&self, path: &Path) -> Result<bool, FingerprintError>;

    /// Raw decoder output that should contain an `MD5=<hex>` token for the
    /// audio stream alone.
    fn decode_audio_md5(&self, path: &Path) -> Result<String, FingerprintError>;
}

#[derive(Clone)]
pub struct Fingerprinter {
    tool: Arc<dyn AudioTool>,
}

impl Fingerprinter {
    pub fn new(tool: Arc<dyn AudioTool>) -> Self {
        Self { tool }
    }

    pub fn fingerprint(&self, path: &Path) -> Result<String, FingerprintError> {
        let audio_only = match self.tool.is_audio_only(path) {
            Ok(audio_only) => audio_only,
            Err(e) => {
                debug!("Stream check failed for {}, using decoder: {}", path.display(), e);
                false
            }
        };

        if audio_only {
            debug!("Hashing {} directly", path.display());
            return hash::hash_file_md5(path).map_err(|e| {
                error!("Error reading {}: {}", path.display(), e);
                FingerprintError::Io(e)
            });
        }

        debug!("Hashing {} with decoder", path.display());
        let output = self.tool.decode_audio_md5(path).map_err(|e| {
            error!("Error calculating MD5 for {}: {}", path.display(), e);
            e
        })?;

        match hash::parse_md5_token(&output) {
            Some(md5) => Ok(md5),
            None => {
                warn!(
                    "Could not find MD5 hash in decoder output for {}. Output: {}",
                    path.display(),
                    output.trim()
                );
                Err(FingerprintError::NoHashToken(output.trim().to_string()))
            }
        }
    }
}
