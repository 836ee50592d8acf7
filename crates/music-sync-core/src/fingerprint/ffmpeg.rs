use super::{AudioTool, FingerprintError};
use crate::command::{run_with_timeout, CommandOutput, RunError};
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::debug;

pub const INSPECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DECODE_TIMEOUT: Duration = Duration::from_secs(60);
const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// ffprobe/ffmpeg on the host.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    inspect_timeout: Duration,
    decode_timeout: Duration,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTool {
    pub fn new(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
            inspect_timeout: INSPECT_TIMEOUT,
            decode_timeout: DECODE_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, inspect: Duration, decode: Duration) -> Self {
        self.inspect_timeout = inspect;
        self.decode_timeout = decode;
        self
    }

    /// Run `<tool> -version` for both binaries. Returns the first line of each banner.
    pub fn check_available(&self) -> Result<Vec<String>, FingerprintError> {
        [&self.ffmpeg, &self.ffprobe]
            .into_iter()
            .map(|tool| {
                let output = run(tool, Command::new(tool).arg("-version"), VERSION_TIMEOUT)?;
                let content = output.combined();
                if !output.success() || !content.contains("version") {
                    return Err(FingerprintError::Failed {
                        tool: tool.clone(),
                        code: output.status.code(),
                        stderr: format!("unexpected version output: {}", content.trim()),
                    });
                }
                Ok(content.lines().next().unwrap_or_default().trim().to_string())
            })
            .collect()
    }
}

fn run(tool: &str, command: &mut Command, timeout: Duration) -> Result<CommandOutput, FingerprintError> {
    run_with_timeout(command, timeout).map_err(|e| match e {
        RunError::NotFound(_) => FingerprintError::ToolMissing(tool.to_string()),
        RunError::Timeout(after) => FingerprintError::Timeout {
            tool: tool.to_string(),
            after,
        },
        RunError::Io(e) => FingerprintError::Io(e),
    })
}

impl AudioTool for FfmpegTool {
    fn is_audio_only(&self, path: &Path) -> Result<bool, FingerprintError> {
        let output = run(
            &self.ffprobe,
            Command::new(&self.ffprobe)
                .args([
                    "-v",
                    "error",
                    "-select_streams",
                    "v",
                    "-show_entries",
                    "stream=codec_type",
                    "-of",
                    "default=nw=1:nk=1",
                ])
                .arg(path),
            self.inspect_timeout,
        )?;

        if !output.success() {
            return Err(FingerprintError::Failed {
                tool: self.ffprobe.clone(),
                code: output.status.code(),
                stderr: output.error_excerpt(),
            });
        }

        let audio_only = output.stdout.trim().is_empty();
        debug!("Stream check {}: audio only = {}", path.display(), audio_only);
        Ok(audio_only)
    }

    fn decode_audio_md5(&self, path: &Path) -> Result<String, FingerprintError> {
        let output = run(
            &self.ffmpeg,
            Command::new(&self.ffmpeg)
                .arg("-i")
                .arg(path)
                .args(["-vn", "-f", "md5", "-"]),
            self.decode_timeout,
        )?;

        if !output.success() {
            return Err(FingerprintError::Failed {
                tool: self.ffmpeg.clone(),
                code: output.status.code(),
                stderr: output.error_excerpt(),
            });
        }

        Ok(output.combined())
    }
}
