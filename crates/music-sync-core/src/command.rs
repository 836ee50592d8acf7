//! Bounded-time execution of external tools (ffmpeg, ffprobe, DRM plugins).

use std::io::{self, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, trace};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Error, Debug)]
pub enum RunError {
    #[error("executable not found: {0}")]
    NotFound(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout and stderr joined, the way tools that print their result to
    /// either stream are searched.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Trimmed stderr, or `Exit code N` when the tool printed nothing.
    pub fn error_excerpt(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            match self.status.code() {
                Some(code) => format!("Exit code {}", code),
                None => "terminated by signal".to_string(),
            }
        } else {
            stderr.to_string()
        }
    }
}

/// Spawn `command` with piped output and wait at most `timeout` for it to exit
/// and close its output pipes. On Unix the child leads its own process group,
/// and the whole group is killed once the call returns, so background
/// processes it left behind cannot outlive the deadline.
pub fn run_with_timeout(command: &mut Command, timeout: Duration) -> Result<CommandOutput, RunError> {
    let deadline = Instant::now() + timeout;
    let program = command.get_program().to_string_lossy().into_owned();
    trace!("Spawning {:?}", command);

    own_process_group(command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => RunError::NotFound(program.clone()),
            _ => RunError::Io(err),
        })?;

    // Drain both pipes on their own threads so a chatty child cannot block on a full pipe.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait_for_exit(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_process_group(&child);
            let _ = child.kill();
            let _ = child.wait();
            return Err(RunError::Timeout(timeout));
        }
        Err(e) => {
            kill_process_group(&child);
            return Err(e.into());
        }
    };

    // Pipes inherited by leftover background processes stay open after the
    // child exits; waiting for them is bounded by the same deadline.
    let stdout = collect(stdout, deadline);
    let stderr = collect(stderr, deadline);
    kill_process_group(&child);

    match (stdout, stderr) {
        (Some(stdout), Some(stderr)) => Ok(CommandOutput {
            status,
            stdout,
            stderr,
        }),
        _ => {
            debug!("{} exited but its output pipes stayed open past the deadline", program);
            Err(RunError::Timeout(timeout))
        }
    }
}

/// `Ok(None)` when the deadline passed with the child still running.
fn wait_for_exit(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
        // ESRCH just means the group is already gone.
        unsafe {
            libc::kill(-pgid, libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<Receiver<String>> {
    pipe.map(|mut reader| {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });
        rx
    })
}

/// `None` when the pipe was still open at the deadline.
fn collect(output: Option<Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = output else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => Some(String::new()),
    }
}
