//! Capture helper child process management
//!
//! Wraps the spawned helper with line-oriented access to its stdout and a
//! graceful stop sequence: SIGTERM first, SIGKILL only if it stalls.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, warn};

use crate::protocol::Line;

/// How long the helper gets to exit after SIGTERM.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running capture helper and its stdout line stream.
pub struct CaptureProcess {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
}

impl CaptureProcess {
    /// Spawn the helper. Its stdout carries the event protocol; stderr is
    /// forwarded to our logs.
    pub fn spawn(helper: &Path) -> Result<Self> {
        let mut child = Command::new(helper)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn capture helper {}", helper.display()))?;

        let stdout = child.stdout.take().context("helper stdout not piped")?;
        let lines = BufReader::new(stdout).lines();

        if let Some(stderr) = child.stderr.take() {
            let mut stderr_lines = BufReader::new(stderr).lines();
            tokio::spawn(async move {
                while let Ok(Some(line)) = stderr_lines.next_line().await {
                    debug!(%line, "helper stderr");
                }
            });
        }

        debug!(pid = ?child.id(), helper = %helper.display(), "capture helper spawned");

        Ok(Self { child, lines })
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next protocol line, or `None` once stdout closes. Lines that do
    /// not parse are skipped.
    pub async fn next_line(&mut self) -> Option<Line> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(raw)) => match Line::parse(&raw) {
                    Ok(line) => return Some(line),
                    Err(e) => {
                        debug!(?e, %raw, "skipping unparseable helper line");
                    }
                },
                Ok(None) => return None,
                Err(e) => {
                    warn!(?e, "error reading helper stdout");
                    return None;
                }
            }
        }
    }

    /// Stop the helper: SIGTERM, drain its last lines, then wait with a
    /// timeout and fall back to SIGKILL.
    pub async fn shutdown(mut self) {
        if let Some(pid) = self.child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(?e, pid, "failed to signal capture helper");
            }
        }

        let graceful = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while let Some(line) = self.next_line().await {
                if let Line::Shutdown(message) = line {
                    debug!(%message, "helper acknowledged shutdown");
                }
            }
            self.child.wait().await
        })
        .await;

        match graceful {
            Ok(Ok(status)) => {
                debug!(%status, "capture helper exited");
            }
            Ok(Err(e)) => {
                warn!(?e, "error waiting for capture helper");
            }
            Err(_) => {
                warn!("capture helper did not exit in time, killing");
                if let Err(e) = self.child.start_kill() {
                    warn!(?e, "failed to kill capture helper");
                }
                let _ = self.child.wait().await;
            }
        }
    }
}
