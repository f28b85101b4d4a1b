//! Child processes owned by the orchestrator.

use std::io::{BufRead as _, BufReader, Read};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::foundation::error::{SpinloopError, SpinloopResult};

const WAIT_POLL: Duration = Duration::from_millis(20);

/// A child process that is killed and reaped when dropped.
#[derive(Debug)]
pub struct ManagedChild {
    label: &'static str,
    child: Option<Child>,
}

impl ManagedChild {
    pub fn spawn(label: &'static str, cmd: &mut Command) -> std::io::Result<Self> {
        let child = cmd.spawn()?;
        tracing::debug!(process = label, pid = child.id(), "spawned");
        Ok(Self {
            label,
            child: Some(child),
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn child_mut(&mut self) -> Option<&mut Child> {
        self.child.as_mut()
    }

    /// Non-blocking exit check.
    pub fn try_status(&mut self) -> Option<ExitStatus> {
        self.child.as_mut().and_then(|c| c.try_wait().ok().flatten())
    }

    /// Wait up to `limit` for the process to exit on its own.
    pub fn wait_timeout(&mut self, limit: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + limit;
        loop {
            if let Some(status) = self.try_status() {
                return Some(status);
            }
            if Instant::now() >= deadline {
                return None;
            }
            std::thread::sleep(WAIT_POLL);
        }
    }

    pub fn kill(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Ok(Some(status)) = child.try_wait() {
                tracing::debug!(process = self.label, %status, "already exited");
                return;
            }
            let _ = child.kill();
            let _ = child.wait();
            tracing::debug!(process = self.label, "killed");
        }
    }

    /// Give the process `grace` to exit, then kill it.
    pub fn shutdown(mut self, grace: Duration) -> Option<ExitStatus> {
        let status = self.wait_timeout(grace);
        if status.is_none() {
            tracing::warn!(process = self.label, "did not exit in time; killing");
        }
        self.kill();
        status
    }
}

impl Drop for ManagedChild {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Run `argv` to completion with inherited stdio. A non-zero exit is a build error.
#[tracing::instrument(skip_all, fields(program = argv.first().map(String::as_str).unwrap_or("")))]
pub fn run_to_completion(argv: &[String]) -> SpinloopResult<()> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SpinloopError::build("empty build command"))?;
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| SpinloopError::build(format!("failed to run '{program}': {e}")))?;
    if !status.success() {
        return Err(SpinloopError::build(format!(
            "'{}' exited with status {status}",
            argv.join(" ")
        )));
    }
    Ok(())
}

/// Reads a child's stdout and stderr line by line on background threads.
///
/// Lines keep being drained after a match so the child never blocks on a full pipe.
pub struct LineScraper {
    lines: Receiver<String>,
}

impl LineScraper {
    pub fn attach(child: &mut ManagedChild) -> SpinloopResult<Self> {
        let label = child.label();
        let inner = child
            .child_mut()
            .ok_or_else(|| SpinloopError::launch(format!("{label} process already reaped")))?;
        let (tx, rx) = mpsc::channel();
        let mut attached = 0;
        if let Some(stdout) = inner.stdout.take() {
            spawn_line_reader(label, stdout, tx.clone());
            attached += 1;
        }
        if let Some(stderr) = inner.stderr.take() {
            spawn_line_reader(label, stderr, tx);
            attached += 1;
        }
        if attached == 0 {
            return Err(SpinloopError::launch(format!(
                "{label} process has no piped output to scrape"
            )));
        }
        Ok(Self { lines: rx })
    }

    /// Wait for a line matching `pattern` and parse capture group 1 as a port.
    pub fn wait_for_port(&self, pattern: &Regex, limit: Duration) -> SpinloopResult<u16> {
        let deadline = Instant::now() + limit;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let line = match self.lines.recv_timeout(remaining) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(SpinloopError::timeout(
                        format!("serving process to print a line matching '{pattern}'"),
                        limit,
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SpinloopError::launch(
                        "serving process closed its output before announcing a port",
                    ));
                }
            };
            let Some(caps) = pattern.captures(&line) else {
                continue;
            };
            let port = caps
                .get(1)
                .and_then(|m| m.as_str().parse::<u16>().ok())
                .ok_or_else(|| {
                    SpinloopError::launch(format!("listen line has no usable port: '{line}'"))
                })?;
            return Ok(port);
        }
    }
}

fn spawn_line_reader(
    label: &'static str,
    stream: impl Read + Send + 'static,
    tx: mpsc::Sender<String>,
) {
    std::thread::spawn(move || {
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            tracing::debug!(process = label, "{line}");
            let _ = tx.send(line);
        }
    });
}

#[cfg(test)]
#[path = "../../tests/unit/orchestrator/process.rs"]
mod tests;
