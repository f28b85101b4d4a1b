//! Locating, launching and talking to the render host.

use std::ffi::OsString;
use std::io::{BufRead as _, BufReader, Write as _};
use std::path::{Path, PathBuf};
use std::process::{ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::config::SpinloopConfig;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::host::protocol::{HostCommand, HostEvent, decode_event, encode_line};
use crate::orchestrator::process::ManagedChild;

/// Pins the render host binary.
pub const RENDER_HOST_ENV: &str = "SPINLOOP_RENDER_HOST";

const HOST_BINARY: &str = "spinloop";

/// Inputs to the render host search, in priority order.
#[derive(Clone, Debug, Default)]
pub struct RenderHostSearch {
    pub env_override: Option<OsString>,
    pub pinned: Option<PathBuf>,
    pub current_exe: Option<PathBuf>,
    pub install_dirs: Vec<PathBuf>,
    pub path_var: Option<OsString>,
}

impl RenderHostSearch {
    /// Search inputs taken from the process environment.
    pub fn from_env(pinned: Option<&Path>) -> Self {
        let home = dirs::home_dir();
        let mut install_dirs = Vec::new();
        if let Some(cargo_home) = std::env::var_os("CARGO_HOME") {
            install_dirs.push(PathBuf::from(cargo_home).join("bin"));
        }
        if let Some(home) = &home {
            install_dirs.push(home.join(".cargo").join("bin"));
        }
        install_dirs.extend(
            ["/usr/local/bin", "/usr/bin", "/opt/spinloop/bin"]
                .iter()
                .map(PathBuf::from),
        );
        Self {
            env_override: std::env::var_os(RENDER_HOST_ENV).filter(|v| !v.is_empty()),
            pinned: pinned.map(Path::to_path_buf),
            current_exe: std::env::current_exe().ok(),
            install_dirs,
            path_var: std::env::var_os("PATH"),
        }
    }

    pub fn resolve(&self) -> SpinloopResult<PathBuf> {
        if let Some(value) = &self.env_override {
            let path = PathBuf::from(value);
            return if path.is_file() {
                Ok(path)
            } else {
                Err(SpinloopError::launch(format!(
                    "{RENDER_HOST_ENV} points at '{}', which is not a file",
                    path.display()
                )))
            };
        }
        if let Some(path) = &self.pinned {
            return if path.is_file() {
                Ok(path.clone())
            } else {
                Err(SpinloopError::launch(format!(
                    "render_host.binary '{}' is not a file",
                    path.display()
                )))
            };
        }
        if let Some(exe) = &self.current_exe
            && exe.file_stem().is_some_and(|s| s == HOST_BINARY)
            && exe.is_file()
        {
            return Ok(exe.clone());
        }
        let path_dirs = self
            .path_var
            .as_ref()
            .map(|p| std::env::split_paths(p).collect::<Vec<_>>())
            .unwrap_or_default();
        self.install_dirs
            .iter()
            .chain(path_dirs.iter())
            .map(|dir| dir.join(HOST_BINARY))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                SpinloopError::launch(format!(
                    "no render host binary found; set {RENDER_HOST_ENV} to the spinloop binary"
                ))
            })
    }
}

/// Resolve the render host binary from the environment.
pub fn locate_render_host(pinned: Option<&Path>) -> SpinloopResult<PathBuf> {
    RenderHostSearch::from_env(pinned).resolve()
}

/// An open channel to a running render host.
pub trait HostConnection {
    fn send(&mut self, cmd: &HostCommand) -> SpinloopResult<()>;

    /// Next event, or `None` if nothing arrived within `limit`.
    fn recv_timeout(&mut self, limit: Duration) -> SpinloopResult<Option<HostEvent>>;

    /// Ask the host to exit, waiting up to `grace` before killing it.
    fn close(&mut self, grace: Duration);
}

pub trait HostLauncher {
    fn launch(&self) -> SpinloopResult<Box<dyn HostConnection>>;
}

/// Launches the render host as a child process speaking the line protocol.
#[derive(Clone, Debug)]
pub struct ProcessHostLauncher {
    binary: PathBuf,
    config: SpinloopConfig,
    extra_args: Vec<String>,
}

impl ProcessHostLauncher {
    pub fn new(binary: PathBuf, config: SpinloopConfig) -> Self {
        let extra_args = config.orchestrator.render_host.extra_args.clone();
        Self {
            binary,
            config,
            extra_args,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Arguments after the binary: the host subcommand, its config and backend, then any extras.
    fn host_args(&self, config_path: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "host".into(),
            "--config".into(),
            config_path.as_os_str().to_owned(),
            "--backend".into(),
            self.config.orchestrator.render_host.backend.as_str().into(),
        ];
        args.extend(self.extra_args.iter().map(OsString::from));
        args
    }
}

impl HostLauncher for ProcessHostLauncher {
    #[tracing::instrument(skip_all, fields(binary = %self.binary.display()))]
    fn launch(&self) -> SpinloopResult<Box<dyn HostConnection>> {
        let config_file = write_host_config(&self.config)?;
        let mut cmd = Command::new(&self.binary);
        cmd.args(self.host_args(config_file.path()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        let mut child = ManagedChild::spawn("render-host", &mut cmd).map_err(|e| {
            SpinloopError::launch(format!(
                "failed to start render host '{}': {e}",
                self.binary.display()
            ))
        })?;
        let inner = child
            .child_mut()
            .ok_or_else(|| SpinloopError::launch("render host exited immediately"))?;
        let stdin = inner
            .stdin
            .take()
            .ok_or_else(|| SpinloopError::launch("failed to open render host stdin (unexpected)"))?;
        let stdout = inner
            .stdout
            .take()
            .ok_or_else(|| SpinloopError::launch("failed to open render host stdout (unexpected)"))?;

        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                if tx.send(decode_event(&line)).is_err() {
                    break;
                }
            }
        });

        tracing::info!(pid = child.id(), "render host launched");
        Ok(Box::new(ProcessHost {
            child: Some(child),
            stdin: Some(stdin),
            events: rx,
            _config_file: config_file,
        }))
    }
}

struct ProcessHost {
    child: Option<ManagedChild>,
    stdin: Option<ChildStdin>,
    events: Receiver<SpinloopResult<HostEvent>>,
    _config_file: NamedTempFile,
}

impl HostConnection for ProcessHost {
    fn send(&mut self, cmd: &HostCommand) -> SpinloopResult<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| SpinloopError::launch("render host connection is closed"))?;
        let line = encode_line(cmd)?;
        stdin
            .write_all(line.as_bytes())
            .and_then(|()| stdin.flush())
            .map_err(|e| SpinloopError::launch(format!("failed to message render host: {e}")))
    }

    fn recv_timeout(&mut self, limit: Duration) -> SpinloopResult<Option<HostEvent>> {
        match self.events.recv_timeout(limit) {
            Ok(event) => event.map(Some),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                let status = self
                    .child
                    .as_mut()
                    .and_then(|c| c.wait_timeout(Duration::from_millis(200)));
                Err(SpinloopError::launch(match status {
                    Some(status) => format!("render host exited unexpectedly ({status})"),
                    None => "render host closed its output".to_owned(),
                }))
            }
        }
    }

    fn close(&mut self, grace: Duration) {
        if self.stdin.is_some() {
            let _ = self.send(&HostCommand::Shutdown);
        }
        drop(self.stdin.take());
        if let Some(child) = self.child.take() {
            match child.shutdown(grace) {
                Some(status) => tracing::debug!(%status, "render host exited"),
                None => tracing::warn!("render host killed after grace period"),
            }
        }
    }
}

/// Write the resolved configuration for the render host. The file is removed when dropped.
fn write_host_config(cfg: &SpinloopConfig) -> SpinloopResult<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("spinloop-host-")
        .suffix(".json")
        .tempfile()
        .map_err(|e| SpinloopError::launch(format!("failed to create render host config: {e}")))?;
    serde_json::to_writer_pretty(file.as_file_mut(), cfg)?;
    file.as_file_mut().flush().map_err(|e| {
        SpinloopError::launch(format!(
            "failed to write render host config '{}': {e}",
            file.path().display()
        ))
    })?;
    Ok(file)
}

#[cfg(test)]
#[path = "../../tests/unit/orchestrator/render_host.rs"]
mod tests;
