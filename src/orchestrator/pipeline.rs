//! Orchestrator state machine.
//!
//! `Idle → BuildingAssets → ServingAssets → LaunchingRenderHost → NavigatingToRecordRoute →
//! WaitingForCanvasReady → WaitingForSceneReady → WaitingForDeliverySignal → PersistingArtifact →
//! Transcoding → Terminated`. Optional stages are skipped. Every child process is held by a
//! guard scoped to [`Orchestrator::run`], so all of them are gone once `run` returns, whatever
//! the outcome.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use regex::Regex;

use crate::capture::mime::extension_for_mime;
use crate::capture::stream::ensure_parent_dir;
use crate::config::{ServeConfig, SpinloopConfig};
use crate::delivery::{DeliveryNotice, decode_payload};
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::host::protocol::{HostCommand, HostEvent};
use crate::host::route::PageUrl;
use crate::orchestrator::process::{LineScraper, ManagedChild, run_to_completion};
use crate::orchestrator::render_host::{
    HostConnection, HostLauncher, ProcessHostLauncher, locate_render_host,
};
use crate::orchestrator::transcode::transcode_to_mp4;

const THROTTLING_HINT: &str = "the capture stream probably never reached the target frame count; \
     disable render throttling (scene.clock = \"fixed_step\") when investigating";
const ASSET_HINT: &str = "check that the mesh and environment URLs resolve from the page";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    BuildingAssets,
    ServingAssets,
    LaunchingRenderHost,
    NavigatingToRecordRoute,
    WaitingForCanvasReady,
    WaitingForSceneReady,
    WaitingForDeliverySignal,
    PersistingArtifact,
    Transcoding,
    Terminated,
}

/// Outcome of a successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    pub artifact_path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub transcoded: Option<PathBuf>,
    pub elapsed: Duration,
}

pub struct Orchestrator<L: HostLauncher> {
    cfg: SpinloopConfig,
    launcher: L,
    state: OrchestratorState,
    trail: Vec<OrchestratorState>,
}

impl Orchestrator<ProcessHostLauncher> {
    /// Orchestrator that launches the real render host binary.
    pub fn from_config(cfg: SpinloopConfig) -> SpinloopResult<Self> {
        let binary = locate_render_host(cfg.orchestrator.render_host.binary.as_deref())?;
        tracing::debug!(binary = %binary.display(), "render host resolved");
        let launcher = ProcessHostLauncher::new(binary, cfg.clone());
        Ok(Self::new(cfg, launcher))
    }
}

impl<L: HostLauncher> Orchestrator<L> {
    pub fn new(cfg: SpinloopConfig, launcher: L) -> Self {
        Self {
            cfg,
            launcher,
            state: OrchestratorState::Idle,
            trail: vec![OrchestratorState::Idle],
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    /// Every state entered so far, in order.
    pub fn trail(&self) -> &[OrchestratorState] {
        &self.trail
    }

    fn enter(&mut self, next: OrchestratorState) {
        tracing::info!(from = ?self.state, to = ?next, "orchestrator");
        self.state = next;
        self.trail.push(next);
    }

    #[tracing::instrument(skip_all)]
    pub fn run(&mut self) -> SpinloopResult<RunReport> {
        let started = Instant::now();
        let result = self.run_stages(started);
        self.enter(OrchestratorState::Terminated);
        if let Err(e) = &result {
            tracing::error!(error = %e, "run failed");
        }
        result
    }

    fn run_stages(&mut self, started: Instant) -> SpinloopResult<RunReport> {
        self.cfg.validate()?;
        let cfg = self.cfg.orchestrator.clone();
        let timeouts = cfg.timeouts.clone();

        if let Some(build) = &cfg.build {
            self.enter(OrchestratorState::BuildingAssets);
            run_to_completion(build)?;
        }

        let (server, page_url) = match &cfg.serve {
            Some(serve) => {
                self.enter(OrchestratorState::ServingAssets);
                let (server, port) = start_server(serve, timeouts.listen())?;
                (Some(server), PageUrl::served(&serve.host, port, &cfg.route))
            }
            None => {
                let dir = std::fs::canonicalize(&cfg.asset_dir).map_err(|e| {
                    SpinloopError::launch(format!(
                        "asset directory '{}' is not usable: {e}",
                        cfg.asset_dir.display()
                    ))
                })?;
                (None, PageUrl::local(&dir, &cfg.route))
            }
        };

        self.enter(OrchestratorState::LaunchingRenderHost);
        let mut host = HostGuard {
            conn: self.launcher.launch()?,
            grace: timeouts.exit_grace(),
            closed: false,
        };

        self.enter(OrchestratorState::NavigatingToRecordRoute);
        host.conn.send(&HostCommand::Navigate {
            url: page_url.clone(),
        })?;
        wait_for(
            host.conn.as_mut(),
            "the record page to load",
            timeouts.canvas_ready(),
            None,
            |ev| matches!(ev, HostEvent::Loaded { .. }).then_some(()),
        )?;

        self.enter(OrchestratorState::WaitingForCanvasReady);
        wait_for(
            host.conn.as_mut(),
            "the render surface (canvas_ready)",
            timeouts.canvas_ready(),
            None,
            |ev| matches!(ev, HostEvent::CanvasReady { .. }).then_some(()),
        )?;

        self.enter(OrchestratorState::WaitingForSceneReady);
        wait_for(
            host.conn.as_mut(),
            "scene assets to load (scene_ready)",
            timeouts.scene_ready(),
            Some(ASSET_HINT),
            |ev| matches!(ev, HostEvent::SceneReady { .. }).then_some(()),
        )?;

        self.enter(OrchestratorState::WaitingForDeliverySignal);
        let notice = wait_for(
            host.conn.as_mut(),
            "the delivery signal",
            timeouts.delivery(),
            Some(THROTTLING_HINT),
            |ev| match ev {
                HostEvent::Delivered { notice } => Some(notice),
                _ => None,
            },
        )?;

        self.enter(OrchestratorState::PersistingArtifact);
        let artifact_path = persist_artifact(&notice, &cfg.output.dir, &cfg.output.stem)?;
        tracing::info!(
            path = %artifact_path.display(),
            size = notice.size,
            mime = %notice.mime_type,
            "artifact written"
        );

        host.close();
        drop(server);

        let transcoded = if cfg.output.transcode.enabled {
            self.enter(OrchestratorState::Transcoding);
            match transcode_to_mp4(&artifact_path, &cfg.output.transcode) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!(error = %e, "transcode failed; keeping the primary artifact");
                    None
                }
            }
        } else {
            None
        };

        Ok(RunReport {
            artifact_path,
            size: notice.size,
            mime_type: notice.mime_type,
            transcoded,
            elapsed: started.elapsed(),
        })
    }
}

/// Closes the render host on every exit path.
struct HostGuard {
    conn: Box<dyn HostConnection>,
    grace: Duration,
    closed: bool,
}

impl HostGuard {
    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.conn.close(self.grace);
        }
    }
}

impl Drop for HostGuard {
    fn drop(&mut self) {
        self.close();
    }
}

fn start_server(serve: &ServeConfig, listen: Duration) -> SpinloopResult<(ManagedChild, u16)> {
    let pattern = Regex::new(&serve.listen_pattern)
        .map_err(|e| SpinloopError::validation(format!("invalid serve.listen_pattern: {e}")))?;
    let (program, args) = serve
        .argv
        .split_first()
        .ok_or_else(|| SpinloopError::validation("serve argv must not be empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut server = ManagedChild::spawn("serve", &mut cmd)
        .map_err(|e| SpinloopError::launch(format!("failed to start '{program}': {e}")))?;
    let scraper = LineScraper::attach(&mut server)?;
    let port = scraper.wait_for_port(&pattern, listen)?;
    tracing::info!(port, "assets served");
    Ok((server, port))
}

/// Wait until `pick` accepts an event. Host `error` events and expiry of `limit` are fatal.
fn wait_for<T>(
    conn: &mut dyn HostConnection,
    condition: &str,
    limit: Duration,
    hint: Option<&'static str>,
    mut pick: impl FnMut(HostEvent) -> Option<T>,
) -> SpinloopResult<T> {
    let timed_out = || match hint {
        Some(hint) => SpinloopError::timeout_with_hint(condition, limit, hint),
        None => SpinloopError::timeout(condition, limit),
    };
    let deadline = Instant::now() + limit;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out());
        }
        let Some(event) = conn.recv_timeout(remaining)? else {
            return Err(timed_out());
        };
        if let HostEvent::Error { message } = &event {
            return Err(SpinloopError::launch(format!(
                "render host failed while waiting for {condition}: {message}"
            )));
        }
        let kind = event.kind();
        match pick(event) {
            Some(value) => return Ok(value),
            None => tracing::debug!(event = kind, "host event"),
        }
    }
}

/// Write or verify the delivered artifact and return its path.
pub fn persist_artifact(
    notice: &DeliveryNotice,
    out_dir: &Path,
    stem: &str,
) -> SpinloopResult<PathBuf> {
    if !notice.completed {
        return Err(SpinloopError::delivery("host reported an incomplete delivery"));
    }
    if notice.payload.is_none() {
        let path = notice.saved_path.clone().ok_or_else(|| {
            SpinloopError::delivery("delivery carries neither a payload nor a saved path")
        })?;
        let size = std::fs::metadata(&path)
            .map_err(|e| {
                SpinloopError::delivery(format!(
                    "saved artifact '{}' is missing: {e}",
                    path.display()
                ))
            })?
            .len();
        if size != notice.size {
            return Err(SpinloopError::delivery(format!(
                "saved artifact '{}' has {size} bytes, notice says {}",
                path.display(),
                notice.size
            )));
        }
        return Ok(path);
    }

    let bytes = decode_payload(notice)?;
    let path = out_dir.join(format!("{stem}.{}", extension_for_mime(&notice.mime_type)));
    ensure_parent_dir(&path)?;
    std::fs::write(&path, &bytes).map_err(|e| {
        SpinloopError::delivery(format!("failed to write '{}': {e}", path.display()))
    })?;
    Ok(path)
}

#[cfg(test)]
#[path = "../../tests/unit/orchestrator/pipeline.rs"]
mod tests;
