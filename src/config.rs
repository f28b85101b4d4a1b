//! Session and orchestrator configuration.
//!
//! Everything is defaulted so that an empty JSON object (or no file at all) yields a runnable
//! configuration. CLI flags override individual fields after loading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;

use crate::delivery::DeliveryMode;
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::render::backend::BackendKind;

/// Default candidate list, highest priority first.
pub const DEFAULT_MIME_CANDIDATES: [&str; 3] = [
    "video/webm;codecs=vp9",
    "video/webm;codecs=vp8",
    "video/webm",
];

/// How the host's render loop advances time.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Sleep to each frame deadline; missed ticks are dropped, not caught up.
    #[default]
    Realtime,
    /// Advance exactly one frame period per tick without sleeping.
    FixedStep,
}

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpinloopConfig {
    pub scene: SceneParams,
    pub orchestrator: OrchestratorConfig,
}

/// Fixed parameters the `/record` entry point boots with.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SceneParams {
    pub seconds_per_revolution: f64,
    pub fps: Fps,
    pub target_frame_count: u64,
    pub canvas: Canvas,
    /// Mesh location, resolved against the page URL.
    pub mesh_url: String,
    /// Environment/lighting location, resolved against the page URL.
    pub environment_url: String,
    /// Camera elevation above the turntable plane.
    pub camera_tilt_deg: f64,
    pub revolution_tolerance_deg: f64,
    pub settle_delay_ms: u64,
    pub mime_candidates: Vec<String>,
    pub delivery: DeliveryMode,
    /// Local save action target inside the host; `None` saves to the download directory.
    pub save_path: Option<PathBuf>,
    /// Where the host's save action writes when `save_path` is unset. Defaults to the user's
    /// download directory.
    pub download_dir: Option<PathBuf>,
    pub background: Rgba8,
    pub clock: ClockMode,
}

impl Default for SceneParams {
    fn default() -> Self {
        Self {
            seconds_per_revolution: 20.94,
            fps: Fps { num: 60, den: 1 },
            target_frame_count: 1257,
            canvas: Canvas {
                width: 720,
                height: 720,
            },
            mesh_url: "models/turntable.obj".to_owned(),
            environment_url: "env/studio.json".to_owned(),
            camera_tilt_deg: 18.0,
            revolution_tolerance_deg: 0.6,
            settle_delay_ms: 300,
            mime_candidates: DEFAULT_MIME_CANDIDATES
                .iter()
                .map(|s| (*s).to_owned())
                .collect(),
            delivery: DeliveryMode::Inline,
            save_path: None,
            download_dir: None,
            background: Rgba8::BLACK,
            clock: ClockMode::Realtime,
        }
    }
}

impl SceneParams {
    pub fn validate(&self) -> SpinloopResult<()> {
        if !self.seconds_per_revolution.is_finite() || self.seconds_per_revolution <= 0.0 {
            return Err(SpinloopError::validation(
                "seconds_per_revolution must be finite and > 0",
            ));
        }
        Fps::new(self.fps.num, self.fps.den)?;
        if self.target_frame_count == 0 {
            return Err(SpinloopError::validation("target_frame_count must be > 0"));
        }
        self.canvas.validate()?;
        if !(self.revolution_tolerance_deg > 0.0 && self.revolution_tolerance_deg < 45.0) {
            return Err(SpinloopError::validation(
                "revolution_tolerance_deg must be in (0, 45)",
            ));
        }
        if self.mesh_url.trim().is_empty() || self.environment_url.trim().is_empty() {
            return Err(SpinloopError::validation(
                "mesh_url and environment_url must be non-empty",
            ));
        }
        if self.delivery == DeliveryMode::DirectSave && self.save_path.is_none() {
            return Err(SpinloopError::validation(
                "direct-save delivery requires scene.save_path",
            ));
        }
        let closure = self.loop_closure_error_frames();
        if closure.abs() > 1.0 {
            return Err(SpinloopError::validation(format!(
                "loop does not close: {} frames at {} fps last {:.4}s but one revolution is {:.4}s ({closure:+.2} frames)",
                self.target_frame_count,
                self.fps.as_f64(),
                self.recording_secs(),
                self.seconds_per_revolution,
            )));
        }
        Ok(())
    }

    /// Nominal duration of the recorded clip.
    pub fn recording_secs(&self) -> f64 {
        self.fps.frames_to_secs(self.target_frame_count)
    }

    /// `(F / fps - S)` expressed in frames; the loop closes when this is within ±1.
    pub fn loop_closure_error_frames(&self) -> f64 {
        (self.recording_secs() - self.seconds_per_revolution) * self.fps.as_f64()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn revolution_tolerance_rad(&self) -> f64 {
        crate::foundation::math::deg_to_rad(self.revolution_tolerance_deg)
    }
}

/// Resolved timing of a session, as printed by `spinloop plan`.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct SessionPlan {
    pub seconds_per_revolution: f64,
    pub fps: f64,
    pub target_frame_count: u64,
    /// One revolution rounded to whole frames; a closing loop records about this many.
    pub frames_per_revolution: u64,
    pub recording_secs: f64,
    pub closure_error_frames: f64,
    pub loop_closes: bool,
    pub canvas: Canvas,
    pub clock: ClockMode,
}

impl SceneParams {
    pub fn plan(&self) -> SessionPlan {
        let closure_error_frames = self.loop_closure_error_frames();
        SessionPlan {
            seconds_per_revolution: self.seconds_per_revolution,
            fps: self.fps.as_f64(),
            target_frame_count: self.target_frame_count,
            frames_per_revolution: self.fps.secs_to_frames_round(self.seconds_per_revolution),
            recording_secs: self.recording_secs(),
            closure_error_frames,
            loop_closes: closure_error_frames.abs() <= 1.0,
            canvas: self.canvas,
            clock: self.clock,
        }
    }
}

/// Static-serving step.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServeConfig {
    pub argv: Vec<String>,
    /// Regex matched against each output line; capture group 1 is the port.
    pub listen_pattern: String,
    pub host: String,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            argv: [
                "python3",
                "-u",
                "-m",
                "http.server",
                "0",
                "--bind",
                "127.0.0.1",
                "--directory",
                "assets",
            ]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
            listen_pattern: r"port (\d+)".to_owned(),
            host: "127.0.0.1".to_owned(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderHostConfig {
    /// Pinned host binary. `SPINLOOP_RENDER_HOST` takes precedence.
    pub binary: Option<PathBuf>,
    /// Passed to the host as `--backend`.
    pub backend: BackendKind,
    pub extra_args: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timeouts {
    pub listen_ms: u64,
    pub canvas_ready_ms: u64,
    /// Bound on asset loading plus the first scene tick after navigation.
    pub scene_ready_ms: u64,
    pub delivery_ms: u64,
    pub exit_grace_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            listen_ms: 30_000,
            canvas_ready_ms: 30_000,
            scene_ready_ms: 30_000,
            delivery_ms: 60_000,
            exit_grace_ms: 5_000,
        }
    }
}

impl Timeouts {
    pub fn listen(&self) -> Duration {
        Duration::from_millis(self.listen_ms)
    }

    pub fn canvas_ready(&self) -> Duration {
        Duration::from_millis(self.canvas_ready_ms)
    }

    pub fn scene_ready(&self) -> Duration {
        Duration::from_millis(self.scene_ready_ms)
    }

    pub fn delivery(&self) -> Duration {
        Duration::from_millis(self.delivery_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TranscodeConfig {
    pub enabled: bool,
    pub preset: String,
    pub crf: u8,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            preset: "slow".to_owned(),
            crf: 18,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub dir: PathBuf,
    /// File name without extension; the extension follows the negotiated container.
    pub stem: String,
    pub transcode: TranscodeConfig,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("out"),
            stem: "turntable".to_owned(),
            transcode: TranscodeConfig::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    pub build: Option<Vec<String>>,
    pub serve: Option<ServeConfig>,
    /// Asset directory used as the page base when no serving step is configured.
    pub asset_dir: PathBuf,
    pub route: String,
    pub render_host: RenderHostConfig,
    pub timeouts: Timeouts,
    pub output: OutputConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            build: None,
            serve: Some(ServeConfig::default()),
            asset_dir: PathBuf::from("assets"),
            route: crate::host::route::RECORD_ROUTE.to_owned(),
            render_host: RenderHostConfig::default(),
            timeouts: Timeouts::default(),
            output: OutputConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> SpinloopResult<()> {
        if let Some(build) = &self.build
            && build.is_empty()
        {
            return Err(SpinloopError::validation("build argv must not be empty"));
        }
        if let Some(serve) = &self.serve {
            if serve.argv.is_empty() {
                return Err(SpinloopError::validation("serve argv must not be empty"));
            }
            let re = regex::Regex::new(&serve.listen_pattern).map_err(|e| {
                SpinloopError::validation(format!("invalid serve.listen_pattern: {e}"))
            })?;
            if re.captures_len() < 2 {
                return Err(SpinloopError::validation(
                    "serve.listen_pattern needs a capture group for the port",
                ));
            }
        }
        if !self.route.starts_with('/') {
            return Err(SpinloopError::validation("route must start with '/'"));
        }
        if self.output.stem.trim().is_empty() {
            return Err(SpinloopError::validation("output.stem must be non-empty"));
        }
        let t = &self.timeouts;
        if t.listen_ms == 0
            || t.canvas_ready_ms == 0
            || t.scene_ready_ms == 0
            || t.delivery_ms == 0
        {
            return Err(SpinloopError::validation("timeouts must be non-zero"));
        }
        Ok(())
    }
}

impl SpinloopConfig {
    /// Load from `path`, or return defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> SpinloopResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config '{}'", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> SpinloopResult<Self> {
        let cfg: Self = serde_json::from_str(text)?;
        Ok(cfg)
    }

    pub fn validate(&self) -> SpinloopResult<()> {
        self.scene.validate()?;
        self.orchestrator.validate()
    }
}

#[cfg(test)]
#[path = "../tests/unit/config.rs"]
mod tests;
