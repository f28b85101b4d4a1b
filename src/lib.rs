//! Spinloop records seamless turntable loops.
//!
//! A headless render host spins a mesh at a fixed angular rate. Once its assets are loaded and
//! one full revolution has passed, it records exactly one revolution of frames, so the clip's
//! last frame flows into its first. An orchestrator process drives the host and writes the
//! artifact to disk, optionally transcoding it.
//!
//! - [`SceneDriver`] maps elapsed time to an angle and emits fire-once readiness events
//! - [`Recorder`] arms at a [`LoopBoundary`] and captures a fixed number of frames
//! - [`Delivery`] hands the finished artifact to whoever is waiting for it
//! - [`Orchestrator`] runs build, serve, host and persistence out of process
#![forbid(unsafe_code)]

mod foundation;

pub(crate) mod capture;
pub mod config;
pub(crate) mod delivery;
pub(crate) mod host;
pub(crate) mod orchestrator;
pub(crate) mod render;
pub(crate) mod scene;

pub use crate::capture::mime::{
    EncoderSupport, EncodingProfile, FALLBACK_MIME, FfmpegEncoders, negotiate,
};
pub use crate::capture::recorder::{
    Recorder, RecorderEvent, RecordingPlan, RecordingSession, RecordingStatus,
};
pub use crate::capture::stream::{
    CaptureStream, FfmpegCaptureStream, StopOutcome, StreamConfig, StreamEvent, StreamState,
};
pub use crate::config::{ClockMode, SceneParams, SessionPlan, SpinloopConfig};
pub use crate::delivery::{
    Artifact, Delivery, DeliveryMode, DeliveryNotice, DeliveryObserver, decode_payload,
};
pub use crate::foundation::core::{Canvas, Fps, FrameIndex, Rgba8};
pub use crate::foundation::error::{SpinloopError, SpinloopResult};
pub use crate::host::page::{
    FixedStepClock, FrameClock, PageStatus, RealtimeClock, RecordPage, render_still,
};
pub use crate::host::protocol::{EventWriter, HostCommand, HostEvent};
pub use crate::host::route::{PageUrl, RECORD_ROUTE};
pub use crate::host::run_host;
pub use crate::orchestrator::pipeline::{Orchestrator, OrchestratorState, RunReport};
pub use crate::orchestrator::render_host::{
    HostConnection, HostLauncher, ProcessHostLauncher, RENDER_HOST_ENV, locate_render_host,
};
pub use crate::orchestrator::transcode::transcode_to_mp4;
pub use crate::render::backend::{BackendKind, FrameRGBA, TurntableBackend, create_backend};
pub use crate::render::cpu::CpuTurntable;
#[cfg(feature = "gpu")]
pub use crate::render::gpu::GpuTurntable;
pub use crate::scene::driver::{LoopBoundary, SceneDriver, SceneEvent, SceneTick};
pub use crate::scene::mesh::{Environment, Mesh};
pub use crate::scene::rotation::angle_at;
