//! Frame-Accurate Recorder.
//!
//! Lifecycle of a single recording: armed at the loop boundary, started after a settle delay,
//! fed one frame per render tick until exactly `target_frame_count` frames were captured, then
//! stopped once and finalized once into a single artifact that goes to [`Delivery`].
//!
//! Time is passed in as a [`Duration`] since the render loop started, so the recorder never
//! reads a clock of its own.

use std::time::Duration;

use crate::capture::mime::{EncoderSupport, negotiate};
use crate::capture::stream::{CaptureStream, StopOutcome, StreamConfig, StreamEvent};
use crate::config::SceneParams;
use crate::delivery::{Artifact, Delivery, DeliveryNotice};
use crate::foundation::core::{Canvas, Fps, Rgba8};
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::render::backend::FrameRGBA;
use crate::scene::driver::LoopBoundary;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordingStatus {
    Idle,
    ArmedWaitingForLoopStart,
    Recording,
    Finalizing,
    Complete,
    Failed,
}

/// Fixed inputs of a recording.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordingPlan {
    pub surface: Canvas,
    pub target_frame_count: u64,
    pub fps: Fps,
    pub mime_candidates: Vec<String>,
    pub background: Rgba8,
}

impl RecordingPlan {
    pub fn from_scene(scene: &SceneParams) -> Self {
        Self {
            surface: scene.canvas,
            target_frame_count: scene.target_frame_count,
            fps: scene.fps,
            mime_candidates: scene.mime_candidates.clone(),
            background: scene.background,
        }
    }
}

#[derive(Debug)]
pub struct RecordingSession {
    status: RecordingStatus,
    target_frame_count: u64,
    frames_observed: u64,
    chunks: Vec<Vec<u8>>,
    mime_type: String,
    boundary: LoopBoundary,
    armed_at: Duration,
    stream_cfg: StreamConfig,
    finished: bool,
}

impl RecordingSession {
    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    pub fn target_frame_count(&self) -> u64 {
        self.target_frame_count
    }

    pub fn frames_observed(&self) -> u64 {
        self.frames_observed
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn boundary(&self) -> LoopBoundary {
        self.boundary
    }
}

/// Something the render loop should report upward.
#[derive(Clone, Debug, PartialEq)]
pub enum RecorderEvent {
    Started {
        mime_type: String,
        target_frame_count: u64,
    },
    StopRequested {
        frames_observed: u64,
    },
    Delivered(DeliveryNotice),
}

pub struct Recorder<S: CaptureStream> {
    stream: S,
    session: Option<RecordingSession>,
    settle_delay: Duration,
    delivery: Delivery,
}

impl<S: CaptureStream> Recorder<S> {
    pub fn new(stream: S, settle_delay: Duration, delivery: Delivery) -> Self {
        Self {
            stream,
            session: None,
            settle_delay,
            delivery,
        }
    }

    pub fn status(&self) -> RecordingStatus {
        self.session
            .as_ref()
            .map_or(RecordingStatus::Idle, |s| s.status)
    }

    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    /// Arm the recorder at the loop boundary. A recorder arms once.
    #[tracing::instrument(skip_all, fields(frame = boundary.frame().0, angle = boundary.angle()))]
    pub fn arm(
        &mut self,
        boundary: LoopBoundary,
        plan: &RecordingPlan,
        support: &dyn EncoderSupport,
        now: Duration,
    ) -> SpinloopResult<()> {
        if self.session.is_some() {
            return Err(SpinloopError::capture(
                "recorder already armed; sessions are single-use",
            ));
        }
        if plan.target_frame_count == 0 {
            return Err(SpinloopError::validation("target_frame_count must be > 0"));
        }
        Fps::new(plan.fps.num, plan.fps.den)?;
        plan.surface.validate()?;

        let profile = negotiate(&plan.mime_candidates, support);
        tracing::info!(
            mime = %profile.mime_type,
            target_frames = plan.target_frame_count,
            settle_ms = self.settle_delay.as_millis() as u64,
            "recorder armed"
        );
        self.session = Some(RecordingSession {
            status: RecordingStatus::ArmedWaitingForLoopStart,
            target_frame_count: plan.target_frame_count,
            frames_observed: 0,
            chunks: Vec::new(),
            mime_type: profile.mime_type.clone(),
            boundary,
            armed_at: now,
            stream_cfg: StreamConfig {
                canvas: plan.surface,
                fps: plan.fps,
                profile,
                bg_rgba: plan.background.0,
            },
            finished: false,
        });
        Ok(())
    }

    /// Per-tick callback: start after the settle delay, count and feed frames, stop on target.
    pub fn on_tick(
        &mut self,
        now: Duration,
        frame: &FrameRGBA,
    ) -> SpinloopResult<Vec<RecorderEvent>> {
        let mut events = self.pump()?;
        let Some(session) = self.session.as_mut() else {
            return Ok(events);
        };

        if session.status == RecordingStatus::ArmedWaitingForLoopStart {
            if now.saturating_sub(session.armed_at) < self.settle_delay {
                return Ok(events);
            }
            if let Err(e) = self.stream.start(&session.stream_cfg) {
                session.status = RecordingStatus::Failed;
                return Err(e);
            }
            session.status = RecordingStatus::Recording;
            tracing::info!(mime = %session.mime_type, "recording started");
            events.push(RecorderEvent::Started {
                mime_type: session.mime_type.clone(),
                target_frame_count: session.target_frame_count,
            });
        }

        if session.status != RecordingStatus::Recording {
            return Ok(events);
        }

        if let Err(e) = self.stream.push_frame(frame) {
            session.status = RecordingStatus::Failed;
            return Err(e);
        }
        session.frames_observed += 1;
        if session.frames_observed >= session.target_frame_count {
            session.status = RecordingStatus::Finalizing;
            tracing::info!(frames = session.frames_observed, "target frame count reached");
            if let StopOutcome::NotRecording(state) = self.stream.request_stop() {
                tracing::warn!(?state, "stop requested while not recording; ignoring");
            }
            events.push(RecorderEvent::StopRequested {
                frames_observed: session.frames_observed,
            });
        }
        Ok(events)
    }

    /// Ask the stream to stop. Stopping a stream that is not recording is logged and ignored.
    pub fn request_stop(&mut self) -> StopOutcome {
        let outcome = self.stream.request_stop();
        if let StopOutcome::NotRecording(state) = outcome {
            tracing::warn!(?state, "stop requested while not recording; ignoring");
        }
        outcome
    }

    /// Drain stream events: append chunks in arrival order and finalize on completion.
    pub fn pump(&mut self) -> SpinloopResult<Vec<RecorderEvent>> {
        let mut events = Vec::new();
        for ev in self.stream.poll_events() {
            match ev {
                StreamEvent::Chunk(bytes) => {
                    if let Some(session) = self.session.as_mut() {
                        session.chunks.push(bytes);
                    }
                }
                StreamEvent::Stopped => {
                    if let Some(notice) = self.finalize()? {
                        events.push(RecorderEvent::Delivered(notice));
                    }
                }
                StreamEvent::Failed(msg) => {
                    if let Some(session) = self.session.as_mut() {
                        session.status = RecordingStatus::Failed;
                    }
                    return Err(SpinloopError::capture(msg));
                }
            }
        }
        Ok(events)
    }

    /// Concatenate chunks and deliver. Runs once; later calls return `Ok(None)`.
    pub fn finalize(&mut self) -> SpinloopResult<Option<DeliveryNotice>> {
        let Some(session) = self.session.as_mut() else {
            return Err(SpinloopError::capture("finalize called before arm"));
        };
        if session.finished {
            tracing::debug!("finalize already ran; ignoring repeated completion signal");
            return Ok(None);
        }
        session.finished = true;

        if session.frames_observed < session.target_frame_count {
            session.status = RecordingStatus::Failed;
            return Err(SpinloopError::capture(format!(
                "capture stream stopped after {} of {} frames",
                session.frames_observed, session.target_frame_count
            )));
        }

        session.status = RecordingStatus::Finalizing;
        let artifact = Artifact {
            bytes: session.chunks.concat(),
            mime_type: session.mime_type.clone(),
        };
        tracing::info!(
            chunks = session.chunks.len(),
            size = artifact.size(),
            frames = session.frames_observed,
            "recording finalized"
        );
        session.chunks.clear();

        match self.delivery.deliver(&artifact) {
            Ok(notice) => {
                session.status = RecordingStatus::Complete;
                Ok(notice)
            }
            Err(e) => {
                session.status = RecordingStatus::Failed;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/capture/recorder.rs"]
mod tests;
