//! The `/record` page: one render loop driving the Scene Driver and the Recorder.
//!
//! Everything here runs on a single thread, one tick at a time. Asset loads and the encoder run
//! elsewhere and are only polled from the loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::capture::mime::EncoderSupport;
use crate::capture::recorder::{Recorder, RecorderEvent, RecordingPlan, RecordingStatus};
use crate::capture::stream::CaptureStream;
use crate::config::{ClockMode, SceneParams};
use crate::delivery::Delivery;
use crate::foundation::core::Fps;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::host::protocol::{EventWriter, HostEvent};
use crate::host::route::{PageUrl, Route};
use crate::render::backend::{BackendKind, FrameRGBA, TurntableBackend, create_backend};
use crate::scene::assets::{PendingAsset, fetch_bytes};
use crate::scene::driver::{SceneDriver, SceneEvent};
use crate::scene::mesh::{Environment, Mesh};

/// Paces the render loop.
pub trait FrameClock {
    /// Wait for the next tick and return the time elapsed since the loop started.
    fn next_tick(&mut self) -> Duration;
}

/// Wall-clock pacing. Sleeps to each deadline; ticks missed while rendering are dropped.
#[derive(Debug)]
pub struct RealtimeClock {
    start: Option<Instant>,
    period: Duration,
    next_deadline: Duration,
    dropped: u64,
}

impl RealtimeClock {
    pub fn new(fps: Fps) -> Self {
        Self {
            start: None,
            period: fps.frame_duration(),
            next_deadline: Duration::ZERO,
            dropped: 0,
        }
    }

    pub fn dropped_ticks(&self) -> u64 {
        self.dropped
    }
}

impl FrameClock for RealtimeClock {
    fn next_tick(&mut self) -> Duration {
        let start = *self.start.get_or_insert_with(Instant::now);
        let now = start.elapsed();
        if now < self.next_deadline {
            std::thread::sleep(self.next_deadline - now);
        }
        let elapsed = start.elapsed();
        self.next_deadline += self.period;
        while self.next_deadline <= elapsed {
            self.next_deadline += self.period;
            self.dropped += 1;
        }
        elapsed
    }
}

/// Deterministic pacing: exactly one frame period per tick, no sleeping.
#[derive(Debug)]
pub struct FixedStepClock {
    fps: Fps,
    ticks: u64,
}

impl FixedStepClock {
    pub fn new(fps: Fps) -> Self {
        Self { fps, ticks: 0 }
    }
}

impl FrameClock for FixedStepClock {
    fn next_tick(&mut self) -> Duration {
        let elapsed = Duration::from_secs_f64(self.fps.frames_to_secs(self.ticks));
        self.ticks += 1;
        elapsed
    }
}

pub fn clock_for(mode: ClockMode, fps: Fps) -> Box<dyn FrameClock> {
    match mode {
        ClockMode::Realtime => Box::new(RealtimeClock::new(fps)),
        ClockMode::FixedStep => Box::new(FixedStepClock::new(fps)),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageStatus {
    Running,
    Done,
}

pub struct RecordPage<S: CaptureStream> {
    driver: SceneDriver,
    mesh: PendingAsset<Mesh>,
    environment: PendingAsset<Environment>,
    renderer: Box<dyn TurntableBackend>,
    placeholder: FrameRGBA,
    recorder: Recorder<S>,
    plan: RecordingPlan,
    encoders: Box<dyn EncoderSupport + Send>,
    events: EventWriter,
}

impl<S: CaptureStream> RecordPage<S> {
    /// Navigate to `url`: check the route, start both asset loads, take over the render surface.
    #[tracing::instrument(skip_all, fields(url = %url))]
    pub fn boot(
        url: &str,
        scene: &SceneParams,
        renderer: Box<dyn TurntableBackend>,
        stream: S,
        encoders: Box<dyn EncoderSupport + Send>,
        events: EventWriter,
    ) -> SpinloopResult<Self> {
        let page = PageUrl::parse(url)?;
        let Route::Record = page.route()?;
        scene.validate()?;
        let mesh = PendingAsset::spawn("mesh", page.resolve(&scene.mesh_url)?, Mesh::parse_obj_bytes);
        let environment = PendingAsset::spawn(
            "environment",
            page.resolve(&scene.environment_url)?,
            Environment::parse_json,
        );
        events.send(&HostEvent::Loaded {
            url: url.to_owned(),
        })?;
        Self::with_assets(scene, mesh, environment, renderer, stream, encoders, events)
    }

    /// Build the page around already-started asset loads.
    pub fn with_assets(
        scene: &SceneParams,
        mesh: PendingAsset<Mesh>,
        environment: PendingAsset<Environment>,
        renderer: Box<dyn TurntableBackend>,
        stream: S,
        encoders: Box<dyn EncoderSupport + Send>,
        events: EventWriter,
    ) -> SpinloopResult<Self> {
        if renderer.canvas() != scene.canvas {
            return Err(SpinloopError::validation(format!(
                "render surface is {}x{}, scene expects {}x{}",
                renderer.canvas().width,
                renderer.canvas().height,
                scene.canvas.width,
                scene.canvas.height
            )));
        }
        let driver = SceneDriver::new(
            scene.seconds_per_revolution,
            scene.revolution_tolerance_rad(),
        )?;
        let placeholder = FrameRGBA::solid(scene.canvas, scene.background.to_premul());
        let mut delivery = Delivery::new(scene.delivery, scene.save_path.clone());
        if let Some(dir) = &scene.download_dir {
            delivery = delivery.with_download_dir(dir);
        }
        let delivery = delivery.with_observer(Box::new(events.clone()));
        let recorder = Recorder::new(stream, scene.settle_delay(), delivery);

        events.send(&HostEvent::CanvasReady {
            width: scene.canvas.width,
            height: scene.canvas.height,
        })?;

        Ok(Self {
            driver,
            mesh,
            environment,
            renderer,
            placeholder,
            recorder,
            plan: RecordingPlan::from_scene(scene),
            encoders,
            events,
        })
    }

    pub fn driver(&self) -> &SceneDriver {
        &self.driver
    }

    pub fn recorder(&self) -> &Recorder<S> {
        &self.recorder
    }

    /// One render tick at `elapsed` since the loop started.
    pub fn step(&mut self, elapsed: Duration) -> SpinloopResult<PageStatus> {
        if self.mesh.poll()?.is_some() {
            self.driver.mark_mesh_loaded();
        }
        if self.environment.poll()?.is_some() {
            self.driver.mark_environment_loaded();
        }

        let tick = self.driver.tick(elapsed.as_secs_f64());
        for ev in &tick.events {
            let event = match *ev {
                SceneEvent::Ready { angle } => {
                    tracing::info!(frame = tick.frame.0, angle, "scene ready");
                    HostEvent::SceneReady {
                        angle,
                        frame: tick.frame.0,
                    }
                }
                SceneEvent::FullRevolution { angle, traveled } => {
                    tracing::info!(frame = tick.frame.0, angle, traveled, "full revolution");
                    HostEvent::FullRevolution {
                        angle,
                        frame: tick.frame.0,
                    }
                }
            };
            self.events.send(&event)?;
        }

        let rendered;
        let frame = match (self.mesh.get(), self.environment.get()) {
            (Some(mesh), Some(env)) => {
                rendered = self.renderer.render(mesh, env, tick.angle)?;
                &rendered
            }
            _ => &self.placeholder,
        };

        if let Some(boundary) = tick.boundary {
            self.recorder
                .arm(boundary, &self.plan, &*self.encoders, elapsed)?;
        }

        for ev in self.recorder.on_tick(elapsed, frame)? {
            match ev {
                RecorderEvent::Started {
                    mime_type,
                    target_frame_count,
                } => self.events.send(&HostEvent::RecordingStarted {
                    mime_type,
                    target_frame_count,
                })?,
                RecorderEvent::StopRequested { frames_observed } => {
                    tracing::debug!(frames_observed, "waiting for capture stream to finish");
                }
                RecorderEvent::Delivered(notice) => {
                    tracing::info!(size = notice.size, mime = %notice.mime_type, "delivered");
                }
            }
        }

        Ok(match self.recorder.status() {
            RecordingStatus::Complete => PageStatus::Done,
            _ => PageStatus::Running,
        })
    }

    /// Tick until the recording is delivered or `shutdown` is raised.
    pub fn run(&mut self, clock: &mut dyn FrameClock, shutdown: &AtomicBool) -> SpinloopResult<()> {
        while !shutdown.load(Ordering::Relaxed) {
            let elapsed = clock.next_tick();
            if self.step(elapsed)? == PageStatus::Done {
                tracing::info!(
                    elapsed_secs = self.driver.rotation().elapsed_seconds(),
                    "recording page finished"
                );
                return Ok(());
            }
        }
        tracing::info!("render loop stopped by shutdown");
        Ok(())
    }
}

/// Render one frame at `angle` radians on `backend`, loading both assets synchronously.
pub fn render_still(
    scene: &SceneParams,
    page_url: &str,
    angle: f64,
    backend: BackendKind,
) -> SpinloopResult<FrameRGBA> {
    let page = PageUrl::parse(page_url)?;
    let mesh = Mesh::parse_obj_bytes(&fetch_bytes(&page.resolve(&scene.mesh_url)?)?)?;
    let env = Environment::parse_json(&fetch_bytes(&page.resolve(&scene.environment_url)?)?)?;
    let mut renderer = create_backend(backend, scene.canvas, scene.camera_tilt_deg)?;
    renderer.render(&mesh, &env, angle)
}

#[cfg(test)]
#[path = "../../tests/unit/host/page.rs"]
mod tests;
