//! Rotation Scene Driver.
//!
//! Advances the turntable angle once per render tick and turns the two asynchronous resource
//! loads into fire-once scene events:
//!
//! - [`SceneEvent::Ready`] on the first tick where both the mesh and the environment are loaded.
//!   The angle of that tick becomes the revolution start angle.
//! - [`SceneEvent::FullRevolution`] on the first tick where forward travel since that start angle
//!   reaches `2π - tolerance`. This tick is the loop boundary: the clip recorded from here ends
//!   where it started.

use crate::foundation::core::FrameIndex;
use crate::foundation::error::SpinloopResult;
use crate::scene::readiness::{OneShot, RevolutionTracker};
use crate::scene::rotation::RotationState;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SceneEvent {
    Ready { angle: f64 },
    FullRevolution { angle: f64, traveled: f64 },
}

/// Proof that the scene has reached its loop boundary.
///
/// Only [`SceneDriver::tick`] can produce one, and only on the tick where both scene events have
/// fired; arming a recorder requires it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopBoundary {
    angle: f64,
    frame: FrameIndex,
}

impl LoopBoundary {
    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn frame(&self) -> FrameIndex {
        self.frame
    }

    #[cfg(test)]
    pub(crate) fn for_tests(angle: f64, frame: FrameIndex) -> Self {
        Self { angle, frame }
    }
}

/// Output of one render tick.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneTick {
    pub frame: FrameIndex,
    pub angle: f64,
    pub events: Vec<SceneEvent>,
    pub boundary: Option<LoopBoundary>,
}

#[derive(Debug)]
pub struct SceneDriver {
    rotation: RotationState,
    mesh_loaded: OneShot,
    environment_loaded: OneShot,
    ready: OneShot,
    full_revolution: OneShot,
    revolution: RevolutionTracker,
    next_frame: FrameIndex,
}

impl SceneDriver {
    pub fn new(seconds_per_revolution: f64, tolerance_rad: f64) -> SpinloopResult<Self> {
        Ok(Self {
            rotation: RotationState::new(seconds_per_revolution)?,
            mesh_loaded: OneShot::Pending,
            environment_loaded: OneShot::Pending,
            ready: OneShot::Pending,
            full_revolution: OneShot::Pending,
            revolution: RevolutionTracker::new(tolerance_rad),
            next_frame: FrameIndex(0),
        })
    }

    pub fn mark_mesh_loaded(&mut self) {
        self.mesh_loaded.fire();
    }

    pub fn mark_environment_loaded(&mut self) {
        self.environment_loaded.fire();
    }

    pub fn assets_ready(&self) -> bool {
        self.mesh_loaded.is_fired() && self.environment_loaded.is_fired()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.is_fired()
    }

    pub fn has_completed_revolution(&self) -> bool {
        self.full_revolution.is_fired()
    }

    pub fn rotation(&self) -> &RotationState {
        &self.rotation
    }

    /// Run one render tick at `elapsed_secs` since the loop started.
    pub fn tick(&mut self, elapsed_secs: f64) -> SceneTick {
        let frame = self.next_frame;
        self.next_frame = frame.next();
        let angle = self.rotation.advance_to(elapsed_secs);

        let mut events = Vec::new();
        let mut boundary = None;

        if self.ready.is_fired() {
            if !self.full_revolution.is_fired() && self.revolution.observe(angle) {
                self.full_revolution.fire();
                events.push(SceneEvent::FullRevolution {
                    angle,
                    traveled: self.revolution.traveled(),
                });
                boundary = Some(LoopBoundary { angle, frame });
            }
        } else if self.assets_ready() && self.ready.fire() {
            self.revolution.begin(angle);
            events.push(SceneEvent::Ready { angle });
        }

        SceneTick {
            frame,
            angle,
            events,
            boundary,
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/driver.rs"]
mod tests;
