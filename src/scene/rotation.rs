use std::f64::consts::TAU;

use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::foundation::math::wrap_angle;

/// Turntable angle at `elapsed_secs`, in `[0, 2π)`.
///
/// Pure function of elapsed time so playback speed does not depend on the achieved frame rate.
pub fn angle_at(elapsed_secs: f64, seconds_per_revolution: f64) -> f64 {
    let turns = elapsed_secs.max(0.0) / seconds_per_revolution;
    wrap_angle(turns.fract() * TAU)
}

/// The single piece of mutable timing state of a scene.
///
/// The angle is never stored; it is recomputed from elapsed time on every read so no drift can
/// accumulate across ticks.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationState {
    elapsed_seconds: f64,
    seconds_per_revolution: f64,
}

impl RotationState {
    pub fn new(seconds_per_revolution: f64) -> SpinloopResult<Self> {
        if !seconds_per_revolution.is_finite() || seconds_per_revolution <= 0.0 {
            return Err(SpinloopError::validation(
                "seconds_per_revolution must be finite and > 0",
            ));
        }
        Ok(Self {
            elapsed_seconds: 0.0,
            seconds_per_revolution,
        })
    }

    /// Advance to `elapsed_secs`. Time never moves backwards; stale readings are ignored.
    pub fn advance_to(&mut self, elapsed_secs: f64) -> f64 {
        if elapsed_secs.is_finite() && elapsed_secs > self.elapsed_seconds {
            self.elapsed_seconds = elapsed_secs;
        }
        self.angle_radians()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn seconds_per_revolution(&self) -> f64 {
        self.seconds_per_revolution
    }

    pub fn angle_radians(&self) -> f64 {
        angle_at(self.elapsed_seconds, self.seconds_per_revolution)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/rotation.rs"]
mod tests;
