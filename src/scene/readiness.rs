use std::f64::consts::TAU;

use crate::foundation::math::forward_delta;

/// Fire-once signal state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OneShot {
    #[default]
    Pending,
    Fired,
}

impl OneShot {
    /// Transition to `Fired`. Returns `true` only for the call that performed the transition.
    pub fn fire(&mut self) -> bool {
        match self {
            Self::Pending => {
                *self = Self::Fired;
                true
            }
            Self::Fired => false,
        }
    }

    pub fn is_fired(self) -> bool {
        self == Self::Fired
    }
}

/// Tracks forward rotation from a captured start angle until one full revolution has passed.
///
/// Travel is accumulated tick to tick from wrap-aware forward deltas, so the result does not
/// depend on where in the circle the start angle happens to fall.
#[derive(Clone, Debug)]
pub struct RevolutionTracker {
    tolerance_rad: f64,
    start_angle: Option<f64>,
    last_angle: f64,
    traveled: f64,
}

impl RevolutionTracker {
    pub fn new(tolerance_rad: f64) -> Self {
        Self {
            tolerance_rad,
            start_angle: None,
            last_angle: 0.0,
            traveled: 0.0,
        }
    }

    /// Capture the start angle. Later calls are ignored.
    pub fn begin(&mut self, angle: f64) {
        if self.start_angle.is_some() {
            return;
        }
        self.start_angle = Some(angle);
        self.last_angle = angle;
        self.traveled = 0.0;
    }

    pub fn traveled(&self) -> f64 {
        self.traveled
    }

    /// Feed the angle of a new tick. Returns `true` once travel reaches `2π - tolerance`.
    ///
    /// Before `begin` nothing is tracked and this always returns `false`.
    pub fn observe(&mut self, angle: f64) -> bool {
        if self.start_angle.is_none() {
            return false;
        }
        self.traveled += forward_delta(self.last_angle, angle);
        self.last_angle = angle;
        self.traveled >= TAU - self.tolerance_rad
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scene/readiness.rs"]
mod tests;
