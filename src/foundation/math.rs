use std::f64::consts::TAU;

/// Wrap any finite angle into `[0, 2π)`.
pub(crate) fn wrap_angle(rad: f64) -> f64 {
    let w = rad.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs.
    if w >= TAU { 0.0 } else { w }
}

/// Forward (counter-clockwise) angular distance from `from` to `to`, in `[0, 2π)`.
pub(crate) fn forward_delta(from: f64, to: f64) -> f64 {
    wrap_angle(to - from)
}

pub(crate) fn deg_to_rad(deg: f64) -> f64 {
    deg.to_radians()
}

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
