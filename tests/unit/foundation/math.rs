use super::*;

#[test]
fn wrap_angle_stays_in_half_open_range() {
    for raw in [-TAU, -1e-18, 0.0, 1.0, TAU, 3.0 * TAU + 0.5, 1e6] {
        let w = wrap_angle(raw);
        assert!((0.0..TAU).contains(&w), "{raw} wrapped to {w}");
    }
    assert_eq!(wrap_angle(TAU), 0.0);
}

#[test]
fn forward_delta_is_wrap_aware() {
    assert!((forward_delta(0.1, 0.3) - 0.2).abs() < 1e-12);
    assert!((forward_delta(TAU - 0.1, 0.1) - 0.2).abs() < 1e-12);
    assert!((forward_delta(0.3, 0.1) - (TAU - 0.2)).abs() < 1e-12);
}

#[test]
fn mul_div255_rounds() {
    assert_eq!(mul_div255_u16(255, 255), 255);
    assert_eq!(mul_div255_u16(128, 255), 128);
    assert_eq!(mul_div255_u16(0, 200), 0);
    assert!((deg_to_rad(180.0) - std::f64::consts::PI).abs() < 1e-12);
}
