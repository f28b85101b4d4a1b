//! Turntable camera shared by the render backends.
//!
//! The mesh spins about its Y axis in front of a fixed camera that looks down at a configurable
//! tilt. Triangles come out in painter's order (farthest first), flat-shaded with a two-sided
//! Lambert term plus ambient.

use kurbo::{BezPath, Point};

use crate::foundation::core::Canvas;
use crate::scene::mesh::{Environment, Mesh};

const CAMERA_DISTANCE: f64 = 3.5;
const FILL_FACTOR: f64 = 0.9;

/// One screen-space triangle ready to fill.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectedTriangle {
    pub points: [Point; 3],
    pub depth: f64,
    /// Light factor in `[ambient, 1]`.
    pub shade: f64,
}

impl ProjectedTriangle {
    pub fn path(&self) -> BezPath {
        let mut path = BezPath::new();
        path.move_to(self.points[0]);
        path.line_to(self.points[1]);
        path.line_to(self.points[2]);
        path.close_path();
        path
    }

    /// `base` scaled by this triangle's shade.
    pub fn lit(&self, base: [u8; 3]) -> [u8; 3] {
        base.map(|c| (f64::from(c) * self.shade).round().clamp(0.0, 255.0) as u8)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct TurntableCamera {
    canvas: Canvas,
    tilt_rad: f64,
}

impl TurntableCamera {
    pub fn new(canvas: Canvas, camera_tilt_deg: f64) -> Self {
        Self {
            canvas,
            tilt_rad: camera_tilt_deg.to_radians(),
        }
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    /// Project `mesh` rotated by `angle` radians into `out`, replacing its contents.
    pub fn project(
        &self,
        mesh: &Mesh,
        env: &Environment,
        angle: f64,
        out: &mut Vec<ProjectedTriangle>,
    ) {
        let (w, h) = (
            f64::from(self.canvas.width),
            f64::from(self.canvas.height),
        );
        let (cx, cy) = (w * 0.5, h * 0.5);
        // Unit-radius mesh at the nearest possible depth still fits the shorter side.
        let focal = w.min(h) * 0.5 * FILL_FACTOR * (CAMERA_DISTANCE - 1.0);
        let (sin_a, cos_a) = angle.sin_cos();
        let (sin_t, cos_t) = self.tilt_rad.sin_cos();
        let light = env.light_unit();

        let view = |p: &[f64; 3]| -> [f64; 3] {
            // Spin about Y, then tilt the camera about X.
            let x = p[0] * cos_a + p[2] * sin_a;
            let z = -p[0] * sin_a + p[2] * cos_a;
            let y = p[1] * cos_t - z * sin_t;
            let z = p[1] * sin_t + z * cos_t;
            [x, y, z]
        };

        out.clear();
        for tri in &mesh.triangles {
            let v = tri.map(|i| view(&mesh.positions[i as usize]));
            let n = cross(sub(v[1], v[0]), sub(v[2], v[0]));
            let n_len = dot(n, n).sqrt();
            if n_len == 0.0 {
                continue;
            }
            let lambert = (dot(n, light) / n_len).abs();
            let shade = env.ambient + (1.0 - env.ambient) * lambert;

            let points = v.map(|p| {
                let depth = CAMERA_DISTANCE - p[2];
                Point::new(cx + focal * p[0] / depth, cy - focal * p[1] / depth)
            });
            let depth = CAMERA_DISTANCE - (v[0][2] + v[1][2] + v[2][2]) / 3.0;
            out.push(ProjectedTriangle {
                points,
                depth,
                shade,
            });
        }
        // Painter's order: farthest first.
        out.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    }
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[cfg(test)]
#[path = "../../tests/unit/render/projection.rs"]
mod tests;
