//! CPU turntable backend: fills the projected triangles with `vello_cpu`.

use kurbo::Point;

use crate::foundation::core::Canvas;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::render::backend::{FrameRGBA, TurntableBackend};
use crate::render::projection::{ProjectedTriangle, TurntableCamera};
use crate::scene::mesh::{Environment, Mesh};

pub struct CpuTurntable {
    camera: TurntableCamera,
    width: u16,
    height: u16,
    pixmap: vello_cpu::Pixmap,
    scratch: Vec<ProjectedTriangle>,
}

impl CpuTurntable {
    pub fn new(canvas: Canvas, camera_tilt_deg: f64) -> SpinloopResult<Self> {
        canvas.validate()?;
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| SpinloopError::validation("canvas width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| SpinloopError::validation("canvas height exceeds u16"))?;
        Ok(Self {
            camera: TurntableCamera::new(canvas, camera_tilt_deg),
            width,
            height,
            pixmap: vello_cpu::Pixmap::new(width, height),
            scratch: Vec::new(),
        })
    }
}

impl TurntableBackend for CpuTurntable {
    fn canvas(&self) -> Canvas {
        self.camera.canvas()
    }

    fn render(&mut self, mesh: &Mesh, env: &Environment, angle: f64) -> SpinloopResult<FrameRGBA> {
        self.camera.project(mesh, env, angle, &mut self.scratch);

        let (w, h) = (f64::from(self.width), f64::from(self.height));
        let mut ctx = vello_cpu::RenderContext::new(self.width, self.height);
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);

        let [br, bg, bb, ba] = env.background.0;
        ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(br, bg, bb, ba));
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, w, h));

        for tri in &self.scratch {
            let [r, g, b] = tri.lit(env.base_color);
            ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(r, g, b, 255));
            ctx.fill_path(&triangle_path(&tri.points));
        }

        ctx.flush();
        ctx.render_to_pixmap(&mut self.pixmap);

        let canvas = self.camera.canvas();
        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: self.pixmap.data_as_u8_slice().to_vec(),
            premultiplied: true,
        })
    }
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn triangle_path(points: &[Point; 3]) -> vello_cpu::kurbo::BezPath {
    let mut path = vello_cpu::kurbo::BezPath::new();
    path.move_to(point_to_cpu(points[0]));
    path.line_to(point_to_cpu(points[1]));
    path.line_to(point_to_cpu(points[2]));
    path.close_path();
    path
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
