use crate::foundation::core::Canvas;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::scene::mesh::{Environment, Mesh};

/// One rendered frame in RGBA8 row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameRGBA {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
    pub premultiplied: bool,
}

impl FrameRGBA {
    /// A frame filled with a single premultiplied color.
    pub fn solid(canvas: Canvas, premul_rgba: [u8; 4]) -> Self {
        let mut data = vec![0u8; canvas.byte_len()];
        for px in data.chunks_exact_mut(4) {
            px.copy_from_slice(&premul_rgba);
        }
        Self {
            width: canvas.width,
            height: canvas.height,
            data,
            premultiplied: true,
        }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }
}

/// Renders the turntable scene at a given angle.
pub trait TurntableBackend {
    fn canvas(&self) -> Canvas;

    fn render(&mut self, mesh: &Mesh, env: &Environment, angle: f64) -> SpinloopResult<FrameRGBA>;
}

/// Render backend selection. `gpu` needs the crate's `gpu` feature.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    Cpu,
    /// Hardware-accelerated `vello`/`wgpu` rendering.
    Gpu,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
        }
    }

    pub fn is_available(self) -> bool {
        match self {
            Self::Cpu => true,
            Self::Gpu => cfg!(feature = "gpu"),
        }
    }
}

pub fn create_backend(
    kind: BackendKind,
    canvas: Canvas,
    camera_tilt_deg: f64,
) -> SpinloopResult<Box<dyn TurntableBackend>> {
    tracing::debug!(backend = kind.as_str(), "creating render backend");
    match kind {
        BackendKind::Cpu => Ok(Box::new(crate::render::cpu::CpuTurntable::new(
            canvas,
            camera_tilt_deg,
        )?)),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => Ok(Box::new(crate::render::gpu::GpuTurntable::new(
            canvas,
            camera_tilt_deg,
        )?)),
        #[allow(unreachable_patterns)]
        _ => Err(SpinloopError::validation(format!(
            "render backend '{}' is not available in this build (enable the `gpu` feature)",
            kind.as_str()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/backend.rs"]
mod tests;
