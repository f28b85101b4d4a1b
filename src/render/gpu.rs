//! GPU turntable backend: fills the projected triangles with `vello` on a `wgpu` device and reads
//! the target texture back into a [`FrameRGBA`].

use vello::kurbo::Affine;
use vello::peniko::{Color, Fill};

use crate::foundation::core::Canvas;
use crate::foundation::error::{SpinloopError, SpinloopResult};
use crate::render::backend::{FrameRGBA, TurntableBackend};
use crate::render::projection::{ProjectedTriangle, TurntableCamera};
use crate::scene::mesh::{Environment, Mesh};

struct Target {
    texture: vello::wgpu::Texture,
    view: vello::wgpu::TextureView,
    readback: vello::wgpu::Buffer,
    readback_bytes_per_row: u32,
}

pub struct GpuTurntable {
    camera: TurntableCamera,
    device: vello::wgpu::Device,
    queue: vello::wgpu::Queue,
    renderer: vello::Renderer,
    scene: vello::Scene,
    target: Target,
    scratch: Vec<ProjectedTriangle>,
}

impl GpuTurntable {
    /// Acquire an adapter and device up front so a missing GPU fails at load time, not mid-clip.
    pub fn new(canvas: Canvas, camera_tilt_deg: f64) -> SpinloopResult<Self> {
        canvas.validate()?;

        let instance = vello::wgpu::Instance::new(&vello::wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &vello::wgpu::RequestAdapterOptions {
                power_preference: vello::wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| match e {
            vello::wgpu::RequestAdapterError::NotFound { .. } => {
                SpinloopError::render("no gpu adapter available")
            }
            other => SpinloopError::render(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&vello::wgpu::DeviceDescriptor {
                label: None,
                required_features: vello::wgpu::Features::empty(),
                required_limits: vello::wgpu::Limits::default(),
                experimental_features: vello::wgpu::ExperimentalFeatures::default(),
                memory_hints: vello::wgpu::MemoryHints::Performance,
                trace: vello::wgpu::Trace::Off,
            }))
            .map_err(|e| SpinloopError::render(format!("wgpu request_device failed: {e:?}")))?;

        let renderer = vello::Renderer::new(&device, vello::RendererOptions::default())
            .map_err(|e| SpinloopError::render(format!("vello renderer init failed: {e:?}")))?;

        let target = create_target(&device, canvas)?;
        tracing::info!(
            width = canvas.width,
            height = canvas.height,
            "gpu render backend ready"
        );

        Ok(Self {
            camera: TurntableCamera::new(canvas, camera_tilt_deg),
            device,
            queue,
            renderer,
            scene: vello::Scene::new(),
            target,
            scratch: Vec::new(),
        })
    }

    fn readback(&self) -> SpinloopResult<FrameRGBA> {
        let canvas = self.camera.canvas();
        let mut encoder = self
            .device
            .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                label: Some("spinloop_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            vello::wgpu::TexelCopyTextureInfo {
                texture: &self.target.texture,
                mip_level: 0,
                origin: vello::wgpu::Origin3d::ZERO,
                aspect: vello::wgpu::TextureAspect::All,
            },
            vello::wgpu::TexelCopyBufferInfo {
                buffer: &self.target.readback,
                layout: vello::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(self.target.readback_bytes_per_row),
                    rows_per_image: Some(canvas.height),
                },
            },
            vello::wgpu::Extent3d {
                width: canvas.width,
                height: canvas.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let buffer_slice = self.target.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(vello::wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        self.device
            .poll(vello::wgpu::PollType::wait_indefinitely())
            .map_err(|e| SpinloopError::render(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| SpinloopError::render("readback channel closed"))?
            .map_err(|e| SpinloopError::render(format!("readback map failed: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = canvas.width as usize * 4;
        let padded_row_bytes = self.target.readback_bytes_per_row as usize;
        let mut out = Vec::with_capacity(canvas.byte_len());
        for row in 0..canvas.height as usize {
            let start = row * padded_row_bytes;
            out.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        self.target.readback.unmap();

        Ok(FrameRGBA {
            width: canvas.width,
            height: canvas.height,
            data: out,
            premultiplied: true,
        })
    }
}

impl TurntableBackend for GpuTurntable {
    fn canvas(&self) -> Canvas {
        self.camera.canvas()
    }

    fn render(&mut self, mesh: &Mesh, env: &Environment, angle: f64) -> SpinloopResult<FrameRGBA> {
        self.camera.project(mesh, env, angle, &mut self.scratch);

        self.scene.reset();
        for tri in &self.scratch {
            let [r, g, b] = tri.lit(env.base_color);
            self.scene.fill(
                Fill::NonZero,
                Affine::IDENTITY,
                Color::from_rgba8(r, g, b, 255),
                None,
                &tri.path(),
            );
        }

        let canvas = self.camera.canvas();
        let [br, bg, bb, ba] = env.background.0;
        self.renderer
            .render_to_texture(
                &self.device,
                &self.queue,
                &self.scene,
                &self.target.view,
                &vello::RenderParams {
                    base_color: Color::from_rgba8(br, bg, bb, ba),
                    width: canvas.width,
                    height: canvas.height,
                    antialiasing_method: vello::AaConfig::Area,
                },
            )
            .map_err(|e| SpinloopError::render(format!("vello render failed: {e:?}")))?;

        self.readback()
    }
}

fn create_target(device: &vello::wgpu::Device, canvas: Canvas) -> SpinloopResult<Target> {
    let texture = device.create_texture(&vello::wgpu::TextureDescriptor {
        label: Some("spinloop_target"),
        size: vello::wgpu::Extent3d {
            width: canvas.width,
            height: canvas.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: vello::wgpu::TextureDimension::D2,
        format: vello::wgpu::TextureFormat::Rgba8Unorm,
        usage: vello::wgpu::TextureUsages::STORAGE_BINDING
            | vello::wgpu::TextureUsages::TEXTURE_BINDING
            | vello::wgpu::TextureUsages::RENDER_ATTACHMENT
            | vello::wgpu::TextureUsages::COPY_SRC
            | vello::wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&vello::wgpu::TextureViewDescriptor::default());

    let bytes_per_row_unpadded = canvas
        .width
        .checked_mul(4)
        .ok_or_else(|| SpinloopError::render("render target width overflow"))?;
    let readback_bytes_per_row = align_to(
        bytes_per_row_unpadded,
        vello::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
    );
    let buffer_size = u64::from(readback_bytes_per_row)
        .checked_mul(u64::from(canvas.height))
        .ok_or_else(|| SpinloopError::render("readback buffer size overflow"))?;
    let readback = device.create_buffer(&vello::wgpu::BufferDescriptor {
        label: Some("spinloop_readback"),
        size: buffer_size,
        usage: vello::wgpu::BufferUsages::MAP_READ | vello::wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    Ok(Target {
        texture,
        view,
        readback,
        readback_bytes_per_row,
    })
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
#[path = "../../tests/unit/render/gpu.rs"]
mod tests;
