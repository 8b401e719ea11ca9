pub mod camera;
pub mod config;
pub mod error;
pub mod scene;
pub mod util;

mod contexts;
mod shader_data;
mod resources;
mod internals;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::target::RenderTarget;
use crate::renderer::contexts::frame_ctx::FrameController;
use crate::renderer::contexts::pipeline_ctx::DrawCullPipeline;
use crate::renderer::resources::mesh::{GeometryBuilder, Mesh};
use crate::renderer::scene::{MeshId, Scene};

#[derive(Debug, Clone, Copy)]
pub struct Primitives {
    pub triangle: MeshId,
    pub quad: MeshId,
    pub cube: MeshId,
}

pub struct Renderer {
    scene: Scene,
    primitives: Primitives,

    // Field order is drop order: GPU resources first, then the device, then the instance
    draw_cull: DrawCullPipeline,
    frames: FrameController<RenderTarget>,
    device: Arc<RenderDevice>,
    instance: RenderInstance,
}

impl Renderer {
    pub fn new(window: &Window, config: &RenderConfig) -> Result<Self> {
        let instance = RenderInstance::new(window)?;
        let surface = instance.create_surface(window)?;
        let device = Arc::new(RenderDevice::new(&instance, &surface, config.max_msaa_samples)?);

        let size = window.inner_size();
        let target = RenderTarget::new(
            &instance,
            device.clone(),
            surface,
            vk::Extent2D { width: size.width, height: size.height },
            config,
        )?;
        let render_pass = target.render_pass();
        let samples = target.plan().samples;
        let frames = FrameController::new(target)?;

        let mut scene = Scene::new();
        let mut geometry = GeometryBuilder::new();
        let primitives = Primitives {
            triangle: scene.add_mesh(geometry.add_mesh(&Mesh::new_triangle())),
            quad: scene.add_mesh(geometry.add_mesh(&Mesh::new_quad())),
            cube: scene.add_mesh(geometry.add_mesh(&Mesh::new_cube())),
        };
        let geometry = geometry.upload(&device)?;

        let draw_cull = DrawCullPipeline::new(device.clone(), render_pass, samples, geometry)?;

        Ok(Self {
            scene,
            primitives,

            draw_cull,
            frames,
            device,
            instance,
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn primitives(&self) -> Primitives {
        self.primitives
    }

    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.frames.request_resize(vk::Extent2D { width, height });
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.frames.extent()
    }

    /// Record and present one frame. Skipped frames (minimized, stale surface) return `Ok`.
    pub fn draw(&mut self, camera: &Camera) -> Result<()> {
        // Rebuilds wait for the device, so they happen before any frame is open
        self.draw_cull.sync_with_scene(&self.scene)?;

        let Some(cmd) = self.frames.begin_frame()? else {
            return Ok(());
        };
        let slot = self.frames.frame_index();

        self.draw_cull.update_instance_data(&self.scene, slot)?;
        self.draw_cull.update_frame_uniform(camera, slot)?;
        self.draw_cull.dispatch_cull(cmd, slot);

        self.frames.begin_render_pass(cmd);
        self.draw_cull.draw(cmd, slot);
        self.frames.end_render_pass(cmd);

        self.frames.end_frame(cmd)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle on shutdown: {}", e);
        }
        log::debug!(
            "Destroying renderer ({} objects, {} in flight slots)",
            self.scene.object_count(),
            internals::swapchain::MAX_FRAMES_IN_FLIGHT,
        );
    }
}
