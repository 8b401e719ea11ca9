mod input_state;
mod camera_controller;

use std::sync::Arc;
use std::time::{Duration, Instant};
use color_eyre::{Report, Result};
use glam::Vec3;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{StartCause, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId};
use crate::app::camera_controller::CameraController;
use crate::app::input_state::InputState;
use crate::renderer::camera::Camera;
use crate::renderer::config::RenderConfig;
use crate::renderer::scene::{MaterialId, Transform};
use crate::renderer::Renderer;

const DEMO_GRID_HALF_EXTENT: i32 = 12;
const DEMO_GRID_SPACING: f32 = 2.5;
const DEMO_SPIN_SPEED: f32 = 1.0;
const FRAME_STATS_INTERVAL: Duration = Duration::from_secs(3);

pub struct App {
    config: RenderConfig,
    // Dropped before the window it presents to
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    camera_controller: CameraController,

    // State
    input_state: InputState,
    prev_frame_time: Instant,
    delta_time_secs: f32,
    frame_stats: FrameStats,
    error: Option<Report>,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        let mut camera = Camera::new();
        camera.set_frustum_culling(config.frustum_culling);
        camera.look_at(Vec3::ZERO);

        Self {
            config,
            renderer: None,
            window: None,
            camera_controller: CameraController::new(camera),

            input_state: InputState::default(),
            prev_frame_time: Instant::now(),
            delta_time_secs: 0.0,
            frame_stats: FrameStats::new(),
            error: None,
        }
    }

    pub fn take_error(&mut self) -> Option<Report> {
        self.error.take()
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let (width, height) = self.config.window_size;
        let attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(width, height));
        let window = Arc::new(event_loop.create_window(attributes)?);

        let mut renderer = Renderer::new(&window, &self.config)?;
        populate_demo_scene(&mut renderer)?;

        let extent = renderer.extent();
        self.camera_controller
            .get_camera_mut()
            .set_aspect_ratio(extent.width as f32 / extent.height as f32);

        log::info!(
            "Renderer ready with {} objects",
            renderer.scene().object_count(),
        );
        window.request_redraw();
        self.window = Some(window);
        self.renderer = Some(renderer);
        Ok(())
    }

    fn redraw(&mut self) -> Result<()> {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return Ok(());
        };

        if self.input_state.is_key_just_pressed(KeyCode::KeyF) {
            let camera = self.camera_controller.get_camera_mut();
            let enabled = !camera.is_frustum_culling_enabled();
            camera.set_frustum_culling(enabled);
            log::info!("Frustum culling: {}", enabled);
        }

        self.camera_controller.process_input(&self.input_state, window, self.delta_time_secs);
        self.input_state.reset_frame();

        animate_scene(renderer, self.delta_time_secs);

        let started = Instant::now();
        renderer.draw(self.camera_controller.get_camera())?;
        self.frame_stats.record(started.elapsed());

        window.request_redraw();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: Report) {
        log::error!("{:#}", error);
        self.error.get_or_insert(error);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {
        let curr_frame_time = Instant::now();
        self.delta_time_secs = curr_frame_time.duration_since(self.prev_frame_time).as_secs_f32();
        self.prev_frame_time = curr_frame_time;
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        self.input_state.process_window_events(&event);

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize(new_size.width, new_size.height);
                }
                if new_size.width > 0 && new_size.height > 0 {
                    self.camera_controller
                        .get_camera_mut()
                        .set_aspect_ratio(new_size.width as f32 / new_size.height as f32);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.redraw() {
                    self.fail(event_loop, e);
                }
            }
            _ => {}
        }

        if self.input_state.is_key_down(KeyCode::Escape) {
            event_loop.exit();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // The renderer needs the window alive while it tears down the surface
        self.renderer = None;
        self.window = None;
    }
}

/// Average CPU time spent in `Renderer::draw`, logged periodically
struct FrameStats {
    window_start: Instant,
    frames: u32,
    draw_time: Duration,
}

impl FrameStats {
    fn new() -> Self {
        Self {
            window_start: Instant::now(),
            frames: 0,
            draw_time: Duration::ZERO,
        }
    }

    fn record(&mut self, draw_time: Duration) {
        self.frames += 1;
        self.draw_time += draw_time;

        let elapsed = self.window_start.elapsed();
        if elapsed >= FRAME_STATS_INTERVAL {
            log::info!(
                "{:.1} fps, {:.3} ms average draw",
                self.frames as f64 / elapsed.as_secs_f64(),
                self.draw_time.as_secs_f64() * 1000.0 / self.frames as f64,
            );
            *self = Self::new();
        }
    }
}

fn populate_demo_scene(renderer: &mut Renderer) -> Result<()> {
    let primitives = renderer.primitives();
    let scene = renderer.scene_mut();

    let mut phase = 0.0;
    for x in -DEMO_GRID_HALF_EXTENT..=DEMO_GRID_HALF_EXTENT {
        for z in -DEMO_GRID_HALF_EXTENT..=DEMO_GRID_HALF_EXTENT {
            let (mesh, material) = match (x + z).rem_euclid(3) {
                0 => (primitives.cube, MaterialId::DEFAULT),
                1 => (primitives.quad, MaterialId::new(1)),
                _ => (primitives.triangle, MaterialId::new(2)),
            };
            let translation = Vec3::new(x as f32, 0.0, z as f32) * DEMO_GRID_SPACING;
            scene.add_object(
                mesh,
                material,
                Transform::from_translation(translation)
                    .with_rotation(Vec3::new(0.0, phase, 0.0))
                    .with_scale(Vec3::splat(0.8)),
            )?;
            phase += 0.37;
        }
    }

    Ok(())
}

fn animate_scene(renderer: &mut Renderer, delta_time_secs: f32) {
    for (_, object) in renderer.scene_mut().objects_mut() {
        object.transform.rotation.y += DEMO_SPIN_SPEED * delta_time_secs;
    }
}
