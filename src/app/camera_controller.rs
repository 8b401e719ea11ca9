use glam::{FloatExt, Vec3};
use winit::keyboard::KeyCode;
use winit::window::Window;
use crate::app::input_state::InputState;
use crate::renderer::camera::Camera;
use crate::renderer::util::calculate_direction;

/// Free-flying camera: WASD moves on the ground plane, Space/Ctrl move vertically,
/// arrow keys or right-drag turn the view.
pub struct CameraController {
    camera: Camera,

    move_speed: f32,
    move_smoothing_speed: f32,
    move_current_velocity: Vec3,

    rotation_sensitivity: f32,
    rotation_key_speed: f32,
    rotation_smoothing_speed: f32,
    rotation_max_pitch: f32,
    desired_pitch: f32,
    desired_yaw: f32,
    current_pitch: f32,
    current_yaw: f32,
}

impl CameraController {
    pub fn new(camera: Camera) -> Self {
        let pitch = camera.get_pitch();
        let yaw = camera.get_yaw();
        Self {
            camera,

            move_speed: 6.0,
            move_smoothing_speed: 12.0,
            move_current_velocity: Vec3::ZERO,

            rotation_sensitivity: 0.004,
            rotation_key_speed: 1.5,
            rotation_smoothing_speed: 20.0,
            rotation_max_pitch: 1.5,
            desired_pitch: pitch,
            desired_yaw: yaw,
            current_pitch: pitch,
            current_yaw: yaw,
        }
    }

    pub fn get_camera(&self) -> &Camera {
        &self.camera
    }

    pub fn get_camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn process_input(
        &mut self,
        input_state: &InputState,
        window: &Window,
        delta_time: f32,
    ) {
        if input_state.mouse_right_just_pressed {
            window.set_cursor_visible(false);
        } else if input_state.mouse_right_just_released {
            window.set_cursor_visible(true);
        }

        self.set_desired_rotation(input_state, delta_time);
        self.update_rotation_lerp(delta_time);
        self.update_position(input_state, delta_time);
    }

    fn set_desired_rotation(&mut self, input_state: &InputState, delta_time: f32) {
        let mut delta_yaw = input_state.axis(KeyCode::ArrowLeft, KeyCode::ArrowRight)
            * self.rotation_key_speed
            * delta_time;
        let mut delta_pitch = input_state.axis(KeyCode::ArrowDown, KeyCode::ArrowUp)
            * self.rotation_key_speed
            * delta_time;

        if input_state.mouse_right_down && !input_state.mouse_right_just_pressed {
            let mouse_delta = input_state.mouse_delta();
            delta_yaw += mouse_delta.x * self.rotation_sensitivity;
            delta_pitch -= mouse_delta.y * self.rotation_sensitivity;
        }

        // Yaw is measured from +X towards +Z, so turning right increases it
        self.desired_yaw += delta_yaw;
        self.desired_pitch = (self.desired_pitch + delta_pitch)
            .clamp(-self.rotation_max_pitch, self.rotation_max_pitch);
    }

    fn update_rotation_lerp(&mut self, delta_time: f32) {
        let t = 1.0 - (-self.rotation_smoothing_speed * delta_time).exp();
        self.current_pitch = self.current_pitch.lerp(self.desired_pitch, t);
        self.current_yaw = self.current_yaw.lerp(self.desired_yaw, t);
        self.camera.look_to(calculate_direction(self.current_pitch, self.current_yaw));
    }

    fn update_position(&mut self, input_state: &InputState, delta_time: f32) {
        let forward = self.camera.get_forward();
        let flat_forward = Vec3::new(forward.x, 0.0, forward.z).normalize_or_zero();
        let flat_right = flat_forward.cross(Vec3::Y);

        let direction = flat_forward * input_state.axis(KeyCode::KeyS, KeyCode::KeyW)
            + flat_right * input_state.axis(KeyCode::KeyA, KeyCode::KeyD)
            + Vec3::Y * input_state.axis(KeyCode::ControlLeft, KeyCode::Space);
        let speed = if input_state.is_key_down(KeyCode::ShiftLeft) {
            self.move_speed * 3.0
        } else {
            self.move_speed
        };
        let desired_velocity = direction.normalize_or_zero() * speed;

        let t = 1.0 - (-self.move_smoothing_speed * delta_time).exp();
        self.move_current_velocity = self.move_current_velocity.lerp(desired_velocity, t);
        if self.move_current_velocity.length_squared() > 1e-8 {
            self.camera.set_position(
                self.camera.get_position() + self.move_current_velocity * delta_time,
            );
        }
    }
}
