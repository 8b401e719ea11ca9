use std::collections::HashSet;
use glam::Vec2;
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Default)]
pub struct InputState {
    pub mouse_curr_pos: Vec2,
    pub mouse_prev_pos: Vec2,

    pub mouse_right_just_pressed: bool,
    pub mouse_right_just_released: bool,
    pub mouse_right_down: bool,

    keys_down: HashSet<KeyCode>,
    keys_just_pressed: HashSet<KeyCode>,
}

impl InputState {
    pub fn process_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Right,
                ..
            } => {
                match state {
                    ElementState::Pressed => {
                        self.mouse_right_just_pressed = true;
                        self.mouse_right_just_released = false;
                        self.mouse_right_down = true;
                    }
                    ElementState::Released => {
                        self.mouse_right_just_pressed = false;
                        self.mouse_right_just_released = true;
                        self.mouse_right_down = false;
                    }
                }
            }
            WindowEvent::CursorMoved {
                position,
                ..
            } => {
                self.mouse_curr_pos = Vec2::new(position.x as f32, position.y as f32);
            }
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state,
                    repeat,
                    ..
                },
                ..
            } => {
                match state {
                    ElementState::Pressed => {
                        if !repeat {
                            self.keys_just_pressed.insert(*code);
                        }
                        self.keys_down.insert(*code);
                    }
                    ElementState::Released => {
                        self.keys_down.remove(code);
                    }
                }
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered to unfocused windows
                self.keys_down.clear();
                self.mouse_right_down = false;
            }
            _ => {}
        }
    }

    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys_down.contains(&code)
    }

    pub fn is_key_just_pressed(&self, code: KeyCode) -> bool {
        self.keys_just_pressed.contains(&code)
    }

    /// +1 while only `positive` is held, -1 while only `negative` is held
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_key_down(positive) {
            value += 1.0;
        }
        if self.is_key_down(negative) {
            value -= 1.0;
        }
        value
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_curr_pos - self.mouse_prev_pos
    }

    /// Reset the input states for the next frame.
    pub fn reset_frame(&mut self) {
        self.mouse_prev_pos = self.mouse_curr_pos;
        self.mouse_right_just_pressed = false;
        self.mouse_right_just_released = false;
        self.keys_just_pressed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposing_keys_cancel_out() {
        let mut input = InputState::default();
        input.keys_down.insert(KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 1.0);

        input.keys_down.insert(KeyCode::KeyS);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), 0.0);

        input.keys_down.remove(&KeyCode::KeyW);
        assert_eq!(input.axis(KeyCode::KeyS, KeyCode::KeyW), -1.0);
    }

    #[test]
    fn reset_frame_clears_edges_but_keeps_held_keys() {
        let mut input = InputState::default();
        input.keys_down.insert(KeyCode::KeyF);
        input.keys_just_pressed.insert(KeyCode::KeyF);
        input.mouse_curr_pos = Vec2::new(10.0, 4.0);

        assert_eq!(input.mouse_delta(), Vec2::new(10.0, 4.0));
        input.reset_frame();

        assert!(input.is_key_down(KeyCode::KeyF));
        assert!(!input.is_key_just_pressed(KeyCode::KeyF));
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }
}
