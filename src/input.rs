// Keyboard and mouse state for the free camera
//
// WASD + E/C move, arrows turn, Z/X roll, left-drag looks around.
//
// Held keys are sampled every frame so movement speed does not depend on
// key repeat; mouse drag deltas accumulate between frames.

use glam::Vec3;
use std::collections::HashSet;
use winit::keyboard::KeyCode;

use crate::camera::FreeCamera;
use crate::config::CameraConfig;

#[derive(Debug, Default)]
pub struct InputState {
    held: HashSet<KeyCode>,
    dragging: bool,
    last_cursor: Option<(f64, f64)>,
    look_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(&mut self, code: KeyCode, pressed: bool) {
        if pressed {
            self.held.insert(code);
        } else {
            self.held.remove(&code);
        }
    }

    /// Left button state; releasing it forgets the anchor point
    pub fn set_dragging(&mut self, dragging: bool) {
        self.dragging = dragging;
        if !dragging {
            self.last_cursor = None;
        }
    }

    pub fn cursor_moved(&mut self, x: f64, y: f64) {
        if self.dragging {
            if let Some((lx, ly)) = self.last_cursor {
                self.look_delta.0 += (x - lx) as f32;
                self.look_delta.1 += (y - ly) as f32;
            }
            self.last_cursor = Some((x, y));
        }
    }

    /// Window lost focus: release everything, we will not see the key-up events
    pub fn clear(&mut self) {
        self.held.clear();
        self.set_dragging(false);
        self.look_delta = (0.0, 0.0);
    }

    /// Camera-space direction from WASD + E/C: x right, y up, z forward
    pub fn movement(&self) -> Vec3 {
        let axis = |pos: KeyCode, neg: KeyCode| -> f32 {
            self.held.contains(&pos) as i32 as f32 - self.held.contains(&neg) as i32 as f32
        };
        Vec3::new(
            axis(KeyCode::KeyD, KeyCode::KeyA),
            axis(KeyCode::KeyE, KeyCode::KeyC),
            axis(KeyCode::KeyW, KeyCode::KeyS),
        )
    }

    /// (yaw, pitch) direction from the arrow keys; left and up are positive
    pub fn turn(&self) -> (f32, f32) {
        let held = |k: KeyCode| self.held.contains(&k) as i32 as f32;
        (
            held(KeyCode::ArrowLeft) - held(KeyCode::ArrowRight),
            held(KeyCode::ArrowUp) - held(KeyCode::ArrowDown),
        )
    }

    /// Z rolls left, X rolls right
    pub fn roll(&self) -> f32 {
        self.held.contains(&KeyCode::KeyZ) as i32 as f32
            - self.held.contains(&KeyCode::KeyX) as i32 as f32
    }

    /// Mouse movement in pixels since the last call
    pub fn take_look(&mut self) -> (f32, f32) {
        std::mem::take(&mut self.look_delta)
    }

    /// Move and turn `camera` for a frame of `dt` seconds
    pub fn apply(&mut self, camera: &mut FreeCamera, settings: &CameraConfig, dt: f32) {
        let step = self.movement() * settings.move_speed * dt;
        if step.z != 0.0 {
            camera.translate_forward(step.z);
        }
        if step.x != 0.0 {
            camera.translate_right(step.x);
        }
        if step.y != 0.0 {
            camera.translate_up(step.y);
        }

        let (yaw, pitch) = self.turn();
        let turn = settings.turn_speed * dt;
        let (dx, dy) = self.take_look();
        // Dragging right turns right, dragging down looks down
        let yaw = yaw * turn - dx * settings.mouse_sensitivity;
        let pitch = pitch * turn - dy * settings.mouse_sensitivity;
        if yaw != 0.0 {
            camera.yaw(yaw);
        }
        if pitch != 0.0 {
            camera.pitch(pitch);
        }
        let roll = self.roll() * turn;
        if roll != 0.0 {
            camera.roll(roll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraState;

    fn camera() -> FreeCamera {
        FreeCamera::new(CameraState::from_config(&CameraConfig::default(), 800, 600))
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputState::new();
        input.key(KeyCode::KeyW, true);
        input.key(KeyCode::KeyS, true);
        input.key(KeyCode::KeyD, true);
        assert_eq!(input.movement(), Vec3::new(1.0, 0.0, 0.0));

        input.key(KeyCode::KeyS, false);
        assert_eq!(input.movement(), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn drag_accumulates_only_while_pressed() {
        let mut input = InputState::new();
        input.cursor_moved(10.0, 10.0);
        input.set_dragging(true);
        input.cursor_moved(10.0, 10.0);
        input.cursor_moved(15.0, 8.0);
        input.cursor_moved(20.0, 6.0);
        assert_eq!(input.take_look(), (10.0, -4.0));
        assert_eq!(input.take_look(), (0.0, 0.0));

        input.set_dragging(false);
        input.cursor_moved(100.0, 100.0);
        assert_eq!(input.take_look(), (0.0, 0.0));
    }

    #[test]
    fn walking_forward_moves_along_view() {
        let settings = CameraConfig::default();
        let mut cam = camera();
        let start = cam.camera().position();
        let mut input = InputState::new();
        input.key(KeyCode::KeyW, true);

        input.apply(&mut cam, &settings, 0.5);

        let moved = cam.camera().position() - start;
        let expected = cam.camera().forward() * settings.move_speed * 0.5;
        assert!(moved.abs_diff_eq(expected, 1e-4));
    }

    #[test]
    fn left_arrow_turns_left() {
        let settings = CameraConfig::default();
        let mut cam = camera();
        let mut input = InputState::new();
        input.key(KeyCode::ArrowLeft, true);

        input.apply(&mut cam, &settings, 0.1);

        // Default camera looks down -Z; turning left swings towards -X
        assert!(cam.camera().forward().x < 0.0);
    }

    #[test]
    fn clear_releases_keys() {
        let mut input = InputState::new();
        input.key(KeyCode::KeyW, true);
        input.set_dragging(true);
        input.clear();
        assert_eq!(input.movement(), Vec3::ZERO);
        assert_eq!(input.turn(), (0.0, 0.0));
    }
}
