// Camera - projection/view matrices and a free-flying first person camera
//
// Projection matrices target Vulkan clip space: depth in [0, 1] and the
// Y axis flipped so +Y is up on screen.

use anyhow::{Context, Result};
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::CameraConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Perspective,
    Orthographic,
}

/// Everything needed to rebuild a camera, as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub width: u32,
    pub height: u32,
    pub near: f32,
    pub far: f32,
    pub fov_y: f32,
    pub position: [f32; 3],
    pub up: [f32; 3],
    pub forward: [f32; 3],
    pub projection: Projection,
}

impl CameraState {
    pub fn from_config(config: &CameraConfig, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            near: config.near,
            far: config.far,
            fov_y: config.fov_y,
            position: config.position,
            up: [0.0, 1.0, 0.0],
            forward: [0.0, 0.0, -1.0],
            projection: Projection::Perspective,
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read camera state: {:?}", path))?;
        let state: CameraState = toml::from_str(&content)
            .with_context(|| format!("Bad camera state in {:?}", path))?;
        state.validate()?;
        Ok(state)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write camera state: {:?}", path))?;
        log::info!("Saved camera state to {:?}", path);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            anyhow::bail!("camera viewport must be non-zero");
        }
        if !(self.near > 0.0 && self.near < self.far) {
            anyhow::bail!("camera planes must satisfy 0 < near < far");
        }
        if !(self.fov_y > 0.0 && self.fov_y < 180.0) {
            anyhow::bail!("camera fov_y must be in (0, 180), got {}", self.fov_y);
        }
        if Vec3::from(self.forward).length_squared() == 0.0
            || Vec3::from(self.up).length_squared() == 0.0
        {
            anyhow::bail!("camera forward and up must be non-zero");
        }
        if Vec3::from(self.forward)
            .normalize()
            .cross(Vec3::from(self.up).normalize())
            .length_squared()
            < 1e-6
        {
            anyhow::bail!("camera forward and up must not be parallel");
        }
        Ok(())
    }
}

/// Camera with cached matrices
#[derive(Debug, Clone)]
pub struct Camera {
    state: CameraState,
    projection: Mat4,
    view: Mat4,
}

impl Camera {
    pub fn new(state: CameraState) -> Self {
        let mut camera = Self {
            state,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        };
        camera.update_projection();
        camera.update_view();
        camera
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from(self.state.position)
    }

    pub fn forward(&self) -> Vec3 {
        Vec3::from(self.state.forward)
    }

    pub fn up(&self) -> Vec3 {
        Vec3::from(self.state.up)
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.state.position = position.to_array();
        self.update_view();
    }

    /// Keep the aspect ratio in sync with the swapchain extent
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.state.width = width;
        self.state.height = height;
        self.update_projection();
    }

    pub fn set_projection_mode(&mut self, projection: Projection) {
        self.state.projection = projection;
        self.update_projection();
    }

    fn set_orientation(&mut self, forward: Vec3, up: Vec3) {
        self.state.forward = forward.to_array();
        self.state.up = up.to_array();
        self.update_view();
    }

    fn update_projection(&mut self) {
        let s = &self.state;
        self.projection = match s.projection {
            Projection::Perspective => {
                let aspect = s.width as f32 / s.height as f32;
                let mut proj = Mat4::perspective_rh(s.fov_y.to_radians(), aspect, s.near, s.far);
                proj.y_axis.y *= -1.0;
                proj
            }
            Projection::Orthographic => {
                // Pixel units, origin top-left; Vulkan's Y already points down
                let depth = (s.far - s.near) / 2.0;
                Mat4::orthographic_rh(0.0, s.width as f32, 0.0, s.height as f32, -depth, depth)
            }
        };
    }

    fn update_view(&mut self) {
        let position = self.position();
        self.view = Mat4::look_to_rh(position, self.forward(), self.up());
    }
}

/// First person camera: moves in its own frame, turns with a quaternion
#[derive(Debug, Clone)]
pub struct FreeCamera {
    camera: Camera,
    orientation: Quat,
    home: CameraState,
}

impl FreeCamera {
    pub fn new(state: CameraState) -> Self {
        let orientation = orientation_from(Vec3::from(state.forward), Vec3::from(state.up));
        Self {
            camera: Camera::new(state.clone()),
            orientation,
            home: state,
        }
    }

    /// Restore the saved state at `path`, creating it from `fallback` if missing
    pub fn load_or_create<P: AsRef<Path>>(path: P, fallback: CameraState) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            fallback.save(path)?;
        }
        let mut state = CameraState::load(path)?;
        // The window decides the viewport, not the file
        state.width = fallback.width;
        state.height = fallback.height;
        Ok(Self::new(state))
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn translate_forward(&mut self, delta: f32) {
        self.translate(Vec3::NEG_Z * delta);
    }

    pub fn translate_right(&mut self, delta: f32) {
        self.translate(Vec3::X * delta);
    }

    pub fn translate_up(&mut self, delta: f32) {
        self.translate(Vec3::Y * delta);
    }

    /// Nose up for positive degrees
    pub fn pitch(&mut self, degrees: f32) {
        self.orientation = self.orientation * Quat::from_rotation_x(degrees.to_radians());
        self.apply_orientation();
    }

    /// Turn left for positive degrees, about the world up axis so the horizon stays level
    pub fn yaw(&mut self, degrees: f32) {
        self.orientation = Quat::from_rotation_y(degrees.to_radians()) * self.orientation;
        self.apply_orientation();
    }

    /// Roll about the view axis; positive degrees tip the up vector to the left
    pub fn roll(&mut self, degrees: f32) {
        self.orientation = self.orientation * Quat::from_rotation_z(degrees.to_radians());
        self.apply_orientation();
    }

    /// Back to the pose the camera was created or last saved with
    pub fn reset(&mut self) {
        let mut state = self.home.clone();
        state.width = self.camera.state.width;
        state.height = self.camera.state.height;
        self.orientation = orientation_from(Vec3::from(state.forward), Vec3::from(state.up));
        self.camera = Camera::new(state);
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.camera.state.save(path)?;
        self.home = self.camera.state.clone();
        Ok(())
    }

    fn translate(&mut self, local: Vec3) {
        let world = self.orientation * local;
        let position = self.camera.position() + world;
        self.camera.set_position(position);
    }

    fn apply_orientation(&mut self) {
        self.orientation = self.orientation.normalize();
        let forward = self.orientation * Vec3::NEG_Z;
        let up = self.orientation * Vec3::Y;
        self.camera.set_orientation(forward, up);
    }
}

/// Rotation taking the camera's rest frame (-Z forward, +Y up) to `forward`/`up`
fn orientation_from(forward: Vec3, up: Vec3) -> Quat {
    let back = -forward.normalize();
    let right = up.cross(back).normalize();
    let up = back.cross(right);
    Quat::from_mat3(&glam::Mat3::from_cols(right, up, back)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    fn state() -> CameraState {
        CameraState::from_config(&CameraConfig::default(), 800, 600)
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("cube-harness-{}-{}.toml", name, std::process::id()))
    }

    #[test]
    fn view_puts_camera_at_origin_looking_down_neg_z() {
        let camera = Camera::new(state());
        let eye = camera.view().transform_point3(camera.position());
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));

        let ahead = camera.view().transform_point3(camera.position() + camera.forward());
        assert!(ahead.abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn perspective_targets_vulkan_clip_space() {
        let camera = Camera::new(state());
        let vp = camera.projection() * camera.view();

        // A point above the view axis ends up with negative clip Y (top of the screen)
        let clip = vp * Vec4::new(0.0, 1.0, 0.0, 1.0);
        assert!(clip.y / clip.w < 0.0);

        // Near plane maps to depth 0, far plane to depth 1
        let near = camera.projection() * Vec4::new(0.0, 0.0, -0.1, 1.0);
        let far = camera.projection() * Vec4::new(0.0, 0.0, -100.0, 1.0);
        assert!((near.z / near.w).abs() < 1e-5);
        assert!((far.z / far.w - 1.0).abs() < 1e-4);
    }

    #[test]
    fn viewport_changes_aspect() {
        let mut camera = Camera::new(state());
        let before = camera.projection();
        camera.set_viewport(1600, 600);
        assert_ne!(before, camera.projection());
        assert_eq!(camera.state().width, 1600);

        // Minimized windows report 0x0 and must not poison the matrix
        camera.set_viewport(0, 0);
        assert_eq!(camera.state().width, 1600);
    }

    #[test]
    fn orthographic_maps_pixels_to_ndc() {
        let mut camera = Camera::new(state());
        camera.set_projection_mode(Projection::Orthographic);
        let top_left = camera.projection() * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let bottom_right = camera.projection() * Vec4::new(800.0, 600.0, 0.0, 1.0);
        assert!(top_left.truncate().truncate().abs_diff_eq(glam::Vec2::new(-1.0, -1.0), 1e-5));
        assert!(bottom_right.truncate().truncate().abs_diff_eq(glam::Vec2::new(1.0, 1.0), 1e-5));
    }

    #[test]
    fn translate_forward_moves_along_view_direction() {
        let mut free = FreeCamera::new(state());
        free.translate_forward(1.0);
        assert!(free.camera().position().abs_diff_eq(Vec3::new(0.0, 0.0, 2.0), 1e-5));

        free.translate_right(0.5);
        free.translate_up(0.25);
        assert!(free.camera().position().abs_diff_eq(Vec3::new(0.5, 0.25, 2.0), 1e-5));
    }

    #[test]
    fn yaw_turns_left_and_moves_in_new_direction() {
        let mut free = FreeCamera::new(state());
        free.yaw(90.0);
        assert!(free.camera().forward().abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(free.camera().up().abs_diff_eq(Vec3::Y, 1e-5));

        free.translate_forward(1.0);
        assert!(free.camera().position().abs_diff_eq(Vec3::new(-1.0, 0.0, 3.0), 1e-5));
    }

    #[test]
    fn pitch_then_yaw_keeps_horizon_level() {
        let mut free = FreeCamera::new(state());
        free.pitch(30.0);
        free.yaw(45.0);
        free.yaw(-45.0);
        free.pitch(-30.0);
        assert!(free.camera().forward().abs_diff_eq(Vec3::NEG_Z, 1e-5));

        free.pitch(20.0);
        free.yaw(90.0);
        // Right vector stays horizontal: no roll crept in
        let right = free.camera().forward().cross(free.camera().up());
        assert!(right.y.abs() < 1e-5);
    }

    #[test]
    fn roll_tilts_up_vector() {
        let mut free = FreeCamera::new(state());
        free.roll(90.0);
        assert!(free.camera().up().abs_diff_eq(Vec3::NEG_X, 1e-5));
        assert!(free.camera().forward().abs_diff_eq(Vec3::NEG_Z, 1e-5));
    }

    #[test]
    fn reset_restores_home_pose_but_keeps_viewport() {
        let mut free = FreeCamera::new(state());
        free.translate_forward(2.0);
        free.yaw(33.0);
        free.camera_mut().set_viewport(1024, 768);

        free.reset();
        assert!(free.camera().position().abs_diff_eq(Vec3::new(0.0, 0.0, 3.0), 1e-6));
        assert!(free.camera().forward().abs_diff_eq(Vec3::NEG_Z, 1e-6));
        assert_eq!(free.camera().state().width, 1024);
    }

    #[test]
    fn state_round_trips_through_file() {
        let path = temp_path("roundtrip");
        let mut free = FreeCamera::new(state());
        free.translate_right(1.5);
        free.save(&path).unwrap();

        let loaded = FreeCamera::load_or_create(&path, state()).unwrap();
        assert!(loaded.camera().position().abs_diff_eq(Vec3::new(1.5, 0.0, 3.0), 1e-6));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_state_file_is_created() {
        let path = temp_path("create");
        let _ = std::fs::remove_file(&path);

        let free = FreeCamera::load_or_create(&path, state()).unwrap();
        assert!(path.exists());
        assert_eq!(free.camera().state(), &state());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn malformed_state_file_is_an_error() {
        let path = temp_path("malformed");
        std::fs::write(&path, "width = \"wide\"").unwrap();
        assert!(CameraState::load(&path).is_err());

        std::fs::write(&path, toml::to_string(&CameraState { near: 5.0, far: 1.0, ..state() }).unwrap())
            .unwrap();
        assert!(CameraState::load(&path).is_err());

        // A degenerate field of view would give a non-finite projection
        for fov_y in [0.0, -10.0, 180.0, 270.0] {
            std::fs::write(&path, toml::to_string(&CameraState { fov_y, ..state() }).unwrap())
                .unwrap();
            assert!(CameraState::load(&path).is_err(), "fov_y = {} accepted", fov_y);
        }
        std::fs::remove_file(&path).unwrap();
    }
}
