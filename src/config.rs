// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// A missing file yields the defaults; parse and validation errors are
// returned so the caller can decide (startup falls back, reload ignores).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use winit::keyboard::KeyCode;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub scene: SceneConfig,
    pub camera: CameraConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Cube Harness".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    /// 0 = one slot per swapchain image
    pub max_frames_in_flight: usize,
    pub shader_dir: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.05, 0.05, 0.08, 1.0],
            max_frames_in_flight: 0,
            shader_dir: "shaders".to_string(),
        }
    }
}

/// Cube animation
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    /// Degrees per second
    pub rotation_speed: f32,
    pub rotation_axis: [f32; 3],
    pub paused: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            rotation_speed: 45.0,
            rotation_axis: [0.3, 1.0, 0.2],
            paused: false,
        }
    }
}

/// Camera defaults and persistence
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    /// Units per second
    pub move_speed: f32,
    /// Degrees per second for keys, degrees per pixel for the mouse
    pub turn_speed: f32,
    pub mouse_sensitivity: f32,
    pub state_file: String,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y: 60.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 0.0, 3.0],
            move_speed: 2.0,
            turn_speed: 90.0,
            mouse_sensitivity: 0.2,
            state_file: "camera.toml".to_string(),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_overlay: bool,
    /// Seconds between overlay refreshes
    pub overlay_interval: f32,
    pub hot_reload: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "cube_harness.log".to_string(),
            show_overlay: true,
            overlay_interval: 0.5,
            hot_reload: true,
        }
    }
}

/// Control key bindings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
    pub pause_key: String,
    pub reset_camera_key: String,
    pub save_camera_key: String,
    pub projection_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
            pause_key: "Space".to_string(),
            reset_camera_key: "R".to_string(),
            save_camera_key: "P".to_string(),
            projection_key: "O".to_string(),
        }
    }
}

/// Resolved key bindings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub fullscreen: KeyCode,
    pub quit: KeyCode,
    pub pause: KeyCode,
    pub reset_camera: KeyCode,
    pub save_camera: KeyCode,
    pub projection: KeyCode,
}

impl Config {
    /// Load configuration from a specific path, `None` if there is no file
    ///
    /// Nothing is logged here: at startup this runs before the logger exists.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        Ok(Some(config))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would only fail later inside Vulkan
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "window size must be non-zero, got {}x{}",
                self.window.width,
                self.window.height
            );
        }
        let camera = &self.camera;
        if !(camera.near > 0.0 && camera.near < camera.far) {
            anyhow::bail!(
                "camera planes must satisfy 0 < near < far, got near={} far={}",
                camera.near,
                camera.far
            );
        }
        if !(camera.fov_y > 0.0 && camera.fov_y < 180.0) {
            anyhow::bail!("camera fov_y must be in (0, 180), got {}", camera.fov_y);
        }
        if self.scene.rotation_axis.iter().all(|c| *c == 0.0) {
            anyhow::bail!("scene rotation_axis must not be the zero vector");
        }
        if self.graphics.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            anyhow::bail!(
                "graphics clear_color components must be in [0, 1], got {:?}",
                self.graphics.clear_color
            );
        }
        self.key_bindings()?;
        Ok(())
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> ash::vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => ash::vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => ash::vk::PresentModeKHR::MAILBOX,
            "fifo" => ash::vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => ash::vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                ash::vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Number of frame slots for a swapchain with `image_count` images
    pub fn frames_in_flight(&self, image_count: usize) -> usize {
        match self.graphics.max_frames_in_flight {
            0 => image_count.max(1),
            n => n.min(image_count).max(1),
        }
    }

    pub fn key_bindings(&self) -> Result<KeyBindings> {
        let controls = &self.controls;
        Ok(KeyBindings {
            fullscreen: parse_key(&controls.fullscreen_key)?,
            quit: parse_key(&controls.quit_key)?,
            pause: parse_key(&controls.pause_key)?,
            reset_camera: parse_key(&controls.reset_camera_key)?,
            save_camera: parse_key(&controls.save_camera_key)?,
            projection: parse_key(&controls.projection_key)?,
        })
    }
}

/// Map a key name from the config file to a winit key code
pub fn parse_key(name: &str) -> Result<KeyCode> {
    let key = match name.trim().to_ascii_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "a" => KeyCode::KeyA,
        "b" => KeyCode::KeyB,
        "c" => KeyCode::KeyC,
        "d" => KeyCode::KeyD,
        "e" => KeyCode::KeyE,
        "f" => KeyCode::KeyF,
        "g" => KeyCode::KeyG,
        "h" => KeyCode::KeyH,
        "i" => KeyCode::KeyI,
        "j" => KeyCode::KeyJ,
        "k" => KeyCode::KeyK,
        "l" => KeyCode::KeyL,
        "m" => KeyCode::KeyM,
        "n" => KeyCode::KeyN,
        "o" => KeyCode::KeyO,
        "p" => KeyCode::KeyP,
        "q" => KeyCode::KeyQ,
        "r" => KeyCode::KeyR,
        "s" => KeyCode::KeyS,
        "t" => KeyCode::KeyT,
        "u" => KeyCode::KeyU,
        "v" => KeyCode::KeyV,
        "w" => KeyCode::KeyW,
        "x" => KeyCode::KeyX,
        "y" => KeyCode::KeyY,
        "z" => KeyCode::KeyZ,
        _ => anyhow::bail!("unknown key name '{}'", name),
    };
    Ok(key)
}
