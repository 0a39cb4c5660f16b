// =============================================================================
// CUBE HARNESS - a rotating cube on top of a hand-rolled Vulkan frame ring
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit ApplicationHandler: window, input, config reload)   │
// │    ├── FreeCamera + Spin        (CPU-side scene state)          │
// │    ├── FrameStats               (overlay in the title bar)      │
// │    └── Renderer                                                 │
// │          ├── VulkanDevice + SwapchainResources                  │
// │          └── FrameRing          (fences, semaphores, ownership) │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Drain config changes, advance spin, move camera
// 2. Rebuild the swapchain if a resize or out-of-date was flagged
// 3. FrameRing::draw: wait slot fence, acquire, submit, present
// 4. Update overlay, request the next redraw
//
// =============================================================================

mod backend;
mod camera;
mod config;
mod frame;
mod input;
mod overlay;
mod renderer;
mod scene;
mod watch;

use anyhow::{Context, Result};
use backend::VulkanDevice;
use camera::{CameraState, FreeCamera, Projection};
use clap::Parser;
use config::{Config, KeyBindings, DEFAULT_CONFIG_PATH};
use frame::FrameStatus;
use input::InputState;
use overlay::{overlay_text, FrameStats, OverlayContext};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use renderer::Renderer;
use scene::{Spin, UniformData};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use watch::ConfigWatcher;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

/// Rotating cube on a Vulkan frame submission ring
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Exit after this many presented frames
    #[arg(long)]
    frames: Option<u64>,

    /// Disable Vulkan validation layers even if the config enables them
    #[arg(long)]
    no_validation: bool,
}

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse();

    // Logging depends on the config, so report how loading went after init
    let loaded = Config::load_from_path(&args.config);
    let config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => Config::default(),
    };
    init_logging(&config);
    match loaded {
        Ok(Some(_)) => {
            log::info!("Loaded configuration from {:?}", args.config);
            log::debug!("Config: {:?}", config);
        }
        Ok(None) => log::info!("Config file not found at {:?}, using defaults", args.config),
        Err(e) => log::warn!("Failed to load {:?}: {:#}. Using defaults.", args.config, e),
    }

    log::info!("Starting cube harness");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(args, config)?;
    event_loop.run_app(&mut app)?;
    app.exit_result()
}

/// Initialize logging with optional copy into a log file
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info).parse_default_env();

    if config.debug.log_to_file {
        match File::create(&config.debug.log_file) {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Cube Harness Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(Tee { file })));
            }
            Err(e) => eprintln!("Cannot open log file {:?}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

/// Writes log lines to stderr and the log file
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        self.file.flush()
    }
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// Field order matters for Drop: the renderer (and with it the surface)
/// must go before the window it presents to.
struct App {
    renderer: Option<Renderer>,
    window: Option<Arc<Window>>,
    watcher: Option<ConfigWatcher>,

    args: Args,
    config: Config,
    bindings: KeyBindings,

    camera: FreeCamera,
    spin: Spin,
    input: InputState,
    stats: FrameStats,

    is_fullscreen: bool,
    /// Set on resize / suboptimal / out-of-date; handled before the next draw
    needs_resize: bool,
    /// Window has zero area; nothing to render into
    is_minimized: bool,
    last_frame: Instant,
    /// First fatal error, reported from main after the loop exits
    fatal: Option<anyhow::Error>,
}

impl App {
    fn new(args: Args, config: Config) -> Result<Self> {
        let bindings = config.key_bindings()?;

        let fallback =
            CameraState::from_config(&config.camera, config.window.width, config.window.height);
        let camera = FreeCamera::load_or_create(&config.camera.state_file, fallback)
            .with_context(|| format!("Failed to restore camera from {:?}", config.camera.state_file))?;

        let mut spin = Spin::new(config.scene.rotation_axis, config.scene.rotation_speed);
        spin.set_paused(config.scene.paused);

        let watcher = if config.debug.hot_reload {
            match ConfigWatcher::new(&args.config) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    log::warn!("Hot reload disabled: {:#}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            renderer: None,
            window: None,
            watcher,
            is_fullscreen: config.window.fullscreen,
            args,
            config,
            bindings,
            camera,
            spin,
            input: InputState::new(),
            stats: FrameStats::new(),
            needs_resize: false,
            is_minimized: false,
            last_frame: Instant::now(),
            fatal: None,
        })
    }

    fn exit_result(&mut self) -> Result<()> {
        match self.fatal.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        if self.fatal.is_none() {
            self.fatal = Some(error);
        }
        event_loop.exit();
    }

    // =========================================================================
    // INITIALIZATION
    // =========================================================================

    fn init_graphics(&mut self, window: &Window) -> Result<()> {
        log::info!("Initializing Vulkan...");

        let enable_validation = cfg!(debug_assertions)
            && self.config.debug.validation_layers
            && !self.args.no_validation;

        let display = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let device = VulkanDevice::new(&self.config.window.title, enable_validation, display, handle)?;

        let size = window.inner_size();
        self.is_minimized = size.width == 0 || size.height == 0;
        let renderer = Renderer::new(
            device,
            &self.config,
            size.width.max(1),
            size.height.max(1),
        )?;
        self.sync_viewport(&renderer);
        self.renderer = Some(renderer);

        log::info!("Vulkan initialized successfully!");
        Ok(())
    }

    /// Projection follows the swapchain extent, which may differ from the window
    fn sync_viewport(&mut self, renderer: &Renderer) {
        if let Some(extent) = renderer.extent() {
            self.camera
                .camera_mut()
                .set_viewport(extent.width, extent.height);
        }
    }

    // =========================================================================
    // RENDER LOOP
    // =========================================================================

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame);
        self.last_frame = now;

        self.poll_config();

        if self.is_minimized {
            return;
        }

        let dt = frame_time.as_secs_f32();
        self.spin.advance(dt);
        self.input.apply(&mut self.camera, &self.config.camera, dt);

        let Some(window) = self.window.clone() else {
            return;
        };
        let Some(mut renderer) = self.renderer.take() else {
            return;
        };

        let result = self.render_frame(&mut renderer, &window, frame_time);
        self.renderer = Some(renderer);

        if let Err(e) = result {
            self.fail(event_loop, e);
            return;
        }

        if let Some(limit) = self.args.frames {
            if self.stats.frames_presented() >= limit {
                log::info!("Presented {} frames, exiting", limit);
                event_loop.exit();
            }
        }
    }

    fn render_frame(
        &mut self,
        renderer: &mut Renderer,
        window: &Window,
        frame_time: Duration,
    ) -> Result<()> {
        if self.needs_resize {
            let size = window.inner_size();
            if size.width == 0 || size.height == 0 {
                self.is_minimized = true;
                return Ok(());
            }
            renderer
                .recreate(size.width, size.height)
                .context("Failed to recreate swapchain")?;
            self.needs_resize = false;
            self.stats.record_recreation();
            self.sync_viewport(renderer);
        }

        let camera = self.camera.camera();
        renderer.set_uniforms(UniformData {
            model: self.spin.model(),
            view: camera.view(),
            projection: camera.projection(),
        });

        match renderer.draw()? {
            FrameStatus::Presented { suboptimal, .. } => {
                self.stats.record_frame(frame_time);
                if suboptimal {
                    self.needs_resize = true;
                }
                self.update_overlay(renderer, window);
            }
            FrameStatus::OutOfDate => {
                log::debug!("Swapchain out of date");
                self.needs_resize = true;
            }
        }
        Ok(())
    }

    // =========================================================================
    // OVERLAY
    // =========================================================================

    fn update_overlay(&mut self, renderer: &Renderer, window: &Window) {
        if !self.config.debug.show_overlay {
            return;
        }
        let interval = Duration::try_from_secs_f32(self.config.debug.overlay_interval)
            .unwrap_or(Duration::from_millis(500));
        if !self.stats.should_refresh(interval) {
            return;
        }

        let text = overlay_text(
            &self.stats.snapshot(),
            &OverlayContext {
                title: &self.config.window.title,
                frames_in_flight: renderer.frames_in_flight(),
                current_slot: renderer.current_slot(),
                swapchain_images: renderer.image_count(),
                fullscreen: self.is_fullscreen,
                paused: self.spin.is_paused(),
            },
        );
        window.set_title(&text);
        log::debug!("{}", text);
    }

    // =========================================================================
    // HOT RELOAD
    // =========================================================================

    fn poll_config(&mut self) {
        let Some(watcher) = &self.watcher else {
            return;
        };
        if !watcher.poll() {
            return;
        }

        match Config::load_from_path(&self.args.config) {
            Ok(config) => self.apply_config(config.unwrap_or_default()),
            Err(e) => log::warn!("Ignoring config change: {:#}", e),
        }
    }

    fn apply_config(&mut self, config: Config) {
        if config == self.config {
            return;
        }
        log::info!("Config reloaded");

        if config.scene != self.config.scene {
            self.spin
                .reconfigure(config.scene.rotation_axis, config.scene.rotation_speed);
            if config.scene.paused != self.config.scene.paused {
                self.spin.set_paused(config.scene.paused);
            }
        }

        if config.graphics.clear_color != self.config.graphics.clear_color {
            if let Some(renderer) = self.renderer.as_mut() {
                if let Err(e) = renderer.set_clear_color(config.graphics.clear_color) {
                    log::error!("Failed to apply clear color: {:#}", e);
                }
            }
        }

        match config.key_bindings() {
            Ok(bindings) => self.bindings = bindings,
            Err(e) => log::warn!("Keeping old key bindings: {:#}", e),
        }

        if config.window != self.config.window
            || config.graphics.present_mode != self.config.graphics.present_mode
            || config.graphics.max_frames_in_flight != self.config.graphics.max_frames_in_flight
            || config.graphics.shader_dir != self.config.graphics.shader_dir
            || config.debug.validation_layers != self.config.debug.validation_layers
        {
            log::info!("Window and device settings take effect on restart");
        }

        self.config = config;
    }

    // =========================================================================
    // INPUT
    // =========================================================================

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: KeyCode) {
        let bindings = self.bindings;
        if key == bindings.quit || key == KeyCode::KeyQ {
            log::info!("{:?} pressed, exiting...", key);
            event_loop.exit();
        } else if key == bindings.fullscreen {
            self.toggle_fullscreen();
        } else if key == bindings.pause {
            self.spin.toggle_pause();
            log::info!("Rotation {}", if self.spin.is_paused() { "paused" } else { "resumed" });
        } else if key == bindings.reset_camera {
            self.camera.reset();
            log::info!("Camera reset");
        } else if key == bindings.save_camera {
            match self.camera.save(&self.config.camera.state_file) {
                Ok(()) => log::info!("Camera saved to {:?}", self.config.camera.state_file),
                Err(e) => log::error!("Failed to save camera: {:#}", e),
            }
        } else if key == bindings.projection {
            let camera = self.camera.camera_mut();
            let next = match camera.state().projection {
                Projection::Perspective => Projection::Orthographic,
                Projection::Orthographic => Projection::Perspective,
            };
            camera.set_projection_mode(next);
            log::info!("Projection: {:?}", next);
        }
    }

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            self.needs_resize = true;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_graphics(&window) {
            self.fail(event_loop, e.context("Failed to initialize Vulkan"));
            return;
        }

        self.window = Some(window);
        self.last_frame = Instant::now();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);

                if size.width == 0 || size.height == 0 {
                    self.is_minimized = true;
                } else {
                    self.is_minimized = false;
                    self.needs_resize = true;
                }
            }

            WindowEvent::Focused(false) => self.input.clear(),

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    let pressed = event.state.is_pressed();
                    self.input.key(key, pressed);
                    if pressed && !event.repeat {
                        self.handle_key(event_loop, key);
                    }
                }
            }

            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.input.set_dragging(state == ElementState::Pressed);
            }

            WindowEvent::CursorMoved { position, .. } => {
                self.input.cursor_moved(position.x, position.y);
            }

            _ => {}
        }
    }

    /// Continuous redraws for maximum FPS
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!(
            "Shutting down after {} frames, {} submitted",
            self.stats.frames_presented(),
            self.renderer.as_ref().map_or(0, |r| r.frames_submitted())
        );
        // Surface and swapchain go before the window
        self.renderer = None;
        log::info!("Cleanup complete");
    }
}
