// =============================================================================
// HELLO TRIANGLE - Vulkan on ash + winit
// =============================================================================
//
// Opens a window and draws one hard-coded triangle every frame until the
// window is closed.
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  App (winit event loop, window, config)                         │
// │    └── Renderer                                                 │
// │          ├── Vulkan Device + Surface                            │
// │          ├── PresentTarget (swapchain, pipeline, framebuffers,  │
// │          │                  pre-recorded command buffers)       │
// │          └── Synchronization (2 frames in flight)               │
// └─────────────────────────────────────────────────────────────────┘
//
// Exit status is 0 when the window is closed and 1 after any fatal error,
// which is logged first.
//
// =============================================================================

mod backend;
mod config;
mod renderer;
mod stats;

use anyhow::{Context, Result};
use backend::VkFailure;
use config::Config;
use renderer::{FrameOutcome, RenderSettings, Renderer};
use stats::FrameStats;
use std::fs::File;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes, WindowId},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() {
    let (config, config_warning) = Config::load();

    init_logging(&config);
    if let Some(warning) = config_warning {
        log::warn!("{}", warning);
    }

    log::info!("{} v{}", config.window.title, env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(config) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

/// Initialize logging at the configured level. RUST_LOG still overrides it.
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};

    let mut builder = Builder::new();
    builder.filter_level(config.get_log_level());
    builder.parse_default_env();

    let mut file_error = None;
    if !config.debug.log_file.is_empty() {
        match File::create(&config.debug.log_file) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => file_error = Some(e),
        }
    }

    builder.init();

    if let Some(e) = file_error {
        log::warn!("Could not open log file {}: {}. Logging to stderr.", config.debug.log_file, e);
    }
}

/// Drive the event loop to completion. All GPU objects and the window are
/// released before this returns.
fn run(config: Config) -> Result<()> {
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app).context("Event loop failed")?;
    app.finish()
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

/// IMPORTANT: the renderer is declared before the window so the surface is
/// destroyed while the window still exists.
struct App {
    config: Config,
    renderer: Option<Renderer>,
    window: Option<Window>,
    is_fullscreen: bool,
    stats: FrameStats,
    /// First fatal error raised inside an event callback
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
            is_fullscreen: false,
            stats: FrameStats::new(Instant::now()),
            error: None,
        }
    }

    fn render_settings(&self) -> RenderSettings {
        RenderSettings {
            app_name: self.config.window.title.clone(),
            enable_validation: cfg!(debug_assertions) && self.config.debug.validation_layers,
            present_mode: self.config.get_present_mode(),
            clear_color: self.config.graphics.clear_color,
        }
    }

    /// Record a fatal error and stop the event loop
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    /// Release GPU objects and the window, then report how the run ended
    fn finish(mut self) -> Result<()> {
        let error = self.error.take();
        self.renderer = None;
        self.window = None;

        match error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn create_window(&self, event_loop: &ActiveEventLoop) -> Result<Window> {
        let attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        event_loop
            .create_window(attributes)
            .context(VkFailure::CreateWindow)
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(renderer), Some(window)) = (self.renderer.as_mut(), self.window.as_ref()) else {
            return;
        };

        let outcome = renderer.draw_frame(window.inner_size());

        match outcome {
            Ok(FrameOutcome::Presented) => self.update_fps(),
            Ok(FrameOutcome::Recreated | FrameOutcome::Skipped) => {}
            Err(e) => self.fail(event_loop, e),
        }
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        let Some(window) = self.window.as_ref() else {
            return;
        };

        self.is_fullscreen = !self.is_fullscreen;

        if self.is_fullscreen {
            window.set_fullscreen(Some(Fullscreen::Borderless(None)));
            log::info!("Entered fullscreen mode");
        } else {
            window.set_fullscreen(None);
            log::info!("Exited fullscreen mode");
        }

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.request_resize();
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let Some(report) = self.stats.record(Instant::now()) else {
            return;
        };

        if let Some(window) = self.window.as_ref() {
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms)",
                self.config.window.title, report.fps, report.frame_time_ms
            ));
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match self.create_window(event_loop) {
            Ok(window) => window,
            Err(e) => return self.fail(event_loop, e),
        };

        let renderer = match Renderer::new(&window, self.render_settings()) {
            Ok(renderer) => renderer,
            Err(e) => return self.fail(event_loop, e),
        };

        self.renderer = Some(renderer);
        self.window = Some(window);

        // Setup time is not frame time
        self.stats.restart(Instant::now());
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }

            WindowEvent::RedrawRequested => self.redraw(event_loop),

            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        log::info!("ESC pressed, exiting...");
                        event_loop.exit();
                    }
                    PhysicalKey::Code(KeyCode::F11) if !event.repeat => self.toggle_fullscreen(),
                    _ => {}
                }
            }

            _ => {}
        }
    }

    /// Keep redrawing continuously, except while minimized: then we sleep
    /// until the next Resized event.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            let size = window.inner_size();
            if size.width > 0 && size.height > 0 {
                window.request_redraw();
            }
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        // GPU objects go first, the window they present to after
        self.renderer = None;
    }
}
