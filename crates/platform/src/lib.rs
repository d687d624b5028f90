//! Platform layer: windowing, event loop and frame pacing around a
//! [`renderer::Scene`].

pub mod demo;

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, anyhow};
use log::{error, info, warn};
use renderer::{RecordingDevice, WgpuDevice};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowId},
};

use crate::demo::Demo;

pub const DEFAULT_HEADLESS_FRAMES: u32 = 120;

const HEADLESS_DT: f32 = 1.0 / 60.0;

/// Everything the app parses from the command line.
#[derive(Clone, Debug)]
pub struct RunConfig {
    pub backends: wgpu::Backends,
    pub width: u32,
    pub height: u32,
    pub show_fps: bool,
    pub fov_y_degrees: f32,
    /// `Some(n)`: render `n` frames on the recording device, no window.
    pub headless_frames: Option<u32>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            width: 1280,
            height: 720,
            show_fps: false,
            fov_y_degrees: 60.0,
            headless_frames: None,
        }
    }
}

impl RunConfig {
    pub fn aspect(&self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

/// Counts frames and logs the rate once a second.
struct FpsCounter {
    frames: u32,
    since: Instant,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
        }
    }

    fn tick(&mut self) {
        self.frames += 1;
        let elapsed = self.since.elapsed().as_secs_f32();
        if elapsed >= 1.0 {
            info!("FPS: {:.1}", self.frames as f32 / elapsed);
            self.frames = 0;
            self.since = Instant::now();
        }
    }
}

struct App {
    config: RunConfig,
    window: Option<Arc<Window>>,
    gpu: Option<WgpuDevice>,
    demo: Option<Demo>,
    last_frame: Instant,
    fps: Option<FpsCounter>,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: RunConfig) -> Self {
        let fps = config.show_fps.then(FpsCounter::new);
        Self {
            config,
            window: None,
            gpu: None,
            demo: None,
            last_frame: Instant::now(),
            fps,
            failure: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("voxscene")
            .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .context("failed to create window")?,
        );
        info!(
            "Window created: {}x{}",
            window.inner_size().width,
            window.inner_size().height
        );

        let mut gpu = pollster::block_on(WgpuDevice::new(window.clone(), self.config.backends))
            .context("GPU initialization failed")?;
        let aspect = gpu.aspect();
        let demo = Demo::build(&mut gpu, self.config.fov_y_degrees, aspect)?;

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.demo = Some(demo);
        self.last_frame = Instant::now();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("{err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(gpu), Some(demo)) = (self.gpu.as_mut(), self.demo.as_mut()) else {
            return;
        };

        let now = Instant::now();
        demo.advance((now - self.last_frame).as_secs_f32());
        self.last_frame = now;

        match gpu.begin_frame() {
            Ok(()) => {
                demo.scene.render(gpu);
                gpu.end_frame();
                if let Some(fps) = self.fps.as_mut() {
                    fps.tick();
                }
            }
            Err(e) if WgpuDevice::is_surface_lost(&e) => {
                warn!("Surface lost/outdated. Recreating...");
                gpu.recreate_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                self.fail(event_loop, anyhow!("GPU out of memory"));
            }
            Err(e) => warn!("Surface error: {e:?}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(err) = self.init(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested. Exiting event loop.");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let (Some(gpu), Some(demo)) = (self.gpu.as_mut(), self.demo.as_mut()) {
                    gpu.resize(new_size.width, new_size.height);
                    demo.scene.set_aspect(gpu.aspect());
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                info!("Scale factor changed: {scale_factor:.3}");
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Poll);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let (Some(demo), Some(gpu)) = (self.demo.take(), self.gpu.as_mut()) {
            demo.destroy(gpu);
        }
    }
}

/// Open a window and render the demo scene until it is closed.
pub fn run_with_renderer(config: RunConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
    let mut app = App::new(config);
    event_loop
        .run_app(&mut app)
        .context("winit event loop terminated with error")?;

    match app.failure.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Render the demo scene on a [`RecordingDevice`] and log what was drawn.
pub fn run_headless(config: &RunConfig) -> Result<()> {
    let frames = config.headless_frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
    let mut device = RecordingDevice::new();
    let mut demo = Demo::build(&mut device, config.fov_y_degrees, config.aspect())?;
    device.clear_commands();

    let mut draws = 0usize;
    let mut indices = 0u64;
    for _ in 0..frames {
        demo.advance(HEADLESS_DT);
        demo.scene.render(&mut device);
        for draw in device.draw_calls() {
            draws += 1;
            indices += u64::from(draw.index_count);
        }
        device.clear_commands();
    }

    info!(
        "headless: {frames} frames, {draws} draws, {indices} indices, {} live buffers",
        device.live_buffers()
    );
    demo.destroy(&mut device);
    Ok(())
}
