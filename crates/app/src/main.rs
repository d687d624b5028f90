//! Entry point for voxscene.
//! Logging + CLI flags, then either the windowed or the headless runner.

use anyhow::Result;
use log::{info, warn};
use platform::{DEFAULT_HEADLESS_FRAMES, RunConfig};

fn parse_backend(val: &str) -> wgpu::Backends {
    // Accept: auto|vulkan|dx12|metal|gl
    match val.to_ascii_lowercase().as_str() {
        "auto" => wgpu::Backends::all(),
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" | "d3d12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" | "opengl" | "gles" => wgpu::Backends::GL,
        other => {
            warn!("Unknown backend '{other}', falling back to auto.");
            wgpu::Backends::all()
        }
    }
}

fn parse_switch(val: &str) -> bool {
    matches!(
        val.to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

fn parse_size(val: &str) -> Option<(u32, u32)> {
    let (w, h) = val.split_once('x').or_else(|| val.split_once('X'))?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

fn parse_fov(val: &str) -> Option<f32> {
    val.parse::<f32>()
        .ok()
        .filter(|fov| *fov > 0.0 && *fov < 180.0)
}

fn parse_args<I>(args: I) -> RunConfig
where
    I: IntoIterator<Item = String>,
{
    let mut config = RunConfig::default();
    let mut width: Option<u32> = None;
    let mut height: Option<u32> = None;

    for arg in args {
        if let Some(v) = arg.strip_prefix("--gpu-backend=") {
            config.backends = parse_backend(v);
        } else if arg == "--show-fps" {
            config.show_fps = true;
        } else if let Some(v) = arg.strip_prefix("--show-fps=") {
            config.show_fps = parse_switch(v);
        } else if let Some(v) = arg.strip_prefix("--size=") {
            match parse_size(v) {
                Some((w, h)) => {
                    width = Some(w);
                    height = Some(h);
                }
                None => warn!("Bad --size '{v}', expected WxH."),
            }
        } else if let Some(v) = arg.strip_prefix("--width=") {
            match v.parse() {
                Ok(w) => width = Some(w),
                Err(_) => warn!("Bad --width '{v}'."),
            }
        } else if let Some(v) = arg.strip_prefix("--height=") {
            match v.parse() {
                Ok(h) => height = Some(h),
                Err(_) => warn!("Bad --height '{v}'."),
            }
        } else if let Some(v) = arg.strip_prefix("--fov=") {
            match parse_fov(v) {
                Some(fov) => config.fov_y_degrees = fov,
                None => warn!("Bad --fov '{v}', keeping {}.", config.fov_y_degrees),
            }
        } else if arg == "--headless" {
            config.headless_frames = Some(DEFAULT_HEADLESS_FRAMES);
        } else if let Some(v) = arg.strip_prefix("--headless=") {
            config.headless_frames = Some(v.parse().unwrap_or_else(|_| {
                warn!("Bad --headless '{v}', rendering {DEFAULT_HEADLESS_FRAMES} frames.");
                DEFAULT_HEADLESS_FRAMES
            }));
        } else if arg.starts_with("--") {
            warn!("Ignoring unknown flag '{arg}'.");
        }
    }

    config.width = width.unwrap_or(config.width).max(1);
    config.height = height.unwrap_or(config.height).max(1);
    config
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args(std::env::args().skip(1));
    info!(
        "Starting voxscene. Backend: {:?}, show_fps={}, window_size={}x{}, fov={}",
        config.backends, config.show_fps, config.width, config.height, config.fov_y_degrees
    );

    if config.headless_frames.is_some() {
        platform::run_headless(&config)?;
    } else {
        platform::run_with_renderer(config)?;
    }

    info!("Graceful shutdown. Bye!");
    Ok(())
}
