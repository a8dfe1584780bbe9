//! Cube demo application
//!
//! Opens a window and renders the static cube until the window is closed
//! (Escape also closes it). An optional first argument names a TOML or RON
//! configuration file.

use cube_engine::prelude::*;

fn load_config() -> Result<HarnessConfig, ConfigError> {
    let config = match std::env::args().nth(1) {
        Some(path) => HarnessConfig::load_from_file(&path)?,
        None => HarnessConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run(config: &HarnessConfig) -> Result<FrameStats, Box<dyn std::error::Error>> {
    let window = Window::new(&config.window)?;

    let compiler = GlslcCompiler::locate(config.renderer.shaders.glslc_path.as_deref());
    log::debug!("Using shader compiler {}", compiler.executable().display());

    let mut renderer = CubeRenderer::new(
        window,
        &config.renderer,
        &compiler,
        config.frame_loop.fence_timeout_ns,
    )?;
    let extent = renderer.extent();
    log::info!(
        "Rendering {}x{} over {} swapchain images (depth {})",
        extent.width,
        extent.height,
        renderer.image_count(),
        if renderer.depth_enabled() { "on" } else { "off" }
    );

    Ok(renderer.run(config.frame_loop)?)
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init(log::LevelFilter::Error);
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    // validate() already checked the level name
    logging::init(config.log_level_filter().unwrap_or(log::LevelFilter::Info));
    log::info!("Starting cube demo");

    match run(&config) {
        Ok(stats) => log::info!("Rendered {} frames", stats.frames_presented),
        Err(e) => {
            log::error!("Cube demo failed: {}", e);
            std::process::exit(1);
        }
    }
}
