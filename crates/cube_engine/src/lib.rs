//! # Cube Engine
//!
//! A minimal Vulkan rendering harness: it brings up a device, a surface and
//! a swapchain, uploads a cube and one transform, and renders it one fully
//! synchronized frame at a time.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cube_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = HarnessConfig::default().with_max_frames(60);
//!     let window = Window::new(&config.window)?;
//!     let compiler = GlslcCompiler::locate(None);
//!     let mut renderer = CubeRenderer::new(
//!         window,
//!         &config.renderer,
//!         &compiler,
//!         config.frame_loop.fence_timeout_ns,
//!     )?;
//!     renderer.run(config.frame_loop)?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;

/// Common imports for harness users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, FrameLoopConfig, HarnessConfig, RendererConfig, WindowConfig},
        foundation::{logging, math::mvp_matrix},
        render::{
            CubeRenderer, EventSource, FrameStats, GlslcCompiler, ShaderCompiler, VulkanError,
            VulkanResult, Window, WindowError,
        },
    };
}
