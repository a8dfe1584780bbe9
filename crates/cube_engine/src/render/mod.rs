//! # Rendering
//!
//! A minimal Vulkan harness that draws one static cube.
//!
//! - [`vulkan`]: RAII wrappers for every GPU object
//! - [`renderer`]: builds the objects in order and records the frame
//! - [`frame_loop`]: the acquire, record, submit, present cycle
//! - [`geometry`] and [`shader_compiler`]: the scene's vertices and shaders

pub mod frame_loop;
pub mod geometry;
pub mod renderer;
pub mod shader_compiler;
pub mod vulkan;

pub use frame_loop::{AcquireOutcome, EventSource, FrameDevice, FrameLoop, FrameState, FrameStats};
pub use geometry::{ColorVertex, UvVertex, CUBE_VERTEX_COUNT};
pub use renderer::CubeRenderer;
pub use shader_compiler::{GlslcCompiler, ShaderCompileError, ShaderCompiler, ShaderStage};
pub use vulkan::{VulkanError, VulkanResult, Window, WindowError};
