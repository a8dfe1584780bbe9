//! Vulkan rendering backend
//!
//! RAII wrappers over the Vulkan objects the cube harness creates. Every
//! wrapper keeps a clone of the logical device handle and destroys its object
//! on drop; owners declare fields in reverse creation order.

pub mod buffer;
pub mod commands;
pub mod context;
pub mod descriptor_set;
pub mod framebuffer;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex_layout;
pub mod window;

pub use buffer::{find_memory_type, write_mapped, Buffer, UniformBuffer, VertexBuffer};
pub use commands::{ActiveRenderPass, CommandBuffer, CommandBufferState, CommandPool, CommandRecorder};
pub use context::{
    DebugSeverity, LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance,
    VulkanResult,
};
pub use descriptor_set::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, SAMPLER_BINDING,
    UNIFORM_BINDING,
};
pub use framebuffer::{DepthBuffer, Framebuffer, DEPTH_FORMAT};
pub use render_pass::RenderPass;
pub use shader::{GraphicsPipeline, PipelineCache, PipelineDescription, ShaderModule};
pub use surface::{Surface, SurfaceSupport};
pub use swapchain::{Swapchain, SwapchainPlan};
pub use sync::{Fence, FenceStatus, LayoutTransition, Semaphore};
pub use vertex_layout::VulkanVertexLayout;
pub use window::{Window, WindowError, WindowResult};
