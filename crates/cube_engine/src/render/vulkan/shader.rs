//! Shader modules, pipeline cache and the graphics pipeline
//!
//! SPIR-V loading and fixed-function state for the cube pipeline following
//! RAII patterns. The pipeline owns its layout.

use ash::{vk, Device};
use std::ffi::CStr;

use crate::render::vulkan::{VulkanError, VulkanResult};

const ENTRY_POINT: &CStr = c"main";

/// Shader module wrapper with RAII cleanup
pub struct ShaderModule {
    device: Device,
    module: vk::ShaderModule,
}

impl ShaderModule {
    /// Create shader module from SPIR-V words
    pub fn from_words(device: Device, words: &[u32]) -> VulkanResult<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(words);

        let module = unsafe {
            device
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, module })
    }

    /// Create shader stage create info
    pub fn create_stage_info(&self, stage: vk::ShaderStageFlags) -> vk::PipelineShaderStageCreateInfo {
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(stage)
            .module(self.module)
            .name(ENTRY_POINT)
            .build()
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_shader_module(self.module, None);
        }
    }
}

/// Empty pipeline cache used for pipeline creation
pub struct PipelineCache {
    device: Device,
    cache: vk::PipelineCache,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::builder();

        let cache = unsafe {
            device
                .create_pipeline_cache(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, cache })
    }

    /// Get the cache handle
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline_cache(self.cache, None);
        }
    }
}

/// Fill, back-face culling, clockwise front faces
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Depth test and write with `LESS_OR_EQUAL`, or everything off
pub fn depth_stencil_state(depth_enabled: bool) -> vk::PipelineDepthStencilStateCreateInfo {
    let stencil_op = vk::StencilOpState {
        fail_op: vk::StencilOp::KEEP,
        pass_op: vk::StencilOp::KEEP,
        depth_fail_op: vk::StencilOp::KEEP,
        compare_op: vk::CompareOp::ALWAYS,
        ..Default::default()
    };

    vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(depth_enabled)
        .depth_write_enable(depth_enabled)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false)
        .front(stencil_op)
        .back(stencil_op)
        .min_depth_bounds(0.0)
        .max_depth_bounds(0.0)
        .build()
}

/// Dynamic states supplied per frame
pub const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Inputs for building the cube pipeline
pub struct PipelineDescription<'a> {
    /// Render pass the pipeline draws in
    pub render_pass: vk::RenderPass,
    /// Single descriptor set layout wrapped by the pipeline layout
    pub set_layout: vk::DescriptorSetLayout,
    /// Vertex stage module
    pub vertex_shader: &'a ShaderModule,
    /// Fragment stage module
    pub fragment_shader: &'a ShaderModule,
    /// The single vertex binding
    pub vertex_binding: vk::VertexInputBindingDescription,
    /// Attributes of the vertex binding
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    /// Enable depth test and write
    pub depth_enabled: bool,
}

/// Graphics pipeline wrapper with RAII cleanup
pub struct GraphicsPipeline {
    device: Device,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

impl GraphicsPipeline {
    /// Create the pipeline layout and graphics pipeline through `cache`
    pub fn new(
        device: Device,
        cache: &PipelineCache,
        description: &PipelineDescription<'_>,
    ) -> VulkanResult<Self> {
        let set_layouts = [description.set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(VulkanError::Api)?
        };

        // Drop destroys the layout if pipeline creation fails
        let mut created = Self {
            device,
            pipeline: vk::Pipeline::null(),
            layout,
        };

        let shader_stages = [
            description
                .vertex_shader
                .create_stage_info(vk::ShaderStageFlags::VERTEX),
            description
                .fragment_shader
                .create_stage_info(vk::ShaderStageFlags::FRAGMENT),
        ];

        let bindings = [description.vertex_binding];
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(description.vertex_attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&DYNAMIC_STATES);

        let rasterizer = rasterization_state();

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil = depth_stencil_state(description.depth_enabled);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::NO_OP)
            .attachments(&color_blend_attachments)
            .blend_constants([1.0; 4]);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(description.render_pass)
            .subpass(0);

        let pipelines = unsafe {
            created
                .device
                .create_graphics_pipelines(cache.handle(), &[pipeline_info.build()], None)
                .map_err(|(_, err)| VulkanError::Api(err))?
        };

        created.pipeline = pipelines.first().copied().ok_or_else(|| {
            VulkanError::InitializationFailed("Driver returned no pipeline".to_string())
        })?;

        log::debug!(
            "Created graphics pipeline (depth {})",
            if description.depth_enabled { "on" } else { "off" }
        );

        Ok(created)
    }

    /// Get pipeline handle
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Get layout handle
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe {
            if self.pipeline != vk::Pipeline::null() {
                self.device.destroy_pipeline(self.pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterization_culls_back_faces_clockwise() {
        let state = rasterization_state();
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.line_width, 1.0);
    }

    #[test]
    fn test_depth_state_follows_flag() {
        let on = depth_stencil_state(true);
        assert_eq!(on.depth_test_enable, vk::TRUE);
        assert_eq!(on.depth_write_enable, vk::TRUE);
        assert_eq!(on.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(on.stencil_test_enable, vk::FALSE);

        let off = depth_stencil_state(false);
        assert_eq!(off.depth_test_enable, vk::FALSE);
        assert_eq!(off.depth_write_enable, vk::FALSE);
    }

    #[test]
    fn test_viewport_and_scissor_are_dynamic() {
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::VIEWPORT));
        assert!(DYNAMIC_STATES.contains(&vk::DynamicState::SCISSOR));
    }

    #[test]
    fn test_entry_point_name() {
        assert_eq!(ENTRY_POINT.to_bytes(), b"main");
    }
}
