//! Cube renderer
//!
//! Owns the window and every GPU object of the harness. The GPU objects are
//! built in dependency order: context, surface, swapchain and views, command
//! pool and buffer, depth, uniform and vertex resources, descriptors, render
//! pass, pipeline cache and pipeline, framebuffers. Struct fields are declared
//! in the reverse of that order so dropping tears everything down in reverse,
//! and the window goes last.
//!
//! The scene resources implement [`FrameDevice`]; [`FrameLoop`] decides when
//! each operation runs.

use ash::vk;

use crate::config::{FrameLoopConfig, RendererConfig};
use crate::foundation::math::{mat4_to_array, mvp_matrix};
use crate::render::frame_loop::{AcquireOutcome, FrameDevice, FrameLoop, FrameStats};
use crate::render::geometry::{textured_cube, SOLID_FACE_COLORS};
use crate::render::shader_compiler::{embedded_source, load_stage, ShaderCompiler, ShaderStage};
use crate::render::vulkan::{
    CommandBuffer, CommandPool, DepthBuffer, DescriptorPool, DescriptorSetLayout,
    DescriptorSetLayoutBuilder, Fence, FenceStatus, Framebuffer, GraphicsPipeline,
    PipelineCache, PipelineDescription, RenderPass, Semaphore, ShaderModule, Surface,
    Swapchain, UniformBuffer, VertexBuffer, VulkanContext, VulkanError, VulkanResult, Window,
    UNIFORM_BINDING,
};

/// Viewport covering the whole extent with the full depth range
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Rectangle covering the whole extent
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Renders a static cube into a window, one fully synchronized frame at a time
pub struct CubeRenderer {
    // The surface inside `resources` must be destroyed before its window.
    resources: SceneResources,
    window: Window,
}

impl CubeRenderer {
    /// Take ownership of `window` and build every GPU resource for it
    ///
    /// The renderer keeps the window alive for as long as the surface exists:
    ///
    /// ```compile_fail
    /// use cube_engine::prelude::*;
    ///
    /// fn build(window: Window, config: &HarnessConfig) -> VulkanResult<()> {
    ///     let compiler = GlslcCompiler::locate(None);
    ///     let renderer = CubeRenderer::new(window, &config.renderer, &compiler, 1_000)?;
    ///     drop(window);
    ///     drop(renderer);
    ///     Ok(())
    /// }
    /// ```
    pub fn new(
        mut window: Window,
        config: &RendererConfig,
        compiler: &dyn ShaderCompiler,
        fence_timeout_ns: u64,
    ) -> VulkanResult<Self> {
        let resources = SceneResources::new(&mut window, config, compiler, fence_timeout_ns)?;
        Ok(Self { resources, window })
    }

    /// Run the frame loop until the window closes or the frame budget is spent
    pub fn run(&mut self, config: FrameLoopConfig) -> VulkanResult<FrameStats> {
        FrameLoop::new(config).run(&mut self.resources, &mut self.window)
    }

    /// Swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.resources.swapchain.extent()
    }

    /// Number of swapchain images, framebuffers and color views
    pub fn image_count(&self) -> usize {
        self.resources.swapchain.image_count()
    }

    /// Whether a depth attachment was created
    pub fn depth_enabled(&self) -> bool {
        self.resources.depth.is_some()
    }
}

/// Every GPU object of the scene
struct SceneResources {
    // Field order is drop order.
    fence: Fence,
    framebuffers: Vec<Framebuffer>,
    pipeline: GraphicsPipeline,
    _pipeline_cache: PipelineCache,
    render_pass: RenderPass,
    descriptor_set: vk::DescriptorSet,
    _descriptor_pool: DescriptorPool,
    _descriptor_layout: DescriptorSetLayout,
    vertex_buffer: VertexBuffer,
    _uniform_buffer: UniformBuffer,
    depth: Option<DepthBuffer>,
    command_buffer: CommandBuffer,
    _command_pool: CommandPool,
    swapchain: Swapchain,
    _surface: Surface,
    context: VulkanContext,
    clear_color: [f32; 4],
}

impl SceneResources {
    fn new(
        window: &mut Window,
        config: &RendererConfig,
        compiler: &dyn ShaderCompiler,
        fence_timeout_ns: u64,
    ) -> VulkanResult<Self> {
        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::Window(e.to_string()))?;

        let context = VulkanContext::new(
            &config.application_name,
            &required_extensions,
            config.validation_enabled(),
        )?;
        let device = context.device().clone();

        let surface = Surface::new(&context, window)?;

        let swapchain = Swapchain::new(
            &context,
            &surface,
            config.requested_image_count,
            window.configured_extent(),
        )?;
        let extent = swapchain.extent();

        let command_pool = CommandPool::new(device.clone(), context.graphics_family())?;
        let mut command_buffer = command_pool.allocate_primary()?;

        let fence = Fence::new(device.clone(), false)?;

        let depth = if config.depth_enabled {
            let depth = DepthBuffer::new(&context, extent)?;
            Self::prepare_depth_layout(
                &context,
                &mut command_buffer,
                &fence,
                &depth,
                fence_timeout_ns,
            )?;
            Some(depth)
        } else {
            None
        };

        let mvp = mat4_to_array(&mvp_matrix(extent));
        let uniform_buffer = UniformBuffer::new(device.clone(), context.memory_properties(), &mvp)?;

        let vertex_buffer = if config.texture_mode {
            VertexBuffer::new(device.clone(), context.memory_properties(), &textured_cube())?
        } else {
            VertexBuffer::new(device.clone(), context.memory_properties(), &SOLID_FACE_COLORS)?
        };

        let descriptor_layout = DescriptorSetLayoutBuilder::for_scene(config.texture_mode).build(&device)?;
        let descriptor_pool = DescriptorPool::for_layout(device.clone(), &descriptor_layout)?;
        let descriptor_set = descriptor_pool.allocate(&descriptor_layout)?;
        descriptor_pool.write_uniform_buffer(
            descriptor_set,
            UNIFORM_BINDING,
            uniform_buffer.descriptor_info(),
        );

        let render_pass = RenderPass::new_forward_pass(
            device.clone(),
            swapchain.format().format,
            depth.as_ref().map(DepthBuffer::format),
        )?;

        let pipeline_cache = PipelineCache::new(device.clone())?;
        let pipeline = {
            let shaders = &config.shaders;
            let vertex_words = load_stage(
                compiler,
                ShaderStage::Vertex,
                shaders.vertex_path.as_deref(),
                embedded_source(ShaderStage::Vertex, config.texture_mode),
            )?;
            let fragment_words = load_stage(
                compiler,
                ShaderStage::Fragment,
                shaders.fragment_path.as_deref(),
                embedded_source(ShaderStage::Fragment, config.texture_mode),
            )?;

            // Modules are only needed until the pipeline exists
            let vertex_shader = ShaderModule::from_words(device.clone(), &vertex_words)?;
            let fragment_shader = ShaderModule::from_words(device.clone(), &fragment_words)?;

            GraphicsPipeline::new(
                device.clone(),
                &pipeline_cache,
                &PipelineDescription {
                    render_pass: render_pass.handle(),
                    set_layout: descriptor_layout.handle(),
                    vertex_shader: &vertex_shader,
                    fragment_shader: &fragment_shader,
                    vertex_binding: vertex_buffer.binding_description(),
                    vertex_attributes: vertex_buffer.attribute_descriptions(),
                    depth_enabled: config.depth_enabled,
                },
            )?
        };

        let framebuffers = Framebuffer::for_swapchain(
            &device,
            render_pass.handle(),
            swapchain.image_views(),
            depth.as_ref().map(DepthBuffer::image_view),
            extent,
        )?;

        log::info!(
            "Renderer ready: {} framebuffers, depth {}, texture mode {}",
            framebuffers.len(),
            if depth.is_some() { "on" } else { "off" },
            if config.texture_mode { "on" } else { "off" }
        );

        Ok(Self {
            fence,
            framebuffers,
            pipeline,
            _pipeline_cache: pipeline_cache,
            render_pass,
            descriptor_set,
            _descriptor_pool: descriptor_pool,
            _descriptor_layout: descriptor_layout,
            vertex_buffer,
            _uniform_buffer: uniform_buffer,
            depth,
            command_buffer,
            _command_pool: command_pool,
            swapchain,
            _surface: surface,
            context,
            clear_color: config.clear_color,
        })
    }

    /// Move the depth image into its attachment layout once, before any frame
    fn prepare_depth_layout(
        context: &VulkanContext,
        command_buffer: &mut CommandBuffer,
        fence: &Fence,
        depth: &DepthBuffer,
        fence_timeout_ns: u64,
    ) -> VulkanResult<()> {
        let mut recorder = command_buffer.begin()?;
        recorder.transition_image_layout(
            depth.image(),
            vk::ImageAspectFlags::DEPTH,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )?;
        let commands = [recorder.end()?];

        let submit_info = vk::SubmitInfo::builder().command_buffers(&commands);
        unsafe {
            context
                .device()
                .queue_submit(context.graphics_queue(), &[submit_info.build()], fence.handle())
                .map_err(VulkanError::Api)?;
        }

        fence.wait_until_signaled(fence_timeout_ns)?;
        fence.reset()?;
        command_buffer.reset()?;
        log::debug!("Depth buffer transitioned to attachment layout");
        Ok(())
    }
}

impl FrameDevice for SceneResources {
    type Semaphore = Semaphore;

    fn wait_idle(&mut self) -> VulkanResult<()> {
        self.context.wait_idle()
    }

    fn create_acquire_semaphore(&mut self) -> VulkanResult<Semaphore> {
        Semaphore::new(self.context.device().clone())
    }

    fn acquire_next_image(
        &mut self,
        semaphore: &Semaphore,
        timeout_ns: u64,
    ) -> VulkanResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.handle(),
                timeout_ns,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    log::debug!("Swapchain is suboptimal for the surface");
                }
                Ok(AcquireOutcome::Acquired(index))
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Ok(AcquireOutcome::NotReady),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn record_frame(&mut self, image_index: u32) -> VulkanResult<()> {
        let index = image_index as usize;
        let image = *self.swapchain.images().get(index).ok_or_else(|| {
            VulkanError::InvalidOperation {
                reason: format!("Acquired image index {} out of range", image_index),
            }
        })?;
        let framebuffer = self
            .framebuffers
            .get(index)
            .map(Framebuffer::handle)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for image {}", image_index),
            })?;

        let extent = self.swapchain.extent();
        let clear_values = self.render_pass.clear_values(self.clear_color);

        self.command_buffer.reset()?;
        let mut recorder = self.command_buffer.begin()?;
        recorder.transition_image_layout(
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )?;

        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer,
                full_rect(extent),
                &clear_values,
            );
            pass.bind_pipeline(self.pipeline.handle());
            pass.bind_descriptor_sets(self.pipeline.layout(), 0, &[self.descriptor_set]);
            pass.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
            pass.set_viewport(&full_viewport(extent));
            pass.set_scissor(&full_rect(extent));
            pass.draw(self.vertex_buffer.vertex_count(), 1, 0, 0);
        }

        recorder.transition_image_layout(
            image,
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )?;
        recorder.end()?;
        Ok(())
    }

    fn submit(&mut self, semaphore: &Semaphore) -> VulkanResult<()> {
        let wait_semaphores = [semaphore.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffer.submittable()?];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);

        unsafe {
            self.context
                .device()
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info.build()],
                    self.fence.handle(),
                )
                .map_err(VulkanError::Api)
        }
    }

    fn wait_for_submission(&mut self, timeout_ns: u64) -> VulkanResult<FenceStatus> {
        let status = self.fence.wait(timeout_ns)?;
        if status == FenceStatus::TimedOut {
            log::trace!("Submission fence wait timed out after {} ns", timeout_ns);
        }
        Ok(status)
    }

    fn present(&mut self, image_index: u32) -> VulkanResult<()> {
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];

        // The fence wait already ordered rendering before this call
        let present_info = vk::PresentInfoKHR::builder()
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.context.graphics_queue(), &present_info)
                .map_err(VulkanError::Api)?
        };
        if suboptimal {
            log::debug!("Presented to a suboptimal swapchain");
        }
        Ok(())
    }

    fn reset_submission_fence(&mut self) -> VulkanResult<()> {
        self.fence.reset()
    }
}

impl Drop for SceneResources {
    fn drop(&mut self) {
        // Nothing may still be executing when the fields start dropping
        if let Err(e) = self.context.wait_idle() {
            log::error!("Device wait before teardown failed: {}", e);
        }
        log::debug!("Tearing down renderer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewport_covers_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_scissor_covers_extent() {
        let extent = vk::Extent2D {
            width: 500,
            height: 500,
        };
        let rect = full_rect(extent);
        assert_eq!(rect.offset.x, 0);
        assert_eq!(rect.offset.y, 0);
        assert_eq!(rect.extent, extent);
    }
}
