//! Command buffer management
//!
//! One command pool bound to the graphics family and one primary command
//! buffer with an explicit begin/end/reset lifecycle. Recording goes through
//! a borrowed `CommandRecorder`, and render passes through an
//! `ActiveRenderPass` guard that ends the pass when dropped.

use ash::{vk, Device};

use crate::render::vulkan::sync::LayoutTransition;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Command pool wrapper with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a new command pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            command_pool,
        })
    }

    /// Allocate one primary command buffer from this pool
    pub fn allocate_primary(&self) -> VulkanResult<CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };
        let buffer = buffers.first().copied().ok_or_else(|| {
            VulkanError::InitializationFailed("Driver returned no command buffer".to_string())
        })?;

        Ok(CommandBuffer {
            device: self.device.clone(),
            pool: self.command_pool,
            buffer,
            state: CommandBufferState::Initial,
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            // Destroying the pool frees any buffer still allocated from it
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Lifecycle state of a command buffer as seen from the CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandBufferState {
    /// Freshly allocated or reset
    Initial,
    /// Between `begin` and `end`
    Recording,
    /// Closed and submittable
    Executable,
}

impl CommandBufferState {
    /// State after `begin`; a buffer that is still recording cannot begin again
    pub fn begin(self) -> VulkanResult<Self> {
        match self {
            Self::Recording => Err(VulkanError::InvalidOperation {
                reason: "Command buffer already recording".to_string(),
            }),
            Self::Initial | Self::Executable => Ok(Self::Recording),
        }
    }

    /// State after `end`
    pub fn end(self) -> VulkanResult<Self> {
        match self {
            Self::Recording => Ok(Self::Executable),
            other => Err(VulkanError::InvalidOperation {
                reason: format!("Cannot end a command buffer that is {other:?}"),
            }),
        }
    }

    /// State after `reset`
    pub const fn reset(self) -> Self {
        Self::Initial
    }

    /// Only executable buffers may be submitted
    pub fn check_submittable(self) -> VulkanResult<()> {
        if self == Self::Executable {
            Ok(())
        } else {
            Err(VulkanError::InvalidOperation {
                reason: format!("Command buffer is {self:?}, not executable"),
            })
        }
    }
}

/// Primary command buffer freed back to its pool on drop
pub struct CommandBuffer {
    device: Device,
    pool: vk::CommandPool,
    buffer: vk::CommandBuffer,
    state: CommandBufferState,
}

impl CommandBuffer {
    /// Open the buffer for one-time-submit recording
    pub fn begin(&mut self) -> VulkanResult<CommandRecorder<'_>> {
        let next = self.state.begin()?;

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        self.state = next;
        Ok(CommandRecorder { buffer: self })
    }

    /// Return the buffer to its initial state without reallocating
    pub fn reset(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
        }
        self.state = self.state.reset();
        Ok(())
    }

    /// Handle for submission; the buffer must be executable
    pub fn submittable(&self) -> VulkanResult<vk::CommandBuffer> {
        self.state.check_submittable()?;
        Ok(self.buffer)
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &[self.buffer]);
        }
    }
}

/// Type-safe command recording into an open command buffer
pub struct CommandRecorder<'a> {
    buffer: &'a mut CommandBuffer,
}

impl<'a> CommandRecorder<'a> {
    /// Record an image layout transition barrier
    pub fn transition_image_layout(
        &mut self,
        image: vk::Image,
        aspect_mask: vk::ImageAspectFlags,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> VulkanResult<()> {
        let transition = LayoutTransition::between(old_layout, new_layout)?;
        let barrier = transition.image_barrier(image, aspect_mask, old_layout, new_layout);

        unsafe {
            self.buffer.device.cmd_pipeline_barrier(
                self.buffer.buffer,
                transition.src_stage,
                transition.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
        Ok(())
    }

    /// Begin an inline render pass
    pub fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        render_area: vk::Rect2D,
        clear_values: &[vk::ClearValue],
    ) -> ActiveRenderPass<'_, 'a> {
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(render_area)
            .clear_values(clear_values);

        unsafe {
            self.buffer.device.cmd_begin_render_pass(
                self.buffer.buffer,
                &render_pass_begin,
                vk::SubpassContents::INLINE,
            );
        }

        ActiveRenderPass { recorder: self }
    }

    /// Close the buffer and make it submittable
    pub fn end(self) -> VulkanResult<vk::CommandBuffer> {
        let next = self.buffer.state.end()?;
        unsafe {
            self.buffer
                .device
                .end_command_buffer(self.buffer.buffer)
                .map_err(VulkanError::Api)?;
        }

        self.buffer.state = next;
        Ok(self.buffer.buffer)
    }
}

/// Active render pass; ends the pass when dropped
pub struct ActiveRenderPass<'r, 'a> {
    recorder: &'r mut CommandRecorder<'a>,
}

impl ActiveRenderPass<'_, '_> {
    fn device(&self) -> &Device {
        &self.recorder.buffer.device
    }

    fn command_buffer(&self) -> vk::CommandBuffer {
        self.recorder.buffer.buffer
    }

    /// Set viewport
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) {
        unsafe {
            self.device()
                .cmd_set_viewport(self.command_buffer(), 0, std::slice::from_ref(viewport));
        }
    }

    /// Set scissor
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) {
        unsafe {
            self.device()
                .cmd_set_scissor(self.command_buffer(), 0, std::slice::from_ref(scissor));
        }
    }

    /// Bind graphics pipeline
    pub fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device().cmd_bind_pipeline(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Bind descriptor sets for the graphics bind point
    pub fn bind_descriptor_sets(
        &mut self,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer(),
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// Bind vertex buffers
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device().cmd_bind_vertex_buffers(
                self.command_buffer(),
                first_binding,
                buffers,
                offsets,
            );
        }
    }

    /// Non-indexed draw
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device().cmd_draw(
                self.command_buffer(),
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

impl Drop for ActiveRenderPass<'_, '_> {
    fn drop(&mut self) {
        unsafe {
            self.device().cmd_end_render_pass(self.command_buffer());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end_reset_cycle() {
        let recording = CommandBufferState::Initial.begin().unwrap();
        assert_eq!(recording, CommandBufferState::Recording);

        let executable = recording.end().unwrap();
        assert_eq!(executable, CommandBufferState::Executable);
        assert!(executable.check_submittable().is_ok());

        assert_eq!(executable.reset(), CommandBufferState::Initial);
        assert_eq!(recording.reset(), CommandBufferState::Initial);
    }

    #[test]
    fn test_begin_while_recording_fails() {
        let result = CommandBufferState::Recording.begin();
        assert!(matches!(result, Err(VulkanError::InvalidOperation { .. })));
    }

    #[test]
    fn test_only_executable_buffers_submit() {
        for state in [CommandBufferState::Initial, CommandBufferState::Recording] {
            assert!(matches!(
                state.check_submittable(),
                Err(VulkanError::InvalidOperation { .. })
            ));
        }
    }

    #[test]
    fn test_end_requires_recording() {
        assert!(CommandBufferState::Initial.end().is_err());
        assert!(CommandBufferState::Executable.end().is_err());
    }

    #[test]
    fn test_executable_buffer_can_record_again() {
        // One-time-submit buffers are re-recorded after submission
        assert_eq!(
            CommandBufferState::Executable.begin().unwrap(),
            CommandBufferState::Recording
        );
    }
}
