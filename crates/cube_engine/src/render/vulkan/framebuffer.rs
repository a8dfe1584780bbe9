//! Framebuffer management
//!
//! The shared depth attachment and one framebuffer per swapchain image.

use ash::{vk, Device};

use crate::render::vulkan::buffer::allocate_memory;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Depth format used by the harness
pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Pick an image tiling that supports depth-stencil attachment use
///
/// Linear tiling is preferred when the driver allows it for the format.
pub fn choose_depth_tiling(
    format: vk::Format,
    properties: vk::FormatProperties,
) -> VulkanResult<vk::ImageTiling> {
    let attachment = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
    if properties.linear_tiling_features.contains(attachment) {
        Ok(vk::ImageTiling::LINEAR)
    } else if properties.optimal_tiling_features.contains(attachment) {
        Ok(vk::ImageTiling::OPTIMAL)
    } else {
        Err(VulkanError::UnsupportedDepthFormat(format))
    }
}

/// Framebuffer wrapper with RAII cleanup
pub struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    /// Create a new framebuffer
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let framebuffer_create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&framebuffer_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }

    /// One framebuffer per color view, each sharing the optional depth view
    pub fn for_swapchain(
        device: &Device,
        render_pass: vk::RenderPass,
        color_views: &[vk::ImageView],
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> VulkanResult<Vec<Self>> {
        color_views
            .iter()
            .map(|&color_view| {
                let attachments: Vec<vk::ImageView> =
                    std::iter::once(color_view).chain(depth_view).collect();
                Self::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect()
    }

    /// Get the framebuffer handle
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Depth buffer wrapper with RAII cleanup
///
/// The image starts in `UNDEFINED` layout; the owner records the one-time
/// transition to `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` before first use.
pub struct DepthBuffer {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    format: vk::Format,
}

impl DepthBuffer {
    /// Create a new depth buffer sized to the surface extent
    pub fn new(context: &VulkanContext, extent: vk::Extent2D) -> VulkanResult<Self> {
        let format = DEPTH_FORMAT;
        let format_properties = unsafe {
            context
                .instance()
                .get_physical_device_format_properties(context.physical_device().device, format)
        };
        let tiling = choose_depth_tiling(format, format_properties)?;
        log::debug!("Depth buffer {:?} with {:?} tiling", format, tiling);

        let device = context.device().clone();

        let image_create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(tiling)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let image = unsafe {
            device
                .create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };

        let memory = match allocate_memory(
            &device,
            context.memory_properties(),
            memory_requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // From here on Drop releases whatever has been created
        let mut depth = Self {
            device,
            image,
            memory,
            image_view: vk::ImageView::null(),
            format,
        };

        unsafe {
            depth
                .device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let image_view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::DEPTH,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        depth.image_view = unsafe {
            depth
                .device
                .create_image_view(&image_view_create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(depth)
    }

    /// Get the image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get the depth format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            if self.image_view != vk::ImageView::null() {
                self.device.destroy_image_view(self.image_view, None);
            }
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
