//! Presentation surface
//!
//! Binds the window's drawable surface to the device context and captures the
//! capability snapshot the swapchain is negotiated from.

use ash::extensions::khr::Surface as SurfaceLoader;
use ash::vk;

use crate::render::vulkan::window::Window;
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Capabilities, formats and present modes a surface reports for a device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    /// Image count, extent and transform limits
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format/color-space pairs, in driver order
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Query the surface support of a physical device
    pub fn query(
        loader: &SurfaceLoader,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VulkanResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                formats: loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            })
        }
    }
}

/// Window surface wrapper with RAII cleanup
pub struct Surface {
    loader: SurfaceLoader,
    surface: vk::SurfaceKHR,
    support: SurfaceSupport,
}

impl Surface {
    /// Create the surface and verify the graphics family can present to it
    pub fn new(context: &VulkanContext, window: &mut Window) -> VulkanResult<Self> {
        let loader = SurfaceLoader::new(context.entry(), context.instance());
        let surface = window
            .create_vulkan_surface(context.instance().handle())
            .map_err(|e| VulkanError::Window(e.to_string()))?;

        let destroy = |error: VulkanError| {
            unsafe { loader.destroy_surface(surface, None) };
            error
        };

        let physical_device = context.physical_device().device;
        let supports_present = unsafe {
            loader.get_physical_device_surface_support(
                physical_device,
                context.graphics_family(),
                surface,
            )
        }
        .map_err(|e| destroy(VulkanError::Api(e)))?;

        if !supports_present {
            return Err(destroy(VulkanError::PresentationUnsupported));
        }

        let support = SurfaceSupport::query(&loader, physical_device, surface).map_err(destroy)?;
        log::debug!(
            "Surface offers {} formats and {} present modes",
            support.formats.len(),
            support.present_modes.len()
        );

        Ok(Self {
            loader,
            surface,
            support,
        })
    }

    /// Get the surface handle
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Capability snapshot taken at creation
    pub fn support(&self) -> &SurfaceSupport {
        &self.support
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.surface, None);
        }
    }
}
