//! Vulkan swapchain management
//!
//! Negotiates extent, format, image count and present mode from a surface
//! snapshot, then creates the swapchain and one color view per image.
//! The swapchain is created once; resizing is not supported.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::vulkan::surface::{Surface, SurfaceSupport};
use crate::render::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Format used when the surface leaves the choice to the application
pub const FALLBACK_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Use the surface's current extent unless it reports the undefined sentinel
pub fn resolve_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    default_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        default_extent
    } else {
        capabilities.current_extent
    }
}

/// Pick the surface format: the first entry verbatim, or the fallback when
/// the first entry is `UNDEFINED`
pub fn resolve_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> VulkanResult<vk::SurfaceFormatKHR> {
    let first = formats.first().ok_or(VulkanError::NoSurfaceFormats)?;
    if first.format == vk::Format::UNDEFINED {
        Ok(FALLBACK_SURFACE_FORMAT)
    } else {
        Ok(*first)
    }
}

/// Clamp the requested image count into `[min + 1, max]`
///
/// A `max_image_count` of zero means the surface has no upper bound.
pub fn resolve_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let upper = if capabilities.max_image_count > 0 {
        capabilities.max_image_count
    } else {
        u32::MAX
    };
    let count = requested.min(upper).max(capabilities.min_image_count + 1);
    // min + 1 can only exceed the bound when min == max
    count.min(upper)
}

/// Prefer a low-latency non-blocking mode, else the always-available FIFO
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|preferred| present_modes.contains(preferred))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Identity pre-transform when supported, otherwise the current transform
pub fn choose_pre_transform(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::SurfaceTransformFlagsKHR {
    if capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        capabilities.current_transform
    }
}

/// First supported composite alpha mode, opaque first
pub fn choose_composite_alpha(
    capabilities: &vk::SurfaceCapabilitiesKHR,
) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&mode| capabilities.supported_composite_alpha.contains(mode))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Every negotiated swapchain parameter, resolved before any handle is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Image extent
    pub extent: vk::Extent2D,
    /// Image format and color space
    pub format: vk::SurfaceFormatKHR,
    /// Minimum number of images requested from the driver
    pub image_count: u32,
    /// Presentation mode
    pub present_mode: vk::PresentModeKHR,
    /// Surface pre-transform
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    /// Composite alpha mode
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainPlan {
    /// Resolve a plan from a surface snapshot
    pub fn resolve(
        support: &SurfaceSupport,
        requested_image_count: u32,
        default_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let capabilities = &support.capabilities;
        let extent = resolve_extent(capabilities, default_extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::EmptyExtent {
                width: extent.width,
                height: extent.height,
            });
        }

        Ok(Self {
            extent,
            format: resolve_surface_format(&support.formats)?,
            image_count: resolve_image_count(capabilities, requested_image_count),
            present_mode: choose_present_mode(&support.present_modes),
            pre_transform: choose_pre_transform(capabilities),
            composite_alpha: choose_composite_alpha(capabilities),
        })
    }
}

/// Swapchain management wrapper with RAII cleanup
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    plan: SwapchainPlan,
}

impl Swapchain {
    /// Create a new swapchain and its image views
    pub fn new(
        context: &VulkanContext,
        surface: &Surface,
        requested_image_count: u32,
        default_extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let plan = SwapchainPlan::resolve(surface.support(), requested_image_count, default_extent)?;
        let device = context.device().clone();
        let swapchain_loader = SwapchainLoader::new(context.instance(), &device);

        let swapchain_create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(plan.image_count)
            .image_format(plan.format.format)
            .image_color_space(plan.format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // From here on, Drop owns cleanup of whatever has been created
        let mut created = Self {
            device,
            swapchain_loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            plan,
        };

        created.images = unsafe {
            created
                .swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        for &image in &created.images {
            let create_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(plan.format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            let view = unsafe {
                created
                    .device
                    .create_image_view(&create_info, None)
                    .map_err(VulkanError::Api)?
            };
            created.image_views.push(view);
        }

        log::info!(
            "Created swapchain: {}x{}, {} images (requested {}), {:?} / {:?}, {:?}",
            plan.extent.width,
            plan.extent.height,
            created.images.len(),
            plan.image_count,
            plan.format.format,
            plan.format.color_space,
            plan.present_mode
        );

        Ok(created)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.plan.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.plan.format
    }

    /// Swapchain images, owned by the swapchain itself
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    /// Get image views
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Get swapchain loader
    pub fn loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Number of images the driver actually created
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &image_view in &self.image_views {
                self.device.destroy_image_view(image_view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, current: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: current,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        }
    }

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_image_count_law() {
        for (min, max) in [(1, 3), (2, 8), (1, 0), (3, 0), (2, 3)] {
            let caps = capabilities(min, max, extent(1, 1));
            for requested in 0..12 {
                let bounded = if max > 0 { requested.min(max) } else { requested };
                let expected = bounded.max(min + 1);
                assert_eq!(
                    resolve_image_count(&caps, requested),
                    expected,
                    "min={min} max={max} requested={requested}"
                );
            }
        }
    }

    #[test]
    fn test_image_count_never_exceeds_bound_when_min_equals_max() {
        let caps = capabilities(2, 2, extent(1, 1));
        assert_eq!(resolve_image_count(&caps, 1), 2);
        assert_eq!(resolve_image_count(&caps, 5), 2);
    }

    #[test]
    fn test_undefined_format_falls_back() {
        let formats = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        let resolved = resolve_surface_format(&formats).unwrap();
        assert_eq!(resolved.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(resolved.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_first_format_taken_verbatim() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
            FALLBACK_SURFACE_FORMAT,
        ];
        assert_eq!(resolve_surface_format(&formats).unwrap(), formats[0]);
    }

    #[test]
    fn test_empty_format_list_is_an_error() {
        assert!(matches!(
            resolve_surface_format(&[]),
            Err(VulkanError::NoSurfaceFormats)
        ));
    }

    #[test]
    fn test_extent_sentinel_uses_default() {
        let caps = capabilities(1, 3, extent(u32::MAX, u32::MAX));
        assert_eq!(resolve_extent(&caps, extent(500, 500)), extent(500, 500));

        let caps = capabilities(1, 3, extent(1024, 768));
        assert_eq!(resolve_extent(&caps, extent(500, 500)), extent(1024, 768));
    }

    #[test]
    fn test_present_mode_preference() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO_RELAXED]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_transform_and_alpha_fallbacks() {
        let mut caps = capabilities(1, 3, extent(1, 1));
        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.supported_composite_alpha = vk::CompositeAlphaFlagsKHR::INHERIT;

        assert_eq!(choose_pre_transform(&caps), vk::SurfaceTransformFlagsKHR::ROTATE_90);
        assert_eq!(choose_composite_alpha(&caps), vk::CompositeAlphaFlagsKHR::INHERIT);
    }

    #[test]
    fn test_plan_scenario_undefined_format() {
        let support = SurfaceSupport {
            capabilities: capabilities(1, 3, extent(800, 600)),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::UNDEFINED,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let plan = SwapchainPlan::resolve(&support, 2, extent(500, 500)).unwrap();
        assert_eq!(plan.extent, extent(800, 600));
        assert_eq!(plan.format, FALLBACK_SURFACE_FORMAT);
        assert_eq!(plan.image_count, 2);
        assert_eq!(plan.present_mode, vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_plan_scenario_request_above_max() {
        let support = SurfaceSupport {
            capabilities: capabilities(1, 2, extent(640, 480)),
            formats: vec![FALLBACK_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let plan = SwapchainPlan::resolve(&support, 5, extent(500, 500)).unwrap();
        assert_eq!(plan.image_count, 2);
    }

    #[test]
    fn test_plan_sentinel_takes_configured_size() {
        let support = SurfaceSupport {
            capabilities: capabilities(1, 3, extent(u32::MAX, u32::MAX)),
            formats: vec![FALLBACK_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let plan = SwapchainPlan::resolve(&support, 2, extent(640, 360)).unwrap();
        assert_eq!(plan.extent, extent(640, 360));
    }

    #[test]
    fn test_plan_rejects_zero_extent() {
        // Minimized windows report a zero current extent
        let support = SurfaceSupport {
            capabilities: capabilities(1, 3, extent(0, 0)),
            formats: vec![FALLBACK_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainPlan::resolve(&support, 2, extent(500, 500)),
            Err(VulkanError::EmptyExtent { width: 0, height: 0 })
        ));

        let support = SurfaceSupport {
            capabilities: capabilities(1, 3, extent(u32::MAX, u32::MAX)),
            ..support
        };
        assert!(matches!(
            SwapchainPlan::resolve(&support, 2, extent(500, 0)),
            Err(VulkanError::EmptyExtent { width: 500, height: 0 })
        ));
    }
}
