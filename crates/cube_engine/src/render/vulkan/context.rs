//! Vulkan context management
//!
//! Owns the instance, the optional debug messenger, the selected physical
//! device and the logical device with its graphics queue. Every other GPU
//! object in the crate is created from this context and must be dropped
//! before it.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device, Entry, Instance};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use thiserror::Error;

use crate::render::shader_compiler::ShaderCompileError;

/// Name of the Khronos validation layer, nul terminated for the loader.
const VALIDATION_LAYER: &[u8] = b"VK_LAYER_KHRONOS_validation\0";

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// The Vulkan loader library could not be loaded
    #[error("Failed to load Vulkan: {0}")]
    Loading(String),

    /// The instance reports no physical devices
    #[error("No Vulkan physical device available")]
    NoPhysicalDevice,

    /// No queue family of the selected device supports graphics work
    #[error("No graphics queue family found")]
    NoGraphicsQueueFamily,

    /// The graphics queue family cannot present to the window surface
    #[error("WSI not supported: graphics queue family cannot present to the surface")]
    PresentationUnsupported,

    /// The negotiated swapchain extent has no area
    #[error("Swapchain extent {width}x{height} has no area")]
    EmptyExtent {
        /// Resolved width
        width: u32,
        /// Resolved height
        height: u32,
    },

    /// The surface reported an empty format list
    #[error("Surface reports no supported formats")]
    NoSurfaceFormats,

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// The depth format cannot be used as a depth-stencil attachment
    #[error("Depth format {0:?} is not supported as a depth-stencil attachment")]
    UnsupportedDepthFormat(vk::Format),

    /// Shader source could not be turned into SPIR-V
    #[error("Shader compilation failed: {0}")]
    ShaderCompilation(#[from] ShaderCompileError),

    /// The windowing collaborator failed
    #[error("Window error: {0}")]
    Window(String),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

/// Severity of a message delivered by the validation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Informational message
    Info,
    /// Possible misuse of the API
    Warning,
    /// Valid but suboptimal API usage
    PerformanceWarning,
    /// Invalid API usage
    Error,
    /// Loader and layer chatter
    Debug,
}

impl DebugSeverity {
    /// Classify a messenger callback by its severity and type flags
    pub fn from_flags(
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    ) -> Self {
        if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            Self::Error
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
                Self::PerformanceWarning
            } else {
                Self::Warning
            }
        } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            Self::Info
        } else {
            Self::Debug
        }
    }

    /// Level used when forwarding the message to the `log` facade
    pub fn log_level(self) -> log::Level {
        match self {
            Self::Error => log::Level::Error,
            Self::Warning | Self::PerformanceWarning => log::Level::Warn,
            Self::Info => log::Level::Debug,
            Self::Debug => log::Level::Trace,
        }
    }
}

/// Debug messenger and the extension loader that created it
struct DebugMessenger {
    loader: DebugUtils,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &Instance) -> VulkanResult<Self> {
        let loader = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe {
            loader
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { loader, messenger })
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();
    let severity = DebugSeverity::from_flags(message_severity, message_type);

    log::log!(severity.log_level(), "[Vulkan] {:?} - {}", severity, message);

    vk::FALSE
}

/// Convert a fixed-size, nul-terminated Vulkan name into an owned string
pub(crate) fn vk_name_to_string(raw: &[c_char]) -> String {
    unsafe { CStr::from_ptr(raw.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug_messenger: Option<DebugMessenger>,
}

impl VulkanInstance {
    /// Create a new Vulkan instance, optionally with validation enabled
    pub fn new(
        app_name: &str,
        required_extensions: &[String],
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| VulkanError::Loading(e.to_string()))?;

        let available_layers = entry
            .enumerate_instance_layer_properties()
            .map_err(VulkanError::Api)?;
        log::debug!("Supported instance layers:");
        for layer in &available_layers {
            log::debug!(
                "  {} || {}",
                vk_name_to_string(&layer.layer_name),
                vk_name_to_string(&layer.description)
            );
        }

        let validation_available = available_layers.iter().any(|layer| {
            unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) }.to_bytes_with_nul()
                == VALIDATION_LAYER
        });
        let use_validation = enable_validation && validation_available;
        if enable_validation && !validation_available {
            log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
        }

        let app_name_cstr = CString::new(app_name)
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid application name: {e}")))?;
        let engine_name_cstr = CString::new("CubeEngine")
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| VulkanError::InitializationFailed(format!("Invalid extension name: {e}")))?;

        let mut extensions: Vec<*const c_char> =
            extension_names.iter().map(|ext| ext.as_ptr()).collect();
        let mut layers: Vec<*const c_char> = Vec::new();
        if use_validation {
            extensions.push(DebugUtils::name().as_ptr());
            layers.push(VALIDATION_LAYER.as_ptr().cast::<c_char>());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        let debug_messenger = if use_validation {
            match DebugMessenger::new(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!(
            "Created Vulkan instance ({} extensions, validation {})",
            extensions.len(),
            if use_validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            debug_messenger,
        })
    }

    /// Vulkan entry point
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Vulkan instance
    pub fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        // The messenger is a child of the instance
        self.debug_messenger.take();
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}

/// Index of the first queue family whose flags include graphics support
pub fn select_graphics_queue_family(families: &[vk::QueueFamilyProperties]) -> Option<u32> {
    families
        .iter()
        .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .and_then(|index| u32::try_from(index).ok())
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory-type table used for allocations
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Available queue families
    pub queue_families: Vec<vk::QueueFamilyProperties>,
    /// Index of the graphics queue family
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    /// Select the first enumerated physical device
    ///
    /// No scoring is done: whichever device the loader reports first is used.
    pub fn select_first(instance: &Instance) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::Api)?
        };
        let device = *devices.first().ok_or(VulkanError::NoPhysicalDevice)?;

        let properties = unsafe { instance.get_physical_device_properties(device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        let graphics_family =
            select_graphics_queue_family(&queue_families).ok_or(VulkanError::NoGraphicsQueueFamily)?;

        log::info!(
            "Selected GPU: {} (graphics queue family {})",
            vk_name_to_string(&properties.device_name),
            graphics_family
        );

        Ok(Self {
            device,
            properties,
            memory_properties,
            queue_families,
            graphics_family,
        })
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    /// Vulkan logical device handle
    pub device: Device,
    /// Graphics operations queue
    pub graphics_queue: vk::Queue,
    /// Index of the graphics queue family
    pub graphics_family: u32,
}

impl LogicalDevice {
    /// Create a logical device with a single graphics queue
    pub fn new(instance: &Instance, physical_device_info: &PhysicalDeviceInfo) -> VulkanResult<Self> {
        let queue_priorities = [1.0_f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device_info.graphics_family)
            .queue_priorities(&queue_priorities)
            .build()];

        let required_extensions = [SwapchainLoader::name().as_ptr()];

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&required_extensions);

        let device = unsafe {
            instance
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(VulkanError::Api)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(physical_device_info.graphics_family, 0) };

        Ok(Self {
            device,
            graphics_queue,
            graphics_family: physical_device_info.graphics_family,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

/// Device context: instance, physical device, logical device and queue
pub struct VulkanContext {
    // Field order is drop order: device before instance.
    device: LogicalDevice,
    physical_device: PhysicalDeviceInfo,
    instance: VulkanInstance,
}

impl VulkanContext {
    /// Create the instance, pick a device and open its graphics queue
    pub fn new(
        app_name: &str,
        required_instance_extensions: &[String],
        enable_validation: bool,
    ) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(app_name, required_instance_extensions, enable_validation)?;
        let physical_device = PhysicalDeviceInfo::select_first(instance.instance())?;
        let device = LogicalDevice::new(instance.instance(), &physical_device)?;

        Ok(Self {
            device,
            physical_device,
            instance,
        })
    }

    /// Get a reference to the Vulkan entry
    pub fn entry(&self) -> &Entry {
        self.instance.entry()
    }

    /// Get a reference to the Vulkan instance
    pub fn instance(&self) -> &Instance {
        self.instance.instance()
    }

    /// Get the physical device info
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }

    /// Get the logical device
    pub fn device(&self) -> &Device {
        &self.device.device
    }

    /// Get the graphics queue
    pub fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Get the graphics queue family index
    pub fn graphics_family(&self) -> u32 {
        self.device.graphics_family
    }

    /// Memory-type table of the selected device
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical_device.memory_properties
    }

    /// Block until every queue of the device is idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_graphics_family_is_first_match() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(select_graphics_queue_family(&families), Some(2));
    }

    #[test]
    fn test_no_graphics_family() {
        let families = [family(vk::QueueFlags::TRANSFER), family(vk::QueueFlags::COMPUTE)];
        assert_eq!(select_graphics_queue_family(&families), None);
        assert_eq!(select_graphics_queue_family(&[]), None);
    }

    #[test]
    fn test_debug_severity_classification() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as Sev;
        use vk::DebugUtilsMessageTypeFlagsEXT as Ty;

        assert_eq!(DebugSeverity::from_flags(Sev::ERROR, Ty::VALIDATION), DebugSeverity::Error);
        assert_eq!(DebugSeverity::from_flags(Sev::WARNING, Ty::VALIDATION), DebugSeverity::Warning);
        assert_eq!(
            DebugSeverity::from_flags(Sev::WARNING, Ty::PERFORMANCE),
            DebugSeverity::PerformanceWarning
        );
        assert_eq!(DebugSeverity::from_flags(Sev::INFO, Ty::GENERAL), DebugSeverity::Info);
        assert_eq!(DebugSeverity::from_flags(Sev::VERBOSE, Ty::GENERAL), DebugSeverity::Debug);
    }

    #[test]
    fn test_error_severity_logs_as_error() {
        assert_eq!(DebugSeverity::Error.log_level(), log::Level::Error);
        assert_eq!(DebugSeverity::PerformanceWarning.log_level(), log::Level::Warn);
    }

    #[test]
    fn test_vk_name_to_string_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"layer\0junk") {
            *dst = *src as c_char;
        }
        assert_eq!(vk_name_to_string(&raw), "layer");
    }
}
