//! Configuration system
//!
//! Any serde type with a default can be loaded from or saved to TOML or RON,
//! chosen by file extension. [`HarnessConfig`] collects every tunable of the
//! cube harness; missing fields take their defaults.

pub use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;

        if path.ends_with(".toml") {
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else if path.ends_with(".ron") {
            ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
        } else {
            Err(ConfigError::UnsupportedFormat(path.to_string()))
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let contents = if path.ends_with(".toml") {
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else if path.ends_with(".ron") {
            ron::ser::to_string_pretty(self, Default::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?
        } else {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Width in screen coordinates
    pub width: u32,
    /// Height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Cube".to_string(),
            width: 500,
            height: 500,
        }
    }
}

/// Shader overrides; unset stages use the embedded GLSL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// GLSL or `.spv` file for the vertex stage
    pub vertex_path: Option<PathBuf>,
    /// GLSL or `.spv` file for the fragment stage
    pub fragment_path: Option<PathBuf>,
    /// Explicit `glslc` executable
    pub glslc_path: Option<PathBuf>,
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Application name reported to the driver
    pub application_name: String,
    /// Validation layer and debug messenger; `None` enables them in debug builds
    pub enable_validation: Option<bool>,
    /// Swapchain image count to ask for before clamping
    pub requested_image_count: u32,
    /// Depth attachment and depth testing
    pub depth_enabled: bool,
    /// Position + UV vertices and the sampler binding instead of colors
    pub texture_mode: bool,
    /// RGBA clear color
    pub clear_color: [f32; 4],
    /// Shader overrides
    pub shaders: ShaderConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Vulkan Cube".to_string(),
            enable_validation: None,
            requested_image_count: 2,
            depth_enabled: true,
            texture_mode: false,
            clear_color: [0.2, 0.2, 0.2, 0.2],
            shaders: ShaderConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Whether validation is on after resolving the build-type default
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

/// Frame loop timing and budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameLoopConfig {
    /// Stop after this many frames; `None` runs until the window closes
    pub max_frames: Option<u64>,
    /// Bound of each submission fence wait; timeouts are re-waited
    pub fence_timeout_ns: u64,
    /// Bound of each acquire call; `None` waits without limit
    pub acquire_timeout_ns: Option<u64>,
}

impl Default for FrameLoopConfig {
    fn default() -> Self {
        Self {
            max_frames: None,
            fence_timeout_ns: 100_000_000,
            acquire_timeout_ns: None,
        }
    }
}

impl FrameLoopConfig {
    /// Acquire timeout in nanoseconds as passed to the driver
    pub fn acquire_timeout(&self) -> u64 {
        self.acquire_timeout_ns.unwrap_or(u64::MAX)
    }
}

/// Complete harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
    /// Frame loop settings
    pub frame_loop: FrameLoopConfig,
    /// `log` level filter name (`off`, `error`, ... `trace`)
    pub log_level: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            renderer: RendererConfig::default(),
            frame_loop: FrameLoopConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Config for HarnessConfig {}

impl HarnessConfig {
    /// Set the window size
    pub fn with_window_size(mut self, width: u32, height: u32) -> Self {
        self.window.width = width;
        self.window.height = height;
        self
    }

    /// Set the window title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Force validation on or off
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.renderer.enable_validation = Some(enabled);
        self
    }

    /// Toggle texture mode
    pub fn with_texture_mode(mut self, enabled: bool) -> Self {
        self.renderer.texture_mode = enabled;
        self
    }

    /// Toggle the depth attachment
    pub fn with_depth(mut self, enabled: bool) -> Self {
        self.renderer.depth_enabled = enabled;
        self
    }

    /// Limit the number of frames rendered
    pub fn with_max_frames(mut self, frames: u64) -> Self {
        self.frame_loop.max_frames = Some(frames);
        self
    }

    /// Parsed log level
    pub fn log_level_filter(&self) -> Result<log::LevelFilter, ConfigError> {
        log::LevelFilter::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", self.log_level)))
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size {}x{} must be non-zero",
                self.window.width, self.window.height
            )));
        }
        if self.renderer.requested_image_count == 0 {
            return Err(ConfigError::Invalid(
                "requested_image_count must be at least 1".to_string(),
            ));
        }
        if self.frame_loop.fence_timeout_ns == 0 {
            return Err(ConfigError::Invalid(
                "fence_timeout_ns must be non-zero".to_string(),
            ));
        }
        if self
            .renderer
            .clear_color
            .iter()
            .any(|c| !(0.0..=1.0).contains(c))
        {
            return Err(ConfigError::Invalid(
                "clear_color components must be within [0, 1]".to_string(),
            ));
        }
        self.log_level_filter().map(|_| ())
    }
}
