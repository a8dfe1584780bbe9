//! GLSL to SPIR-V compilation
//!
//! Shaders are compiled at startup by invoking `glslc` from the Vulkan SDK.
//! Configured `.spv` files are loaded as-is; other configured files are read
//! and compiled; without configuration the embedded sources are compiled.

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;

/// Embedded vertex shader for the solid-color cube
pub const CUBE_VERT: &str = include_str!("shaders/cube.vert");
/// Embedded fragment shader for the solid-color cube
pub const CUBE_FRAG: &str = include_str!("shaders/cube.frag");
/// Embedded vertex shader for the textured cube
pub const CUBE_TEX_VERT: &str = include_str!("shaders/cube_tex.vert");
/// Embedded fragment shader for the textured cube
pub const CUBE_TEX_FRAG: &str = include_str!("shaders/cube_tex.frag");

/// Pipeline stage a shader is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex stage
    Vertex,
    /// Fragment stage
    Fragment,
}

impl ShaderStage {
    /// Stage name as understood by `glslc -fshader-stage`
    pub fn glslc_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// Embedded GLSL source for a stage
pub fn embedded_source(stage: ShaderStage, texture_mode: bool) -> &'static str {
    match (stage, texture_mode) {
        (ShaderStage::Vertex, false) => CUBE_VERT,
        (ShaderStage::Fragment, false) => CUBE_FRAG,
        (ShaderStage::Vertex, true) => CUBE_TEX_VERT,
        (ShaderStage::Fragment, true) => CUBE_TEX_FRAG,
    }
}

/// Shader compilation errors
#[derive(Error, Debug)]
pub enum ShaderCompileError {
    /// Source or binary file could not be read
    #[error("Failed to read shader file {path}: {source}")]
    Io {
        /// Offending file
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The compiler process could not be run
    #[error("Failed to run shader compiler {compiler}: {source}")]
    Spawn {
        /// Compiler executable
        compiler: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The compiler rejected the source
    #[error("{stage:?} shader failed to compile: {log}")]
    Rejected {
        /// Stage being compiled
        stage: ShaderStage,
        /// Compiler diagnostics
        log: String,
    },

    /// Output was not a valid SPIR-V word stream
    #[error("Invalid SPIR-V: {0}")]
    InvalidSpirv(String),
}

/// Turns GLSL source into SPIR-V words
pub trait ShaderCompiler {
    /// Compile `source` for `stage`
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>, ShaderCompileError>;
}

/// Parse a SPIR-V byte stream into words
pub fn spirv_words(bytes: &[u8]) -> Result<Vec<u32>, ShaderCompileError> {
    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| ShaderCompileError::InvalidSpirv(e.to_string()))
}

/// Compiler backed by the `glslc` executable
#[derive(Debug, Clone)]
pub struct GlslcCompiler {
    executable: PathBuf,
}

impl GlslcCompiler {
    /// Use an explicit `glslc` executable
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Locate `glslc`: explicit path, then `$VULKAN_SDK`, then `PATH`
    pub fn locate(configured: Option<&Path>) -> Self {
        if let Some(path) = configured {
            return Self::new(path);
        }

        if let Ok(sdk) = std::env::var("VULKAN_SDK") {
            let candidate = if cfg!(target_os = "windows") {
                Path::new(&sdk).join("Bin").join("glslc.exe")
            } else {
                Path::new(&sdk).join("bin").join("glslc")
            };
            if candidate.exists() {
                return Self::new(candidate);
            }
            log::warn!("glslc not found at {}, falling back to PATH", candidate.display());
        }

        Self::new("glslc")
    }

    /// Executable that will be invoked
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    fn spawn_error(&self, source: std::io::Error) -> ShaderCompileError {
        ShaderCompileError::Spawn {
            compiler: self.executable.clone(),
            source,
        }
    }
}

impl ShaderCompiler for GlslcCompiler {
    fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>, ShaderCompileError> {
        let mut child = Command::new(&self.executable)
            .arg(format!("-fshader-stage={}", stage.glslc_name()))
            .arg("-")
            .arg("-o")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        // glslc reads all of stdin before it writes anything
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| self.spawn_error(e))?;
        }

        let output = child.wait_with_output().map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            return Err(ShaderCompileError::Rejected {
                stage,
                log: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let words = spirv_words(&output.stdout)?;
        log::debug!("Compiled {:?} shader to {} SPIR-V words", stage, words.len());
        Ok(words)
    }
}

/// Produce SPIR-V for a stage from an optional configured file
///
/// `.spv` files are loaded directly; anything else is treated as GLSL.
pub fn load_stage(
    compiler: &dyn ShaderCompiler,
    stage: ShaderStage,
    configured: Option<&Path>,
    fallback_source: &str,
) -> Result<Vec<u32>, ShaderCompileError> {
    let Some(path) = configured else {
        return compiler.compile(stage, fallback_source);
    };

    let read_error = |source| ShaderCompileError::Io {
        path: path.to_path_buf(),
        source,
    };

    if path.extension().is_some_and(|ext| ext == "spv") {
        let bytes = std::fs::read(path).map_err(read_error)?;
        log::debug!("Loaded precompiled {:?} shader {}", stage, path.display());
        spirv_words(&bytes)
    } else {
        let source = std::fs::read_to_string(path).map_err(read_error)?;
        compiler.compile(stage, &source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    /// Records requests and returns a fixed word stream
    struct RecordingCompiler {
        calls: RefCell<Vec<(ShaderStage, String)>>,
    }

    impl ShaderCompiler for RecordingCompiler {
        fn compile(&self, stage: ShaderStage, source: &str) -> Result<Vec<u32>, ShaderCompileError> {
            self.calls.borrow_mut().push((stage, source.to_string()));
            Ok(vec![SPIRV_MAGIC, 0x0001_0000])
        }
    }

    fn recording() -> RecordingCompiler {
        RecordingCompiler {
            calls: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_embedded_sources_match_vertex_layouts() {
        assert!(embedded_source(ShaderStage::Vertex, false).contains("in vec4 in_color"));
        assert!(embedded_source(ShaderStage::Vertex, true).contains("in vec2 in_uv"));
        for texture_mode in [false, true] {
            let vertex = embedded_source(ShaderStage::Vertex, texture_mode);
            assert!(vertex.contains("binding = 0"));
            assert!(vertex.contains("mat4 mvp"));
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ShaderStage::Vertex.glslc_name(), "vertex");
        assert_eq!(ShaderStage::Fragment.glslc_name(), "fragment");
    }

    #[test]
    fn test_unconfigured_stage_compiles_fallback() {
        let compiler = recording();
        let words = load_stage(&compiler, ShaderStage::Vertex, None, CUBE_VERT).unwrap();

        assert_eq!(words[0], SPIRV_MAGIC);
        let calls = compiler.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, ShaderStage::Vertex);
        assert_eq!(calls[0].1, CUBE_VERT);
    }

    #[test]
    fn test_spv_file_bypasses_compiler() {
        let path = std::env::temp_dir().join(format!("cube_engine_test_{}.spv", std::process::id()));
        let words = [SPIRV_MAGIC, 0x0001_0000, 0, 1, 0];
        std::fs::write(&path, bytemuck::cast_slice::<u32, u8>(&words)).unwrap();

        let compiler = recording();
        let loaded = load_stage(&compiler, ShaderStage::Fragment, Some(&path), CUBE_FRAG).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, words);
        assert!(compiler.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_file_reports_path() {
        let path = Path::new("/nonexistent/cube.vert");
        let result = load_stage(&recording(), ShaderStage::Vertex, Some(path), CUBE_VERT);
        match result {
            Err(ShaderCompileError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected Io error, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_spirv_rejected() {
        assert!(matches!(
            spirv_words(&[0x03, 0x02, 0x23]),
            Err(ShaderCompileError::InvalidSpirv(_))
        ));
    }

    #[test]
    fn test_missing_compiler_is_spawn_error() {
        let compiler = GlslcCompiler::new("/nonexistent/glslc");
        assert!(matches!(
            compiler.compile(ShaderStage::Vertex, CUBE_VERT),
            Err(ShaderCompileError::Spawn { .. })
        ));
    }

    #[test]
    fn test_explicit_compiler_path_wins() {
        let compiler = GlslcCompiler::locate(Some(Path::new("/opt/sdk/glslc")));
        assert_eq!(compiler.executable(), Path::new("/opt/sdk/glslc"));
    }
}
