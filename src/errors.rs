// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the filter pipelines
//!
//! Failures fall into two classes:
//!
//! - [`InitializationError`]: the device, shader library or a kernel could not be
//!   set up. Fatal to the subsystem that hit it and reported once.
//! - [`ResourceError`]: a texture, buffer or image conversion failed. Fatal to a
//!   single unit of work (one image or one frame).
//!
//! Transient unavailability in the live stream (no drawable, cache miss) is not an
//! error at all; see [`crate::pipelines::stream::FrameOutcome`].

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Top-level error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Device, shader library or kernel setup failed
    Initialization(InitializationError),
    /// A single unit of work failed
    Resource(ResourceError),
    /// Configuration could not be read or is invalid
    Config(ConfigError),
    /// Generic error with message
    Other(String),
}

/// Device, shader library and kernel setup errors
#[derive(Debug, Clone, PartialEq)]
pub enum InitializationError {
    /// No suitable GPU adapter
    NoAdapter(String),
    /// The adapter refused to create a device
    DeviceRequest(String),
    /// A device feature needed by a pipeline is not available
    MissingFeature(&'static str),
    /// The shader library failed to parse or validate
    ShaderLibrary(String),
    /// A kernel requested by name is not part of the shader library
    KernelNotFound(String),
    /// A kernel exists but cannot be turned into a compute pipeline
    KernelBuild { name: String, reason: String },
    /// The capture source could not be opened
    Capture(String),
}

/// Errors scoped to a single image or frame
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceError {
    /// Texture extent is zero or exceeds the device limit
    InvalidSize { width: u32, height: u32, max: u32 },
    /// Two textures that must share a format do not
    FormatMismatch {
        expected: String,
        found: String,
    },
    /// Two textures that must share an extent do not
    ExtentMismatch {
        expected: (u32, u32),
        found: (u32, u32),
    },
    /// A texture format the pool cannot convert to or from images
    UnsupportedFormat(String),
    /// Image decoding or encoding failed
    Image(String),
    /// Mapping a readback buffer failed
    Readback(String),
    /// Waiting on the device failed
    DeviceWait(String),
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// Reading or writing the config file failed
    Io(String),
    /// The config file is not valid JSON for [`crate::config::Config`]
    Parse(String),
    /// A value is out of range
    Invalid(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Initialization(e) => write!(f, "Initialization error: {}", e),
            AppError::Resource(e) => write!(f, "Resource error: {}", e),
            AppError::Config(e) => write!(f, "Configuration error: {}", e),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for InitializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitializationError::NoAdapter(msg) => write!(f, "No suitable GPU adapter: {}", msg),
            InitializationError::DeviceRequest(msg) => {
                write!(f, "Failed to create GPU device: {}", msg)
            }
            InitializationError::MissingFeature(feature) => {
                write!(f, "GPU feature not available: {}", feature)
            }
            InitializationError::ShaderLibrary(msg) => write!(f, "Shader library: {}", msg),
            InitializationError::KernelNotFound(name) => write!(f, "Kernel not found: {}", name),
            InitializationError::KernelBuild { name, reason } => {
                write!(f, "Failed to build kernel {}: {}", name, reason)
            }
            InitializationError::Capture(msg) => write!(f, "Capture source: {}", msg),
        }
    }
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::InvalidSize { width, height, max } => {
                write!(f, "Invalid texture size {}x{} (max {})", width, height, max)
            }
            ResourceError::FormatMismatch { expected, found } => {
                write!(f, "Texture format mismatch: expected {}, found {}", expected, found)
            }
            ResourceError::ExtentMismatch { expected, found } => write!(
                f,
                "Texture extent mismatch: expected {}x{}, found {}x{}",
                expected.0, expected.1, found.0, found.1
            ),
            ResourceError::UnsupportedFormat(format) => {
                write!(f, "Unsupported texture format: {}", format)
            }
            ResourceError::Image(msg) => write!(f, "Image conversion failed: {}", msg),
            ResourceError::Readback(msg) => write!(f, "Readback failed: {}", msg),
            ResourceError::DeviceWait(msg) => write!(f, "Waiting for GPU failed: {}", msg),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "I/O error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse error: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for InitializationError {}
impl std::error::Error for ResourceError {}
impl std::error::Error for ConfigError {}

impl From<InitializationError> for AppError {
    fn from(err: InitializationError) -> Self {
        AppError::Initialization(err)
    }
}

impl From<ResourceError> for AppError {
    fn from(err: ResourceError) -> Self {
        AppError::Resource(err)
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<image::ImageError> for ResourceError {
    fn from(err: image::ImageError) -> Self {
        ResourceError::Image(err.to_string())
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}
