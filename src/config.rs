// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{config as paths, kernels, stream};
use crate::errors::{ConfigError, InitializationError};
use crate::filters::KernelOptions;
use crate::shaders::ShaderLibrary;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Which adapter to prefer when several are present
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GpuPreference {
    /// Discrete GPU when available
    #[default]
    HighPerformance,
    /// Integrated GPU when available
    LowPower,
}

/// Live stream settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Capture framerate
    pub framerate: u32,
    /// Initial state of the invert toggle
    pub invert: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            width: stream::DEFAULT_WIDTH,
            height: stream::DEFAULT_HEIGHT,
            framerate: stream::DEFAULT_FRAMERATE,
            invert: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entry points starting with this prefix are listed as filters
    pub kernel_prefix: String,
    /// Level count bound to the posterize kernel at load time
    pub posterize_levels: f32,
    /// WGSL library to use instead of the built-in kernels
    pub shader_library: Option<PathBuf>,
    /// Adapter preference
    pub gpu_preference: GpuPreference,
    /// Live stream settings
    pub stream: StreamSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kernel_prefix: kernels::DEFAULT_PREFIX.to_string(),
            posterize_levels: kernels::DEFAULT_POSTERIZE_LEVELS,
            shader_library: None,
            gpu_preference: GpuPreference::default(),
            stream: StreamSettings::default(),
        }
    }
}

impl Config {
    /// Default location of the config file, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(paths::APP_DIR).join(paths::FILE_NAME))
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a config file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Load-time values for parameterised kernels
    pub fn kernel_options(&self) -> KernelOptions {
        KernelOptions {
            posterize_levels: self.posterize_levels,
        }
    }

    /// The configured WGSL library, or the built-in one
    pub fn load_shader_library(&self) -> Result<ShaderLibrary, InitializationError> {
        match &self.shader_library {
            Some(path) => ShaderLibrary::from_file(path),
            None => Ok(ShaderLibrary::builtin()),
        }
    }

    /// Reject values the pipelines cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kernel_prefix.is_empty() {
            return Err(ConfigError::Invalid("kernel_prefix must not be empty".into()));
        }
        if !self.posterize_levels.is_finite()
            || self.posterize_levels < kernels::MIN_POSTERIZE_LEVELS
        {
            return Err(ConfigError::Invalid(format!(
                "posterize_levels must be at least {}, got {}",
                kernels::MIN_POSTERIZE_LEVELS,
                self.posterize_levels
            )));
        }
        if self.stream.width == 0 || self.stream.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "stream size must be non-zero, got {}x{}",
                self.stream.width, self.stream.height
            )));
        }
        if self.stream.framerate == 0 {
            return Err(ConfigError::Invalid("stream framerate must be non-zero".into()));
        }
        Ok(())
    }
}
