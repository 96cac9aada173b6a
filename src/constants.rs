// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

/// Kernel naming and parameters
pub mod kernels {
    /// Entry points starting with this prefix are listed as filters
    pub const DEFAULT_PREFIX: &str = "fx_";

    /// The one kernel the live stream runs
    pub const INVERT: &str = "fx_invert";

    /// Kernel that takes a `levels` parameter
    pub const POSTERIZE: &str = "fx_posterize";

    /// Default posterize level count
    pub const DEFAULT_POSTERIZE_LEVELS: f32 = 5.0;

    /// Fewer than two levels collapses every channel to a single value
    pub const MIN_POSTERIZE_LEVELS: f32 = 2.0;

    /// Bind group holding the two ping-pong textures
    pub const TEXTURE_GROUP: u32 = 0;

    /// Binding of the readable input texture
    pub const INPUT_BINDING: u32 = 0;

    /// Binding of the writable output texture
    pub const OUTPUT_BINDING: u32 = 1;

    /// Bind group holding kernel-specific uniform parameters
    pub const PARAMS_GROUP: u32 = 1;

    /// Binding of the parameter uniform inside [`PARAMS_GROUP`]
    pub const PARAMS_BINDING: u32 = 0;
}

/// GPU vendor identifiers and SIMD widths
///
/// wgpu does not report a per-pipeline execution width, so the preferred
/// thread-group width is looked up from the adapter's PCI vendor id.
pub mod gpu {
    pub const VENDOR_NVIDIA: u32 = 0x10DE;
    pub const VENDOR_AMD: u32 = 0x1002;
    pub const VENDOR_INTEL: u32 = 0x8086;
    pub const VENDOR_APPLE: u32 = 0x106B;

    /// Warp size
    pub const NVIDIA_EXECUTION_WIDTH: u32 = 32;
    /// Wave64 (GCN and RDNA in compute)
    pub const AMD_EXECUTION_WIDTH: u32 = 64;
    /// SIMD16 is the common compute dispatch width
    pub const INTEL_EXECUTION_WIDTH: u32 = 16;
    /// Apple GPU SIMD-group width
    pub const APPLE_EXECUTION_WIDTH: u32 = 32;
    /// Used for unknown vendors and software adapters
    pub const FALLBACK_EXECUTION_WIDTH: u32 = 32;

    /// Get the preferred execution width for a PCI vendor id
    pub fn execution_width_for_vendor(vendor: u32) -> u32 {
        match vendor {
            VENDOR_NVIDIA => NVIDIA_EXECUTION_WIDTH,
            VENDOR_AMD => AMD_EXECUTION_WIDTH,
            VENDOR_INTEL => INTEL_EXECUTION_WIDTH,
            VENDOR_APPLE => APPLE_EXECUTION_WIDTH,
            _ => FALLBACK_EXECUTION_WIDTH,
        }
    }
}

/// Live stream defaults
pub mod stream {
    use std::time::Duration;

    pub const DEFAULT_WIDTH: u32 = 1280;
    pub const DEFAULT_HEIGHT: u32 = 720;
    pub const DEFAULT_FRAMERATE: u32 = 30;

    /// Camera frames arrive as 32-bit packed BGRA
    pub const BYTES_PER_PIXEL: u32 = 4;

    /// Log stream statistics every this many frames
    pub const STATS_LOG_INTERVAL: u64 = 300;

    /// How long `stop()` waits for the capture thread before detaching it
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
}

/// Still image defaults
pub mod still {
    /// Default output file prefix for `apply` when no output path is given
    pub const OUTPUT_PREFIX: &str = "filtered";

    /// Default output extension
    pub const OUTPUT_EXTENSION: &str = "png";
}

/// Configuration file location
pub mod config {
    /// Directory name under the platform config dir
    pub const APP_DIR: &str = "image-filters";

    /// File name inside [`APP_DIR`]
    pub const FILE_NAME: &str = "config.json";
}
