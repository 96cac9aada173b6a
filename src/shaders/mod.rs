// SPDX-License-Identifier: GPL-3.0-only
//! Shader library: the WGSL source kernels are discovered in and compiled from.
//!
//! A library is plain WGSL whose `@compute` entry points are the kernels. It
//! does not define its own thread-group size or output texture type; those
//! come from a prelude generated per device and per pixel format, so the same
//! source serves both the RGBA still-image path and the BGRA stream path.

mod gpu_processor;

pub use gpu_processor::{
    CachedDimensions, compute_dispatch_size, dispatch_grid, read_buffer_async,
    read_buffer_blocking,
};

use crate::errors::InitializationError;
use crate::gpu::{GpuContext, WorkgroupSize, wgpu};
use std::path::Path;
use tracing::{debug, info};

/// Built-in kernels (WGSL)
/// Contains: fx_blur, fx_grayscale, fx_invert, fx_posterize, fx_sepia, copy_through
pub const BUILTIN_KERNELS: &str = include_str!("kernels.wgsl");

/// Group size used when only listing entry points; it has no effect on names
const LISTING_WORKGROUP: WorkgroupSize = WorkgroupSize::new(8, 8);

/// WGSL source of a kernel library
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    label: String,
    source: String,
}

/// A library compiled for one device, pixel format and thread-group size
pub struct CompiledLibrary {
    pub(crate) module: wgpu::ShaderModule,
    pub(crate) ir: naga::Module,
    pub(crate) info: naga::valid::ModuleInfo,
    pub(crate) format: wgpu::TextureFormat,
    pub(crate) workgroup: WorkgroupSize,
}

impl ShaderLibrary {
    /// The kernels shipped with the crate
    pub fn builtin() -> Self {
        Self::from_source("builtin", BUILTIN_KERNELS)
    }

    pub fn from_source(label: &str, source: &str) -> Self {
        Self {
            label: label.to_string(),
            source: source.to_string(),
        }
    }

    /// Read a WGSL library from disk
    pub fn from_file(path: &Path) -> Result<Self, InitializationError> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            InitializationError::ShaderLibrary(format!("{}: {}", path.display(), e))
        })?;
        info!(path = %path.display(), "Loaded shader library");
        Ok(Self::from_source(&path.display().to_string(), &source))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Names of all compute entry points, in declaration order
    pub fn function_names(&self) -> Result<Vec<String>, InitializationError> {
        let source = self.with_prelude(wgpu::TextureFormat::Rgba8Unorm, LISTING_WORKGROUP)?;
        let module = parse(&self.label, &source)?;
        Ok(module
            .entry_points
            .iter()
            .filter(|ep| ep.stage == naga::ShaderStage::Compute)
            .map(|ep| ep.name.clone())
            .collect())
    }

    /// Parse, validate and upload the library for a device.
    ///
    /// Validation happens in naga first so that a broken library is reported as
    /// an error here instead of through wgpu's uncaptured-error handler.
    pub fn compile(
        &self,
        ctx: &GpuContext,
        format: wgpu::TextureFormat,
        workgroup: WorkgroupSize,
    ) -> Result<CompiledLibrary, InitializationError> {
        let (source, ir, info) = self.reflect(format, workgroup)?;

        let module = ctx
            .device()
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&self.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        debug!(
            library = %self.label,
            ?format,
            ?workgroup,
            entry_points = ir.entry_points.len(),
            "Compiled shader library"
        );

        Ok(CompiledLibrary {
            module,
            ir,
            info,
            format,
            workgroup,
        })
    }

    /// Parse and validate without a device
    pub(crate) fn reflect(
        &self,
        format: wgpu::TextureFormat,
        workgroup: WorkgroupSize,
    ) -> Result<(String, naga::Module, naga::valid::ModuleInfo), InitializationError> {
        let source = self.with_prelude(format, workgroup)?;
        let ir = parse(&self.label, &source)?;
        let info = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&ir)
        .map_err(|e| {
            InitializationError::ShaderLibrary(format!(
                "{}: {}",
                self.label,
                e.emit_to_string(&source)
            ))
        })?;
        Ok((source, ir, info))
    }

    fn with_prelude(
        &self,
        format: wgpu::TextureFormat,
        workgroup: WorkgroupSize,
    ) -> Result<String, InitializationError> {
        let texel = storage_texel_name(format).ok_or_else(|| {
            InitializationError::ShaderLibrary(format!(
                "{:?} cannot be used as a kernel output format",
                format
            ))
        })?;
        Ok(format!(
            "const WG_X: u32 = {}u;\nconst WG_Y: u32 = {}u;\nalias OutputTexture = texture_storage_2d<{}, write>;\n{}",
            workgroup.width, workgroup.height, texel, self.source
        ))
    }
}

/// Filter entry point names by prefix and sort them ascending.
///
/// Sorting makes the filter list independent of declaration order, so the list
/// shown to users is reproducible across library edits.
pub fn discover_kernel_names<S: AsRef<str>>(names: &[S], prefix: &str) -> Vec<String> {
    let mut found: Vec<String> = names
        .iter()
        .map(AsRef::as_ref)
        .filter(|name| name.starts_with(prefix))
        .map(str::to_string)
        .collect();
    found.sort();
    found.dedup();
    found
}

/// WGSL texel format name for the storage formats kernels may write
pub fn storage_texel_name(format: wgpu::TextureFormat) -> Option<&'static str> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some("rgba8unorm"),
        wgpu::TextureFormat::Bgra8Unorm => Some("bgra8unorm"),
        _ => None,
    }
}

/// naga's view of the same storage formats
pub(crate) fn naga_storage_format(format: wgpu::TextureFormat) -> Option<naga::StorageFormat> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm => Some(naga::StorageFormat::Rgba8Unorm),
        wgpu::TextureFormat::Bgra8Unorm => Some(naga::StorageFormat::Bgra8Unorm),
        _ => None,
    }
}

fn parse(label: &str, source: &str) -> Result<naga::Module, InitializationError> {
    naga::front::wgsl::parse_str(source).map_err(|e| {
        InitializationError::ShaderLibrary(format!("{}: {}", label, e.emit_to_string(source)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_filters_and_sorts() {
        let names = ["fx_blur", "helper_fn", "fx_invert"];
        assert_eq!(discover_kernel_names(&names, "fx_"), vec!["fx_blur", "fx_invert"]);
    }

    #[test]
    fn test_discovery_orders_strictly_ascending() {
        let names = ["fx_sepia", "fx_blur", "fx_posterize", "fx_blur", "fx_invert"];
        let found = discover_kernel_names(&names, "fx_");
        assert!(found.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(found.len(), 4);
    }

    #[test]
    fn test_discovery_with_no_matches_is_empty() {
        let names = ["main", "copy_through"];
        assert!(discover_kernel_names(&names, "fx_").is_empty());
    }

    #[test]
    fn test_builtin_library_lists_compute_entry_points() {
        let names = ShaderLibrary::builtin().function_names().unwrap();
        assert!(names.contains(&"copy_through".to_string()));
        assert_eq!(
            discover_kernel_names(&names, "fx_"),
            vec!["fx_blur", "fx_grayscale", "fx_invert", "fx_posterize", "fx_sepia"]
        );
    }

    #[test]
    fn test_builtin_library_validates_for_both_formats() {
        let library = ShaderLibrary::builtin();
        for format in [
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureFormat::Bgra8Unorm,
        ] {
            let (_, module, _) = library.reflect(format, WorkgroupSize::new(32, 8)).unwrap();
            let invert = module
                .entry_points
                .iter()
                .find(|ep| ep.name == "fx_invert")
                .unwrap();
            assert_eq!(invert.workgroup_size, [32, 8, 1]);
        }
    }

    #[test]
    fn test_unsupported_output_format_is_rejected() {
        let err = ShaderLibrary::builtin()
            .with_prelude(wgpu::TextureFormat::R32Float, WorkgroupSize::new(8, 8))
            .unwrap_err();
        assert!(matches!(err, InitializationError::ShaderLibrary(_)));
    }

    #[test]
    fn test_broken_library_reports_shader_error() {
        let library = ShaderLibrary::from_source("broken", "@compute fn fx_oops( {");
        assert!(matches!(
            library.function_names(),
            Err(InitializationError::ShaderLibrary(_))
        ));
    }
}
