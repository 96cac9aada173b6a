// SPDX-License-Identifier: GPL-3.0-only

//! Kernel registry
//!
//! Discovers the prefixed compute entry points of a shader library, checks each
//! against the two-texture interface, and builds a compute pipeline for it.
//! Loading is all-or-nothing: one kernel that cannot be built fails the load,
//! so the filter list never shows a kernel that cannot run.

use super::chain::FilterChain;
use crate::constants::kernels::{
    INPUT_BINDING, MIN_POSTERIZE_LEVELS, OUTPUT_BINDING, PARAMS_BINDING, PARAMS_GROUP, POSTERIZE,
    TEXTURE_GROUP,
};
use crate::errors::InitializationError;
use crate::gpu::{GpuContext, WorkgroupSize, wgpu};
use crate::resources::CANONICAL_FORMAT;
use crate::shaders::{CompiledLibrary, ShaderLibrary, discover_kernel_names, naga_storage_format};
use std::num::NonZeroU64;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uniform layout shared by every parameterised kernel
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct ParamsUniform {
    value: f32,
    _pad: [f32; 3],
}

const PARAMS_SIZE: u64 = std::mem::size_of::<ParamsUniform>() as u64;

/// Non-texture inputs of a kernel, fixed at load time
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelParams {
    Posterize { levels: f32 },
}

impl KernelParams {
    fn uniform(&self) -> ParamsUniform {
        match *self {
            KernelParams::Posterize { levels } => ParamsUniform {
                value: levels,
                _pad: [0.0; 3],
            },
        }
    }
}

impl std::fmt::Display for KernelParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelParams::Posterize { levels } => write!(f, "levels={}", levels),
        }
    }
}

/// Load-time values for parameterised kernels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelOptions {
    pub posterize_levels: f32,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            posterize_levels: crate::constants::kernels::DEFAULT_POSTERIZE_LEVELS,
        }
    }
}

/// The fixed kernel name to parameter mapping
pub fn param_binder_for(name: &str, options: &KernelOptions) -> Option<KernelParams> {
    match name {
        POSTERIZE => Some(KernelParams::Posterize {
            levels: options.posterize_levels.max(MIN_POSTERIZE_LEVELS),
        }),
        _ => None,
    }
}

/// Binds a kernel's parameters into an open compute pass
pub struct ParamBinder {
    params: KernelParams,
    bind_group: wgpu::BindGroup,
    _buffer: wgpu::Buffer,
}

impl ParamBinder {
    fn new(ctx: &GpuContext, layout: &wgpu::BindGroupLayout, params: KernelParams) -> Self {
        let device = ctx.device();
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("kernel_params"),
            size: PARAMS_SIZE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue()
            .write_buffer(&buffer, 0, bytemuck::bytes_of(&params.uniform()));

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("kernel_params_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: PARAMS_BINDING,
                resource: buffer.as_entire_binding(),
            }],
        });

        Self {
            params,
            bind_group,
            _buffer: buffer,
        }
    }

    pub fn params(&self) -> KernelParams {
        self.params
    }

    pub fn bind(&self, pass: &mut wgpu::ComputePass<'_>) {
        pass.set_bind_group(PARAMS_GROUP, Some(&self.bind_group), &[]);
    }
}

/// A kernel ready to dispatch
pub struct KernelDescriptor {
    name: String,
    pipeline: wgpu::ComputePipeline,
    texture_layout: Arc<wgpu::BindGroupLayout>,
    binder: Option<ParamBinder>,
    workgroup: WorkgroupSize,
    format: wgpu::TextureFormat,
}

impl KernelDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pipeline(&self) -> &wgpu::ComputePipeline {
        &self.pipeline
    }

    /// Layout of the group-0 input/output texture bind group
    pub fn texture_layout(&self) -> &wgpu::BindGroupLayout {
        &self.texture_layout
    }

    pub fn binder(&self) -> Option<&ParamBinder> {
        self.binder.as_ref()
    }

    /// Thread-group size declared by the kernel
    pub fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }

    /// Storage format the kernel writes
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }
}

impl std::fmt::Debug for KernelDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelDescriptor")
            .field("name", &self.name)
            .field("workgroup", &self.workgroup)
            .field("format", &self.format)
            .field("params", &self.binder.as_ref().map(ParamBinder::params))
            .finish()
    }
}

/// What reflection found out about a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInterface {
    pub workgroup: WorkgroupSize,
    pub uses_params: bool,
}

/// Check a kernel's entry point against the two-texture interface.
///
/// Every global the kernel touches must be the input texture, the output
/// storage texture in `format`, or (only with `has_params`) the parameter
/// uniform. The output must be written by the kernel.
pub fn check_kernel_interface(
    ir: &naga::Module,
    info: &naga::valid::ModuleInfo,
    name: &str,
    format: wgpu::TextureFormat,
    has_params: bool,
    max_threads: u32,
) -> Result<KernelInterface, InitializationError> {
    let fail = |reason: String| InitializationError::KernelBuild {
        name: name.to_string(),
        reason,
    };

    let (index, entry) = ir
        .entry_points
        .iter()
        .enumerate()
        .find(|(_, ep)| ep.name == name)
        .ok_or_else(|| InitializationError::KernelNotFound(name.to_string()))?;

    if entry.stage != naga::ShaderStage::Compute {
        return Err(fail("entry point is not a compute shader".into()));
    }

    let [x, y, z] = entry.workgroup_size;
    if z != 1 {
        return Err(fail(format!("workgroup depth must be 1, found {}", z)));
    }
    if x * y > max_threads {
        return Err(fail(format!(
            "workgroup {}x{} exceeds {} invocations",
            x, y, max_threads
        )));
    }

    let expected_storage = naga_storage_format(format)
        .ok_or_else(|| fail(format!("{:?} is not a kernel output format", format)))?;

    let usage = info.get_entry_point(index);
    let mut writes_output = false;
    let mut uses_params = false;

    for (handle, global) in ir.global_variables.iter() {
        if usage[handle].is_empty() {
            continue;
        }
        let label = global.name.as_deref().unwrap_or("<unnamed>");
        let Some(binding) = &global.binding else {
            return Err(fail(format!("uses unbound global {}", label)));
        };
        let inner = &ir.types[global.ty].inner;

        match (binding.group, binding.binding) {
            (TEXTURE_GROUP, INPUT_BINDING) => {
                if !matches!(
                    inner,
                    naga::TypeInner::Image {
                        dim: naga::ImageDimension::D2,
                        arrayed: false,
                        class: naga::ImageClass::Sampled { .. },
                    }
                ) {
                    return Err(fail(format!("{} must be a texture_2d<f32>", label)));
                }
            }
            (TEXTURE_GROUP, OUTPUT_BINDING) => match inner {
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class: naga::ImageClass::Storage { format, .. },
                } if *format == expected_storage => writes_output = true,
                _ => {
                    return Err(fail(format!(
                        "{} must be a {:?} storage texture",
                        label, expected_storage
                    )));
                }
            },
            (PARAMS_GROUP, PARAMS_BINDING) if has_params => {
                if global.space != naga::AddressSpace::Uniform {
                    return Err(fail(format!("{} must be a uniform", label)));
                }
                uses_params = true;
            }
            (PARAMS_GROUP, PARAMS_BINDING) => {
                return Err(fail(format!(
                    "{} reads parameters but no parameters are defined for it",
                    label
                )));
            }
            (group, binding) => {
                return Err(fail(format!(
                    "unexpected resource {} at group {} binding {}",
                    label, group, binding
                )));
            }
        }
    }

    if !writes_output {
        return Err(fail("never writes the output texture".into()));
    }

    Ok(KernelInterface {
        workgroup: WorkgroupSize::new(x, y),
        uses_params,
    })
}

/// Bind group layouts shared by every kernel of one registry
struct KernelLayouts {
    textures: Arc<wgpu::BindGroupLayout>,
    params: wgpu::BindGroupLayout,
}

impl KernelLayouts {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let textures = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel_textures_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: INPUT_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: OUTPUT_BINDING,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let params = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("kernel_params_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: PARAMS_BINDING,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(PARAMS_SIZE),
                },
                count: None,
            }],
        });

        Self {
            textures: Arc::new(textures),
            params,
        }
    }
}

/// Immutable set of built kernels, in discovery order
pub struct KernelRegistry {
    kernels: Vec<Arc<KernelDescriptor>>,
    format: wgpu::TextureFormat,
}

impl KernelRegistry {
    /// Build every kernel whose name starts with `prefix`, for still images.
    ///
    /// Kernels are sorted by name. Fails as a whole if any kernel fails.
    pub fn load_available_kernels(
        ctx: &GpuContext,
        library: &ShaderLibrary,
        prefix: &str,
        options: &KernelOptions,
    ) -> Result<Self, InitializationError> {
        let names = discover_kernel_names(&library.function_names()?, prefix);
        info!(library = library.label(), prefix, count = names.len(), "Discovered kernels");
        Self::load_named(ctx, library, &names, CANONICAL_FORMAT, options)
    }

    /// Build an explicit list of kernels writing `format`
    pub fn load_named<S: AsRef<str>>(
        ctx: &GpuContext,
        library: &ShaderLibrary,
        names: &[S],
        format: wgpu::TextureFormat,
        options: &KernelOptions,
    ) -> Result<Self, InitializationError> {
        let compiled = library.compile(ctx, format, ctx.caps().preferred_workgroup())?;
        let layouts = KernelLayouts::new(ctx.device(), format);

        let kernels = names
            .iter()
            .map(|name| build_kernel(ctx, &compiled, &layouts, name.as_ref(), options).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()
            .inspect_err(|e| warn!(library = library.label(), error = %e, "Kernel registry load failed"))?;

        info!(
            library = library.label(),
            ?format,
            kernels = ?kernels.iter().map(|k| k.name()).collect::<Vec<_>>(),
            "Kernel registry loaded"
        );

        Ok(Self { kernels, format })
    }

    /// Kernels in discovery order
    pub fn kernels(&self) -> &[Arc<KernelDescriptor>] {
        &self.kernels
    }

    pub fn get(&self, name: &str) -> Option<&Arc<KernelDescriptor>> {
        self.kernels.iter().find(|k| k.name() == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.kernels.iter().map(|k| k.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    /// Output format of every kernel in the registry
    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// One entry per kernel, all disabled
    pub fn selection(&self) -> FilterChain {
        FilterChain::from_kernels(self.kernels.iter().cloned())
    }
}

fn build_kernel(
    ctx: &GpuContext,
    compiled: &CompiledLibrary,
    layouts: &KernelLayouts,
    name: &str,
    options: &KernelOptions,
) -> Result<KernelDescriptor, InitializationError> {
    let params = param_binder_for(name, options);
    let interface = check_kernel_interface(
        &compiled.ir,
        &compiled.info,
        name,
        compiled.format,
        params.is_some(),
        ctx.caps().max_threads_per_group,
    )?;

    let device = ctx.device();
    let pipeline_layout = if interface.uses_params {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&*layouts.textures, &layouts.params],
            push_constant_ranges: &[],
        })
    } else {
        device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(name),
            bind_group_layouts: &[&*layouts.textures],
            push_constant_ranges: &[],
        })
    };

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(name),
        layout: Some(&pipeline_layout),
        module: &compiled.module,
        entry_point: Some(name),
        compilation_options: Default::default(),
        cache: None,
    });

    // Parameters a kernel declares a mapping for but never reads are not bound
    let binder = params
        .filter(|_| interface.uses_params)
        .map(|p| ParamBinder::new(ctx, &layouts.params, p));

    debug!(
        kernel = name,
        workgroup = ?interface.workgroup,
        params = ?binder.as_ref().map(ParamBinder::params),
        "Built kernel"
    );

    Ok(KernelDescriptor {
        name: name.to_string(),
        pipeline,
        texture_layout: Arc::clone(&layouts.textures),
        binder,
        workgroup: interface.workgroup,
        format: compiled.format,
    })
}
