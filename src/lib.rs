// SPDX-License-Identifier: GPL-3.0-only

//! Image Filters - chains of GPU compute kernels over still images and live streams
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`gpu`]: the shared device context and dispatch-relevant device caps
//! - [`shaders`]: the WGSL kernel library, discovery and dispatch helpers
//! - [`filters`]: kernel registry, filter chain and chain executor
//! - [`resources`]: textures, ping-pong pairs, command units and readback
//! - [`pipelines`]: the still-image and live-stream pipelines
//! - [`backends`]: capture sources that feed the live stream
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let ctx = GpuContext::new_blocking("filters", GpuPreference::default())?;
//! let registry = KernelRegistry::load_available_kernels(
//!     &ctx,
//!     &ShaderLibrary::builtin(),
//!     "fx_",
//!     &KernelOptions::default(),
//! )?;
//! let mut chain = registry.selection();
//! chain.set_enabled("fx_invert", true);
//! let output = StillImagePipeline::new(ctx).apply(&chain, &image::open("in.png")?);
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filters;
pub mod gpu;
pub mod pipelines;
pub mod resources;
pub mod shaders;

// Re-export commonly used types
pub use config::{Config, GpuPreference};
pub use errors::{AppError, AppResult, InitializationError, ResourceError};
pub use filters::{FilterChain, KernelOptions, KernelRegistry};
pub use gpu::GpuContext;
pub use pipelines::{StillImagePipeline, StreamPipeline, StreamState};
pub use shaders::ShaderLibrary;
