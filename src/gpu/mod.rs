// SPDX-License-Identifier: GPL-3.0-only

//! GPU device context shared by every pipeline.
//!
//! One [`GpuContext`] is created at startup and passed by `Arc` to the kernel
//! registry and both pipelines. Nothing in the crate reaches for a global device.

use crate::config::GpuPreference;
use crate::constants::gpu::execution_width_for_vendor;
use crate::errors::InitializationError;
use std::sync::Arc;
use tracing::{debug, info};

/// Re-export wgpu under its usual name
pub use wgpu_compute as wgpu;

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
    /// PCI vendor id
    pub vendor: u32,
    /// Whether compute kernels may write BGRA storage textures
    pub bgra_storage: bool,
}

/// Dispatch-relevant device limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Preferred thread-group width (SIMD width of the hardware)
    pub execution_width: u32,
    /// Maximum invocations in one workgroup
    pub max_threads_per_group: u32,
    /// Maximum workgroup size along x
    pub max_group_width: u32,
    /// Maximum workgroup size along y
    pub max_group_height: u32,
    /// Largest 2D texture extent
    pub max_texture_dimension: u32,
}

/// 2D thread-group size of a kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkgroupSize {
    pub width: u32,
    pub height: u32,
}

impl WorkgroupSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Invocations per group
    pub fn threads(&self) -> u32 {
        self.width * self.height
    }
}

impl DeviceCaps {
    /// Derive caps from adapter limits and the vendor's SIMD width
    pub fn from_limits(limits: &wgpu::Limits, vendor: u32) -> Self {
        Self {
            execution_width: execution_width_for_vendor(vendor),
            max_threads_per_group: limits.max_compute_invocations_per_workgroup,
            max_group_width: limits.max_compute_workgroup_size_x,
            max_group_height: limits.max_compute_workgroup_size_y,
            max_texture_dimension: limits.max_texture_dimension_2d,
        }
    }

    /// Thread-group size that fills one SIMD row per group row.
    ///
    /// Width is the execution width, height is as many rows as the
    /// per-group invocation limit allows. Both are at least 1.
    pub fn preferred_workgroup(&self) -> WorkgroupSize {
        let width = self
            .execution_width
            .min(self.max_group_width)
            .min(self.max_threads_per_group)
            .max(1);
        let height = (self.max_threads_per_group / width).clamp(1, self.max_group_height.max(1));
        WorkgroupSize { width, height }
    }
}

/// Long-lived device, queue and adapter handles
pub struct GpuContext {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    info: GpuDeviceInfo,
    caps: DeviceCaps,
}

impl std::fmt::Debug for GpuContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuContext")
            .field("info", &self.info)
            .field("caps", &self.caps)
            .finish()
    }
}

impl GpuContext {
    /// Create a device and queue for compute work.
    ///
    /// Requests `BGRA8UNORM_STORAGE` when the adapter offers it, since the
    /// stream pipeline writes camera-format textures from compute kernels.
    pub async fn new(
        label: &str,
        preference: GpuPreference,
    ) -> Result<Arc<Self>, InitializationError> {
        info!(label = label, "Creating GPU device for compute");

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let power_preference = match preference {
            GpuPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
            GpuPreference::LowPower => wgpu::PowerPreference::LowPower,
        };

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| InitializationError::NoAdapter(e.to_string()))?;

        let adapter_info = adapter.get_info();
        let adapter_limits = adapter.limits();
        let bgra_storage = adapter
            .features()
            .contains(wgpu::Features::BGRA8UNORM_STORAGE);

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            vendor = adapter_info.vendor,
            bgra_storage,
            "GPU adapter selected for compute"
        );

        let required_features = if bgra_storage {
            wgpu::Features::BGRA8UNORM_STORAGE
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(label),
                required_features,
                required_limits: adapter_limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| InitializationError::DeviceRequest(e.to_string()))?;

        let caps = DeviceCaps::from_limits(&adapter_limits, adapter_info.vendor);
        debug!(?caps, workgroup = ?caps.preferred_workgroup(), "Device capabilities");

        let info = GpuDeviceInfo {
            adapter_name: adapter_info.name.clone(),
            backend: adapter_info.backend,
            vendor: adapter_info.vendor,
            bgra_storage,
        };

        Ok(Arc::new(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            info,
            caps,
        }))
    }

    /// Blocking wrapper around [`GpuContext::new`]
    pub fn new_blocking(
        label: &str,
        preference: GpuPreference,
    ) -> Result<Arc<Self>, InitializationError> {
        pollster::block_on(Self::new(label, preference))
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    /// Instance the device was created from, needed to create surfaces
    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    pub fn caps(&self) -> &DeviceCaps {
        &self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::gpu::{VENDOR_AMD, VENDOR_INTEL, VENDOR_NVIDIA};

    fn caps(execution_width: u32, max_threads: u32, max_x: u32, max_y: u32) -> DeviceCaps {
        DeviceCaps {
            execution_width,
            max_threads_per_group: max_threads,
            max_group_width: max_x,
            max_group_height: max_y,
            max_texture_dimension: 8192,
        }
    }

    #[test]
    fn test_preferred_workgroup_fills_invocation_limit() {
        assert_eq!(
            caps(32, 256, 256, 256).preferred_workgroup(),
            WorkgroupSize::new(32, 8)
        );
        assert_eq!(
            caps(64, 1024, 1024, 1024).preferred_workgroup(),
            WorkgroupSize::new(64, 16)
        );
        assert_eq!(
            caps(16, 256, 256, 256).preferred_workgroup(),
            WorkgroupSize::new(16, 16)
        );
    }

    #[test]
    fn test_preferred_workgroup_respects_axis_limits() {
        // Width clamped by max x, height clamped by max y
        assert_eq!(caps(64, 256, 32, 4).preferred_workgroup(), WorkgroupSize::new(32, 4));
        // Degenerate limits still give a valid group
        assert_eq!(caps(0, 0, 0, 0).preferred_workgroup(), WorkgroupSize::new(1, 1));
    }

    #[test]
    fn test_preferred_workgroup_never_exceeds_threads() {
        for width in [1, 8, 16, 32, 64, 128] {
            for threads in [1, 64, 128, 256, 1024] {
                let group = caps(width, threads, 1024, 1024).preferred_workgroup();
                assert!(group.threads() <= threads.max(1));
                assert!(group.width >= 1 && group.height >= 1);
            }
        }
    }

    #[test]
    fn test_caps_from_limits_uses_vendor_width() {
        let limits = wgpu::Limits::default();
        assert_eq!(DeviceCaps::from_limits(&limits, VENDOR_NVIDIA).execution_width, 32);
        assert_eq!(DeviceCaps::from_limits(&limits, VENDOR_AMD).execution_width, 64);
        assert_eq!(DeviceCaps::from_limits(&limits, VENDOR_INTEL).execution_width, 16);
        assert_eq!(
            DeviceCaps::from_limits(&limits, 0).max_texture_dimension,
            limits.max_texture_dimension_2d
        );
    }

    #[tokio::test]
    async fn test_create_compute_context() {
        // This test requires a GPU, so it may be skipped in CI
        match GpuContext::new("test_device", GpuPreference::default()).await {
            Ok(ctx) => {
                println!("Created device: {:?}", ctx.info());
                assert!(ctx.caps().preferred_workgroup().threads() >= 1);
            }
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
            }
        }
    }
}
