// SPDX-License-Identifier: GPL-3.0-only

//! Dispatch sizing and readback helpers shared by the pipelines

use crate::errors::ResourceError;
use crate::gpu::{WorkgroupSize, wgpu};

/// Frame extent the cached stream textures were allocated for
///
/// Empty until the first frame arrives; a frame of any other size means the
/// cached textures must be replaced.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub struct CachedDimensions(Option<(u32, u32)>);

impl CachedDimensions {
    pub fn needs_update(&self, width: u32, height: u32) -> bool {
        self.0 != Some((width, height))
    }

    pub fn update(&mut self, width: u32, height: u32) {
        self.0 = Some((width, height));
    }

    pub fn get(&self) -> Option<(u32, u32)> {
        self.0
    }

    pub fn is_initialized(&self) -> bool {
        self.0.is_some()
    }
}

/// Map a MAP_READ buffer and copy its contents out.
///
/// Polls the device until every submission so far has completed, so the
/// buffer is only read after the copy into it has run.
pub async fn read_buffer_async(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, ResourceError> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| ResourceError::DeviceWait(format!("{:?}", e)))?;

    receiver
        .await
        .map_err(|_| ResourceError::Readback("mapping callback was dropped".into()))?
        .map_err(|e| ResourceError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();
    Ok(data)
}

/// Blocking form of [`read_buffer_async`]
pub fn read_buffer_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
) -> Result<Vec<u8>, ResourceError> {
    pollster::block_on(read_buffer_async(device, buffer))
}

/// Workgroups needed along one axis (ceiling division)
#[inline]
pub fn compute_dispatch_size(dimension: u32, workgroup_size: u32) -> u32 {
    dimension.div_ceil(workgroup_size.max(1))
}

/// Workgroup counts covering a `width` x `height` image
#[inline]
pub fn dispatch_grid(width: u32, height: u32, group: WorkgroupSize) -> (u32, u32) {
    (
        compute_dispatch_size(width, group.width),
        compute_dispatch_size(height, group.height),
    )
}
