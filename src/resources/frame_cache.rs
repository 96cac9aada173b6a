// SPDX-License-Identifier: GPL-3.0-only

//! Per-size texture cache for camera frames
//!
//! Holds one texture the camera buffer is written into and one ping-pong pair,
//! both sized to the current frame. A frame of a different size drops them and
//! allocates new ones; frames of the same size reuse them.

use super::pool::{GpuTexture, ResourcePool, TexturePair};
use crate::backends::camera::{PixelFormat, RawFrame};
use crate::errors::ResourceError;
use crate::gpu::wgpu;
use crate::shaders::CachedDimensions;
use tracing::debug;

const FRAME_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Why a frame could not be bound
#[derive(Debug, Clone, PartialEq)]
pub enum CacheMiss {
    /// Zero extent, stride narrower than a row, or too few bytes
    Malformed,
    /// The frame's pixel format differs from what the kernels write
    FormatMismatch {
        frame: PixelFormat,
        expected: wgpu::TextureFormat,
    },
    /// Texture allocation failed
    Allocation(ResourceError),
}

/// Textures bound for one frame
pub struct BoundFrame<'a> {
    /// The camera pixels
    pub texture: &'a GpuTexture,
    /// Ping-pong pair sized to the frame
    pub pair: &'a mut TexturePair,
}

/// Texture format a frame's bytes are uploaded as
pub fn frame_texture_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Bgra8 => wgpu::TextureFormat::Bgra8Unorm,
        PixelFormat::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
    }
}

pub struct FrameTextureCache {
    dims: CachedDimensions,
    pair_format: wgpu::TextureFormat,
    frame: Option<GpuTexture>,
    pair: Option<TexturePair>,
}

impl FrameTextureCache {
    /// Cache whose pairs are allocated in `pair_format`
    pub fn new(pair_format: wgpu::TextureFormat) -> Self {
        Self {
            dims: CachedDimensions::default(),
            pair_format,
            frame: None,
            pair: None,
        }
    }

    /// Extent of the currently cached textures
    pub fn dimensions(&self) -> CachedDimensions {
        self.dims
    }

    /// Upload a frame into the cached texture, allocating on size change.
    ///
    /// Never waits: a frame that cannot be bound is reported as a miss and the
    /// caller drops it.
    pub fn bind<'a>(
        &'a mut self,
        pool: &ResourcePool,
        frame: &RawFrame,
    ) -> Result<BoundFrame<'a>, CacheMiss> {
        if !frame.is_well_formed() {
            return Err(CacheMiss::Malformed);
        }
        let format = frame_texture_format(frame.format);
        if format != self.pair_format {
            return Err(CacheMiss::FormatMismatch {
                frame: frame.format,
                expected: self.pair_format,
            });
        }

        if self.dims.needs_update(frame.width, frame.height)
            || self.frame.is_none()
            || self.pair.is_none()
        {
            self.frame = None;
            self.pair = None;
            let texture = pool
                .create_texture("camera_frame", frame.width, frame.height, format, FRAME_USAGE)
                .map_err(CacheMiss::Allocation)?;
            let pair = pool
                .allocate_texture_pair(frame.width, frame.height, self.pair_format)
                .map_err(CacheMiss::Allocation)?;
            debug!(
                width = frame.width,
                height = frame.height,
                previous = ?self.dims,
                "Frame size changed, reallocated textures"
            );
            self.dims.update(frame.width, frame.height);
            self.frame = Some(texture);
            self.pair = Some(pair);
        }

        let (Some(texture), Some(pair)) = (self.frame.as_ref(), self.pair.as_mut()) else {
            return Err(CacheMiss::Malformed);
        };
        pool.write_pixels(texture, &frame.data, frame.stride)
            .map_err(CacheMiss::Allocation)?;
        pair.reset();

        Ok(BoundFrame { texture, pair })
    }

    /// Drop all cached textures
    pub fn clear(&mut self) {
        self.frame = None;
        self.pair = None;
        self.dims = CachedDimensions::default();
    }
}
