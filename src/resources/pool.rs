// SPDX-License-Identifier: GPL-3.0-only

//! Texture and command-buffer allocation for one unit of work.
//!
//! Every texture handed out here supports the usages the chain needs (read by
//! a kernel, written by a kernel, copied from, copied to). Nothing is pooled
//! across units of work of different sizes; callers drop what they allocate
//! when the image or frame is done.

use super::ping_pong::PingPong;
use crate::errors::ResourceError;
use crate::gpu::{GpuContext, wgpu};
use crate::shaders::read_buffer_blocking;
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use tracing::debug;

/// Canonical format for still images: 4 channels, 8 bit, unsigned normalized
pub const CANONICAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const BYTES_PER_PIXEL: u32 = 4;

/// Usages every chain texture carries
const CHAIN_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::STORAGE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Usages of an uploaded source texture (never written by a kernel)
const SOURCE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// A 2D texture with its default view
#[derive(Debug)]
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
}

impl GpuTexture {
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn extent(&self) -> wgpu::Extent3d {
        extent(self.width, self.height)
    }
}

/// Two same-size, same-format textures used for ping-pong
pub type TexturePair = PingPong<GpuTexture>;

impl TexturePair {
    pub fn width(&self) -> u32 {
        self.source().width()
    }

    pub fn height(&self) -> u32 {
        self.source().height()
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.source().format()
    }
}

/// An ordered batch of GPU operations submitted atomically
pub struct CommandUnit {
    label: String,
    encoder: wgpu::CommandEncoder,
    operations: usize,
}

impl CommandUnit {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of copies and dispatches encoded so far
    pub fn operations(&self) -> usize {
        self.operations
    }

    /// Encoder for one more operation; operations execute in encoding order
    pub(crate) fn next_operation(&mut self) -> &mut wgpu::CommandEncoder {
        self.operations += 1;
        &mut self.encoder
    }

    /// Finish encoding. The unit can no longer be appended to.
    pub fn seal(self) -> wgpu::CommandBuffer {
        self.encoder.finish()
    }
}

/// Where a centered blit reads from and writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitRegion {
    pub width: u32,
    pub height: u32,
    pub dst_x: u32,
    pub dst_y: u32,
}

/// Copy extent clamped to the smaller texture on each axis, placed at the
/// center of the destination. The source is always read from its origin.
pub fn centered_blit_region(src: (u32, u32), dst: (u32, u32)) -> BlitRegion {
    let width = src.0.min(dst.0);
    let height = src.1.min(dst.1);
    BlitRegion {
        width,
        height,
        dst_x: (dst.0 - width) / 2,
        dst_y: (dst.1 - height) / 2,
    }
}

/// A texture-to-buffer copy that has been encoded but not yet read
pub struct PendingReadback {
    buffer: wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
    format: wgpu::TextureFormat,
}

/// Allocates textures and command units, converts images to and from textures
pub struct ResourcePool {
    ctx: Arc<GpuContext>,
}

impl ResourcePool {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    /// Allocate a texture after checking its extent against the device
    pub fn create_texture(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Result<GpuTexture, ResourceError> {
        let max = self.ctx.caps().max_texture_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(ResourceError::InvalidSize { width, height, max });
        }

        let texture = self.ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent(width, height),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(GpuTexture {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    /// Decode an image and upload it into a new texture in [`CANONICAL_FORMAT`]
    pub fn upload_to_texture(&self, image: &DynamicImage) -> Result<GpuTexture, ResourceError> {
        self.upload_rgba(&image.to_rgba8())
    }

    /// Upload already-decoded RGBA pixels
    pub fn upload_rgba(&self, rgba: &RgbaImage) -> Result<GpuTexture, ResourceError> {
        let (width, height) = rgba.dimensions();
        let texture =
            self.create_texture("still_source", width, height, CANONICAL_FORMAT, SOURCE_USAGE)?;
        self.write_pixels(&texture, rgba.as_raw(), width * BYTES_PER_PIXEL)?;
        debug!(width, height, "Uploaded image to texture");
        Ok(texture)
    }

    /// Copy tightly or loosely packed pixels into a texture of matching format.
    ///
    /// `bytes_per_row` may include row padding.
    pub fn write_pixels(
        &self,
        texture: &GpuTexture,
        data: &[u8],
        bytes_per_row: u32,
    ) -> Result<(), ResourceError> {
        let needed = bytes_per_row as usize * (texture.height() as usize - 1)
            + (texture.width() * BYTES_PER_PIXEL) as usize;
        if bytes_per_row < texture.width() * BYTES_PER_PIXEL || data.len() < needed {
            return Err(ResourceError::Image(format!(
                "pixel data too small: {} bytes for {}x{} at stride {}",
                data.len(),
                texture.width(),
                texture.height(),
                bytes_per_row
            )));
        }

        self.ctx.queue().write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: texture.raw(),
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(texture.height()),
            },
            texture.extent(),
        );
        Ok(())
    }

    /// Two textures usable as kernel input and output, slot A as source
    pub fn allocate_texture_pair(
        &self,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
    ) -> Result<TexturePair, ResourceError> {
        let a = self.create_texture("ping_pong_a", width, height, format, CHAIN_USAGE)?;
        let b = self.create_texture("ping_pong_b", width, height, format, CHAIN_USAGE)?;
        debug!(width, height, ?format, "Allocated texture pair");
        Ok(PingPong::new(a, b))
    }

    /// Start a new command unit
    pub fn command_unit(&self, label: &str) -> CommandUnit {
        let encoder = self
            .ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        CommandUnit {
            label: label.to_string(),
            encoder,
            operations: 0,
        }
    }

    /// Encode a full-extent GPU copy. Both textures must match in size and format.
    pub fn copy_texture(
        &self,
        unit: &mut CommandUnit,
        source: &GpuTexture,
        dest: &GpuTexture,
    ) -> Result<(), ResourceError> {
        if source.format() != dest.format() {
            return Err(format_mismatch(dest.format(), source.format()));
        }
        if (source.width(), source.height()) != (dest.width(), dest.height()) {
            return Err(ResourceError::ExtentMismatch {
                expected: (dest.width(), dest.height()),
                found: (source.width(), source.height()),
            });
        }

        unit.next_operation().copy_texture_to_texture(
            texel_copy(source.raw(), wgpu::Origin3d::ZERO),
            texel_copy(dest.raw(), wgpu::Origin3d::ZERO),
            source.extent(),
        );
        Ok(())
    }

    /// Encode a copy of `source` into the center of `dest`, clamped to the
    /// smaller extent. Formats may differ only in their sRGB suffix.
    pub fn blit_centered(
        &self,
        unit: &mut CommandUnit,
        source: &GpuTexture,
        dest: &wgpu::Texture,
    ) -> Result<BlitRegion, ResourceError> {
        if source.format().remove_srgb_suffix() != dest.format().remove_srgb_suffix() {
            return Err(format_mismatch(dest.format(), source.format()));
        }

        let region = centered_blit_region(
            (source.width(), source.height()),
            (dest.width(), dest.height()),
        );
        unit.next_operation().copy_texture_to_texture(
            texel_copy(source.raw(), wgpu::Origin3d::ZERO),
            texel_copy(
                dest,
                wgpu::Origin3d {
                    x: region.dst_x,
                    y: region.dst_y,
                    z: 0,
                },
            ),
            extent(region.width, region.height),
        );
        Ok(region)
    }

    /// Encode a copy of `texture` into a mappable buffer.
    ///
    /// Rows are padded to `COPY_BYTES_PER_ROW_ALIGNMENT`; the padding is removed
    /// again in [`ResourcePool::finish_readback`].
    pub fn encode_readback(
        &self,
        unit: &mut CommandUnit,
        texture: &GpuTexture,
    ) -> Result<PendingReadback, ResourceError> {
        let format = texture.format();
        if !matches!(
            format,
            wgpu::TextureFormat::Rgba8Unorm | wgpu::TextureFormat::Bgra8Unorm
        ) {
            return Err(ResourceError::UnsupportedFormat(format!("{:?}", format)));
        }

        let padded_row = padded_bytes_per_row(texture.width());
        let buffer = self.ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback_buffer"),
            size: padded_row as u64 * texture.height() as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        unit.next_operation().copy_texture_to_buffer(
            texel_copy(texture.raw(), wgpu::Origin3d::ZERO),
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(texture.height()),
                },
            },
            texture.extent(),
        );

        Ok(PendingReadback {
            buffer,
            width: texture.width(),
            height: texture.height(),
            padded_row,
            format,
        })
    }

    /// Map a readback buffer, blocking until the GPU has written it
    pub fn finish_readback(&self, pending: PendingReadback) -> Result<RgbaImage, ResourceError> {
        let data = read_buffer_blocking(self.ctx.device(), &pending.buffer)?;
        let swap_red_blue = pending.format == wgpu::TextureFormat::Bgra8Unorm;
        let pixels = unpad_rows(
            &data,
            pending.width,
            pending.height,
            pending.padded_row,
            swap_red_blue,
        );
        RgbaImage::from_raw(pending.width, pending.height, pixels).ok_or_else(|| {
            ResourceError::Image(format!(
                "readback produced the wrong number of bytes for {}x{}",
                pending.width, pending.height
            ))
        })
    }

    /// Read a texture back into an image with its own copy-and-wait submission
    pub fn download_from_texture(&self, texture: &GpuTexture) -> Result<RgbaImage, ResourceError> {
        let mut unit = self.command_unit("download");
        let pending = self.encode_readback(&mut unit, texture)?;
        self.submit(unit);
        self.finish_readback(pending)
    }

    /// Seal and submit without waiting
    pub fn submit(&self, unit: CommandUnit) -> wgpu::SubmissionIndex {
        debug!(label = unit.label(), operations = unit.operations(), "Submitting command unit");
        self.ctx.queue().submit(std::iter::once(unit.seal()))
    }

    /// Seal, submit and block until the device has finished all submitted work
    pub fn submit_and_wait(&self, unit: CommandUnit) -> Result<(), ResourceError> {
        self.submit(unit);
        self.ctx
            .device()
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| ResourceError::DeviceWait(format!("{:?}", e)))?;
        Ok(())
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn texel_copy(texture: &wgpu::Texture, origin: wgpu::Origin3d) -> wgpu::TexelCopyTextureInfo<'_> {
    wgpu::TexelCopyTextureInfo {
        texture,
        mip_level: 0,
        origin,
        aspect: wgpu::TextureAspect::All,
    }
}

fn format_mismatch(expected: wgpu::TextureFormat, found: wgpu::TextureFormat) -> ResourceError {
    ResourceError::FormatMismatch {
        expected: format!("{:?}", expected),
        found: format!("{:?}", found),
    }
}

/// Row pitch of a texture-to-buffer copy
pub(crate) fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Drop row padding and optionally convert BGRA to RGBA
fn unpad_rows(
    data: &[u8],
    width: u32,
    height: u32,
    padded_row: u32,
    swap_red_blue: bool,
) -> Vec<u8> {
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks(padded_row as usize).take(height as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }
    if swap_red_blue {
        for px in pixels.chunks_exact_mut(BYTES_PER_PIXEL as usize) {
            px.swap(0, 2);
        }
    }
    pixels
}
