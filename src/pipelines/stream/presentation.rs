// SPDX-License-Identifier: GPL-3.0-only

//! Presentation targets
//!
//! The stream renderer never owns what it presents to. It holds a weak
//! [`PresentationHandle`] and asks for a drawable each frame; a target that
//! has gone away, or has no drawable ready, just means the frame is dropped.

use crate::errors::{InitializationError, ResourceError};
use crate::gpu::{GpuContext, wgpu};
use crate::resources::{GpuTexture, ResourcePool};
use image::RgbaImage;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info};

/// A texture that becomes visible once presented
pub trait Drawable {
    fn texture(&self) -> &wgpu::Texture;

    fn present(self: Box<Self>);
}

/// Something frames can be shown on
pub trait PresentationTarget: Send + Sync {
    /// Next drawable, or `None` if none is ready. Must not block.
    ///
    /// `width` and `height` are the extent of the frame about to be drawn.
    fn acquire(&self, width: u32, height: u32) -> Option<Box<dyn Drawable>>;
}

/// Weak reference to a presentation target, checked every frame
#[derive(Clone)]
pub struct PresentationHandle(Weak<dyn PresentationTarget>);

impl PresentationHandle {
    pub fn new<T: PresentationTarget + 'static>(target: &Arc<T>) -> Self {
        let target: Arc<T> = Arc::clone(target);
        let target: Arc<dyn PresentationTarget> = target;
        Self(Arc::downgrade(&target))
    }

    /// A handle whose target is already gone
    pub fn detached() -> Self {
        let weak: Weak<dyn PresentationTarget> = Weak::<OffscreenTarget>::new();
        Self(weak)
    }

    pub fn upgrade(&self) -> Option<Arc<dyn PresentationTarget>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// A window surface
pub struct SurfaceTarget {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    config: Mutex<wgpu::SurfaceConfiguration>,
}

impl SurfaceTarget {
    /// Configure `surface` for copying BGRA frames into it
    pub fn new(
        ctx: &GpuContext,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
    ) -> Result<Arc<Self>, InitializationError> {
        let caps = surface.get_capabilities(ctx.adapter());
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.remove_srgb_suffix() == wgpu::TextureFormat::Bgra8Unorm)
            .ok_or(InitializationError::MissingFeature("BGRA surface format"))?;
        if !caps.usages.contains(wgpu::TextureUsages::COPY_DST) {
            return Err(InitializationError::MissingFeature("surface copy destination"));
        }

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_DST,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
        };
        surface.configure(ctx.device(), &config);
        info!(?format, width, height, "Surface configured for stream presentation");

        Ok(Arc::new(Self {
            surface,
            device: Arc::clone(ctx.device()),
            config: Mutex::new(config),
        }))
    }

    /// Reconfigure after the window changed size
    pub fn resize(&self, width: u32, height: u32) {
        let Ok(mut config) = self.config.lock() else {
            return;
        };
        config.width = width.max(1);
        config.height = height.max(1);
        self.surface.configure(&self.device, &config);
    }
}

struct SurfaceDrawable(wgpu::SurfaceTexture);

impl Drawable for SurfaceDrawable {
    fn texture(&self) -> &wgpu::Texture {
        &self.0.texture
    }

    fn present(self: Box<Self>) {
        self.0.present();
    }
}

impl PresentationTarget for SurfaceTarget {
    fn acquire(&self, _width: u32, _height: u32) -> Option<Box<dyn Drawable>> {
        match self.surface.get_current_texture() {
            Ok(frame) => Some(Box::new(SurfaceDrawable(frame))),
            Err(e) => {
                debug!(error = %e, "No surface texture available");
                None
            }
        }
    }
}

/// A texture standing in for a window, for headless runs and tests
pub struct OffscreenTarget {
    pool: ResourcePool,
    texture: GpuTexture,
    available: AtomicBool,
    presented: Arc<AtomicU64>,
}

impl OffscreenTarget {
    pub fn new(
        ctx: Arc<GpuContext>,
        width: u32,
        height: u32,
    ) -> Result<Arc<Self>, ResourceError> {
        let pool = ResourcePool::new(ctx);
        let texture = pool.create_texture(
            "offscreen_target",
            width,
            height,
            wgpu::TextureFormat::Bgra8Unorm,
            wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
        )?;
        Ok(Arc::new(Self {
            pool,
            texture,
            available: AtomicBool::new(true),
            presented: Arc::new(AtomicU64::new(0)),
        }))
    }

    /// While unavailable, `acquire` returns no drawable
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of presentation calls so far
    pub fn presented(&self) -> u64 {
        self.presented.load(Ordering::SeqCst)
    }

    /// Read back what was last presented, as RGBA. Waits for the GPU.
    pub fn snapshot(&self) -> Result<RgbaImage, ResourceError> {
        self.pool.download_from_texture(&self.texture)
    }
}

struct OffscreenDrawable {
    texture: wgpu::Texture,
    presented: Arc<AtomicU64>,
}

impl Drawable for OffscreenDrawable {
    fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    fn present(self: Box<Self>) {
        self.presented.fetch_add(1, Ordering::SeqCst);
    }
}

impl PresentationTarget for OffscreenTarget {
    fn acquire(&self, _width: u32, _height: u32) -> Option<Box<dyn Drawable>> {
        if !self.available.load(Ordering::SeqCst) {
            return None;
        }
        Some(Box::new(OffscreenDrawable {
            texture: self.texture.raw().clone(),
            presented: Arc::clone(&self.presented),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverReady;

    impl PresentationTarget for NeverReady {
        fn acquire(&self, _width: u32, _height: u32) -> Option<Box<dyn Drawable>> {
            None
        }
    }

    #[test]
    fn test_handle_follows_target_lifetime() {
        let target = Arc::new(NeverReady);
        let handle = PresentationHandle::new(&target);
        assert!(handle.is_alive());
        assert!(handle.upgrade().is_some());

        drop(target);
        assert!(!handle.is_alive());
        assert!(handle.upgrade().is_none());
    }

    #[test]
    fn test_detached_handle() {
        assert!(PresentationHandle::detached().upgrade().is_none());
    }
}
