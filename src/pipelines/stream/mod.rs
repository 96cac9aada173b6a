// SPDX-License-Identifier: GPL-3.0-only

//! Live-stream pipeline
//!
//! ```text
//! capture thread                          GPU queue
//! ──────────────                          ─────────
//! RawFrame N   → bind → seed → invert → blit → submit ──▶ [frame N]
//! RawFrame N+1 → bind → seed → invert → blit → submit ──▶ [frame N+1]
//! ```
//!
//! Frames are rendered one at a time on the capture thread. Nothing waits for
//! the GPU: each frame is submitted and presented, and the queue's submission
//! order keeps presentation in frame order. A frame that cannot be rendered
//! (no target, no drawable, cache miss) is dropped and counted, never reported
//! as an error.
//!
//! # State machine
//!
//! ```text
//! Uninitialized → Configuring → Running → Stopped
//!                      │
//!                      └──────→ Inoperative
//! ```

mod presentation;

pub use presentation::{
    Drawable, OffscreenTarget, PresentationHandle, PresentationTarget, SurfaceTarget,
};

use crate::backends::camera::{CaptureLoopController, CaptureSource, LoopAction, RawFrame};
use crate::constants::kernels::INVERT;
use crate::constants::stream::{STATS_LOG_INTERVAL, STOP_TIMEOUT};
use crate::errors::{InitializationError, ResourceError};
use crate::filters::{ChainExecutor, FilterChain, KernelOptions, KernelRegistry};
use crate::gpu::{GpuContext, wgpu};
use crate::resources::{CacheMiss, FrameTextureCache, ResourcePool};
use crate::shaders::ShaderLibrary;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Format camera frames are processed in
pub const STREAM_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Bgra8Unorm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    Uninitialized = 0,
    /// Opening the capture source and building kernels
    Configuring = 1,
    Running = 2,
    Stopped = 3,
    /// Configuration failed. No frames will ever be delivered.
    Inoperative = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => StreamState::Uninitialized,
            1 => StreamState::Configuring,
            2 => StreamState::Running,
            3 => StreamState::Stopped,
            _ => StreamState::Inoperative,
        }
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StreamState::Uninitialized => "uninitialized",
            StreamState::Configuring => "configuring",
            StreamState::Running => "running",
            StreamState::Stopped => "stopped",
            StreamState::Inoperative => "inoperative",
        };
        write!(f, "{}", name)
    }
}

/// Why a frame was not presented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The presentation target has been torn down
    TargetGone,
    /// The target had no drawable ready
    NoDrawable,
    /// The frame could not be bound as a texture
    CacheMiss,
    /// Frame, kernel and drawable formats do not line up
    FormatMismatch,
    /// Allocation or encoding failed for this frame
    Resource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Dropped(DropReason),
}

/// Counters shared between the capture thread and readers
#[derive(Debug, Default)]
pub struct StreamStats {
    presented: AtomicU64,
    dropped: AtomicU64,
    last_timestamp_us: AtomicU64,
}

/// Point-in-time copy of [`StreamStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamStatsSnapshot {
    pub presented: u64,
    pub dropped: u64,
    pub last_timestamp: Duration,
}

impl StreamStats {
    fn record(&self, frame: &RawFrame, outcome: FrameOutcome) -> u64 {
        self.last_timestamp_us
            .store(frame.timestamp.as_micros() as u64, Ordering::Relaxed);
        let counter = match outcome {
            FrameOutcome::Presented => &self.presented,
            FrameOutcome::Dropped(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.presented.load(Ordering::Relaxed) + self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StreamStatsSnapshot {
        StreamStatsSnapshot {
            presented: self.presented.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_timestamp: Duration::from_micros(self.last_timestamp_us.load(Ordering::Relaxed)),
        }
    }
}

/// Toggles the UI may flip at any time; read once at the start of each frame
#[derive(Debug)]
pub struct StreamControls {
    invert: AtomicBool,
}

impl StreamControls {
    pub fn new(invert: bool) -> Self {
        Self {
            invert: AtomicBool::new(invert),
        }
    }

    pub fn set_invert(&self, enabled: bool) {
        self.invert.store(enabled, Ordering::Relaxed);
    }

    pub fn invert(&self) -> bool {
        self.invert.load(Ordering::Relaxed)
    }
}

/// Renders one frame at a time into a presentation target
pub struct StreamRenderer {
    pool: ResourcePool,
    executor: ChainExecutor,
    chain: FilterChain,
    cache: FrameTextureCache,
    target: PresentationHandle,
    controls: Arc<StreamControls>,
    stats: Arc<StreamStats>,
}

impl StreamRenderer {
    /// `registry` must contain the invert kernel built for [`STREAM_FORMAT`]
    pub fn new(
        ctx: Arc<GpuContext>,
        registry: &KernelRegistry,
        target: PresentationHandle,
        controls: Arc<StreamControls>,
        stats: Arc<StreamStats>,
    ) -> Result<Self, InitializationError> {
        let invert = registry
            .get(INVERT)
            .ok_or_else(|| InitializationError::KernelNotFound(INVERT.to_string()))?;

        Ok(Self {
            pool: ResourcePool::new(Arc::clone(&ctx)),
            executor: ChainExecutor::new(ctx),
            chain: FilterChain::from_kernels([Arc::clone(invert)]),
            cache: FrameTextureCache::new(registry.format()),
            target,
            controls,
            stats,
        })
    }

    /// Render and present one frame without waiting for the GPU
    pub fn on_frame(&mut self, frame: &RawFrame) -> FrameOutcome {
        let outcome = self.render(frame);
        let total = self.stats.record(frame, outcome);

        if let FrameOutcome::Dropped(reason) = outcome {
            debug!(sequence = frame.sequence, ?reason, "Dropped frame");
        }
        if total % STATS_LOG_INTERVAL == 0 {
            let stats = self.stats.snapshot();
            debug!(
                presented = stats.presented,
                dropped = stats.dropped,
                timestamp = ?stats.last_timestamp,
                "Stream statistics"
            );
        }
        outcome
    }

    fn render(&mut self, frame: &RawFrame) -> FrameOutcome {
        self.chain.set_enabled(INVERT, self.controls.invert());

        let drawable = match acquire_drawable(&self.target, frame.width, frame.height) {
            Ok(drawable) => drawable,
            Err(reason) => return FrameOutcome::Dropped(reason),
        };

        let bound = match self.cache.bind(&self.pool, frame) {
            Ok(bound) => bound,
            Err(CacheMiss::FormatMismatch { .. }) => {
                return FrameOutcome::Dropped(DropReason::FormatMismatch);
            }
            Err(CacheMiss::Malformed) => return FrameOutcome::Dropped(DropReason::CacheMiss),
            Err(CacheMiss::Allocation(_)) => return FrameOutcome::Dropped(DropReason::Resource),
        };

        let mut unit = self.pool.command_unit("stream_frame");
        let output = match self.executor.run(
            &self.pool,
            &mut unit,
            &self.chain,
            bound.texture,
            bound.pair,
        ) {
            Ok(output) => output,
            Err(e) => return FrameOutcome::Dropped(drop_reason(&e)),
        };

        if let Err(e) = self.pool.blit_centered(&mut unit, output, drawable.texture()) {
            return FrameOutcome::Dropped(drop_reason(&e));
        }

        self.pool.submit(unit);
        drawable.present();
        FrameOutcome::Presented
    }
}

/// Next drawable from the target behind `handle`, or why there is none
fn acquire_drawable(
    handle: &PresentationHandle,
    width: u32,
    height: u32,
) -> Result<Box<dyn Drawable>, DropReason> {
    let target = handle.upgrade().ok_or(DropReason::TargetGone)?;
    target.acquire(width, height).ok_or(DropReason::NoDrawable)
}

fn drop_reason(err: &ResourceError) -> DropReason {
    match err {
        ResourceError::FormatMismatch { .. } | ResourceError::UnsupportedFormat(_) => {
            DropReason::FormatMismatch
        }
        _ => DropReason::Resource,
    }
}

/// Owns the capture thread and the renderer it drives
pub struct StreamPipeline {
    ctx: Arc<GpuContext>,
    library: ShaderLibrary,
    options: KernelOptions,
    target: PresentationHandle,
    controls: Arc<StreamControls>,
    stats: Arc<StreamStats>,
    state: Arc<AtomicU8>,
    controller: Option<CaptureLoopController>,
}

impl StreamPipeline {
    pub fn new(
        ctx: Arc<GpuContext>,
        library: ShaderLibrary,
        options: KernelOptions,
        target: PresentationHandle,
        invert: bool,
    ) -> Self {
        Self {
            ctx,
            library,
            options,
            target,
            controls: Arc::new(StreamControls::new(invert)),
            stats: Arc::new(StreamStats::default()),
            state: Arc::new(AtomicU8::new(StreamState::Uninitialized as u8)),
            controller: None,
        }
    }

    pub fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: StreamState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Configure and start delivering frames from `source`.
    ///
    /// Only valid from `Uninitialized`. A configuration failure is logged once
    /// and leaves the pipeline `Inoperative`; it is not returned as an error.
    pub fn start(&mut self, mut source: Box<dyn CaptureSource>) -> StreamState {
        let current = self.state();
        if current != StreamState::Uninitialized {
            warn!(state = %current, "Stream pipeline already started");
            return current;
        }

        self.set_state(StreamState::Configuring);
        let mut renderer = match self.configure(source.as_mut()) {
            Ok(renderer) => renderer,
            Err(e) => {
                warn!(error = %e, "Stream pipeline configuration failed, no frames will be delivered");
                self.set_state(StreamState::Inoperative);
                return StreamState::Inoperative;
            }
        };

        self.set_state(StreamState::Running);
        let state = Arc::clone(&self.state);
        self.controller = Some(CaptureLoopController::start("stream-capture", move || {
            match source.next_frame() {
                Some(frame) => {
                    renderer.on_frame(&frame);
                    LoopAction::Continue
                }
                None => {
                    let _ = state.compare_exchange(
                        StreamState::Running as u8,
                        StreamState::Stopped as u8,
                        Ordering::SeqCst,
                        Ordering::SeqCst,
                    );
                    LoopAction::Stop
                }
            }
        }));

        info!("Stream pipeline running");
        StreamState::Running
    }

    fn configure(
        &self,
        source: &mut dyn CaptureSource,
    ) -> Result<StreamRenderer, InitializationError> {
        if !self.ctx.info().bgra_storage {
            return Err(InitializationError::MissingFeature("BGRA8UNORM_STORAGE"));
        }
        let format = source.open()?;
        let registry =
            KernelRegistry::load_named(&self.ctx, &self.library, &[INVERT], STREAM_FORMAT, &self.options)?;
        info!(capture = %format, "Stream pipeline configured");

        StreamRenderer::new(
            Arc::clone(&self.ctx),
            &registry,
            self.target.clone(),
            Arc::clone(&self.controls),
            Arc::clone(&self.stats),
        )
    }

    /// Flip the invert kernel; takes effect on the next frame
    pub fn set_invert(&self, enabled: bool) {
        self.controls.set_invert(enabled);
    }

    pub fn controls(&self) -> Arc<StreamControls> {
        Arc::clone(&self.controls)
    }

    pub fn stats(&self) -> StreamStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the capture thread is still delivering frames
    pub fn is_running(&self) -> bool {
        self.controller
            .as_ref()
            .is_some_and(CaptureLoopController::is_running)
    }

    /// Block until the source ends on its own
    pub fn wait(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.join();
        }
    }

    /// Stop frame delivery. GPU work already submitted is left to finish.
    pub fn stop(&mut self) {
        if let Some(mut controller) = self.controller.take() {
            controller.stop_within(STOP_TIMEOUT);
        }
        let current = self.state();
        let next = state_after_stop(current);
        if next != current {
            self.set_state(next);
            let stats = self.stats();
            info!(
                presented = stats.presented,
                dropped = stats.dropped,
                "Stream pipeline stopped"
            );
        }
    }
}

/// A pipeline that never started keeps its state when stopped
fn state_after_stop(current: StreamState) -> StreamState {
    match current {
        StreamState::Uninitialized | StreamState::Inoperative | StreamState::Stopped => current,
        StreamState::Configuring | StreamState::Running => StreamState::Stopped,
    }
}

impl Drop for StreamPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
