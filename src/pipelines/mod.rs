// SPDX-License-Identifier: GPL-3.0-only

//! Filter pipelines
//!
//! ```text
//! ┌──────────────┐     ┌─────────────────────────┐     ┌──────────────┐
//! │ DynamicImage │ ──▶ │  Still-image pipeline   │ ──▶ │  RgbaImage   │
//! │              │     │  - one command unit     │     │              │
//! │              │     │  - blocks until done    │     │              │
//! └──────────────┘     └─────────────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌─────────────────────────┐     ┌──────────────┐
//! │   RawFrame   │ ──▶ │  Live-stream pipeline   │ ──▶ │   Drawable   │
//! │   (BGRA)     │     │  - one unit per frame   │     │              │
//! │              │     │  - never waits          │     │              │
//! └──────────────┘     └─────────────────────────┘     └──────────────┘
//! ```
//!
//! Both share the kernel registry's immutable pipelines and allocate their own
//! textures per image or per frame size.

pub mod still;
pub mod stream;

pub use still::StillImagePipeline;
pub use stream::{
    DropReason, FrameOutcome, OffscreenTarget, PresentationHandle, PresentationTarget,
    StreamControls, StreamPipeline, StreamRenderer, StreamState, StreamStats, StreamStatsSnapshot,
    SurfaceTarget,
};
