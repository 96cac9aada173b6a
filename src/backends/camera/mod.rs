// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture boundary
//!
//! ```text
//! ┌──────────────────┐   next_frame()   ┌──────────────────────┐
//! │  CaptureSource   │ ───────────────▶ │ CaptureLoopController│
//! │ (SyntheticCamera)│                  │   (capture thread)   │
//! └──────────────────┘                  └──────────┬───────────┘
//!                                                  │ RawFrame
//!                                                  ▼
//!                                       ┌──────────────────────┐
//!                                       │    StreamRenderer    │
//!                                       └──────────────────────┘
//! ```

pub mod frame_loop;
pub mod synthetic;
pub mod types;

pub use frame_loop::{CaptureLoopController, LoopAction};
pub use synthetic::{Pattern, SyntheticCamera};
pub use types::*;
