// SPDX-License-Identifier: GPL-3.0-only

//! Frame sources for the live stream
//!
//! - [`camera`]: capture source trait, raw frame type, the synthetic camera and
//!   the capture thread controller

pub mod camera;
