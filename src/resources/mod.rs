// SPDX-License-Identifier: GPL-3.0-only

//! GPU resources for one unit of work (one image or one frame)

mod frame_cache;
mod ping_pong;
mod pool;

pub use frame_cache::{BoundFrame, CacheMiss, FrameTextureCache, frame_texture_format};
pub use ping_pong::{PingPong, Slot, run_stages};
pub use pool::{
    BlitRegion, CANONICAL_FORMAT, CommandUnit, GpuTexture, PendingReadback, ResourcePool,
    TexturePair, centered_blit_region,
};
