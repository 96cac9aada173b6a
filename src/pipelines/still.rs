// SPDX-License-Identifier: GPL-3.0-only

//! Still-image pipeline
//!
//! ```text
//! DynamicImage → upload → seed copy → kernels → readback copy → wait → RgbaImage
//!                          └───────── one command unit ─────────┘
//! ```
//!
//! The whole run is encoded into a single command unit and the calling thread
//! blocks until the device has finished, so the returned image is complete.

use crate::errors::{AppError, AppResult};
use crate::filters::{ChainExecutor, FilterChain};
use crate::gpu::GpuContext;
use crate::resources::{CANONICAL_FORMAT, ResourcePool};
use image::{DynamicImage, RgbaImage};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct StillImagePipeline {
    pool: ResourcePool,
    executor: ChainExecutor,
}

impl StillImagePipeline {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            pool: ResourcePool::new(Arc::clone(&ctx)),
            executor: ChainExecutor::new(ctx),
        }
    }

    pub fn pool(&self) -> &ResourcePool {
        &self.pool
    }

    /// Run the enabled kernels of `chain` over `input`.
    ///
    /// Returns `None` on failure after logging it; see [`Self::try_apply`]
    /// for the error itself.
    pub fn apply(&self, chain: &FilterChain, input: &DynamicImage) -> Option<RgbaImage> {
        match self.try_apply(chain, input) {
            Ok(image) => Some(image),
            Err(e) => {
                warn!(error = %e, "Still image filtering failed");
                None
            }
        }
    }

    /// Run the enabled kernels of `chain` over `input`, blocking until done
    pub fn try_apply(&self, chain: &FilterChain, input: &DynamicImage) -> AppResult<RgbaImage> {
        let start = Instant::now();
        let (width, height) = (input.width(), input.height());

        let source = self.pool.upload_to_texture(input)?;
        let mut pair = self
            .pool
            .allocate_texture_pair(width, height, CANONICAL_FORMAT)?;

        let mut unit = self.pool.command_unit("still_image");
        let output = self
            .executor
            .run(&self.pool, &mut unit, chain, &source, &mut pair)?;
        let pending = self.pool.encode_readback(&mut unit, output)?;
        debug!(operations = unit.operations(), "Still image unit encoded");

        self.pool.submit_and_wait(unit)?;
        let image = self.pool.finish_readback(pending)?;

        if image.dimensions() != (width, height) {
            return Err(AppError::Other(format!(
                "output is {}x{}, expected {}x{}",
                image.width(),
                image.height(),
                width,
                height
            )));
        }

        info!(
            width,
            height,
            filters = ?chain.enabled_names(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Filtered still image"
        );
        Ok(image)
    }
}
