// SPDX-License-Identifier: GPL-3.0-only

//! Chain executor
//!
//! Seeds the ping-pong pair with a GPU copy of the source, then encodes one
//! compute pass per enabled kernel into the caller's command unit. Nothing is
//! submitted here; the pipelines decide whether to wait.

use super::chain::FilterChain;
use super::registry::KernelDescriptor;
use crate::constants::kernels::{INPUT_BINDING, OUTPUT_BINDING, TEXTURE_GROUP};
use crate::errors::ResourceError;
use crate::gpu::{GpuContext, wgpu};
use crate::resources::{CommandUnit, GpuTexture, ResourcePool, TexturePair, run_stages};
use crate::shaders::dispatch_grid;
use std::sync::Arc;
use tracing::debug;

pub struct ChainExecutor {
    ctx: Arc<GpuContext>,
}

impl ChainExecutor {
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx }
    }

    /// Encode the enabled kernels of `chain` over `source`.
    ///
    /// Returns the pair texture holding the result. With no enabled kernels
    /// that is the seeded copy of `source`, never an unwritten texture.
    pub fn run<'p>(
        &self,
        pool: &ResourcePool,
        unit: &mut CommandUnit,
        chain: &FilterChain,
        source: &GpuTexture,
        pair: &'p mut TexturePair,
    ) -> Result<&'p GpuTexture, ResourceError> {
        check_formats(chain.enabled().map(|k| (k.name(), k.format())), pair.format())?;

        pool.copy_texture(unit, source, pair.source())?;

        let ran = run_stages(pair, chain.enabled(), |kernel, src, dst| {
            self.dispatch(unit, kernel, src, dst);
            Ok::<_, ResourceError>(())
        })?;

        debug!(
            unit = unit.label(),
            kernels = ran,
            width = source.width(),
            height = source.height(),
            "Encoded filter chain"
        );
        Ok(pair.source())
    }

    fn dispatch(
        &self,
        unit: &mut CommandUnit,
        kernel: &KernelDescriptor,
        src: &GpuTexture,
        dst: &GpuTexture,
    ) {
        let bind_group = self
            .ctx
            .device()
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.name()),
                layout: kernel.texture_layout(),
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: INPUT_BINDING,
                        resource: wgpu::BindingResource::TextureView(src.view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: OUTPUT_BINDING,
                        resource: wgpu::BindingResource::TextureView(dst.view()),
                    },
                ],
            });

        let (groups_x, groups_y) = dispatch_grid(dst.width(), dst.height(), kernel.workgroup());

        let mut pass = unit
            .next_operation()
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.name()),
                timestamp_writes: None,
            });
        pass.set_pipeline(kernel.pipeline());
        pass.set_bind_group(TEXTURE_GROUP, Some(&bind_group), &[]);
        if let Some(binder) = kernel.binder() {
            binder.bind(&mut pass);
        }
        pass.dispatch_workgroups(groups_x, groups_y, 1);
    }
}

/// Every kernel must have been built for the pair's storage format
fn check_formats<'k>(
    kernels: impl IntoIterator<Item = (&'k str, wgpu::TextureFormat)>,
    format: wgpu::TextureFormat,
) -> Result<(), ResourceError> {
    match kernels.into_iter().find(|&(_, f)| f != format) {
        Some((name, found)) => Err(ResourceError::FormatMismatch {
            expected: format!("{:?} ({})", format, name),
            found: format!("{:?}", found),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    //! The GPU path encodes exactly what `run_stages` hands it, so chain
    //! semantics are checked here with CPU buffers in place of textures.

    use super::check_formats;
    use crate::errors::ResourceError;
    use crate::filters::chain::{FilterChain, Kernel};
    use crate::gpu::wgpu::TextureFormat;
    use crate::resources::{PingPong, run_stages};
    use std::cell::RefCell;

    struct CpuKernel {
        name: &'static str,
        op: Op,
    }

    impl Kernel for CpuKernel {
        fn name(&self) -> &str {
            self.name
        }
    }

    type Op = fn(u8) -> u8;

    const INVERT: Op = |v| 255 - v;
    const BRIGHTEN: Op = |v| v.saturating_add(40);
    const HALVE: Op = |v| v / 2;

    fn kernels(names: &[(&'static str, Op)]) -> FilterChain<CpuKernel> {
        FilterChain::from_kernels(names.iter().map(|&(name, op)| CpuKernel { name, op }))
    }

    /// Seed, run the enabled stages, return the final source slot
    fn run_cpu(chain: &FilterChain<CpuKernel>, input: &[u8]) -> Vec<u8> {
        let mut pair = PingPong::new(
            RefCell::new(vec![0; input.len()]),
            RefCell::new(vec![0; input.len()]),
        );
        pair.source().borrow_mut().copy_from_slice(input);
        run_stages(&mut pair, chain.enabled(), |kernel, src, dst| {
            let src = src.borrow();
            let mut dst = dst.borrow_mut();
            for (d, s) in dst.iter_mut().zip(src.iter()) {
                *d = (kernel.op)(*s);
            }
            Ok::<_, ()>(())
        })
        .unwrap();
        pair.source().borrow().clone()
    }

    const IMAGE: [u8; 8] = [0, 1, 17, 64, 128, 200, 254, 255];

    #[test]
    fn test_empty_chain_passes_through() {
        let chain = kernels(&[]);
        assert_eq!(run_cpu(&chain, &IMAGE), IMAGE);
    }

    #[test]
    fn test_all_disabled_equals_empty() {
        let chain = kernels(&[("fx_a", INVERT), ("fx_b", BRIGHTEN), ("fx_c", HALVE)]);
        assert_eq!(run_cpu(&chain, &IMAGE), IMAGE);
    }

    #[test]
    fn test_invert_twice_is_identity() {
        let mut chain = kernels(&[("fx_invert_1", INVERT), ("fx_invert_2", INVERT)]);
        chain.set_all(true);
        assert_eq!(run_cpu(&chain, &IMAGE), IMAGE);
    }

    #[test]
    fn test_single_kernel() {
        let mut chain = kernels(&[("fx_invert", INVERT)]);
        chain.set_all(true);
        let expected: Vec<u8> = IMAGE.iter().map(|&v| INVERT(v)).collect();
        assert_eq!(run_cpu(&chain, &IMAGE), expected);
    }

    #[test]
    fn test_disabled_entries_are_no_ops() {
        let all: [(&'static str, Op); 4] = [
            ("fx_a", INVERT),
            ("fx_b", BRIGHTEN),
            ("fx_c", HALVE),
            ("fx_d", BRIGHTEN),
        ];

        // Every subset of four kernels
        for mask in 0u32..16 {
            let mut full = kernels(&all);
            let mut only_enabled = Vec::new();
            for (i, &(name, op)) in all.iter().enumerate() {
                if mask & (1 << i) != 0 {
                    full.set_enabled(name, true);
                    only_enabled.push((name, op));
                }
            }
            let mut compact = kernels(&only_enabled);
            compact.set_all(true);

            assert_eq!(
                run_cpu(&full, &IMAGE),
                run_cpu(&compact, &IMAGE),
                "mask {:04b}",
                mask
            );
        }
    }

    #[test]
    fn test_order_matters() {
        let mut a = kernels(&[("fx_brighten", BRIGHTEN), ("fx_halve", HALVE)]);
        a.set_all(true);
        let mut b = kernels(&[("fx_halve", HALVE), ("fx_brighten", BRIGHTEN)]);
        b.set_all(true);
        assert_ne!(run_cpu(&a, &IMAGE), run_cpu(&b, &IMAGE));
    }

    #[test]
    fn test_matching_formats_pass() {
        let kernels = [
            ("fx_invert", TextureFormat::Bgra8Unorm),
            ("fx_blur", TextureFormat::Bgra8Unorm),
        ];
        assert!(check_formats(kernels, TextureFormat::Bgra8Unorm).is_ok());
        let none: Vec<(&str, TextureFormat)> = Vec::new();
        assert!(check_formats(none, TextureFormat::Rgba8Unorm).is_ok());
    }

    #[test]
    fn test_format_mismatch_names_first_offending_kernel() {
        let kernels = [
            ("fx_invert", TextureFormat::Bgra8Unorm),
            ("fx_sepia", TextureFormat::Rgba8Unorm),
            ("fx_blur", TextureFormat::Rgba8Unorm),
        ];
        match check_formats(kernels, TextureFormat::Bgra8Unorm) {
            Err(ResourceError::FormatMismatch { expected, found }) => {
                assert_eq!(expected, "Bgra8Unorm (fx_sepia)");
                assert_eq!(found, "Rgba8Unorm");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
