// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use image_filters::constants::{gpu, kernels, stream};

#[test]
fn test_execution_widths_are_usable_group_widths() {
    for vendor in [
        gpu::VENDOR_NVIDIA,
        gpu::VENDOR_AMD,
        gpu::VENDOR_INTEL,
        gpu::VENDOR_APPLE,
        0,
    ] {
        let width = gpu::execution_width_for_vendor(vendor);
        assert!(width.is_power_of_two(), "vendor {:#x}", vendor);
        // Fits the WebGPU default of 256 invocations per group
        assert!(width <= 256);
    }
}

#[test]
fn test_unknown_vendor_uses_fallback() {
    assert_eq!(
        gpu::execution_width_for_vendor(0xFFFF),
        gpu::FALLBACK_EXECUTION_WIDTH
    );
}

#[test]
fn test_kernel_names_follow_prefix() {
    assert!(kernels::INVERT.starts_with(kernels::DEFAULT_PREFIX));
    assert!(kernels::POSTERIZE.starts_with(kernels::DEFAULT_PREFIX));
}

#[test]
fn test_posterize_default_is_usable() {
    assert!(kernels::DEFAULT_POSTERIZE_LEVELS >= kernels::MIN_POSTERIZE_LEVELS);
    assert!(kernels::MIN_POSTERIZE_LEVELS >= 2.0);
}

#[test]
fn test_bindings_do_not_collide() {
    assert_ne!(kernels::INPUT_BINDING, kernels::OUTPUT_BINDING);
    assert_ne!(kernels::TEXTURE_GROUP, kernels::PARAMS_GROUP);
}

#[test]
fn test_stream_defaults() {
    assert!(stream::DEFAULT_WIDTH > 0 && stream::DEFAULT_HEIGHT > 0);
    assert!(stream::DEFAULT_FRAMERATE > 0);
    assert_eq!(stream::BYTES_PER_PIXEL, 4);
}
