// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing discovered kernels
//! - Filtering still images
//! - Running the live stream headless

use chrono::Local;
use image_filters::backends::camera::SyntheticCamera;
use image_filters::constants::still::{OUTPUT_EXTENSION, OUTPUT_PREFIX};
use image_filters::pipelines::{OffscreenTarget, PresentationHandle, StreamPipeline, StreamState};
use image_filters::{Config, GpuContext, KernelRegistry, StillImagePipeline};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Load the config from `path`, or from the default location
pub fn load_config(path: Option<&Path>) -> Result<Config, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

fn create_context(config: &Config) -> Result<Arc<GpuContext>, Box<dyn std::error::Error>> {
    let ctx = GpuContext::new_blocking("image-filters", config.gpu_preference)?;
    let info = ctx.info();
    println!("GPU: {} ({:?})", info.adapter_name, info.backend);
    Ok(ctx)
}

fn load_registry(
    ctx: &GpuContext,
    config: &Config,
) -> Result<KernelRegistry, Box<dyn std::error::Error>> {
    let library = config.load_shader_library()?;
    let registry = KernelRegistry::load_available_kernels(
        ctx,
        &library,
        &config.kernel_prefix,
        &config.kernel_options(),
    )?;
    Ok(registry)
}

/// List discovered kernels
pub fn list_kernels(config: &Config) -> CliResult {
    let ctx = create_context(config)?;
    let registry = load_registry(&ctx, config)?;

    if registry.is_empty() {
        println!("No kernels with prefix '{}' found.", config.kernel_prefix);
        return Ok(());
    }

    println!("Available filters:");
    println!();
    for kernel in registry.kernels() {
        let group = kernel.workgroup();
        print!("  {:<16} group {}x{}", kernel.name(), group.width, group.height);
        if let Some(binder) = kernel.binder() {
            print!("  ({})", binder.params());
        }
        println!();
    }

    Ok(())
}

/// Filter a still image with the named kernels enabled
pub fn apply_filters(
    config: &Config,
    input: &Path,
    output: Option<PathBuf>,
    filters: &[String],
    all: bool,
) -> CliResult {
    let image = image::open(input)?;
    println!("Input: {} ({}x{})", input.display(), image.width(), image.height());

    let ctx = create_context(config)?;
    let registry = load_registry(&ctx, config)?;

    let mut chain = registry.selection();
    if all {
        chain.set_all(true);
    }
    for name in filters {
        if !chain.set_enabled(name, true) {
            return Err(format!(
                "Unknown filter '{}'. Available: {}",
                name,
                registry.names().join(", ")
            )
            .into());
        }
    }

    let enabled = chain.enabled_names();
    if enabled.is_empty() {
        println!("Filters: none (pass-through)");
    } else {
        println!("Filters: {}", enabled.join(" -> "));
    }

    let pipeline = StillImagePipeline::new(ctx);
    let start = Instant::now();
    let filtered = pipeline.try_apply(&chain, &image)?;
    println!("Filtered in {} ms", start.elapsed().as_millis());

    let output_path = match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            path
        }
        None => default_output_path(input),
    };
    filtered.save(&output_path)?;
    println!("Saved: {}", output_path.display());

    Ok(())
}

fn default_output_path(input: &Path) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let dir = input.parent().unwrap_or_else(|| Path::new("."));
    dir.join(format!("{}_{}.{}", OUTPUT_PREFIX, timestamp, OUTPUT_EXTENSION))
}

/// Options for the `stream` command after merging with the config
pub struct StreamArgs {
    pub frames: Option<u64>,
    pub invert: bool,
    pub width: u32,
    pub height: u32,
    pub snapshot: Option<PathBuf>,
}

/// Run the synthetic camera through the stream pipeline
pub fn run_stream(config: &Config, args: StreamArgs) -> CliResult {
    let ctx = create_context(config)?;
    let library = config.load_shader_library()?;
    let target = OffscreenTarget::new(Arc::clone(&ctx), args.width, args.height)?;

    let mut camera = SyntheticCamera::new(args.width, args.height, config.stream.framerate);
    if let Some(frames) = args.frames {
        camera = camera.with_frame_limit(frames);
    }

    let mut pipeline = StreamPipeline::new(
        ctx,
        library,
        config.kernel_options(),
        PresentationHandle::new(&target),
        args.invert,
    );

    println!(
        "Streaming {}x{} @ {}fps, invert {}",
        args.width,
        args.height,
        config.stream.framerate,
        if args.invert { "on" } else { "off" }
    );

    if pipeline.start(Box::new(camera)) == StreamState::Inoperative {
        return Err("Stream pipeline could not be configured (run with RUST_LOG=warn for details)".into());
    }

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = Arc::clone(&stop_flag);
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    println!("Running... (press Ctrl+C to stop)");
    let start = Instant::now();
    while pipeline.is_running() {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping...");
            break;
        }

        let stats = pipeline.stats();
        print!(
            "\rFrames: {} presented, {} dropped",
            stats.presented, stats.dropped
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    pipeline.stop();

    let stats = pipeline.stats();
    let elapsed = start.elapsed().as_secs_f64();
    println!();
    println!(
        "Presented {} frames, dropped {} in {:.1}s ({:.1} fps)",
        stats.presented,
        stats.dropped,
        elapsed,
        stats.presented as f64 / elapsed.max(f64::EPSILON)
    );

    if let Some(path) = args.snapshot {
        target.snapshot()?.save(&path)?;
        println!("Snapshot saved: {}", path.display());
    }

    Ok(())
}
