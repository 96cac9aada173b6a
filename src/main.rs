// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "image-filters")]
#[command(about = "Apply chains of GPU compute filters to images and camera streams")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered filter kernels
    List,

    /// Filter a still image
    Apply {
        /// Input image
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (default: filtered_TIMESTAMP.png next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Enable a filter by name; may be repeated. Filters run in list order.
        #[arg(short, long = "filter")]
        filters: Vec<String>,

        /// Enable every discovered filter
        #[arg(long)]
        all: bool,
    },

    /// Run the live stream from the synthetic camera into an offscreen target
    Stream {
        /// Stop after this many frames (default: run until Ctrl+C)
        #[arg(long)]
        frames: Option<u64>,

        /// Start with the invert filter off
        #[arg(long)]
        no_invert: bool,

        /// Frame width (default: from config)
        #[arg(long)]
        width: Option<u32>,

        /// Frame height (default: from config)
        #[arg(long)]
        height: Option<u32>,

        /// Save the last presented frame to this file
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=image_filters=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => cli::list_kernels(&config),
        Commands::Apply {
            input,
            output,
            filters,
            all,
        } => cli::apply_filters(&config, &input, output, &filters, all),
        Commands::Stream {
            frames,
            no_invert,
            width,
            height,
            snapshot,
        } => cli::run_stream(
            &config,
            cli::StreamArgs {
                frames,
                invert: !no_invert && config.stream.invert,
                width: width.unwrap_or(config.stream.width),
                height: height.unwrap_or(config.stream.height),
                snapshot,
            },
        ),
    }
}
