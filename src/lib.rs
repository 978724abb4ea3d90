// Lenscast - webcam relay, overlay and recording appliance
// Main library entry point

pub mod commands;
pub mod config;
pub mod devices;
pub mod encoding;
pub mod gstreamer_init;
pub mod notifications;
pub mod overlay;
pub mod pipeline;
pub mod recording;
pub mod storage;
pub mod video;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::commands::Appliance;
use crate::config::Config;
use crate::devices::{GstSinkBackend, GstSourceBackend};
use crate::encoding::FfmpegLauncher;
use crate::pipeline::Backends;

/// Command-line options for `run`
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_path: Option<PathBuf>,
    pub verbose: bool,
    pub print_config: bool,
}

/// Load config, start the appliance, and run until Ctrl-C
pub fn run(options: RunOptions) -> anyhow::Result<()> {
    let default_filter = if options.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(config::default_config_path);
    let config = Config::load_or_default(&config_path);

    if options.print_config {
        print!("{}", toml::to_string_pretty(&config)?);
        return Ok(());
    }

    config.validate().context("invalid configuration")?;

    gstreamer_init::init_gstreamer_env();
    if !gstreamer_init::is_gstreamer_available() {
        anyhow::bail!("GStreamer is not available; cannot open camera or virtual camera");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("lenscast-rt")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let backends = Backends {
        source: Arc::new(GstSourceBackend::new()),
        sink: Arc::new(GstSinkBackend::new()),
        encoder: Box::new(FfmpegLauncher::from_config(&config)),
    };

    log::info!(
        "Relaying {} -> {} at {}@{}fps, output in {}",
        config.camera_device,
        config.virtual_device,
        config.resolution,
        config.fps,
        config.output_root.display()
    );

    // Device opening can block for a few seconds
    let appliance = tokio::task::spawn_blocking(move || Appliance::launch(config, backends))
        .await
        .context("launch task failed")?
        .context("failed to start the frame pipeline")?;
    let refresher = appliance.spawn_stats_refresher();

    log::info!("Lenscast running, press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    log::info!("Shutting down");

    let handle = appliance.clone();
    tokio::task::spawn_blocking(move || handle.shutdown())
        .await
        .context("shutdown task failed")?;
    refresher.abort();

    Ok(())
}
