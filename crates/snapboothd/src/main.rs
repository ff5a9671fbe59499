use anyhow::{Context, Result};
use snapbooth_core::{BoothMachine, PresenceProbe};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod camera_feed;
mod config;
mod dbus_interface;
mod perception;
mod renderer;
mod transport;

use camera_feed::LiveCompositor;
use config::Config;
use dbus_interface::BoothService;
use perception::JsonLineDetector;
use renderer::TerminalRenderer;
use transport::{HttpSettings, HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // stdout belongs to the booth display
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "snapboothd starting");

    let config = Config::load().context("invalid configuration")?;
    tracing::info!(
        device = %config.camera_device,
        countdown_secs = config.countdown_secs,
        result_secs = config.result_secs,
        debounce_frames = config.debounce_frames,
        "configuration loaded"
    );

    let feed = camera_feed::spawn_camera(
        &config.camera_device,
        config.frame_width,
        config.frame_height,
    )
    .with_context(|| format!("failed to open camera {}", config.camera_device))?;
    let compositor = LiveCompositor::new(feed, config.frame_max_age(), config.print_style());

    let transport = HttpTransport::new(HttpSettings::from_config(&config)?)
        .context("failed to build upload client")?;

    let (machine, booth) = BoothMachine::new(
        config.booth(),
        Box::new(compositor),
        Arc::new(transport),
        Box::new(TerminalRenderer::new(std::io::stdout())),
    )?;
    let machine_task = tokio::spawn(machine.run());

    let probe = PresenceProbe::new(JsonLineDetector, config.probe_settings());
    perception::spawn_stdin(probe, booth.clone()).context("failed to start perception thread")?;

    let _connection = if config.dbus_enabled {
        let connection = zbus::connection::Builder::session()?
            .name(dbus_interface::BUS_NAME)?
            .serve_at(dbus_interface::OBJECT_PATH, BoothService::new(booth.clone()))?
            .build()
            .await
            .context("failed to register on the session bus")?;
        tracing::info!(
            name = dbus_interface::BUS_NAME,
            path = dbus_interface::OBJECT_PATH,
            "D-Bus interface registered"
        );
        Some(connection)
    } else {
        tracing::info!("D-Bus disabled via SNAPBOOTH_DBUS_ENABLED=0");
        None
    };

    tracing::info!("snapboothd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("snapboothd shutting down");

    if booth.shutdown().await.is_err() {
        tracing::warn!("booth machine already stopped");
    }
    machine_task.await.context("booth machine task failed")?;

    Ok(())
}
