mod barometer;
mod cadence;
mod config;
mod convert;
mod decode;
mod dispatch;
mod display;
mod error;
mod stream;
mod upload;
mod weather;

use crate::barometer::FallbackBarometer;
use crate::cadence::{CadenceGate, Clock, SystemClock};
use crate::config::Config;
use crate::dispatch::{DispatchSettings, Dispatcher, RelayContext};
use crate::stream::RawLine;
use crate::upload::Uploader;
use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc;

fn init_tracing() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,weather_relay=info".into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!(err.to_string()))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let config = Config::from_env()?;
    tracing::info!(
        primary = %config.primary_url,
        secondary = %config.secondary_url,
        secondary_interval_minutes = config.secondary_interval_minutes,
        upload_enabled = config.upload_enabled,
        source_zone = %config.source_zone,
        "weather relay starting"
    );

    let clock = SystemClock;
    let context = RelayContext::new(
        config.primary_destination(),
        config.secondary_destination(),
        CadenceGate::new(config.secondary_interval_minutes, clock.minute()),
    );
    let uploader =
        Uploader::new(config.upload_timeout(), config.upload_enabled).context("http client")?;
    let display = display::open(config.display_fb.as_deref(), config.display_rotation);
    let barometer = FallbackBarometer::from_config(
        config.barometer_path.as_deref(),
        config.barometer_scale,
        config.static_pressure_hpa,
    );
    let mut dispatcher = Dispatcher::new(
        context,
        uploader,
        display,
        barometer,
        Box::new(clock),
        DispatchSettings {
            poll_interval: config.poll_interval(),
            glyph_hold: config.glyph_hold(),
            source_zone: config.source_zone,
        },
    );
    dispatcher.power_up();

    let (line_tx, line_rx) = mpsc::channel::<RawLine>(config.queue_capacity);
    let reader = stream::spawn_reader(
        &config.receiver_command(),
        config.stream_stall_timeout(),
        line_tx,
    )?;

    let interrupted = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            true
        }
        _ = dispatcher.run(line_rx) => false,
    };

    let totals = dispatcher.context().totals();
    tracing::info!(
        good = totals.success,
        failed = totals.failure,
        counters = ?dispatcher.counters(),
        "weather relay stopping"
    );

    if interrupted {
        reader.abort();
        return Ok(());
    }

    // The loop only ends on its own once the reader has dropped its sender.
    let reason = reader.await.context("sensor reader task panicked")?;
    tracing::error!(error = %reason, "sensor stream ended");
    Err(reason.into())
}
