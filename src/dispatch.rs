use crate::barometer::FallbackBarometer;
use crate::cadence::{CadenceGate, Clock};
use crate::decode::{decode_line, IndoorReading, OutdoorReading, SensorEvent};
use crate::display::{DisplaySink, Glyph, Rgb};
use crate::error::UploadError;
use crate::stream::RawLine;
use crate::upload::{Destination, UploadOutcome, UploadStats, Uploader};
use crate::weather::{indoor_status_text, DerivedOutdoorMetrics, SourceZone};
use std::time::Duration;
use tokio::sync::mpsc;

/// Upload state owned by the dispatch loop: destinations, cadence and
/// outcome counters. Built once at startup.
#[derive(Debug)]
pub struct RelayContext {
    pub primary: Destination,
    pub secondary: Destination,
    pub cadence: CadenceGate,
    pub primary_stats: UploadStats,
    pub secondary_stats: UploadStats,
}

impl RelayContext {
    pub fn new(primary: Destination, secondary: Destination, cadence: CadenceGate) -> Self {
        Self {
            primary,
            secondary,
            cadence,
            primary_stats: UploadStats::default(),
            secondary_stats: UploadStats::default(),
        }
    }

    pub fn totals(&self) -> UploadStats {
        UploadStats {
            success: self.primary_stats.success + self.secondary_stats.success,
            failure: self.primary_stats.failure + self.secondary_stats.failure,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchCounters {
    pub lines: u64,
    pub indoor: u64,
    pub outdoor: u64,
    pub decode_errors: u64,
    pub compute_errors: u64,
    pub idle_pulses: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub poll_interval: Duration,
    pub glyph_hold: Duration,
    pub source_zone: SourceZone,
}

pub struct Dispatcher {
    context: RelayContext,
    uploader: Uploader,
    display: Box<dyn DisplaySink + Send>,
    barometer: FallbackBarometer,
    clock: Box<dyn Clock + Send>,
    settings: DispatchSettings,
    counters: DispatchCounters,
}

impl Dispatcher {
    pub fn new(
        context: RelayContext,
        uploader: Uploader,
        display: Box<dyn DisplaySink + Send>,
        barometer: FallbackBarometer,
        clock: Box<dyn Clock + Send>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            context,
            uploader,
            display,
            barometer,
            clock,
            settings,
            counters: DispatchCounters::default(),
        }
    }

    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    pub fn counters(&self) -> DispatchCounters {
        self.counters
    }

    pub fn power_up(&mut self) {
        self.show_message("Power Up", Rgb::RED, Rgb::OFF);
        self.clear_display();
    }

    /// Drains the hand-off queue until every producer is gone. Waits at most
    /// one poll interval per receive so idle time is still accounted for.
    pub async fn run(&mut self, mut rx: mpsc::Receiver<RawLine>) {
        tracing::info!(
            interval_minutes = self.context.cadence.interval_minutes(),
            "dispatch loop started"
        );
        loop {
            match tokio::time::timeout(self.settings.poll_interval, rx.recv()).await {
                Err(_) => {
                    self.counters.idle_pulses += 1;
                    tracing::trace!(pulse = self.counters.idle_pulses, "waiting for sensor data");
                }
                Ok(None) => {
                    tracing::warn!(
                        lines = self.counters.lines,
                        outdoor = self.counters.outdoor,
                        "hand-off queue closed; dispatch loop stopping"
                    );
                    return;
                }
                Ok(Some(line)) => self.handle_line(line).await,
            }
        }
    }

    pub async fn handle_line(&mut self, mut line: RawLine) {
        self.counters.lines += 1;
        let channel = line.channel.as_str();
        match decode_line(&mut line) {
            Ok(None) => {
                tracing::trace!(channel, "ignoring non-sensor line");
            }
            Ok(Some(SensorEvent::Indoor(reading))) => self.handle_indoor(&reading),
            Ok(Some(SensorEvent::Outdoor(reading))) => self.handle_outdoor(&reading).await,
            Err(err) => {
                self.counters.decode_errors += 1;
                tracing::warn!(
                    channel,
                    error = %err,
                    len = line.bytes.len(),
                    "dropping undecodable sensor line"
                );
            }
        }
    }

    fn handle_indoor(&mut self, reading: &IndoorReading) {
        self.counters.indoor += 1;
        let text = indoor_status_text(reading);
        tracing::info!(
            temperature_f = reading.temperature_f,
            humidity_pct = reading.humidity_pct,
            "indoor reading"
        );
        self.show_message(&text, Rgb::YELLOW, Rgb::DARK_GREEN);
        self.clear_display();
    }

    async fn handle_outdoor(&mut self, reading: &OutdoorReading) {
        self.counters.outdoor += 1;
        let pressure_hpa = self.barometer.read();
        let metrics =
            match DerivedOutdoorMetrics::derive(reading, pressure_hpa, self.settings.source_zone) {
                Ok(metrics) => metrics,
                Err(err) => {
                    self.counters.compute_errors += 1;
                    tracing::warn!(error = %err, ?reading, "dropping outdoor reading");
                    return;
                }
            };

        let fields = metrics.wire_fields();
        tracing::info!(
            dateutc = %fields.dateutc,
            tempf = %fields.tempf,
            humidity = %fields.humidity,
            dewptf = %fields.dewptf,
            winddir = %fields.winddir,
            windspeedmph = %fields.windspeedmph,
            windgustmph = %fields.windgustmph,
            dailyrainin = %fields.dailyrainin,
            uv = %fields.uv,
            baromin = %fields.baromin,
            light = %fields.light,
            "outdoor reading"
        );
        self.show_message(&metrics.status_text(), Rgb::YELLOW, Rgb::DARK_BLUE);
        self.clear_display();

        let primary = self.uploader.send(&self.context.primary, &metrics).await;
        self.context.primary_stats.record(&primary);
        log_upload(&self.context.primary, &primary);
        match &primary {
            Ok(UploadOutcome::Accepted) => self.flash_glyph(Glyph::Plus).await,
            Ok(UploadOutcome::DryRun) => {}
            Err(_) => self.flash_glyph(Glyph::ArrowUp).await,
        }
        tracing::info!(
            primary_good = self.context.primary_stats.success,
            primary_failed = self.context.primary_stats.failure,
            secondary_good = self.context.secondary_stats.success,
            secondary_failed = self.context.secondary_stats.failure,
            "upload counts"
        );

        let minute = self.clock.minute();
        if self.context.cadence.admit(minute) {
            tracing::info!(minute, "interval mark reached; uploading to secondary");
            let secondary = self.uploader.send(&self.context.secondary, &metrics).await;
            self.context.secondary_stats.record(&secondary);
            log_upload(&self.context.secondary, &secondary);
        } else {
            tracing::debug!(minute, "skipping secondary upload this reading");
        }
    }

    async fn flash_glyph(&mut self, glyph: Glyph) {
        if let Err(err) = self.display.show_glyph(glyph) {
            tracing::warn!(error = %err, ?glyph, "display glyph failed");
            return;
        }
        if !self.settings.glyph_hold.is_zero() {
            tokio::time::sleep(self.settings.glyph_hold).await;
        }
        self.clear_display();
    }

    fn show_message(&mut self, text: &str, fg: Rgb, bg: Rgb) {
        if let Err(err) = self.display.show_message(text, fg, bg) {
            tracing::warn!(error = %err, text, "display message failed");
        }
    }

    fn clear_display(&mut self) {
        if let Err(err) = self.display.clear() {
            tracing::warn!(error = %err, "display clear failed");
        }
    }
}

fn log_upload(destination: &Destination, result: &Result<UploadOutcome, UploadError>) {
    match result {
        Ok(outcome) => tracing::debug!(destination = destination.name(), ?outcome, "upload done"),
        Err(err) => tracing::warn!(destination = destination.name(), error = %err, "upload failed"),
    }
}
