use crate::stream::ReceiverCommand;
use crate::upload::{Destination, DestinationKind};
use crate::weather::SourceZone;
use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

const DEFAULT_PRIMARY_URL: &str =
    "https://rtupdate.wunderground.com/weatherstation/updateweatherstation.php";
const DEFAULT_SECONDARY_URL: &str =
    "https://pwsweather.com/weatherstation/updateweatherstation.php";
const DEFAULT_RTL433_BIN: &str = "/usr/local/bin/rtl_433";
// 146 = FT-020T WeatherRack2, 147 = F016TH temperature/humidity.
const DEFAULT_RTL433_PROTOCOLS: &str = "146,147";

/// Station credentials as they may appear in the setup file.
#[derive(Debug, Clone, Default, Deserialize)]
struct SetupConfigOverrides {
    #[serde(default)]
    wu_station_id: Option<String>,
    #[serde(default)]
    wu_station_key: Option<String>,
    #[serde(default)]
    pws_station_id: Option<String>,
    #[serde(default)]
    pws_station_key: Option<String>,
    #[serde(default)]
    secondary_interval_minutes: Option<u32>,
    #[serde(default)]
    source_timezone: Option<String>,
}

fn load_setup_config_overrides(path: &Path) -> Option<SetupConfigOverrides> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "setup config not found; using environment only");
        return None;
    }
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to read setup config; using environment only"
            );
            return None;
        }
    };
    let mut bytes = contents.into_bytes();
    match simd_json::serde::from_slice(&mut bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(
                path = %path.display(),
                error = %err,
                "failed to parse setup config; using environment only"
            );
            None
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub wu_station_id: String,
    pub wu_station_key: String,
    pub pws_station_id: String,
    pub pws_station_key: String,
    pub primary_url: Url,
    pub secondary_url: Url,
    pub secondary_interval_minutes: u32,
    pub upload_enabled: bool,
    pub upload_timeout_secs: u64,

    pub rtl433_bin: String,
    pub rtl433_protocols: Vec<String>,
    pub queue_capacity: usize,
    pub poll_interval_ms: u64,
    pub stream_stall_secs: u64,
    pub source_zone: SourceZone,

    pub display_fb: Option<PathBuf>,
    pub display_rotation: u16,
    pub glyph_hold_ms: u64,

    pub barometer_path: Option<PathBuf>,
    pub barometer_scale: f64,
    pub static_pressure_hpa: f64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let overrides = env_optional("RELAY_SETUP_CONFIG_PATH")
            .and_then(|path| load_setup_config_overrides(Path::new(&path)))
            .unwrap_or_default();

        let wu_station_id = env_or_setup("WU_STATION_ID", overrides.wu_station_id.as_deref());
        let wu_station_key = env_or_setup("WU_STATION_KEY", overrides.wu_station_key.as_deref());
        let pws_station_id = env_or_setup("PWS_STATION_ID", overrides.pws_station_id.as_deref());
        let pws_station_key =
            env_or_setup("PWS_STATION_KEY", overrides.pws_station_key.as_deref());

        let primary_url = parse_url(
            "RELAY_PRIMARY_URL",
            &env_string("RELAY_PRIMARY_URL", DEFAULT_PRIMARY_URL),
        )?;
        let secondary_url = parse_url(
            "RELAY_SECONDARY_URL",
            &env_string("RELAY_SECONDARY_URL", DEFAULT_SECONDARY_URL),
        )?;

        let secondary_interval_minutes = match env_optional("RELAY_SECONDARY_INTERVAL_MINUTES") {
            Some(raw) => raw
                .parse::<u32>()
                .context("invalid RELAY_SECONDARY_INTERVAL_MINUTES")?,
            None => overrides.secondary_interval_minutes.unwrap_or(2),
        };

        let source_zone_raw = env_optional("RELAY_SOURCE_TIMEZONE")
            .or(overrides.source_timezone)
            .unwrap_or_else(|| "local".to_string());
        let source_zone = source_zone_raw
            .parse::<SourceZone>()
            .map_err(|err| anyhow!("invalid RELAY_SOURCE_TIMEZONE: {err}"))?;

        let rtl433_protocols = env_string("RELAY_RTL433_PROTOCOLS", DEFAULT_RTL433_PROTOCOLS)
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            wu_station_id,
            wu_station_key,
            pws_station_id,
            pws_station_key,
            primary_url,
            secondary_url,
            secondary_interval_minutes,
            upload_enabled: env_bool("RELAY_UPLOAD_ENABLED", true)?,
            upload_timeout_secs: env_u64("RELAY_UPLOAD_TIMEOUT_SECS", 10)?,
            rtl433_bin: env_string("RELAY_RTL433_BIN", DEFAULT_RTL433_BIN),
            rtl433_protocols,
            queue_capacity: env_u64("RELAY_QUEUE_CAPACITY", 1024)? as usize,
            poll_interval_ms: env_u64("RELAY_POLL_INTERVAL_MS", 1000)?,
            stream_stall_secs: env_u64("RELAY_STREAM_STALL_SECS", 600)?,
            source_zone,
            display_fb: env_optional("RELAY_DISPLAY_FB").map(PathBuf::from),
            display_rotation: env_u16("RELAY_DISPLAY_ROTATION", 90)?,
            glyph_hold_ms: env_u64("RELAY_GLYPH_HOLD_MS", 1000)?,
            barometer_path: env_optional("RELAY_BAROMETER_PATH").map(PathBuf::from),
            barometer_scale: env_f64("RELAY_BAROMETER_SCALE", 10.0)?,
            static_pressure_hpa: env_f64("RELAY_STATIC_PRESSURE_HPA", 1013.25)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Checks everything the agent cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.wu_station_id.is_empty() || self.wu_station_key.is_empty() {
            bail!("missing Weather Underground station id or key (WU_STATION_ID / WU_STATION_KEY)");
        }
        if self.pws_station_id.is_empty() || self.pws_station_key.is_empty() {
            bail!("missing PWSweather station id or key (PWS_STATION_ID / PWS_STATION_KEY)");
        }
        if self.secondary_interval_minutes == 0 {
            bail!("RELAY_SECONDARY_INTERVAL_MINUTES must be at least 1");
        }
        if self.queue_capacity == 0 {
            bail!("RELAY_QUEUE_CAPACITY must be at least 1");
        }
        if self.rtl433_protocols.is_empty() {
            bail!("RELAY_RTL433_PROTOCOLS must name at least one decoder");
        }
        if !matches!(self.display_rotation, 0 | 90 | 180 | 270) {
            bail!("RELAY_DISPLAY_ROTATION must be 0, 90, 180 or 270");
        }
        Ok(())
    }

    pub fn primary_destination(&self) -> Destination {
        Destination {
            kind: DestinationKind::Primary,
            endpoint: self.primary_url.clone(),
            station_id: self.wu_station_id.clone(),
            station_key: self.wu_station_key.clone(),
        }
    }

    pub fn secondary_destination(&self) -> Destination {
        Destination {
            kind: DestinationKind::Secondary,
            endpoint: self.secondary_url.clone(),
            station_id: self.pws_station_id.clone(),
            station_key: self.pws_station_key.clone(),
        }
    }

    pub fn receiver_command(&self) -> ReceiverCommand {
        ReceiverCommand {
            program: self.rtl433_bin.clone(),
            protocols: self.rtl433_protocols.clone(),
        }
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn stream_stall_timeout(&self) -> Option<Duration> {
        (self.stream_stall_secs > 0).then(|| Duration::from_secs(self.stream_stall_secs))
    }

    pub fn glyph_hold(&self) -> Duration {
        Duration::from_millis(self.glyph_hold_ms)
    }
}

fn env_string(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

fn env_or_setup(key: &str, setup: Option<&str>) -> String {
    env_optional(key)
        .or_else(|| {
            setup
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_default()
}

fn env_u64(key: &str, default: u64) -> Result<u64> {
    match env_optional(key) {
        Some(value) => value.parse::<u64>().with_context(|| format!("invalid {key}")),
        None => Ok(default),
    }
}

fn env_u16(key: &str, default: u16) -> Result<u16> {
    let value = env_u64(key, u64::from(default))?;
    u16::try_from(value).with_context(|| format!("invalid {key}: {value} is out of range"))
}

fn env_f64(key: &str, default: f64) -> Result<f64> {
    match env_optional(key) {
        Some(value) => value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| anyhow!("invalid {key}")),
        None => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_optional(key) {
        Some(value) => parse_bool(&value).ok_or_else(|| anyhow!("invalid {key}: {value:?}")),
        None => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_url(key: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).with_context(|| format!("invalid {key}"))
}

fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
