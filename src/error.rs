use std::time::Duration;
use thiserror::Error;

/// Why the sensor stream stopped. Every variant is fatal for the agent.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sensor stream closed (receiver exited: {status})")]
    Closed { status: String },

    #[error("sensor stream stalled: no output for {}s", .idle.as_secs())]
    Stalled { idle: Duration },

    #[error("failed to read sensor stream: {0}")]
    Read(#[from] std::io::Error),

    #[error("hand-off queue closed by consumer")]
    QueueClosed,
}

/// A line that looked like a sensor event but could not be turned into one.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed {kind} payload: {source}")]
    Json {
        kind: &'static str,
        #[source]
        source: simd_json::Error,
    },

    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ComputeError {
    #[error("dew point undefined for relative humidity {0}%")]
    NonPositiveHumidity(f64),

    #[error("dew point undefined for temperature {temp_c}C at {humidity_pct}% humidity")]
    DewPointSingular { temp_c: f64, humidity_pct: f64 },

    #[error("non-finite {quantity} derived from sensor reading")]
    NonFinite { quantity: &'static str },

    #[error("sensor time {0} does not exist or is ambiguous in the source timezone")]
    LocalTime(String),
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{destination} returned HTTP {status}: {body}")]
    Status {
        destination: &'static str,
        status: u16,
        body: String,
    },

    #[error("{destination} request failed: {source}")]
    Transport {
        destination: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display device {path}: {source}")]
    Device {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum BarometerError {
    #[error("failed to read pressure from {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unparseable pressure value {value:?} in {path}")]
    Parse { path: String, value: String },
}
