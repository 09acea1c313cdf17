use crate::error::DecodeError;
use crate::stream::RawLine;
use chrono::NaiveDateTime;
use serde::Deserialize;

const INDOOR_MODELS: [&str; 2] = ["F007TH", "F016TH"];
const OUTDOOR_MODELS: [&str; 2] = ["FT0300", "FT020T"];

pub const SENSOR_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Unknown,
    Indoor,
    Outdoor,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Unknown => "unknown",
            EventKind::Indoor => "indoor",
            EventKind::Outdoor => "outdoor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    Indoor(IndoorReading),
    Outdoor(OutdoorReading),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IndoorReading {
    #[serde(rename = "humidity")]
    pub humidity_pct: f64,
    #[serde(rename = "temperature_F")]
    pub temperature_f: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutdoorReading {
    pub timestamp: NaiveDateTime,
    pub humidity_pct: f64,
    pub temperature_raw: i64,
    pub wind_dir_deg: f64,
    pub avg_wind_raw: f64,
    pub gust_wind_raw: f64,
    pub cumulative_rain_raw: f64,
    pub uv_raw: f64,
    pub light: f64,
}

#[derive(Debug, Deserialize)]
struct OutdoorPayload<'a> {
    #[serde(borrow)]
    time: &'a str,
    humidity: f64,
    temperature: i64,
    winddirection: f64,
    avewindspeed: f64,
    gustwindspeed: f64,
    cumulativerain: f64,
    uv: f64,
    light: f64,
}

/// Picks the event shape from the sensor model name embedded in the line.
/// Indoor models are checked first; a line naming both kinds decodes as indoor.
pub fn classify(line: &str) -> EventKind {
    if INDOOR_MODELS.iter().any(|model| line.contains(model)) {
        EventKind::Indoor
    } else if OUTDOOR_MODELS.iter().any(|model| line.contains(model)) {
        EventKind::Outdoor
    } else {
        EventKind::Unknown
    }
}

/// Classifies and decodes one raw line. `Ok(None)` means the line is not a
/// sensor event at all (receiver chatter, other models) and is not an error.
pub fn decode_line(line: &mut RawLine) -> Result<Option<SensorEvent>, DecodeError> {
    let kind = classify(&String::from_utf8_lossy(&line.bytes));
    decode(kind, &mut line.bytes)
}

pub fn decode(kind: EventKind, payload: &mut [u8]) -> Result<Option<SensorEvent>, DecodeError> {
    match kind {
        EventKind::Unknown => Ok(None),
        EventKind::Indoor => {
            let reading: IndoorReading =
                simd_json::from_slice(payload).map_err(|source| DecodeError::Json {
                    kind: kind.as_str(),
                    source,
                })?;
            Ok(Some(SensorEvent::Indoor(reading)))
        }
        EventKind::Outdoor => {
            let raw: OutdoorPayload =
                simd_json::from_slice(payload).map_err(|source| DecodeError::Json {
                    kind: kind.as_str(),
                    source,
                })?;
            let timestamp = NaiveDateTime::parse_from_str(raw.time.trim(), SENSOR_TIME_FORMAT)
                .map_err(|source| DecodeError::Timestamp {
                    value: raw.time.to_string(),
                    source,
                })?;
            Ok(Some(SensorEvent::Outdoor(OutdoorReading {
                timestamp,
                humidity_pct: raw.humidity,
                temperature_raw: raw.temperature,
                wind_dir_deg: raw.winddirection,
                avg_wind_raw: raw.avewindspeed,
                gust_wind_raw: raw.gustwindspeed,
                cumulative_rain_raw: raw.cumulativerain,
                uv_raw: raw.uv,
                light: raw.light,
            })))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::outdoor_line;
    use super::*;
    use crate::stream::Channel;
    use serde_json::json;

    fn raw(text: &str) -> RawLine {
        RawLine {
            channel: Channel::Stdout,
            bytes: text.as_bytes().to_vec(),
        }
    }

    #[test]
    fn classify_by_model_marker() {
        assert_eq!(classify(r#"{"model":"Fine Offset F007TH"}"#), EventKind::Indoor);
        assert_eq!(classify(r#"{"model":"SwitchDoc F016TH"}"#), EventKind::Indoor);
        assert_eq!(classify(r#"{"model":"SwitchDoc FT020T"}"#), EventKind::Outdoor);
        assert_eq!(classify(r#"{"model":"FT0300"}"#), EventKind::Outdoor);
        assert_eq!(classify("rtl_433 version 22.11 inputs file rtl_tcp"), EventKind::Unknown);
    }

    #[test]
    fn classify_prefers_indoor_when_both_markers_present() {
        assert_eq!(classify("F016TH FT020T"), EventKind::Indoor);
    }

    #[test]
    fn indoor_line_decodes_exact_values() {
        let payload = json!({"model": "SwitchDoc F016TH", "humidity": 41, "temperature_F": 71.6});
        let mut line = raw(&payload.to_string());
        let event = decode_line(&mut line).expect("decode").expect("event");
        assert_eq!(
            event,
            SensorEvent::Indoor(IndoorReading {
                humidity_pct: 41.0,
                temperature_f: 71.6,
            })
        );
    }

    #[test]
    fn outdoor_line_decodes_all_fields() {
        let mut line = raw(&outdoor_line());
        let event = decode_line(&mut line).expect("decode").expect("event");
        let SensorEvent::Outdoor(reading) = event else {
            panic!("expected outdoor reading, got {event:?}");
        };
        assert_eq!(reading.timestamp.to_string(), "2024-06-01 14:32:10");
        assert_eq!(reading.temperature_raw, 650);
        assert_eq!(reading.humidity_pct, 50.0);
        assert_eq!(reading.wind_dir_deg, 270.0);
        assert_eq!(reading.avg_wind_raw, 10.0);
        assert_eq!(reading.gust_wind_raw, 20.0);
        assert_eq!(reading.cumulative_rain_raw, 254.0);
        assert_eq!(reading.uv_raw, 35.0);
        assert_eq!(reading.light, 12000.0);
    }

    #[test]
    fn unrelated_line_is_not_an_error() {
        let mut line = raw("Tuned to 433.920MHz.");
        assert!(decode_line(&mut line).expect("decode").is_none());
    }

    #[test]
    fn invalid_json_with_outdoor_marker_is_decode_error() {
        let mut line = raw(r#"{"model": "FT020T", "temperature": 6"#);
        let err = decode_line(&mut line).expect_err("must fail");
        assert!(matches!(err, DecodeError::Json { kind: "outdoor", .. }), "{err:?}");
    }

    #[test]
    fn missing_field_is_decode_error_not_partial_event() {
        let mut payload: serde_json::Value =
            serde_json::from_str(&outdoor_line()).expect("fixture");
        payload.as_object_mut().expect("object").remove("uv");
        let mut line = raw(&payload.to_string());
        assert!(decode_line(&mut line).is_err());

        let mut line = raw(r#"{"model": "F007TH", "humidity": 40}"#);
        assert!(decode_line(&mut line).is_err());
    }

    #[test]
    fn bad_timestamp_is_decode_error() {
        let mut payload: serde_json::Value =
            serde_json::from_str(&outdoor_line()).expect("fixture");
        payload["time"] = json!("yesterday");
        let mut line = raw(&payload.to_string());
        let err = decode_line(&mut line).expect_err("must fail");
        assert!(matches!(err, DecodeError::Timestamp { .. }), "{err:?}");
    }

    #[test]
    fn non_utf8_noise_is_ignored() {
        let mut line = RawLine {
            channel: Channel::Stderr,
            bytes: vec![0xff, 0xfe, b'F'],
        };
        assert!(decode_line(&mut line).expect("decode").is_none());
    }

    #[test]
    fn non_utf8_payload_with_marker_is_decode_error() {
        let mut bytes = br#"{"model": "F016TH", "humidity": 40, "temperature_F": "#.to_vec();
        bytes.extend_from_slice(&[0xff, b'}']);
        let mut line = RawLine {
            channel: Channel::Stdout,
            bytes,
        };
        assert!(decode_line(&mut line).is_err());
    }
}
