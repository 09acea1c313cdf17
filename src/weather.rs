use crate::convert;
use crate::decode::{IndoorReading, OutdoorReading};
use crate::error::ComputeError;
use chrono::{DateTime, FixedOffset, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use std::str::FromStr;

const DATEUTC_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zone the receiver stamps its `time` field in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceZone {
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl SourceZone {
    pub fn to_utc(self, naive: NaiveDateTime) -> Result<DateTime<Utc>, ComputeError> {
        match self {
            SourceZone::Utc => Ok(Utc.from_utc_datetime(&naive)),
            SourceZone::Local => resolve_local(naive, Local.from_local_datetime(&naive)),
            SourceZone::Fixed(offset) => resolve_local(naive, offset.from_local_datetime(&naive)),
        }
    }
}

/// A wall-clock time repeated by a DST fall-back resolves to its earlier
/// instant. Only a time skipped by spring-forward is an error.
fn resolve_local<Tz: TimeZone>(
    naive: NaiveDateTime,
    local: LocalResult<DateTime<Tz>>,
) -> Result<DateTime<Utc>, ComputeError> {
    local
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| ComputeError::LocalTime(naive.to_string()))
}

impl FromStr for SourceZone {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("local") {
            return Ok(SourceZone::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(SourceZone::Utc);
        }
        parse_offset(trimmed)
            .map(SourceZone::Fixed)
            .ok_or_else(|| format!("expected local, utc or an offset like -06:00, got {trimmed:?}"))
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':').unwrap_or((rest, "0"));
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

impl fmt::Display for SourceZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceZone::Local => f.write_str("local"),
            SourceZone::Utc => f.write_str("utc"),
            SourceZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Outdoor values in the units the weather services expect. Built once per
/// reading and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedOutdoorMetrics {
    pub observed_at: DateTime<Utc>,
    pub humidity_pct: f64,
    pub temp_f: f64,
    pub temp_c: f64,
    pub dewpoint_f: f64,
    pub baro_inhg: f64,
    pub wind_dir_deg: f64,
    pub avg_wind_mph: f64,
    pub gust_wind_mph: f64,
    pub rain_in: f64,
    pub uv_index: f64,
    pub light: f64,
}

impl DerivedOutdoorMetrics {
    pub fn derive(
        reading: &OutdoorReading,
        pressure_hpa: f64,
        zone: SourceZone,
    ) -> Result<Self, ComputeError> {
        let temp_f = convert::fahrenheit_from_raw(reading.temperature_raw);
        let temp_c = convert::celsius_from_fahrenheit(temp_f);
        let dewpoint_c = convert::dew_point_celsius(temp_c, reading.humidity_pct)?;
        let baro_inhg = convert::inhg_from_hpa(pressure_hpa);
        if !baro_inhg.is_finite() {
            return Err(ComputeError::NonFinite {
                quantity: "barometric pressure",
            });
        }

        Ok(Self {
            observed_at: zone.to_utc(reading.timestamp)?,
            humidity_pct: reading.humidity_pct,
            temp_f,
            temp_c,
            dewpoint_f: convert::fahrenheit_from_celsius(dewpoint_c),
            baro_inhg,
            wind_dir_deg: reading.wind_dir_deg,
            avg_wind_mph: convert::mph_from_raw_wind(reading.avg_wind_raw),
            gust_wind_mph: convert::mph_from_raw_wind(reading.gust_wind_raw),
            rain_in: convert::inches_from_mm(reading.cumulative_rain_raw),
            uv_index: convert::uv_index_from_raw(reading.uv_raw),
            light: reading.light,
        })
    }

    /// Observation fields as they go on the wire. Precision is part of the
    /// upload protocol, not presentation.
    pub fn wire_fields(&self) -> WireFields {
        WireFields {
            dateutc: self.observed_at.format(DATEUTC_FORMAT).to_string(),
            tempf: format!("{:.1}", self.temp_f),
            humidity: format!("{:.0}", self.humidity_pct),
            dewptf: format!("{:.1}", self.dewpoint_f),
            winddir: format!("{:.0}", self.wind_dir_deg),
            windspeedmph: format!("{:.2}", self.avg_wind_mph),
            windgustmph: format!("{:.2}", self.gust_wind_mph),
            dailyrainin: format!("{:.2}", self.rain_in),
            uv: format!("{:.1}", self.uv_index),
            baromin: format!("{:.2}", self.baro_inhg),
            light: format!("{:.0}", self.light),
        }
    }

    pub fn status_text(&self) -> String {
        status_text(self.temp_f, self.humidity_pct)
    }
}

/// Formatted observation. `dateutc` is the plain civil UTC time; it is
/// percent-encoded when the query is assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFields {
    pub dateutc: String,
    pub tempf: String,
    pub humidity: String,
    pub dewptf: String,
    pub winddir: String,
    pub windspeedmph: String,
    pub windgustmph: String,
    pub dailyrainin: String,
    pub uv: String,
    pub baromin: String,
    pub light: String,
}

impl WireFields {
    /// Observation pairs in upload order, excluding credentials and action.
    pub fn pairs(&self) -> [(&'static str, &str); 10] {
        [
            ("dateutc", self.dateutc.as_str()),
            ("tempf", self.tempf.as_str()),
            ("humidity", self.humidity.as_str()),
            ("dewptf", self.dewptf.as_str()),
            ("winddir", self.winddir.as_str()),
            ("windspeedmph", self.windspeedmph.as_str()),
            ("windgustmph", self.windgustmph.as_str()),
            ("dailyrainin", self.dailyrainin.as_str()),
            ("uv", self.uv.as_str()),
            ("baromin", self.baromin.as_str()),
        ]
    }
}

pub fn indoor_status_text(reading: &IndoorReading) -> String {
    status_text(reading.temperature_f, reading.humidity_pct)
}

fn status_text(temp_f: f64, humidity_pct: f64) -> String {
    format!("{temp_f:.1}F  {humidity_pct:.0}%")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::fixtures::outdoor_line;
    use crate::decode::{decode_line, SensorEvent};
    use crate::stream::{Channel, RawLine};
    use chrono::NaiveDate;

    fn outdoor() -> OutdoorReading {
        let mut line = RawLine {
            channel: Channel::Stdout,
            bytes: outdoor_line().into_bytes(),
        };
        match decode_line(&mut line) {
            Ok(Some(SensorEvent::Outdoor(reading))) => reading,
            other => panic!("fixture did not decode: {other:?}"),
        }
    }

    #[test]
    fn wire_fields_use_protocol_precision() {
        let metrics =
            DerivedOutdoorMetrics::derive(&outdoor(), 1013.25, SourceZone::Utc).expect("derive");
        let fields = metrics.wire_fields();
        assert_eq!(fields.dateutc, "2024-06-01 14:32:10");
        assert_eq!(fields.tempf, "77.0");
        assert_eq!(fields.humidity, "50");
        assert_eq!(fields.dewptf, "56.9");
        assert_eq!(fields.winddir, "270");
        assert_eq!(fields.windspeedmph, "2.24");
        assert_eq!(fields.windgustmph, "4.47");
        assert_eq!(fields.dailyrainin, "1.00");
        assert_eq!(fields.uv, "3.5");
        assert_eq!(fields.baromin, "29.92");
        assert_eq!(fields.light, "12000");
    }

    #[test]
    fn derivation_is_deterministic() {
        let reading = outdoor();
        let first = DerivedOutdoorMetrics::derive(&reading, 1002.4, SourceZone::Utc)
            .expect("derive")
            .wire_fields();
        for _ in 0..5 {
            let again = DerivedOutdoorMetrics::derive(&reading, 1002.4, SourceZone::Utc)
                .expect("derive")
                .wire_fields();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn dew_point_stays_below_air_temperature() {
        let metrics =
            DerivedOutdoorMetrics::derive(&outdoor(), 1013.25, SourceZone::Utc).expect("derive");
        assert!((metrics.temp_c - 25.0).abs() < 1e-9);
        assert!(metrics.dewpoint_f < metrics.temp_f);
    }

    #[test]
    fn zero_humidity_is_compute_error() {
        let mut reading = outdoor();
        reading.humidity_pct = 0.0;
        let err = DerivedOutdoorMetrics::derive(&reading, 1013.25, SourceZone::Utc)
            .expect_err("must fail");
        assert_eq!(err, ComputeError::NonPositiveHumidity(0.0));
    }

    #[test]
    fn fixed_offset_converts_to_utc() {
        let zone: SourceZone = "-06:00".parse().expect("zone");
        let metrics = DerivedOutdoorMetrics::derive(&outdoor(), 1013.25, zone).expect("derive");
        assert_eq!(metrics.wire_fields().dateutc, "2024-06-01 20:32:10");
    }

    #[test]
    fn repeated_fall_back_hour_resolves_to_earlier_instant() {
        let naive = NaiveDate::from_ymd_opt(2024, 11, 3)
            .and_then(|d| d.and_hms_opt(1, 30, 0))
            .expect("naive");
        let cdt = FixedOffset::west_opt(5 * 3600).expect("cdt");
        let cst = FixedOffset::west_opt(6 * 3600).expect("cst");
        let first = cdt.from_local_datetime(&naive).single().expect("cdt time");
        let second = cst.from_local_datetime(&naive).single().expect("cst time");

        let utc = resolve_local(naive, LocalResult::Ambiguous(first, second)).expect("resolve");
        assert_eq!(utc.format(DATEUTC_FORMAT).to_string(), "2024-11-03 06:30:00");
    }

    #[test]
    fn skipped_spring_forward_time_is_compute_error() {
        let naive = NaiveDate::from_ymd_opt(2024, 3, 10)
            .and_then(|d| d.and_hms_opt(2, 30, 0))
            .expect("naive");
        let err = resolve_local::<FixedOffset>(naive, LocalResult::None).expect_err("gap");
        assert_eq!(err, ComputeError::LocalTime("2024-03-10 02:30:00".to_string()));
    }

    #[test]
    fn source_zone_parsing() {
        assert_eq!("local".parse::<SourceZone>(), Ok(SourceZone::Local));
        assert_eq!("UTC".parse::<SourceZone>(), Ok(SourceZone::Utc));
        assert!(matches!("+05:30".parse::<SourceZone>(), Ok(SourceZone::Fixed(_))));
        assert!("US/Central".parse::<SourceZone>().is_err());
    }

    #[test]
    fn status_text_matches_display_format() {
        let reading = IndoorReading {
            humidity_pct: 44.6,
            temperature_f: 70.26,
        };
        assert_eq!(indoor_status_text(&reading), "70.3F  45%");
    }
}
