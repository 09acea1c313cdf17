use crate::error::ComputeError;

const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;

const RAW_TEMP_OFFSET: f64 = 400.0;
const MPS_TO_MPH: f64 = 0.2237;
const MM_TO_IN: f64 = 0.003937;
const HPA_TO_INHG: f64 = 0.0295300;
const UV_RAW_SCALE: f64 = 0.1;

/// Sensor temperatures arrive as tenths of a degree Celsius offset by 400.
pub fn celsius_from_raw(raw: i64) -> f64 {
    (raw as f64 - RAW_TEMP_OFFSET) / 10.0
}

#[cfg(test)]
pub fn raw_from_celsius(celsius: f64) -> i64 {
    (celsius * 10.0 + RAW_TEMP_OFFSET).round() as i64
}

pub fn fahrenheit_from_raw(raw: i64) -> f64 {
    fahrenheit_from_celsius(celsius_from_raw(raw))
}

pub fn fahrenheit_from_celsius(celsius: f64) -> f64 {
    celsius * 9.0 / 5.0 + 32.0
}

pub fn celsius_from_fahrenheit(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Magnus approximation of the dew point in degrees Celsius.
pub fn dew_point_celsius(temp_c: f64, rel_humidity_pct: f64) -> Result<f64, ComputeError> {
    if rel_humidity_pct.is_nan() || rel_humidity_pct <= 0.0 {
        return Err(ComputeError::NonPositiveHumidity(rel_humidity_pct));
    }
    let alpha = (MAGNUS_A * temp_c) / (MAGNUS_B + temp_c) + (rel_humidity_pct / 100.0).ln();
    let denominator = MAGNUS_A - alpha;
    if denominator == 0.0 {
        return Err(ComputeError::DewPointSingular {
            temp_c,
            humidity_pct: rel_humidity_pct,
        });
    }
    let dew_point = MAGNUS_B * alpha / denominator;
    if !dew_point.is_finite() {
        return Err(ComputeError::NonFinite {
            quantity: "dew point",
        });
    }
    Ok(dew_point)
}

// The sensor documents wind in m/s; the factor is kept as shipped until the
// datasheet unit is confirmed against hardware.
pub fn mph_from_raw_wind(raw_mps: f64) -> f64 {
    raw_mps * MPS_TO_MPH
}

pub fn inches_from_mm(raw_mm: f64) -> f64 {
    raw_mm * MM_TO_IN
}

pub fn inhg_from_hpa(hpa: f64) -> f64 {
    hpa * HPA_TO_INHG
}

pub fn uv_index_from_raw(raw: f64) -> f64 {
    raw * UV_RAW_SCALE
}
