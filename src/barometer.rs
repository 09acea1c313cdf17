use crate::error::BarometerError;
use std::path::{Path, PathBuf};

pub trait Barometer {
    fn pressure_hpa(&mut self) -> Result<f64, BarometerError>;
}

#[derive(Debug, Clone, Copy)]
pub struct StaticBarometer {
    hpa: f64,
}

impl StaticBarometer {
    pub fn new(hpa: f64) -> Self {
        Self { hpa }
    }
}

impl Barometer for StaticBarometer {
    fn pressure_hpa(&mut self) -> Result<f64, BarometerError> {
        Ok(self.hpa)
    }
}

/// Pressure sensor exposed through sysfs, e.g. the IIO
/// `in_pressure_input` attribute (kPa, hence the default scale of 10).
#[derive(Debug, Clone)]
pub struct SysfsBarometer {
    path: PathBuf,
    scale: f64,
}

impl SysfsBarometer {
    pub fn new(path: impl Into<PathBuf>, scale: f64) -> Self {
        Self {
            path: path.into(),
            scale,
        }
    }
}

impl Barometer for SysfsBarometer {
    fn pressure_hpa(&mut self) -> Result<f64, BarometerError> {
        let raw = std::fs::read_to_string(&self.path).map_err(|source| BarometerError::Read {
            path: self.path.display().to_string(),
            source,
        })?;
        let value = raw.trim();
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| v * self.scale)
            .ok_or_else(|| BarometerError::Parse {
                path: self.path.display().to_string(),
                value: value.to_string(),
            })
    }
}

/// Reads the primary barometer and substitutes a fixed pressure when it
/// cannot be read, so a flaky sensor never costs an upload.
pub struct FallbackBarometer {
    primary: Box<dyn Barometer + Send>,
    fallback_hpa: f64,
}

impl FallbackBarometer {
    pub fn new(primary: Box<dyn Barometer + Send>, fallback_hpa: f64) -> Self {
        Self {
            primary,
            fallback_hpa,
        }
    }

    pub fn from_config(path: Option<&Path>, scale: f64, fallback_hpa: f64) -> Self {
        let primary: Box<dyn Barometer + Send> = match path {
            Some(path) => {
                tracing::info!(path = %path.display(), scale, "reading pressure from sysfs");
                Box::new(SysfsBarometer::new(path, scale))
            }
            None => {
                tracing::info!(fallback_hpa, "no barometer configured; using static pressure");
                Box::new(StaticBarometer::new(fallback_hpa))
            }
        };
        Self::new(primary, fallback_hpa)
    }

    pub fn read(&mut self) -> f64 {
        match self.primary.pressure_hpa() {
            Ok(hpa) => hpa,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    fallback_hpa = self.fallback_hpa,
                    "barometer read failed; using static pressure"
                );
                self.fallback_hpa
            }
        }
    }
}
