// config.rs — viewer options, defaults and one-time normalization
//
// Angles are stored in radians, fields of view in degrees (as the renderer consumes them).
// Everything is normalized once by `ViewerConfig::normalized()`; nothing downstream re-validates.

use crate::error::ConfigError;
use crate::markers::MarkerDescriptor;
use crate::projector::PanoData;
use crate::view::{wrap_longitude, HALF_PI, TWO_PI};
use serde::{Deserialize, Deserializer};
use std::path::Path;

const DEFAULT_CACHE_CAPACITY: usize = 6;

/// An angle in radians. Deserializes from a number (radians) or a string with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(try_from = "NumberOrText")]
pub struct Angle(pub f64);

impl Angle {
    pub fn degrees(deg: f64) -> Self {
        Self(deg.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }
}

/// Angular speed in radians per second. Same input forms as [`Angle`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(try_from = "NumberOrText")]
pub struct Speed(pub f64);

impl Speed {
    pub fn rpm(revolutions: f64) -> Self {
        Self(revolutions * TWO_PI / 60.0)
    }

    pub fn radians_per_second(self) -> f64 {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

impl TryFrom<NumberOrText> for Angle {
    type Error = ConfigError;

    fn try_from(v: NumberOrText) -> Result<Self, Self::Error> {
        match v {
            NumberOrText::Number(n) => Ok(Angle(n)),
            NumberOrText::Text(s) => parse_angle(&s).map(Angle),
        }
    }
}

impl TryFrom<NumberOrText> for Speed {
    type Error = ConfigError;

    fn try_from(v: NumberOrText) -> Result<Self, Self::Error> {
        match v {
            NumberOrText::Number(n) => Ok(Speed(n)),
            NumberOrText::Text(s) => parse_speed(&s).map(Speed),
        }
    }
}

/// Split "12.5deg" into (12.5, "deg").
fn split_value_unit(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let bytes = text.as_bytes();
    let mut end = 0;
    if bytes.first() == Some(&b'-') {
        end = 1;
    }
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    let value = text[..end].parse::<f64>().ok()?;
    Some((value, text[end..].trim()))
}

/// Parse "30deg", "1.2rad", "45°" or a bare number (radians).
pub fn parse_angle(text: &str) -> Result<f64, ConfigError> {
    let (value, unit) =
        split_value_unit(text).ok_or_else(|| ConfigError::InvalidAngle(text.to_string()))?;
    match unit.to_ascii_lowercase().as_str() {
        "deg" | "degs" | "degrees" | "°" => Ok(value.to_radians()),
        "" | "rad" | "rads" | "radians" => Ok(value),
        _ => Err(ConfigError::InvalidAngle(text.to_string())),
    }
}

/// Parse "2rpm", "10dps", "0.5 radians per second"… into radians per second.
pub fn parse_speed(text: &str) -> Result<f64, ConfigError> {
    let (mut value, unit) =
        split_value_unit(text).ok_or_else(|| ConfigError::UnknownSpeedUnit(text.to_string()))?;
    let unit = unit.to_ascii_lowercase();
    if unit.ends_with("pm") || unit.ends_with("per minute") {
        value /= 60.0;
    }
    match unit.as_str() {
        "dpm" | "degrees per minute" | "dps" | "degrees per second" => Ok(value.to_radians()),
        "radians per minute" | "radians per second" => Ok(value),
        "rpm" | "revolutions per minute" | "rps" | "revolutions per second" => Ok(value * TWO_PI),
        _ => Err(ConfigError::UnknownSpeedUnit(unit)),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Initial panorama source (path or identifier understood by the loader).
    pub panorama: Option<String>,
    pub min_fov: f64,
    pub max_fov: f64,
    pub default_fov: Option<f64>,
    pub default_longitude: Angle,
    pub default_latitude: Angle,
    pub longitude_range: Option<[Angle; 2]>,
    pub latitude_range: Option<[Angle; 2]>,
    pub move_speed: f64,
    pub autorotate_delay_ms: Option<u64>,
    pub autorotate_speed: Speed,
    pub autorotate_latitude: Option<Angle>,
    #[serde(deserialize_with = "cache_capacity_or_default")]
    pub cache_capacity: usize,
    pub inertia_enabled: bool,
    pub transition_duration_ms: u64,
    pub mousewheel: bool,
    pub mousemove: bool,
    pub keyboard: bool,
    pub gyroscope: bool,
    pub move_threshold_px: f64,
    pub inertia_window_ms: f64,
    /// Release speed (px/ms) below which no inertia is started.
    pub inertia_min_speed: f64,
    pub inertia_duration_ms: u64,
    pub pinch_zoom_factor: f64,
    pub pano_data: Option<PanoData>,
    pub markers: Vec<MarkerDescriptor>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            panorama: None,
            min_fov: 30.0,
            max_fov: 90.0,
            default_fov: None,
            default_longitude: Angle(0.0),
            default_latitude: Angle(0.0),
            longitude_range: None,
            latitude_range: None,
            move_speed: 1.0,
            autorotate_delay_ms: Some(2000),
            autorotate_speed: Speed::rpm(2.0),
            autorotate_latitude: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            inertia_enabled: true,
            transition_duration_ms: 1500,
            mousewheel: true,
            mousemove: true,
            keyboard: true,
            gyroscope: false,
            move_threshold_px: 4.0,
            inertia_window_ms: 300.0,
            inertia_min_speed: 0.05,
            inertia_duration_ms: 500,
            pinch_zoom_factor: 80.0,
            pano_data: None,
            markers: Vec::new(),
        }
    }
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Order and clamp every option. Each correction is logged as a warning.
    pub fn normalized(mut self) -> Self {
        if self.max_fov < self.min_fov {
            log::warn!("max_fov cannot be lower than min_fov, swapping them");
            std::mem::swap(&mut self.min_fov, &mut self.max_fov);
        }
        let (min_fov, max_fov) = (self.min_fov.clamp(1.0, 179.0), self.max_fov.clamp(1.0, 179.0));
        if min_fov != self.min_fov || max_fov != self.max_fov {
            log::warn!("fov bounds must be within [1, 179] degrees");
        }
        self.min_fov = min_fov;
        self.max_fov = max_fov;

        self.default_fov = Some(match self.default_fov {
            Some(fov) if fov.is_finite() => fov.clamp(self.min_fov, self.max_fov),
            _ => self.max_fov / 2.0 + self.min_fov / 2.0,
        });

        self.default_longitude = Angle(wrap_longitude(self.default_longitude.0));
        self.default_latitude = Angle(clamp_latitude(self.default_latitude.0));
        self.autorotate_latitude = Some(Angle(clamp_latitude(
            self.autorotate_latitude.unwrap_or(self.default_latitude).0,
        )));

        if let Some([a, b]) = self.longitude_range {
            self.longitude_range = Some([Angle(wrap_longitude(a.0)), Angle(wrap_longitude(b.0))]);
        }

        if let Some([mut lo, mut hi]) = self.latitude_range {
            if lo.0 > hi.0 {
                log::warn!("latitude_range values must be ordered, swapping them");
                std::mem::swap(&mut lo, &mut hi);
            }
            self.latitude_range = Some([Angle(clamp_latitude(lo.0)), Angle(clamp_latitude(hi.0))]);
        }

        if !self.move_speed.is_finite() || self.move_speed <= 0.0 {
            log::warn!("invalid move_speed {}, using 1", self.move_speed);
            self.move_speed = 1.0;
        }

        if !self.autorotate_speed.0.is_finite() {
            log::warn!("invalid autorotate_speed, using 2rpm");
            self.autorotate_speed = Speed::rpm(2.0);
        }

        self
    }

    /// Latitude bounds in radians, the full [-π/2, π/2] when no range is configured.
    pub fn latitude_bounds(&self) -> (f64, f64) {
        match self.latitude_range {
            Some([lo, hi]) => (lo.0, hi.0),
            None => (-HALF_PI, HALF_PI),
        }
    }

    pub fn longitude_bounds(&self) -> Option<(f64, f64)> {
        self.longitude_range.map(|[a, b]| (a.0, b.0))
    }

    /// Zoom level matching `default_fov`. Level 0 is `max_fov`, level 100 is `min_fov`.
    pub fn default_zoom_level(&self) -> f64 {
        let fov = self.default_fov.unwrap_or(self.max_fov / 2.0 + self.min_fov / 2.0);
        let span = self.max_fov - self.min_fov;
        if span <= f64::EPSILON {
            return 0.0;
        }
        ((self.max_fov - fov) / span * 100.0).round()
    }
}

/// Negative, fractional or non-numeric capacities fall back to the default with a warning.
fn cache_capacity_or_default<'de, D: Deserializer<'de>>(de: D) -> Result<usize, D::Error> {
    let value = serde_json::Value::deserialize(de)?;
    match value.as_u64().and_then(|v| usize::try_from(v).ok()) {
        Some(capacity) => Ok(capacity),
        None => {
            log::warn!("invalid cache_capacity {value}, using {DEFAULT_CACHE_CAPACITY}");
            Ok(DEFAULT_CACHE_CAPACITY)
        }
    }
}

fn clamp_latitude(lat: f64) -> f64 {
    if lat.is_finite() {
        lat.clamp(-HALF_PI, HALF_PI)
    } else {
        0.0
    }
}
