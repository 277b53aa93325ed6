// view.rs — orientation model: longitude / latitude / zoom level and the derived field of view

use crate::config::ViewerConfig;

pub const TWO_PI: f64 = std::f64::consts::TAU;
pub const HALF_PI: f64 = std::f64::consts::FRAC_PI_2;

/// Wrap any finite angle into [0, 2π).
pub fn wrap_longitude(longitude: f64) -> f64 {
    let wrapped = longitude.rem_euclid(TWO_PI);
    // rem_euclid can round up to exactly 2π for tiny negative inputs
    if wrapped >= TWO_PI {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest angular step from `from` to `to`, in (-π, π].
pub fn shortest_delta(from: f64, to: f64) -> f64 {
    let d = (to - from).rem_euclid(TWO_PI);
    if d > std::f64::consts::PI {
        d - TWO_PI
    } else {
        d
    }
}

/// Snapshot of what is visible. Angles in radians, `fov` (vertical) in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub longitude: f64,
    pub latitude: f64,
    pub zoom_level: u8,
    pub fov: f64,
}

/// Parameters handed to the render backend once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub longitude: f64,
    pub latitude: f64,
    /// Vertical field of view, degrees.
    pub fov: f64,
    pub aspect: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Limits {
    min_fov: f64,
    max_fov: f64,
    latitude: (f64, f64),
    /// (start, end), wrapping through 0 when start > end
    longitude: Option<(f64, f64)>,
}

/// Holds the current view and enforces the configured ranges. Out-of-range input is clamped
/// (latitude, zoom) or wrapped (longitude), never rejected.
#[derive(Debug, Clone)]
pub struct OrientationModel {
    state: ViewState,
    limits: Limits,
}

impl OrientationModel {
    pub fn new(config: &ViewerConfig) -> Self {
        let limits = Limits {
            min_fov: config.min_fov,
            max_fov: config.max_fov,
            latitude: config.latitude_bounds(),
            longitude: config.longitude_bounds(),
        };
        let mut model = Self {
            state: ViewState {
                longitude: 0.0,
                latitude: 0.0,
                zoom_level: 0,
                fov: limits.max_fov,
            },
            limits,
        };
        model.set_zoom(config.default_zoom_level());
        model.set_position(config.default_longitude.0, config.default_latitude.0);
        model
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn longitude(&self) -> f64 {
        self.state.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.state.latitude
    }

    pub fn zoom_level(&self) -> u8 {
        self.state.zoom_level
    }

    pub fn fov(&self) -> f64 {
        self.state.fov
    }

    /// Horizontal field of view (degrees) for the given aspect ratio.
    pub fn horizontal_fov(&self, aspect: f64) -> f64 {
        let half = (self.state.fov.to_radians() / 2.0).tan() * aspect;
        (2.0 * half.atan()).to_degrees()
    }

    pub fn camera(&self, aspect: f64) -> CameraParams {
        CameraParams {
            longitude: self.state.longitude,
            latitude: self.state.latitude,
            fov: self.state.fov,
            aspect,
        }
    }

    /// Returns the effective (clamped) longitude and latitude.
    pub fn set_position(&mut self, longitude: f64, latitude: f64) -> (f64, f64) {
        if longitude.is_finite() {
            self.state.longitude = self.clamp_longitude(longitude);
        }
        if latitude.is_finite() {
            self.state.latitude = self.clamp_latitude(latitude);
        }
        (self.state.longitude, self.state.latitude)
    }

    /// Move by a delta. Longitude keeps wrapping, latitude saturates.
    pub fn rotate_by(&mut self, d_longitude: f64, d_latitude: f64) -> (f64, f64) {
        self.set_position(self.state.longitude + d_longitude, self.state.latitude + d_latitude)
    }

    /// Returns the effective (rounded, clamped) zoom level.
    pub fn set_zoom(&mut self, level: f64) -> u8 {
        if level.is_finite() {
            let level = level.round().clamp(0.0, 100.0) as u8;
            self.state.zoom_level = level;
            self.state.fov = self.fov_for_level(level);
        }
        self.state.zoom_level
    }

    pub fn zoom_in(&mut self) -> u8 {
        self.set_zoom(f64::from(self.state.zoom_level) + 1.0)
    }

    pub fn zoom_out(&mut self) -> u8 {
        self.set_zoom(f64::from(self.state.zoom_level) - 1.0)
    }

    pub fn fov_for_level(&self, level: u8) -> f64 {
        let l = self.limits;
        l.max_fov + (f64::from(level) / 100.0) * (l.min_fov - l.max_fov)
    }

    /// Signed step from `from` to `to` for animated moves: the shortest way round, or the way
    /// through the allowed arc when a longitude range is set.
    pub fn longitude_delta(&self, from: f64, to: f64) -> f64 {
        let Some((start, _)) = self.limits.longitude else {
            return shortest_delta(from, to);
        };
        // offsets from the range start grow monotonically across the allowed arc
        let offset = |lon: f64| wrap_longitude(self.clamp_longitude(lon) - start);
        offset(to) - offset(from)
    }

    pub fn clamp_latitude(&self, latitude: f64) -> f64 {
        let (lo, hi) = self.limits.latitude;
        latitude.clamp(lo, hi)
    }

    pub fn clamp_longitude(&self, longitude: f64) -> f64 {
        let lon = wrap_longitude(longitude);
        let Some((start, end)) = self.limits.longitude else {
            return lon;
        };
        let inside = if start <= end {
            lon >= start && lon <= end
        } else {
            lon >= start || lon <= end
        };
        if inside {
            return lon;
        }
        // snap to whichever bound is angularly closer
        if shortest_delta(lon, start).abs() <= shortest_delta(lon, end).abs() {
            start
        } else {
            end
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Angle;
    use proptest::prelude::*;

    fn model() -> OrientationModel {
        OrientationModel::new(&ViewerConfig::default().normalized())
    }

    #[test]
    fn starts_at_defaults() {
        let m = model();
        assert_eq!(m.longitude(), 0.0);
        assert_eq!(m.latitude(), 0.0);
        assert_eq!(m.zoom_level(), 50);
        assert!((m.fov() - 60.0).abs() < 1e-9);
    }

    #[test]
    fn zoom_maps_linearly_onto_fov() {
        let mut m = model();
        assert_eq!(m.set_zoom(0.0), 0);
        assert_eq!(m.fov(), 90.0);
        assert_eq!(m.set_zoom(100.0), 100);
        assert_eq!(m.fov(), 30.0);
        assert_eq!(m.set_zoom(250.0), 100);
        assert_eq!(m.set_zoom(-3.0), 0);
        assert_eq!(m.set_zoom(f64::NAN), 0);
    }

    #[test]
    fn fov_decreases_with_zoom() {
        let m = model();
        for level in 0..100u8 {
            assert!(m.fov_for_level(level) > m.fov_for_level(level + 1));
        }
    }

    #[test]
    fn shortest_delta_crosses_zero() {
        let d = shortest_delta(350f64.to_radians(), 10f64.to_radians());
        assert!((d - 20f64.to_radians()).abs() < 1e-12);
        let d = shortest_delta(10f64.to_radians(), 350f64.to_radians());
        assert!((d + 20f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn longitude_range_crossing_zero_snaps_to_nearest_bound() {
        let cfg = ViewerConfig {
            longitude_range: Some([Angle::degrees(300.0), Angle::degrees(60.0)]),
            ..ViewerConfig::default()
        }
        .normalized();
        let mut m = OrientationModel::new(&cfg);
        let (lon, _) = m.set_position(20f64.to_radians(), 0.0);
        assert!((lon - 20f64.to_radians()).abs() < 1e-12);
        let (lon, _) = m.set_position(100f64.to_radians(), 0.0);
        assert!((lon - 60f64.to_radians()).abs() < 1e-9);
        let (lon, _) = m.set_position(250f64.to_radians(), 0.0);
        assert!((lon - 300f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn longitude_delta_stays_inside_the_range() {
        let cfg = ViewerConfig {
            longitude_range: Some([Angle::degrees(10.0), Angle::degrees(350.0)]),
            ..ViewerConfig::default()
        }
        .normalized();
        let m = OrientationModel::new(&cfg);
        let d = m.longitude_delta(20f64.to_radians(), 340f64.to_radians());
        assert!((d - 320f64.to_radians()).abs() < 1e-9);
        let d = m.longitude_delta(340f64.to_radians(), 20f64.to_radians());
        assert!((d + 320f64.to_radians()).abs() < 1e-9);

        // without a range the short way round wins
        let d = model().longitude_delta(20f64.to_radians(), 340f64.to_radians());
        assert!((d + 40f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn horizontal_fov_widens_with_aspect() {
        let m = model();
        assert!((m.horizontal_fov(1.0) - m.fov()).abs() < 1e-9);
        assert!(m.horizontal_fov(2.0) > m.fov());
    }

    proptest! {
        #[test]
        fn longitude_always_wraps(l in -1.0e4f64..1.0e4) {
            let mut m = model();
            let (lon, _) = m.set_position(l, 0.0);
            prop_assert!((0.0..TWO_PI).contains(&lon));
            prop_assert!(shortest_delta(lon, l.rem_euclid(TWO_PI)).abs() < 1e-9);
        }

        #[test]
        fn latitude_outside_range_takes_nearest_bound(lat in -10.0f64..10.0) {
            let cfg = ViewerConfig {
                latitude_range: Some([Angle(-0.5), Angle(0.8)]),
                ..ViewerConfig::default()
            }
            .normalized();
            let mut m = OrientationModel::new(&cfg);
            let (_, eff) = m.set_position(0.0, lat);
            if lat < -0.5 {
                prop_assert_eq!(eff, -0.5);
            } else if lat > 0.8 {
                prop_assert_eq!(eff, 0.8);
            } else {
                prop_assert_eq!(eff, lat);
            }
        }
    }
}
