// projector.rs — spherical / texture / screen conversions and per-tick marker projection
//
// Conventions (shared with the WGSL shader):
//   direction(lon, lat) = (cos lat · sin lon, sin lat, −cos lat · cos lon)
//   texture u = lon / 2π, v = 0.5 − lat / π
// Longitude grows to the right of the screen, latitude grows upward.

use crate::markers::{Coordinates, Marker, MarkerSet, MarkerShape};
use crate::view::{wrap_longitude, ViewState, HALF_PI, TWO_PI};
use glam::DVec3;
use serde::Deserialize;
use std::f64::consts::PI;

const NEAR_PLANE: f64 = 1e-3;

/// Geometry of the equirectangular source, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct PanoData {
    pub full_width: f64,
    pub full_height: f64,
    pub cropped_x: f64,
    pub cropped_y: f64,
}

impl PanoData {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            full_width: f64::from(width),
            full_height: f64::from(height),
            cropped_x: 0.0,
            cropped_y: 0.0,
        }
    }

    /// Geometry for an image without explicit crop data. Images flatter than 2:1 are taken
    /// as the lower part of a full sphere, the missing sky left empty.
    pub fn for_image(width: u32, height: u32) -> Self {
        let full_height = height.max(width / 2);
        Self {
            full_width: f64::from(width),
            full_height: f64::from(full_height),
            cropped_x: 0.0,
            cropped_y: f64::from(full_height - height),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.full_width > 0.0 && self.full_height > 0.0
    }

    pub fn texture_to_spherical(&self, x: f64, y: f64) -> (f64, f64) {
        let longitude = (x + self.cropped_x) / self.full_width * TWO_PI;
        let latitude = HALF_PI - (y + self.cropped_y) / self.full_height * PI;
        (wrap_longitude(longitude), latitude)
    }

    pub fn spherical_to_texture(&self, longitude: f64, latitude: f64) -> (f64, f64) {
        let x = wrap_longitude(longitude) / TWO_PI * self.full_width - self.cropped_x;
        let y = (HALF_PI - latitude) / PI * self.full_height - self.cropped_y;
        (x, y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(1.0),
            height: height.max(1.0),
        }
    }

    pub fn aspect(&self) -> f64 {
        self.width / self.height
    }

    pub fn contains(&self, p: ScreenPoint) -> bool {
        p.x >= 0.0 && p.x <= self.width && p.y >= 0.0 && p.y <= self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ScreenRect {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.left + self.width && y >= self.top && y <= self.top + self.height
    }
}

pub fn direction(longitude: f64, latitude: f64) -> DVec3 {
    DVec3::new(
        latitude.cos() * longitude.sin(),
        latitude.sin(),
        -latitude.cos() * longitude.cos(),
    )
}

pub fn spherical(dir: DVec3) -> (f64, f64) {
    let d = dir.normalize();
    (wrap_longitude(d.x.atan2(-d.z)), d.y.clamp(-1.0, 1.0).asin())
}

/// Perspective camera built from a view state.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    forward: DVec3,
    right: DVec3,
    up: DVec3,
    tan_half_v: f64,
    tan_half_h: f64,
    viewport: Viewport,
}

impl Camera {
    pub fn new(view: &ViewState, viewport: Viewport) -> Self {
        let forward = direction(view.longitude, view.latitude);
        let right = DVec3::new(view.longitude.cos(), 0.0, view.longitude.sin());
        let up = right.cross(forward).normalize();
        let tan_half_v = (view.fov.to_radians() / 2.0).tan();
        Self {
            forward,
            right,
            up,
            tan_half_v,
            tan_half_h: tan_half_v * viewport.aspect(),
            viewport,
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// None when the direction is behind (or exactly beside) the viewer.
    pub fn project(&self, dir: DVec3) -> Option<ScreenPoint> {
        let z = dir.dot(self.forward);
        if z <= 1e-9 {
            return None;
        }
        let ndc_x = dir.dot(self.right) / (z * self.tan_half_h);
        let ndc_y = dir.dot(self.up) / (z * self.tan_half_v);
        Some(ScreenPoint {
            x: (ndc_x + 1.0) / 2.0 * self.viewport.width,
            y: (1.0 - ndc_y) / 2.0 * self.viewport.height,
        })
    }

    /// Clip a closed outline against the plane just in front of the viewer, so edges that
    /// pass behind the camera end where they leave the view instead of being dropped.
    pub fn clip_to_front(&self, outline: &[DVec3]) -> Vec<DVec3> {
        let depth = |d: DVec3| d.dot(self.forward) - NEAR_PLANE;
        let mut clipped = Vec::with_capacity(outline.len() + 2);
        for (i, &current) in outline.iter().enumerate() {
            let previous = outline[(i + outline.len() - 1) % outline.len()];
            let (dc, dp) = (depth(current), depth(previous));
            if (dc >= 0.0) != (dp >= 0.0) {
                let t = dp / (dp - dc);
                clipped.push(previous + (current - previous) * t);
            }
            if dc >= 0.0 {
                clipped.push(current);
            }
        }
        clipped
    }

    /// Screen pixel back to (longitude, latitude).
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let ndc_x = 2.0 * x / self.viewport.width - 1.0;
        let ndc_y = 1.0 - 2.0 * y / self.viewport.height;
        spherical(
            self.forward + self.right * (ndc_x * self.tan_half_h) + self.up * (ndc_y * self.tan_half_v),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectedShape {
    Point { anchor: ScreenPoint, rect: ScreenRect },
    /// Outline clipped to the part in front of the viewer, joined by straight screen-space
    /// edges.
    Polygon { points: Vec<ScreenPoint> },
    Circle { center: ScreenPoint, radius: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerProjection {
    pub id: String,
    pub visible: bool,
    /// None when nothing of the marker is in front of the viewer.
    pub shape: Option<ProjectedShape>,
}

fn to_direction(c: Coordinates, pano: Option<&PanoData>) -> Option<DVec3> {
    match c {
        Coordinates::Spherical { longitude, latitude } => Some(direction(longitude, latitude)),
        Coordinates::Texture { x, y } => {
            let pano = pano.filter(|p| p.is_valid())?;
            let (lon, lat) = pano.texture_to_spherical(x, y);
            Some(direction(lon, lat))
        }
    }
}

pub fn project_marker(camera: &Camera, marker: &Marker, pano: Option<&PanoData>) -> MarkerProjection {
    let viewport = camera.viewport();
    let shape = match &marker.shape {
        MarkerShape::Point {
            position,
            width,
            height,
            anchor,
            ..
        } => to_direction(*position, pano)
            .and_then(|d| camera.project(d))
            .map(|p| ProjectedShape::Point {
                anchor: p,
                rect: ScreenRect {
                    left: p.x - anchor.x * width,
                    top: p.y - anchor.y * height,
                    width: *width,
                    height: *height,
                },
            }),
        MarkerShape::Polygon { vertices } => {
            let directions: Vec<DVec3> = vertices
                .iter()
                .filter_map(|v| to_direction(*v, pano))
                .collect();
            let points: Vec<ScreenPoint> = camera
                .clip_to_front(&directions)
                .into_iter()
                .filter_map(|d| camera.project(d))
                .collect();
            (!points.is_empty()).then_some(ProjectedShape::Polygon { points })
        }
        MarkerShape::Circle { center, radius } => to_direction(*center, pano)
            .and_then(|d| camera.project(d))
            .map(|center| ProjectedShape::Circle {
                center,
                radius: *radius,
            }),
    };

    let visible = match &shape {
        Some(ProjectedShape::Point { anchor, .. }) => viewport.contains(*anchor),
        Some(ProjectedShape::Circle { center, .. }) => viewport.contains(*center),
        Some(ProjectedShape::Polygon { points }) => points.iter().any(|p| viewport.contains(*p)),
        None => false,
    };

    MarkerProjection {
        id: marker.id.clone(),
        visible,
        shape,
    }
}

/// Pure function of the view: never touches the orientation model.
pub fn project_markers(
    view: &ViewState,
    viewport: Viewport,
    pano: Option<&PanoData>,
    markers: &MarkerSet,
) -> Vec<MarkerProjection> {
    let camera = Camera::new(view, viewport);
    markers.iter().map(|m| project_marker(&camera, m, pano)).collect()
}

fn point_in_polygon(points: &[ScreenPoint], x: f64, y: f64) -> bool {
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (pi, pj) = (points[i], points[j]);
        if (pi.y > y) != (pj.y > y) && x < (pj.x - pi.x) * (y - pi.y) / (pj.y - pi.y) + pi.x {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Topmost visible marker under (x, y), last-added first.
pub fn hit_test(projections: &[MarkerProjection], x: f64, y: f64) -> Option<&str> {
    projections
        .iter()
        .rev()
        .filter(|p| p.visible)
        .find(|p| match &p.shape {
            Some(ProjectedShape::Point { rect, .. }) => rect.contains(x, y),
            Some(ProjectedShape::Circle { center, radius }) => {
                (center.x - x).hypot(center.y - y) <= *radius
            }
            Some(ProjectedShape::Polygon { points }) => {
                points.len() >= 3 && point_in_polygon(points, x, y)
            }
            None => false,
        })
        .map(|p| p.id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markers::{CoordList, MarkerDescriptor};

    fn view(lon_deg: f64, lat_deg: f64, fov: f64) -> ViewState {
        ViewState {
            longitude: lon_deg.to_radians(),
            latitude: lat_deg.to_radians(),
            zoom_level: 50,
            fov,
        }
    }

    fn single(desc: MarkerDescriptor) -> MarkerSet {
        let mut set = MarkerSet::new();
        set.add(desc).unwrap();
        set
    }

    #[test]
    fn marker_on_view_axis_is_centered_at_any_fov() {
        let vp = Viewport::new(800.0, 600.0);
        for fov in [30.0, 60.0, 90.0, 120.0] {
            let v = view(123.0, 0.0, fov);
            let set = single(MarkerDescriptor::point("c", v.longitude, 0.0).with_html("x"));
            let p = &project_markers(&v, vp, None, &set)[0];
            assert!(p.visible);
            let Some(ProjectedShape::Point { anchor, .. }) = p.shape else {
                panic!("no projection");
            };
            assert!((anchor.x - 400.0).abs() < 1e-6);
            assert!((anchor.y - 300.0).abs() < 1e-6);
        }
    }

    #[test]
    fn marker_behind_viewer_is_invisible() {
        let vp = Viewport::new(800.0, 600.0);
        let v = view(30.0, 10.0, 90.0);
        let set = single(MarkerDescriptor::point("back", v.longitude + PI, -v.latitude).with_html("x"));
        let p = &project_markers(&v, vp, None, &set)[0];
        assert!(!p.visible);
        assert!(p.shape.is_none());
    }

    #[test]
    fn screen_directions_follow_longitude_and_latitude() {
        let cam = Camera::new(&view(0.0, 0.0, 90.0), Viewport::new(100.0, 100.0));
        let right = cam.project(direction(0.2, 0.0)).unwrap();
        let above = cam.project(direction(0.0, 0.2)).unwrap();
        assert!(right.x > 50.0);
        assert!(above.y < 50.0);
    }

    #[test]
    fn unproject_inverts_project() {
        let cam = Camera::new(&view(200.0, 25.0, 70.0), Viewport::new(1280.0, 720.0));
        let (lon, lat) = (210f64.to_radians(), 30f64.to_radians());
        let p = cam.project(direction(lon, lat)).unwrap();
        let (l2, b2) = cam.unproject(p.x, p.y);
        assert!((l2 - lon).abs() < 1e-9);
        assert!((b2 - lat).abs() < 1e-9);
    }

    #[test]
    fn texture_mapping_matches_equirectangular() {
        let pano = PanoData::full(4000, 2000);
        let (lon, lat) = pano.texture_to_spherical(1000.0, 500.0);
        assert!((lon - HALF_PI).abs() < 1e-12);
        assert!((lat - PI / 4.0).abs() < 1e-12);
        let (x, y) = pano.spherical_to_texture(lon, lat);
        assert!((x - 1000.0).abs() < 1e-9 && (y - 500.0).abs() < 1e-9);
    }

    #[test]
    fn texture_markers_need_pano_data() {
        let vp = Viewport::new(800.0, 600.0);
        let set = single(MarkerDescriptor {
            id: Some("px".into()),
            x: Some(0.0),
            y: Some(1000.0),
            html: Some("x".into()),
            ..MarkerDescriptor::default()
        });
        let v = view(0.0, 0.0, 60.0);
        assert!(!project_markers(&v, vp, None, &set)[0].visible);
        let pano = PanoData::full(4000, 2000);
        assert!(project_markers(&v, vp, Some(&pano), &set)[0].visible);
    }

    #[test]
    fn polygon_visible_with_one_vertex_on_screen_and_hit_inside() {
        let vp = Viewport::new(800.0, 600.0);
        let v = view(0.0, 0.0, 60.0);
        let d = 5f64.to_radians();
        let set = single(MarkerDescriptor {
            id: Some("poly".into()),
            polygon_rad: Some(CoordList::Pairs(vec![[-d, -d], [d, -d], [d, d], [-d, d]])),
            ..MarkerDescriptor::default()
        });
        let proj = project_markers(&v, vp, None, &set);
        assert!(proj[0].visible);
        assert_eq!(hit_test(&proj, 400.0, 300.0), Some("poly"));
        assert_eq!(hit_test(&proj, 10.0, 10.0), None);

        // only one corner on screen
        let far = 33f64.to_radians();
        let set = single(MarkerDescriptor {
            id: Some("edge".into()),
            polygon_rad: Some(CoordList::Pairs(vec![[0.0, 0.0], [far, 0.0], [far, far], [0.0, far]])),
            ..MarkerDescriptor::default()
        });
        assert!(project_markers(&v, vp, None, &set)[0].visible);
    }

    #[test]
    fn polygon_straddling_the_viewer_is_clipped_not_shrunk() {
        let vp = Viewport::new(800.0, 600.0);
        let v = view(0.0, 0.0, 90.0);
        let d = 10f64.to_radians();
        // two corners ahead, two behind the viewer
        let set = single(MarkerDescriptor {
            id: Some("wide".into()),
            polygon_rad: Some(CoordList::Pairs(vec![
                [-d, -d],
                [d, -d],
                [PI - d, -d],
                [PI + d, -d],
            ])),
            ..MarkerDescriptor::default()
        });
        let proj = project_markers(&v, vp, None, &set);
        let Some(ProjectedShape::Polygon { points }) = &proj[0].shape else {
            panic!("no projection");
        };
        // both front corners plus one crossing point on each side edge
        assert_eq!(points.len(), 4);
        assert!(points.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
        assert!(points.iter().any(|p| p.x > vp.width));
        assert!(points.iter().any(|p| p.x < 0.0));

        let cam = Camera::new(&v, vp);
        let behind = [direction(PI - d, 0.0), direction(PI + d, 0.0), direction(PI, d)];
        assert!(cam.clip_to_front(&behind).is_empty());
    }

    #[test]
    fn circle_hit_uses_screen_radius() {
        let vp = Viewport::new(800.0, 600.0);
        let v = view(0.0, 0.0, 60.0);
        let set = single(MarkerDescriptor {
            id: Some("ring".into()),
            longitude: Some(crate::config::Angle(0.0)),
            latitude: Some(crate::config::Angle(0.0)),
            circle: Some(20.0),
            ..MarkerDescriptor::default()
        });
        let proj = project_markers(&v, vp, None, &set);
        assert!(proj[0].visible);
        assert_eq!(hit_test(&proj, 400.0, 300.0), Some("ring"));
        assert_eq!(hit_test(&proj, 410.0, 310.0), Some("ring"));
        assert_eq!(hit_test(&proj, 425.0, 300.0), None);
    }

    #[test]
    fn point_hit_uses_anchor_box() {
        let vp = Viewport::new(800.0, 600.0);
        let v = view(0.0, 0.0, 60.0);
        let mut desc = MarkerDescriptor::point("pin", 0.0, 0.0).with_image("pin.png");
        desc.anchor = Some("bottom center".into());
        desc.width = Some(20.0);
        desc.height = Some(40.0);
        let proj = project_markers(&v, vp, None, &single(desc));
        // box spans x 390..410, y 260..300
        assert_eq!(hit_test(&proj, 400.0, 280.0), Some("pin"));
        assert_eq!(hit_test(&proj, 400.0, 310.0), None);
    }

    #[test]
    fn flat_images_sit_at_the_bottom_of_the_sphere() {
        let full = PanoData::for_image(4000, 2000);
        assert_eq!(full, PanoData::full(4000, 2000));

        let flat = PanoData::for_image(4000, 1000);
        assert_eq!(flat.full_height, 2000.0);
        assert_eq!(flat.cropped_y, 1000.0);
        // top row of the image is the horizon
        let (_, lat) = flat.texture_to_spherical(0.0, 0.0);
        assert!(lat.abs() < 1e-12);
    }
}
