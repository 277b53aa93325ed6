// markers.rs — marker descriptors (JSON shape), validated markers and the owned marker set

use crate::config::Angle;
use crate::error::MarkerError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Hit-test size for markers that do not declare one.
pub const DEFAULT_MARKER_SIZE: f64 = 32.0;

/// Polygon coordinates, either `[x0, y0, x1, y1, …]` or `[[x0, y0], [x1, y1], …]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CoordList {
    Flat(Vec<f64>),
    Pairs(Vec<[f64; 2]>),
}

impl CoordList {
    fn pairs(&self, id: &str) -> Result<Vec<(f64, f64)>, MarkerError> {
        let pairs: Vec<(f64, f64)> = match self {
            CoordList::Flat(v) => {
                if v.len() % 2 != 0 {
                    return Err(MarkerError::PolygonOddLength(id.to_string()));
                }
                v.chunks_exact(2).map(|c| (c[0], c[1])).collect()
            }
            CoordList::Pairs(v) => v.iter().map(|p| (p[0], p[1])).collect(),
        };
        if pairs.len() < 3 {
            return Err(MarkerError::PolygonTooShort {
                id: id.to_string(),
                count: pairs.len(),
            });
        }
        if pairs.iter().any(|(a, b)| !a.is_finite() || !b.is_finite()) {
            return Err(MarkerError::NonFinite(id.to_string()));
        }
        Ok(pairs)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TooltipSpec {
    Text(String),
    Full {
        content: String,
        #[serde(default)]
        position: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tooltip {
    pub content: String,
    pub position: Option<String>,
}

impl From<TooltipSpec> for Tooltip {
    fn from(spec: TooltipSpec) -> Self {
        match spec {
            TooltipSpec::Text(content) => Tooltip {
                content,
                position: None,
            },
            TooltipSpec::Full { content, position } => Tooltip { content, position },
        }
    }
}

/// What callers hand to `add_marker` / `update_marker`. Every field is optional so the same
/// type doubles as a partial patch.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MarkerDescriptor {
    pub id: Option<String>,
    pub longitude: Option<Angle>,
    pub latitude: Option<Angle>,
    /// Source-image pixel coordinates.
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub image: Option<String>,
    pub html: Option<String>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub anchor: Option<String>,
    pub tooltip: Option<TooltipSpec>,
    /// Longer content shown when the marker is selected.
    pub content: Option<String>,
    pub style: BTreeMap<String, String>,
    #[serde(alias = "svgStyle")]
    pub svg_style: BTreeMap<String, String>,
    pub polygon_px: Option<CoordList>,
    pub polygon_rad: Option<CoordList>,
    /// Circle radius in screen pixels.
    pub circle: Option<f64>,
}

impl MarkerDescriptor {
    pub fn point(id: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self {
            id: Some(id.into()),
            longitude: Some(Angle(longitude)),
            latitude: Some(Angle(latitude)),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    /// Overlay the fields set in `patch` on top of `self`.
    pub fn merged(&self, patch: &MarkerDescriptor) -> MarkerDescriptor {
        let mut out = self.clone();
        if patch.longitude.is_some() || patch.latitude.is_some() {
            out.x = None;
            out.y = None;
        }
        if patch.x.is_some() || patch.y.is_some() {
            out.longitude = None;
            out.latitude = None;
        }
        if patch.polygon_px.is_some() {
            out.polygon_rad = None;
        }
        if patch.polygon_rad.is_some() {
            out.polygon_px = None;
        }

        macro_rules! overlay {
            ($($f:ident),*) => {
                $( if patch.$f.is_some() { out.$f = patch.$f.clone(); } )*
            };
        }
        overlay!(
            longitude, latitude, x, y, image, html, width, height, anchor, tooltip, content,
            polygon_px, polygon_rad, circle
        );
        if !patch.style.is_empty() {
            out.style = patch.style.clone();
        }
        if !patch.svg_style.is_empty() {
            out.svg_style = patch.svg_style.clone();
        }
        out
    }

    fn coordinates(&self) -> Option<Coordinates> {
        match (self.longitude, self.latitude, self.x, self.y) {
            (Some(lon), Some(lat), _, _) => Some(Coordinates::Spherical {
                longitude: lon.0,
                latitude: lat.0,
            }),
            (_, _, Some(x), Some(y)) => Some(Coordinates::Texture { x, y }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinates {
    Spherical { longitude: f64, latitude: f64 },
    /// Pixel position in the full equirectangular source image.
    Texture { x: f64, y: f64 },
}

impl Coordinates {
    fn is_finite(&self) -> bool {
        match *self {
            Coordinates::Spherical { longitude, latitude } => {
                longitude.is_finite() && latitude.is_finite()
            }
            Coordinates::Texture { x, y } => x.is_finite() && y.is_finite(),
        }
    }
}

/// Fraction of the marker box that sits on the projected point (0,0 = top left).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Default for Anchor {
    fn default() -> Self {
        Self { x: 0.5, y: 0.5 }
    }
}

impl Anchor {
    /// Parse "bottom center", "top left", "right"… Unknown words are ignored.
    pub fn parse(text: &str) -> Self {
        let mut anchor = Self::default();
        for word in text.split_whitespace() {
            match word.to_ascii_lowercase().as_str() {
                "left" => anchor.x = 0.0,
                "right" => anchor.x = 1.0,
                "top" => anchor.y = 0.0,
                "bottom" => anchor.y = 1.0,
                _ => {}
            }
        }
        anchor
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointContent {
    Image(String),
    Html(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerShape {
    Point {
        position: Coordinates,
        content: PointContent,
        width: f64,
        height: f64,
        anchor: Anchor,
    },
    Polygon {
        vertices: Vec<Coordinates>,
    },
    Circle {
        center: Coordinates,
        radius: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: String,
    pub shape: MarkerShape,
    pub tooltip: Option<Tooltip>,
    pub content: Option<String>,
    pub style: BTreeMap<String, String>,
    pub svg_style: BTreeMap<String, String>,
    descriptor: MarkerDescriptor,
}

impl Marker {
    pub fn descriptor(&self) -> &MarkerDescriptor {
        &self.descriptor
    }
}

impl TryFrom<MarkerDescriptor> for Marker {
    type Error = MarkerError;

    fn try_from(desc: MarkerDescriptor) -> Result<Self, Self::Error> {
        let id = desc
            .id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or(MarkerError::MissingId)?;

        let shape = if let Some(list) = &desc.polygon_px {
            let vertices = list
                .pairs(&id)?
                .into_iter()
                .map(|(x, y)| Coordinates::Texture { x, y })
                .collect();
            MarkerShape::Polygon { vertices }
        } else if let Some(list) = &desc.polygon_rad {
            let vertices = list
                .pairs(&id)?
                .into_iter()
                .map(|(longitude, latitude)| Coordinates::Spherical { longitude, latitude })
                .collect();
            MarkerShape::Polygon { vertices }
        } else if let Some(radius) = desc.circle {
            let center = desc
                .coordinates()
                .ok_or_else(|| MarkerError::MissingCoordinates(id.clone()))?;
            if !center.is_finite() || !radius.is_finite() {
                return Err(MarkerError::NonFinite(id));
            }
            MarkerShape::Circle {
                center,
                radius: radius.abs(),
            }
        } else {
            let content = match (&desc.image, &desc.html) {
                (Some(img), _) => PointContent::Image(img.clone()),
                (None, Some(html)) => PointContent::Html(html.clone()),
                (None, None) => return Err(MarkerError::MissingContent(id)),
            };
            let position = desc
                .coordinates()
                .ok_or_else(|| MarkerError::MissingCoordinates(id.clone()))?;
            if !position.is_finite() {
                return Err(MarkerError::NonFinite(id));
            }
            MarkerShape::Point {
                position,
                content,
                width: desc.width.unwrap_or(DEFAULT_MARKER_SIZE),
                height: desc.height.unwrap_or(DEFAULT_MARKER_SIZE),
                anchor: desc.anchor.as_deref().map(Anchor::parse).unwrap_or_default(),
            }
        };

        Ok(Marker {
            id,
            shape,
            tooltip: desc.tooltip.clone().map(Tooltip::from),
            content: desc.content.clone(),
            style: desc.style.clone(),
            svg_style: desc.svg_style.clone(),
            descriptor: desc,
        })
    }
}

/// Markers in insertion order; later markers draw (and hit-test) on top.
#[derive(Debug, Clone, Default)]
pub struct MarkerSet {
    markers: Vec<Marker>,
}

impl MarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.id == id)
    }

    fn position(&self, id: &str) -> Result<usize, MarkerError> {
        self.markers
            .iter()
            .position(|m| m.id == id)
            .ok_or_else(|| MarkerError::UnknownId(id.to_string()))
    }

    pub fn add(&mut self, descriptor: MarkerDescriptor) -> Result<&Marker, MarkerError> {
        let marker = Marker::try_from(descriptor)?;
        if self.get(&marker.id).is_some() {
            return Err(MarkerError::DuplicateId(marker.id));
        }
        self.markers.push(marker);
        Ok(&self.markers[self.markers.len() - 1])
    }

    pub fn remove(&mut self, id: &str) -> Result<Marker, MarkerError> {
        let idx = self.position(id)?;
        Ok(self.markers.remove(idx))
    }

    /// The marker id cannot be changed through a patch.
    pub fn update(&mut self, id: &str, patch: &MarkerDescriptor) -> Result<&Marker, MarkerError> {
        let idx = self.position(id)?;
        let mut merged = self.markers[idx].descriptor.merged(patch);
        merged.id = Some(id.to_string());
        let marker = Marker::try_from(merged)?;
        self.markers[idx] = marker;
        Ok(&self.markers[idx])
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_demo_style_json() {
        let markers: Vec<MarkerDescriptor> = serde_json::from_str(
            r#"[
                { "id": "image", "longitude": 5.6981, "latitude": -0.1377,
                  "image": "pin-blue.png", "width": 32, "height": 32,
                  "anchor": "bottom center", "tooltip": "A image marker" },
                { "id": "polygon", "polygon_px": [3184, 794, 3268, 841, 3367, 1194],
                  "svgStyle": { "fill": "rgba(200, 0, 0, 0.2)" },
                  "tooltip": { "content": "A polygon", "position": "right bottom" } },
                { "id": "circle", "circle": 20, "x": 2500, "y": 1000 }
            ]"#,
        )
        .unwrap();

        let mut set = MarkerSet::new();
        for m in markers {
            set.add(m).unwrap();
        }
        assert_eq!(set.len(), 3);

        let img = set.get("image").unwrap();
        match &img.shape {
            MarkerShape::Point { anchor, content, .. } => {
                assert_eq!(*anchor, Anchor { x: 0.5, y: 1.0 });
                assert_eq!(*content, PointContent::Image("pin-blue.png".into()));
            }
            other => panic!("unexpected shape {other:?}"),
        }
        let poly = set.get("polygon").unwrap();
        assert!(matches!(&poly.shape, MarkerShape::Polygon { vertices } if vertices.len() == 3));
        assert_eq!(poly.tooltip.as_ref().unwrap().position.as_deref(), Some("right bottom"));
        assert_eq!(poly.svg_style.get("fill").map(String::as_str), Some("rgba(200, 0, 0, 0.2)"));
        assert!(matches!(set.get("circle").unwrap().shape, MarkerShape::Circle { radius, .. } if radius == 20.0));
    }

    #[test]
    fn rejects_marker_without_content_or_coordinates() {
        let mut set = MarkerSet::new();
        let err = set
            .add(MarkerDescriptor {
                id: Some("empty".into()),
                ..MarkerDescriptor::default()
            })
            .unwrap_err();
        assert_eq!(err, MarkerError::MissingContent("empty".into()));

        let err = set
            .add(MarkerDescriptor {
                id: Some("nowhere".into()),
                html: Some("<b>hi</b>".into()),
                ..MarkerDescriptor::default()
            })
            .unwrap_err();
        assert_eq!(err, MarkerError::MissingCoordinates("nowhere".into()));
        assert!(set.is_empty());
    }

    #[test]
    fn rejects_short_and_odd_polygons() {
        let mut set = MarkerSet::new();
        let short = MarkerDescriptor {
            id: Some("p".into()),
            polygon_rad: Some(CoordList::Pairs(vec![[0.0, 0.0], [0.1, 0.1]])),
            ..MarkerDescriptor::default()
        };
        assert!(matches!(set.add(short), Err(MarkerError::PolygonTooShort { count: 2, .. })));
        let odd = MarkerDescriptor {
            id: Some("p".into()),
            polygon_px: Some(CoordList::Flat(vec![1.0, 2.0, 3.0])),
            ..MarkerDescriptor::default()
        };
        assert!(matches!(set.add(odd), Err(MarkerError::PolygonOddLength(_))));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut set = MarkerSet::new();
        set.add(MarkerDescriptor::point("a", 0.0, 0.0).with_html("a")).unwrap();
        let err = set.add(MarkerDescriptor::point("a", 1.0, 0.0).with_html("b")).unwrap_err();
        assert_eq!(err, MarkerError::DuplicateId("a".into()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn update_merges_and_keeps_set_on_failure() {
        let mut set = MarkerSet::new();
        set.add(MarkerDescriptor::point("a", 0.0, 0.0).with_html("a")).unwrap();

        let moved = set
            .update(
                "a",
                &MarkerDescriptor {
                    x: Some(10.0),
                    y: Some(20.0),
                    ..MarkerDescriptor::default()
                },
            )
            .unwrap();
        assert!(matches!(
            moved.shape,
            MarkerShape::Point { position: Coordinates::Texture { x, y }, .. } if x == 10.0 && y == 20.0
        ));

        let bad = MarkerDescriptor {
            polygon_px: Some(CoordList::Flat(vec![1.0, 2.0])),
            ..MarkerDescriptor::default()
        };
        assert!(set.update("a", &bad).is_err());
        assert!(matches!(set.get("a").unwrap().shape, MarkerShape::Point { .. }));
        assert_eq!(set.update("zzz", &bad).unwrap_err(), MarkerError::UnknownId("zzz".into()));
    }

    #[test]
    fn anchor_words() {
        assert_eq!(Anchor::parse("top left"), Anchor { x: 0.0, y: 0.0 });
        assert_eq!(Anchor::parse("right"), Anchor { x: 1.0, y: 0.5 });
        assert_eq!(Anchor::parse("center center"), Anchor::default());
    }
}
