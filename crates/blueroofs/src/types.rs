use chrono::{DateTime, NaiveDate, Utc};
use geo_types::{Coord, Geometry, MultiPolygon, Rect};
use geojson::JsonObject;
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::error::{BlueRoofError, Result};

/// 2D integer grid where each connected run of one nonzero value is a blob.
pub type LabeledRaster = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Binary grid (0 or 255) with the same shape as the source image.
pub type Mask = GrayImage;

/// Affine map from raster indices to geographic coordinates.
///
/// `x = a * col + b * row + c`, `y = d * col + e * row + f`. Serialised as
/// `[a, b, c, d, e, f]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0)
    }

    /// North-up transform anchored at the top-left corner of the raster.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height, origin_y)
    }

    pub fn apply(&self, col: f64, row: f64) -> Coord<f64> {
        Coord {
            x: self.a * col + self.b * row + self.c,
            y: self.d * col + self.e * row + self.f,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Geographic to raster mapping, `None` when the transform is singular.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let (ia, ib) = (self.e / det, -self.b / det);
        let (id, ie) = (-self.d / det, self.a / det);
        Some(Self::new(
            ia,
            ib,
            -(ia * self.c + ib * self.f),
            id,
            ie,
            -(id * self.c + ie * self.f),
        ))
    }

    /// The same transform re-anchored at pixel `(col, row)`, as needed after a crop.
    pub fn shifted(&self, col: f64, row: f64) -> Self {
        let origin = self.apply(col, row);
        Self { c: origin.x, f: origin.y, ..*self }
    }

    pub fn to_geo(&self) -> geo::AffineTransform<f64> {
        geo::AffineTransform::new(self.a, self.b, self.c, self.d, self.e, self.f)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<[f64; 6]> for Affine {
    fn from([a, b, c, d, e, f]: [f64; 6]) -> Self {
        Self::new(a, b, c, d, e, f)
    }
}

impl From<Affine> for [f64; 6] {
    fn from(t: Affine) -> Self {
        [t.a, t.b, t.c, t.d, t.e, t.f]
    }
}

/// Axis-aligned geographic bounding box, serialised as `[min_x, min_y, max_x, max_y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 4]", into = "[f64; 4]")]
pub struct Region {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Region {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    pub fn corners(&self) -> [Coord<f64>; 4] {
        [
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
            Coord { x: self.min_x, y: self.max_y },
        ]
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord { x: self.min_x, y: self.min_y },
            Coord { x: self.max_x, y: self.max_y },
        )
    }
}

impl From<[f64; 4]> for Region {
    fn from([min_x, min_y, max_x, max_y]: [f64; 4]) -> Self {
        Self::new(min_x, min_y, max_x, max_y)
    }
}

impl From<Region> for [f64; 4] {
    fn from(r: Region) -> Self {
        [r.min_x, r.min_y, r.max_x, r.max_y]
    }
}

/// A polygonal geometry paired with free-form properties.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    geometry: Geometry<f64>,
    properties: JsonObject,
}

impl Feature {
    /// Only `Polygon` and `MultiPolygon` geometries are accepted.
    pub fn new(geometry: Geometry<f64>, properties: JsonObject) -> Result<Self> {
        match geometry {
            Geometry::Polygon(_) | Geometry::MultiPolygon(_) => Ok(Self { geometry, properties }),
            other => Err(BlueRoofError::unsupported(format!(
                "expected a Polygon or MultiPolygon, got {}",
                geometry_kind(&other)
            ))),
        }
    }

    /// Single-member collections are stored as a plain polygon.
    pub fn from_polygons(mut polygons: MultiPolygon<f64>, properties: JsonObject) -> Self {
        let geometry = if polygons.0.len() == 1 {
            Geometry::Polygon(polygons.0.remove(0))
        } else {
            Geometry::MultiPolygon(polygons)
        };
        Self { geometry, properties }
    }

    pub fn geometry(&self) -> &Geometry<f64> {
        &self.geometry
    }

    pub fn properties(&self) -> &JsonObject {
        &self.properties
    }

    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.properties.insert(key.into(), value.into());
    }

    pub fn to_multi_polygon(&self) -> MultiPolygon<f64> {
        match &self.geometry {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
            // unreachable through the constructors
            _ => MultiPolygon::new(Vec::new()),
        }
    }
}

pub(crate) fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::LineString(_) | Geometry::Line(_) => "LineString",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "unsupported geometry",
    }
}

/// Which pixel product an image request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Correction {
    /// Atmospherically compensated / base-layer matched pixels
    Corrected,
    Raw,
}

/// Pixels for one catalog image cropped to the requested region.
#[derive(Debug, Clone)]
pub struct SceneImage {
    pub image_id: String,
    pub pixels: RgbImage,
    pub transform: Affine,
    pub acquired: DateTime<Utc>,
    pub correction: Correction,
}

impl SceneImage {
    /// Acquisition date in UTC, day precision.
    pub fn acquisition_date(&self) -> NaiveDate {
        self.acquired.date_naive()
    }
}
