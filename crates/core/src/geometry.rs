//! Geometry classification, envelopes and distance helpers
//!
//! Feature geometry is a `geo_types::Geometry<f64>` with longitude on the x
//! axis and latitude on the y axis. Longitudes are not normalized: a feature
//! may be stored with coordinates beyond ±180° so that it can straddle the
//! antimeridian, and region queries compensate by testing shifted copies of
//! the query box (see [`BBox::wrapped`]).

use geo::{BoundingRect, Contains};
use geo_types::{Geometry, GeometryCollection, LineString, Point};
use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Geometry type discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum GeometryType {
    /// Single point
    Point = 0,
    /// Open or closed polyline
    LineString = 1,
    /// Polygon with optional holes
    Polygon = 2,
    /// Collection of points
    MultiPoint = 3,
    /// Collection of polylines
    MultiLineString = 4,
    /// Collection of polygons
    MultiPolygon = 5,
    /// Heterogeneous collection
    GeometryCollection = 6,
}

impl GeometryType {
    /// Classify a geo-types geometry
    pub fn from_geometry(geom: &Geometry<f64>) -> Self {
        match geom {
            Geometry::Point(_) => GeometryType::Point,
            Geometry::Line(_) | Geometry::LineString(_) => GeometryType::LineString,
            Geometry::Polygon(_) | Geometry::Rect(_) | Geometry::Triangle(_) => {
                GeometryType::Polygon
            }
            Geometry::MultiPoint(_) => GeometryType::MultiPoint,
            Geometry::MultiLineString(_) => GeometryType::MultiLineString,
            Geometry::MultiPolygon(_) => GeometryType::MultiPolygon,
            Geometry::GeometryCollection(_) => GeometryType::GeometryCollection,
        }
    }
}

/// Rewrite convenience shapes (`Line`, `Rect`, `Triangle`) as their general
/// counterparts so that every backend returns the same geometry it stored.
pub fn normalize_geometry(geom: Geometry<f64>) -> Geometry<f64> {
    match geom {
        Geometry::Line(line) => Geometry::LineString(LineString::from(vec![line.start, line.end])),
        Geometry::Rect(rect) => Geometry::Polygon(rect.to_polygon()),
        Geometry::Triangle(tri) => Geometry::Polygon(tri.to_polygon()),
        Geometry::GeometryCollection(gc) => Geometry::GeometryCollection(GeometryCollection(
            gc.0.into_iter().map(normalize_geometry).collect(),
        )),
        other => other,
    }
}

/// Axis-aligned bounding box in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    /// Western edge (minimum longitude)
    pub min_lng: f64,
    /// Southern edge (minimum latitude)
    pub min_lat: f64,
    /// Eastern edge (maximum longitude)
    pub max_lng: f64,
    /// Northern edge (maximum latitude)
    pub max_lat: f64,
}

impl BBox {
    /// Create a bounding box from its edges
    pub fn new(min_lng: f64, min_lat: f64, max_lng: f64, max_lat: f64) -> Self {
        Self {
            min_lng,
            min_lat,
            max_lng,
            max_lat,
        }
    }

    /// Compute the envelope of a geometry, `None` for empty geometries
    pub fn from_geometry(geom: &Geometry<f64>) -> Option<Self> {
        let rect = geom.bounding_rect()?;
        Some(Self {
            min_lng: rect.min().x,
            min_lat: rect.min().y,
            max_lng: rect.max().x,
            max_lat: rect.max().y,
        })
    }

    /// Check if this bbox intersects another (edges inclusive)
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_lat <= other.max_lat
            && self.max_lat >= other.min_lat
            && self.min_lng <= other.max_lng
            && self.max_lng >= other.min_lng
    }

    /// Check if this bbox fully contains another bbox
    pub fn contains_bbox(&self, other: &BBox) -> bool {
        self.min_lat <= other.min_lat
            && self.max_lat >= other.max_lat
            && self.min_lng <= other.min_lng
            && self.max_lng >= other.max_lng
    }

    /// Check if this bbox contains a point
    pub fn contains_point(&self, lng: f64, lat: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lng >= self.min_lng && lng <= self.max_lng
    }

    /// Copy of this bbox shifted east by `degrees` of longitude
    pub fn shifted(&self, degrees: f64) -> Self {
        Self::new(
            self.min_lng + degrees,
            self.min_lat,
            self.max_lng + degrees,
            self.max_lat,
        )
    }

    /// The three copies of this bbox (−360°, 0°, +360°) that together match
    /// geometries stored with unwrapped longitudes.
    pub fn wrapped(&self) -> [BBox; 3] {
        [self.shifted(-360.0), *self, self.shifted(360.0)]
    }

    /// Check intersection against any of the wrapped copies of `self`
    pub fn intersects_wrapped(&self, other: &BBox) -> bool {
        self.wrapped().iter().any(|b| b.intersects(other))
    }

    /// Conservative envelope of a great-circle radius around a point
    pub fn around(center: Point<f64>, meters: f64) -> Self {
        let dlat = (meters / EARTH_RADIUS_METERS).to_degrees();
        let cos_lat = center.y().to_radians().cos().abs();
        let dlng = if cos_lat < 1e-9 {
            180.0
        } else {
            (dlat / cos_lat).min(180.0)
        };
        Self::new(
            center.x() - dlng,
            (center.y() - dlat).max(-90.0),
            center.x() + dlng,
            (center.y() + dlat).min(90.0),
        )
    }
}

/// Haversine distance between two points in meters
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lng = (lng2 - lng1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Minimum distance in meters from a point to any part of a geometry
///
/// Returns 0 when the point lies inside a polygonal geometry and
/// `f64::INFINITY` for empty geometries.
pub fn distance_to_geometry(point: Point<f64>, geom: &Geometry<f64>) -> f64 {
    let (lng, lat) = (point.x(), point.y());
    match geom {
        Geometry::Point(p) => haversine_distance(lat, lng, p.y(), p.x()),
        Geometry::MultiPoint(mp) => mp
            .iter()
            .map(|p| haversine_distance(lat, lng, p.y(), p.x()))
            .fold(f64::INFINITY, f64::min),
        Geometry::Line(line) => {
            distance_to_segment(lat, lng, line.start.y, line.start.x, line.end.y, line.end.x)
        }
        Geometry::LineString(ls) => distance_to_linestring(lat, lng, ls),
        Geometry::MultiLineString(mls) => mls
            .iter()
            .map(|ls| distance_to_linestring(lat, lng, ls))
            .fold(f64::INFINITY, f64::min),
        Geometry::Polygon(poly) => distance_to_polygon(point, poly),
        Geometry::MultiPolygon(mp) => mp
            .iter()
            .map(|poly| distance_to_polygon(point, poly))
            .fold(f64::INFINITY, f64::min),
        Geometry::Rect(rect) => distance_to_polygon(point, &rect.to_polygon()),
        Geometry::Triangle(tri) => distance_to_polygon(point, &tri.to_polygon()),
        Geometry::GeometryCollection(gc) => gc
            .iter()
            .map(|g| distance_to_geometry(point, g))
            .fold(f64::INFINITY, f64::min),
    }
}

fn distance_to_polygon(point: Point<f64>, poly: &geo_types::Polygon<f64>) -> f64 {
    if poly.contains(&point) {
        return 0.0;
    }
    let (lng, lat) = (point.x(), point.y());
    let mut min_dist = distance_to_linestring(lat, lng, poly.exterior());
    for interior in poly.interiors() {
        min_dist = min_dist.min(distance_to_linestring(lat, lng, interior));
    }
    min_dist
}

fn distance_to_linestring(lat: f64, lng: f64, ls: &LineString<f64>) -> f64 {
    match ls.0.len() {
        0 => f64::INFINITY,
        1 => haversine_distance(lat, lng, ls.0[0].y, ls.0[0].x),
        _ => ls
            .0
            .windows(2)
            .map(|w| distance_to_segment(lat, lng, w[0].y, w[0].x, w[1].y, w[1].x))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Planar projection onto the segment, measured with haversine
fn distance_to_segment(lat: f64, lng: f64, lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dx = lng2 - lng1;
    let dy = lat2 - lat1;

    if dx == 0.0 && dy == 0.0 {
        return haversine_distance(lat, lng, lat1, lng1);
    }

    let t = (((lng - lng1) * dx + (lat - lat1) * dy) / (dx * dx + dy * dy)).clamp(0.0, 1.0);
    haversine_distance(lat, lng, lat1 + t * dy, lng1 + t * dx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{coord, line_string, point, polygon, Line, Rect};

    #[test]
    fn test_geometry_type_classification() {
        let p: Geometry<f64> = point!(x: 1.0, y: 2.0).into();
        assert_eq!(GeometryType::from_geometry(&p), GeometryType::Point);

        let l: Geometry<f64> = Line::new(coord! {x: 0.0, y: 0.0}, coord! {x: 1.0, y: 1.0}).into();
        assert_eq!(GeometryType::from_geometry(&l), GeometryType::LineString);

        let r: Geometry<f64> = Rect::new(coord! {x: 0.0, y: 0.0}, coord! {x: 1.0, y: 1.0}).into();
        assert_eq!(GeometryType::from_geometry(&r), GeometryType::Polygon);
    }

    #[test]
    fn test_normalize_rewrites_convenience_shapes() {
        let r: Geometry<f64> = Rect::new(coord! {x: 0.0, y: 0.0}, coord! {x: 1.0, y: 1.0}).into();
        assert!(matches!(normalize_geometry(r), Geometry::Polygon(_)));

        let l: Geometry<f64> = Line::new(coord! {x: 0.0, y: 0.0}, coord! {x: 1.0, y: 1.0}).into();
        match normalize_geometry(l) {
            Geometry::LineString(ls) => assert_eq!(ls.0.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bbox_from_linestring() {
        let g: Geometry<f64> = line_string![(x: 179.0, y: 10.0), (x: 181.0, y: 11.0)].into();
        let bbox = BBox::from_geometry(&g).unwrap();
        assert_eq!(bbox, BBox::new(179.0, 10.0, 181.0, 11.0));
    }

    #[test]
    fn test_wrapped_matches_unwrapped_longitudes() {
        let stored = BBox::new(179.0, 10.0, 181.0, 11.0);
        let query = BBox::new(-180.0, 0.0, -178.0, 20.0);
        assert!(!query.intersects(&stored));
        assert!(query.intersects_wrapped(&stored));
    }

    #[test]
    fn test_haversine_one_degree_at_equator() {
        let d = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((d - 111_195.0).abs() < 50.0);
    }

    #[test]
    fn test_distance_inside_polygon_is_zero() {
        let poly: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0),
            (x: 2.0, y: 0.0),
            (x: 2.0, y: 2.0),
            (x: 0.0, y: 2.0),
            (x: 0.0, y: 0.0),
        ]
        .into();
        assert_eq!(distance_to_geometry(point!(x: 1.0, y: 1.0), &poly), 0.0);
        assert!(distance_to_geometry(point!(x: 3.0, y: 1.0), &poly) > 100_000.0);
    }

    #[test]
    fn test_around_contains_center() {
        let center = point!(x: 10.0, y: 45.0);
        let bbox = BBox::around(center, 5_000.0);
        assert!(bbox.contains_point(10.0, 45.0));
        assert!(bbox.max_lat - bbox.min_lat > 0.08);
    }
}
