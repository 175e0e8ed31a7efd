//! # GeoJSON Geometry
//!
//! The subset of GeoJSON the engine needs: typed geometries with validation,
//! reduction of pipe geometries to a single line, canonical coordinates for
//! id derivation, and great-circle distances for the nearest-building query.

use crate::TwinError;
use crate::primitives::COORD_DECIMALS;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A GeoJSON position: `[lon, lat]` with an optional altitude.
pub type Position = Vec<f64>;

/// Mean Earth radius used for haversine distances.
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// A GeoJSON geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Point { coordinates: Position },
    MultiPoint { coordinates: Vec<Position> },
    LineString { coordinates: Vec<Position> },
    MultiLineString { coordinates: Vec<Vec<Position>> },
    Polygon { coordinates: Vec<Vec<Position>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Position>>> },
    GeometryCollection { geometries: Vec<Geometry> },
}

/// A longitude/latitude pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    #[must_use]
    pub const fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [lon, lat, ..] => Some(Self::new(*lon, *lat)),
            _ => None,
        }
    }

    /// Canonical text of this coordinate, `"<lon>_<lat>"` at
    /// [`COORD_DECIMALS`] places. Two coordinates that agree to that
    /// precision always produce the same key.
    #[must_use]
    pub fn canonical_key(&self) -> String {
        format!(
            "{}_{}",
            canonical_component(self.lon),
            canonical_component(self.lat)
        )
    }

    /// This coordinate rounded to [`COORD_DECIMALS`] places.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self::new(round_component(self.lon), round_component(self.lat))
    }
}

fn canonical_component(value: f64) -> String {
    let text = format!("{:.*}", COORD_DECIMALS, value);
    // Negative zero would otherwise hash differently from zero.
    match text.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0' || c == '.') => rest.to_string(),
        _ => text,
    }
}

fn round_component(value: f64) -> f64 {
    canonical_component(value).parse().unwrap_or(value)
}

impl Geometry {
    /// Parse and validate a geometry from JSON.
    pub fn from_value(value: Value) -> Result<Self, TwinError> {
        let geometry: Geometry =
            serde_json::from_value(value).map_err(|e| TwinError::InvalidGeometry(e.to_string()))?;
        geometry.validate()?;
        Ok(geometry)
    }

    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point { .. } => "Point",
            Geometry::MultiPoint { .. } => "MultiPoint",
            Geometry::LineString { .. } => "LineString",
            Geometry::MultiLineString { .. } => "MultiLineString",
            Geometry::Polygon { .. } => "Polygon",
            Geometry::MultiPolygon { .. } => "MultiPolygon",
            Geometry::GeometryCollection { .. } => "GeometryCollection",
        }
    }

    /// Check structural validity: finite in-range positions, lines with at
    /// least two positions, closed polygon rings of at least four.
    pub fn validate(&self) -> Result<(), TwinError> {
        match self {
            Geometry::Point { coordinates } => check_position(coordinates),
            Geometry::MultiPoint { coordinates } => {
                non_empty(coordinates, "MultiPoint")?;
                coordinates.iter().try_for_each(|p| check_position(p))
            }
            Geometry::LineString { coordinates } => check_line(coordinates),
            Geometry::MultiLineString { coordinates } => {
                non_empty(coordinates, "MultiLineString")?;
                coordinates.iter().try_for_each(|l| check_line(l))
            }
            Geometry::Polygon { coordinates } => check_polygon(coordinates),
            Geometry::MultiPolygon { coordinates } => {
                non_empty(coordinates, "MultiPolygon")?;
                coordinates.iter().try_for_each(|p| check_polygon(p))
            }
            Geometry::GeometryCollection { geometries } => {
                geometries.iter().try_for_each(Geometry::validate)
            }
        }
    }

    /// Reduce a pipe geometry to one connected line.
    ///
    /// A `LineString` is returned as-is. A `MultiLineString` is merged by
    /// joining parts whose endpoints coincide (at canonical precision),
    /// reversing parts where needed. Returns `None` for any other type, or
    /// when the parts do not chain into exactly one line.
    #[must_use]
    pub fn reduce_to_line(&self) -> Option<Vec<Coord>> {
        match self {
            Geometry::LineString { coordinates } => to_coords(coordinates),
            Geometry::MultiLineString { coordinates } => {
                let parts = coordinates
                    .iter()
                    .map(|line| to_coords(line))
                    .collect::<Option<Vec<_>>>()?;
                merge_lines(parts)
            }
            _ => None,
        }
    }

    /// Every vertex of the geometry, in document order.
    #[must_use]
    pub fn vertices(&self) -> Vec<Coord> {
        let mut out = Vec::new();
        self.collect_vertices(&mut out);
        out
    }

    fn collect_vertices(&self, out: &mut Vec<Coord>) {
        let push_all = |out: &mut Vec<Coord>, positions: &[Position]| {
            out.extend(positions.iter().filter_map(|p| Coord::from_position(p)));
        };
        match self {
            Geometry::Point { coordinates } => {
                out.extend(Coord::from_position(coordinates));
            }
            Geometry::MultiPoint { coordinates } | Geometry::LineString { coordinates } => {
                push_all(out, coordinates);
            }
            Geometry::MultiLineString { coordinates } | Geometry::Polygon { coordinates } => {
                for line in coordinates {
                    push_all(out, line);
                }
            }
            Geometry::MultiPolygon { coordinates } => {
                for ring in coordinates.iter().flatten() {
                    push_all(out, ring);
                }
            }
            Geometry::GeometryCollection { geometries } => {
                for geometry in geometries {
                    geometry.collect_vertices(out);
                }
            }
        }
    }
}

// =============================================================================
// VALIDATION HELPERS
// =============================================================================

fn invalid(reason: impl Into<String>) -> TwinError {
    TwinError::InvalidGeometry(reason.into())
}

fn non_empty<T>(items: &[T], what: &str) -> Result<(), TwinError> {
    if items.is_empty() {
        Err(invalid(format!("{what} has no members")))
    } else {
        Ok(())
    }
}

fn check_position(position: &[f64]) -> Result<(), TwinError> {
    let Some(coord) = Coord::from_position(position) else {
        return Err(invalid("position needs at least two numbers"));
    };
    if !position.iter().all(|v| v.is_finite()) {
        return Err(invalid("position has a non-finite number"));
    }
    if !(-180.0..=180.0).contains(&coord.lon) || !(-90.0..=90.0).contains(&coord.lat) {
        return Err(invalid(format!(
            "position [{}, {}] is outside lon/lat range",
            coord.lon, coord.lat
        )));
    }
    Ok(())
}

fn check_line(line: &[Position]) -> Result<(), TwinError> {
    if line.len() < 2 {
        return Err(invalid("LineString needs at least two positions"));
    }
    line.iter().try_for_each(|p| check_position(p))
}

fn check_polygon(rings: &[Vec<Position>]) -> Result<(), TwinError> {
    non_empty(rings, "Polygon")?;
    for ring in rings {
        if ring.len() < 4 {
            return Err(invalid("polygon ring needs at least four positions"));
        }
        ring.iter().try_for_each(|p| check_position(p))?;
        if ring.first() != ring.last() {
            return Err(invalid("polygon ring is not closed"));
        }
    }
    Ok(())
}

// =============================================================================
// LINE MERGING
// =============================================================================

fn to_coords(positions: &[Position]) -> Option<Vec<Coord>> {
    let coords = positions
        .iter()
        .map(|p| Coord::from_position(p))
        .collect::<Option<Vec<_>>>()?;
    if coords.len() < 2 { None } else { Some(coords) }
}

fn endpoint_keys(line: &[Coord]) -> Option<(String, String)> {
    Some((line.first()?.canonical_key(), line.last()?.canonical_key()))
}

fn merge_lines(parts: Vec<Vec<Coord>>) -> Option<Vec<Coord>> {
    let mut parts = parts.into_iter();
    let mut line = parts.next()?;
    let mut remaining: Vec<Vec<Coord>> = parts.collect();

    while !remaining.is_empty() {
        let (head, tail) = endpoint_keys(&line)?;
        let (index, (start, end)) = remaining.iter().enumerate().find_map(|(i, part)| {
            let keys = endpoint_keys(part)?;
            let touches = keys.0 == tail || keys.1 == tail || keys.1 == head || keys.0 == head;
            touches.then_some((i, keys))
        })?;
        let part = remaining.remove(index);

        if start == tail {
            line.extend(part.into_iter().skip(1));
        } else if end == tail {
            line.extend(part.into_iter().rev().skip(1));
        } else if end == head {
            let mut joined: Vec<Coord> = part;
            joined.pop();
            joined.extend(line);
            line = joined;
        } else {
            let mut joined: Vec<Coord> = part.into_iter().rev().collect();
            joined.pop();
            joined.extend(line);
            line = joined;
        }
    }
    Some(line)
}

// =============================================================================
// DISTANCE
// =============================================================================

/// Great-circle distance in meters.
#[allow(clippy::float_arithmetic)]
#[must_use]
pub fn haversine_meters(a: Coord, b: Coord) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Smallest vertex-to-vertex distance between two geometries, in meters.
#[must_use]
pub fn min_distance_meters(a: &Geometry, b: &Geometry) -> Option<f64> {
    let left = a.vertices();
    let right = b.vertices();
    left.iter()
        .flat_map(|p| right.iter().map(move |q| haversine_meters(*p, *q)))
        .min_by(f64::total_cmp)
}

/// Round a distance to two decimal places.
#[allow(clippy::float_arithmetic)]
#[must_use]
pub fn round_centimeters(meters: f64) -> f64 {
    (meters * 100.0).round() / 100.0
}

// =============================================================================
// TESTS
// =============================================================================
