//! Geometry types produced by the format readers
//!
//! Only the shapes a KML document can express are modelled here: points,
//! lines, rings, polygons, 3D model placements and the two collection forms
//! (homogeneous [`MultiPoint`] and heterogeneous [`GeometryBag`]).

use crate::error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single geodetic position (degrees, optional altitude in meters)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    /// Longitude, normalized into [-180, 180]
    pub lon: f64,
    /// Latitude in [-90, 90]
    pub lat: f64,
    /// Altitude in meters when the source tuple had a third component
    pub alt: Option<f64>,
}

impl Coord {
    /// Build a position, validating latitude and normalizing longitude.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidCoordinate`] when either ordinate is not
    /// finite or the latitude lies outside [-90, 90].
    pub fn new(lon: f64, lat: f64, alt: Option<f64>) -> Result<Self> {
        if !lon.is_finite() {
            return Err(GeoError::InvalidCoordinate(format!("longitude {lon}")));
        }
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(GeoError::InvalidCoordinate(format!("latitude {lat}")));
        }
        if let Some(a) = alt {
            if !a.is_finite() {
                return Err(GeoError::InvalidCoordinate(format!("altitude {a}")));
            }
        }
        Ok(Self {
            lon: normalize_longitude(lon),
            lat,
            alt,
        })
    }

    /// Whether the position carries an altitude
    #[inline]
    #[must_use]
    pub const fn is_3d(&self) -> bool {
        self.alt.is_some()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.alt {
            Some(alt) => write!(f, "({}, {}, {})", self.lon, self.lat, alt),
            None => write!(f, "({}, {})", self.lon, self.lat),
        }
    }
}

/// Wrap a longitude into [-180, 180]
#[must_use]
pub fn normalize_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        return lon;
    }
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lon > 0.0 {
        180.0
    } else {
        wrapped
    }
}

/// Rendering metadata shared by every geometry kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryProps {
    /// `clampToGround`, `relativeToGround`, `absolute` or a gx variant
    pub altitude_mode: Option<String>,
    /// Connect the geometry to the ground
    pub extrude: Option<bool>,
    /// Follow the terrain
    pub tessellate: Option<bool>,
    /// gx:drawOrder
    pub draw_order: Option<i32>,
}

impl GeometryProps {
    /// True when no metadata is set
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.altitude_mode.is_none()
            && self.extrude.is_none()
            && self.tessellate.is_none()
            && self.draw_order.is_none()
    }

    /// Copy every field of `other` that is unset here
    pub fn fill_missing(&mut self, other: &Self) {
        if self.altitude_mode.is_none() {
            self.altitude_mode.clone_from(&other.altitude_mode);
        }
        if self.extrude.is_none() {
            self.extrude = other.extrude;
        }
        if self.tessellate.is_none() {
            self.tessellate = other.tessellate;
        }
        if self.draw_order.is_none() {
            self.draw_order = other.draw_order;
        }
    }
}

/// A single position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Position
    pub coord: Coord,
    /// Rendering metadata
    pub props: GeometryProps,
}

impl Point {
    /// Point without metadata
    #[must_use]
    pub fn new(coord: Coord) -> Self {
        Self {
            coord,
            props: GeometryProps::default(),
        }
    }
}

/// An open path of two or more positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// Vertices in document order
    pub points: Vec<Coord>,
    /// Rendering metadata
    pub props: GeometryProps,
}

impl Line {
    /// Build a line.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidGeometry`] for fewer than two positions.
    pub fn new(points: Vec<Coord>) -> Result<Self> {
        if points.len() < 2 {
            return Err(GeoError::InvalidGeometry(format!(
                "line requires at least 2 points, got {}",
                points.len()
            )));
        }
        Ok(Self {
            points,
            props: GeometryProps::default(),
        })
    }
}

/// A ring of four or more positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRing {
    /// Vertices in document order
    pub points: Vec<Coord>,
    /// Rendering metadata
    pub props: GeometryProps,
}

impl LinearRing {
    /// Minimum number of positions a ring must carry
    pub const MIN_POINTS: usize = 4;

    /// Build a ring.
    ///
    /// Closure (first == last) is not enforced; many producers omit it.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidGeometry`] for fewer than four positions.
    pub fn new(points: Vec<Coord>) -> Result<Self> {
        if points.len() < Self::MIN_POINTS {
            return Err(GeoError::InvalidGeometry(format!(
                "ring requires at least {} points, got {}",
                Self::MIN_POINTS,
                points.len()
            )));
        }
        Ok(Self {
            points,
            props: GeometryProps::default(),
        })
    }

    /// Whether the last vertex repeats the first
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => a.lon == b.lon && a.lat == b.lat,
            _ => false,
        }
    }
}

/// One outer ring and zero or more holes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Outer boundary
    pub outer: LinearRing,
    /// Inner boundaries
    pub inners: Vec<LinearRing>,
    /// Rendering metadata
    pub props: GeometryProps,
}

impl Polygon {
    /// Build a polygon from its rings
    #[must_use]
    pub fn new(outer: LinearRing, inners: Vec<LinearRing>) -> Self {
        Self {
            outer,
            inners,
            props: GeometryProps::default(),
        }
    }
}

/// A 3D model placement. Only the location and altitude mode are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Model anchor
    pub location: Option<Coord>,
    /// Rendering metadata
    pub props: GeometryProps,
}

/// A collection made only of points
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiPoint {
    /// Member points
    pub points: Vec<Point>,
    /// Rendering metadata
    pub props: GeometryProps,
}

/// A heterogeneous geometry collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryBag {
    /// Member geometries
    pub geometries: Vec<Geometry>,
    /// Rendering metadata
    pub props: GeometryProps,
}

/// Any geometry a feature can carry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Geometry {
    /// Single position
    Point(Point),
    /// Open path
    Line(Line),
    /// Closed ring
    LinearRing(LinearRing),
    /// Area with optional holes
    Polygon(Polygon),
    /// 3D model placement
    Model(Model),
    /// Point collection
    MultiPoint(MultiPoint),
    /// Mixed collection
    Bag(GeometryBag),
}

impl Geometry {
    /// Short type name, as used in log messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::Line(_) => "Line",
            Self::LinearRing(_) => "LinearRing",
            Self::Polygon(_) => "Polygon",
            Self::Model(_) => "Model",
            Self::MultiPoint(_) => "MultiPoint",
            Self::Bag(_) => "GeometryBag",
        }
    }

    /// Rendering metadata
    #[must_use]
    pub const fn props(&self) -> &GeometryProps {
        match self {
            Self::Point(g) => &g.props,
            Self::Line(g) => &g.props,
            Self::LinearRing(g) => &g.props,
            Self::Polygon(g) => &g.props,
            Self::Model(g) => &g.props,
            Self::MultiPoint(g) => &g.props,
            Self::Bag(g) => &g.props,
        }
    }

    /// Mutable rendering metadata
    pub fn props_mut(&mut self) -> &mut GeometryProps {
        match self {
            Self::Point(g) => &mut g.props,
            Self::Line(g) => &mut g.props,
            Self::LinearRing(g) => &mut g.props,
            Self::Polygon(g) => &mut g.props,
            Self::Model(g) => &mut g.props,
            Self::MultiPoint(g) => &mut g.props,
            Self::Bag(g) => &mut g.props,
        }
    }

    /// Total number of positions, counting every ring and member
    #[must_use]
    pub fn num_points(&self) -> usize {
        match self {
            Self::Point(_) => 1,
            Self::Line(g) => g.points.len(),
            Self::LinearRing(g) => g.points.len(),
            Self::Polygon(g) => {
                g.outer.points.len() + g.inners.iter().map(|r| r.points.len()).sum::<usize>()
            }
            Self::Model(g) => usize::from(g.location.is_some()),
            Self::MultiPoint(g) => g.points.len(),
            Self::Bag(g) => g.geometries.iter().map(Self::num_points).sum(),
        }
    }
}
