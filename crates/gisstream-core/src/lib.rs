//! # gisstream-core
//!
//! GIS object model shared by the gisstream readers.
//!
//! A reader turns a source document into an ordered stream of [`GisObject`]
//! values: a [`DocumentStart`] header, balanced [`ContainerStart`] /
//! `ContainerEnd` pairs, [`Feature`]s with their [`Geometry`], shared
//! [`Style`]s and [`StyleMap`]s, [`Schema`]s, and opaque foreign
//! [`Element`]s. This crate has no I/O; it only defines the values and the
//! small parsing helpers every format needs (colors and times).
//!
//! ## Example
//!
//! ```
//! use gisstream_core::{Coord, Feature, FeatureKind, Geometry, GisObject, Point};
//!
//! let mut feature = Feature::new(FeatureKind::Placemark);
//! feature.common.name = Some("Summit".to_string());
//! feature.geometry = Some(Geometry::Point(Point::new(Coord::new(-121.7, 46.8, Some(4392.0))?)));
//!
//! let obj = GisObject::Feature(feature);
//! assert_eq!(obj.kind(), "Placemark");
//! # Ok::<(), gisstream_core::GeoError>(())
//! ```

pub mod color;
pub mod element;
pub mod error;
pub mod geometry;
pub mod object;
pub mod schema;
pub mod style;
pub mod tagged_map;
pub mod time;

pub use color::Color;
pub use element::{Element, Namespace};
pub use error::{GeoError, Result};
pub use geometry::{
    normalize_longitude, Coord, Geometry, GeometryBag, GeometryProps, Line, LinearRing, Model,
    MultiPoint, Point, Polygon,
};
pub use object::{
    Common, ContainerKind, ContainerStart, DocumentStart, DocumentType, Feature, FeatureKind,
    GisObject, GroundOverlay, NetworkLink, NetworkLinkControl, Overlay, PhotoOverlay,
    ScreenLocation, ScreenOverlay, ScreenUnit,
};
pub use schema::{FieldType, Schema, SimpleField};
pub use style::{
    BalloonStyle, ColorMode, IconStyle, LabelStyle, LineStyle, ListItemType, ListStyle, PolyStyle,
    Style, StyleMap, StylePair, StyleSelector, STYLE_MAP_HIGHLIGHT, STYLE_MAP_NORMAL,
};
pub use tagged_map::TaggedMap;
pub use time::parse_kml_time;
