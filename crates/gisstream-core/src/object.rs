//! GIS objects emitted by the streaming readers, in document order

use crate::color::Color;
use crate::element::{Element, Namespace};
use crate::geometry::Geometry;
use crate::schema::{Schema, SimpleField};
use crate::style::{Style, StyleMap, StyleSelector};
use crate::tagged_map::TaggedMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source format of a document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// Keyhole Markup Language (plain or inside a KMZ archive)
    #[default]
    Kml,
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kml => write!(f, "KML"),
        }
    }
}

/// First object of every stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStart {
    /// Format
    pub format: DocumentType,
    /// Character encoding from the XML declaration (`UTF-8` when absent)
    pub encoding: String,
    /// Prefixed namespaces declared on the root element
    pub namespaces: Vec<Namespace>,
}

impl DocumentStart {
    /// Start marker with the default encoding and no namespaces
    #[must_use]
    pub fn new(format: DocumentType) -> Self {
        Self {
            format,
            encoding: "UTF-8".to_string(),
            namespaces: Vec::new(),
        }
    }
}

/// Properties shared by features and containers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Common {
    /// Element id
    pub id: Option<String>,
    /// `name`
    pub name: Option<String>,
    /// `description`
    pub description: Option<String>,
    /// `visibility`; absent means the KML default (visible)
    pub visibility: Option<bool>,
    /// `styleUrl`
    pub style_url: Option<String>,
    /// `Snippet` / `snippet`; an empty string is preserved
    pub snippet: Option<String>,
    /// Start of the time primitive
    pub start_time: Option<DateTime<Utc>>,
    /// End of the time primitive
    pub end_time: Option<DateTime<Utc>>,
    /// `Region` (`LatLonAltBox` and `Lod` values merged)
    pub region: TaggedMap,
    /// `LookAt` or `Camera`
    pub view_group: TaggedMap,
    /// Schema referenced by the last `SchemaData` block
    pub schema: Option<String>,
    /// Extended data values keyed by field
    pub data: Vec<(SimpleField, String)>,
    /// Foreign elements found among the properties
    pub elements: Vec<Element>,
    /// Foreign elements found inside `ExtendedData`
    pub extended_elements: Vec<Element>,
}

impl Common {
    /// Store an extended data value, replacing any value for the same field
    /// name
    pub fn put_data(&mut self, field: SimpleField, value: String) {
        if let Some(slot) = self.data.iter_mut().find(|(f, _)| f.name == field.name) {
            *slot = (field, value);
        } else {
            self.data.push((field, value));
        }
    }

    /// Extended data value by field name
    #[must_use]
    pub fn get_data(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|(f, _)| f.name == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Kind of container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// `Document`
    Document,
    /// `Folder`
    Folder,
}

impl ContainerKind {
    /// KML element name
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Document => "Document",
            Self::Folder => "Folder",
        }
    }
}

/// Opening of a `Document` or `Folder`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStart {
    /// Container kind
    pub kind: ContainerKind,
    /// Shared properties
    pub common: Common,
    /// `open`
    pub open: bool,
    /// Inline styles declared in the container header
    pub styles: Vec<StyleSelector>,
}

impl ContainerStart {
    /// Empty container header
    #[must_use]
    pub fn new(kind: ContainerKind) -> Self {
        Self {
            kind,
            common: Common::default(),
            open: false,
            styles: Vec::new(),
        }
    }
}

/// Units of a [`ScreenLocation`] ordinate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreenUnit {
    /// Fraction of the screen / image
    #[default]
    Fraction,
    /// Pixels from the origin
    Pixels,
    /// Pixels inset from the far edge
    InsetPixels,
}

impl ScreenUnit {
    /// Parse `fraction`, `pixels` or `insetPixels` (case-insensitive)
    #[must_use]
    pub fn from_kml(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "fraction" => Some(Self::Fraction),
            "pixels" => Some(Self::Pixels),
            "insetpixels" => Some(Self::InsetPixels),
            _ => None,
        }
    }
}

/// `overlayXY`, `screenXY`, `rotationXY` or `size`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenLocation {
    /// x ordinate
    pub x: f64,
    /// y ordinate
    pub y: f64,
    /// Units of `x`
    pub xunits: ScreenUnit,
    /// Units of `y`
    pub yunits: ScreenUnit,
}

/// Properties shared by all overlays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    /// Tint
    pub color: Option<Color>,
    /// Stacking order
    pub draw_order: Option<i32>,
    /// `Icon` link
    pub icon: TaggedMap,
}

/// `GroundOverlay` specifics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundOverlay {
    /// Shared overlay properties
    pub overlay: Overlay,
    /// `LatLonBox` north
    pub north: Option<f64>,
    /// `LatLonBox` south
    pub south: Option<f64>,
    /// `LatLonBox` east
    pub east: Option<f64>,
    /// `LatLonBox` west (values below -180 are shifted by 360)
    pub west: Option<f64>,
    /// `LatLonBox` rotation
    pub rotation: Option<f64>,
    /// `altitude`
    pub altitude: Option<f64>,
    /// `altitudeMode`
    pub altitude_mode: Option<String>,
}

/// `ScreenOverlay` specifics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenOverlay {
    /// Shared overlay properties
    pub overlay: Overlay,
    /// `overlayXY`
    pub overlay_xy: Option<ScreenLocation>,
    /// `screenXY`
    pub screen_xy: Option<ScreenLocation>,
    /// `rotationXY`
    pub rotation_xy: Option<ScreenLocation>,
    /// `size`
    pub size: Option<ScreenLocation>,
    /// `rotation`, normalized into [-180, 180]
    pub rotation: Option<f64>,
}

/// `PhotoOverlay` specifics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhotoOverlay {
    /// Shared overlay properties
    pub overlay: Overlay,
    /// `rotation` in [-180, 180]
    pub rotation: Option<f64>,
}

/// `NetworkLink` specifics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkLink {
    /// `Link` (or legacy `Url`) values; `href` is rewritten to the resolved
    /// target once a reader has processed the link
    pub link: TaggedMap,
    /// `open`
    pub open: bool,
    /// `refreshVisibility`
    pub refresh_visibility: bool,
    /// `flyToView`
    pub fly_to_view: bool,
}

impl Default for NetworkLink {
    fn default() -> Self {
        Self {
            link: TaggedMap::new("Link"),
            open: false,
            refresh_visibility: false,
            fly_to_view: false,
        }
    }
}

/// Feature refinement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureKind {
    /// `Placemark`
    Placemark,
    /// `NetworkLink`
    NetworkLink(NetworkLink),
    /// `GroundOverlay`
    GroundOverlay(GroundOverlay),
    /// `ScreenOverlay`
    ScreenOverlay(ScreenOverlay),
    /// `PhotoOverlay`
    PhotoOverlay(PhotoOverlay),
}

impl FeatureKind {
    /// KML element name
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Placemark => "Placemark",
            Self::NetworkLink(_) => "NetworkLink",
            Self::GroundOverlay(_) => "GroundOverlay",
            Self::ScreenOverlay(_) => "ScreenOverlay",
            Self::PhotoOverlay(_) => "PhotoOverlay",
        }
    }
}

/// A placemark, overlay or network link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    /// Refinement
    pub kind: FeatureKind,
    /// Shared properties
    pub common: Common,
    /// Inline `Style` or `StyleMap`
    pub style: Option<StyleSelector>,
    /// Geometry (placemarks, and the point of a `PhotoOverlay`)
    pub geometry: Option<Geometry>,
}

impl Feature {
    /// Empty feature of the given kind
    #[must_use]
    pub fn new(kind: FeatureKind) -> Self {
        Self {
            kind,
            common: Common::default(),
            style: None,
            geometry: None,
        }
    }

    /// Network link details when this is a `NetworkLink`
    #[must_use]
    pub const fn network_link(&self) -> Option<&NetworkLink> {
        match &self.kind {
            FeatureKind::NetworkLink(link) => Some(link),
            _ => None,
        }
    }

    /// Shared overlay properties when this is an overlay
    #[must_use]
    pub const fn overlay(&self) -> Option<&Overlay> {
        match &self.kind {
            FeatureKind::GroundOverlay(o) => Some(&o.overlay),
            FeatureKind::ScreenOverlay(o) => Some(&o.overlay),
            FeatureKind::PhotoOverlay(o) => Some(&o.overlay),
            _ => None,
        }
    }

    /// Mutable shared overlay properties when this is an overlay
    pub fn overlay_mut(&mut self) -> Option<&mut Overlay> {
        match &mut self.kind {
            FeatureKind::GroundOverlay(o) => Some(&mut o.overlay),
            FeatureKind::ScreenOverlay(o) => Some(&mut o.overlay),
            FeatureKind::PhotoOverlay(o) => Some(&mut o.overlay),
            _ => None,
        }
    }
}

/// Top-level link metadata. `Update` bodies are not kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkLinkControl {
    /// `minRefreshPeriod` seconds
    pub min_refresh_period: Option<f64>,
    /// `maxSessionLength` seconds
    pub max_session_length: Option<f64>,
    /// `cookie`
    pub cookie: Option<String>,
    /// `message`
    pub message: Option<String>,
    /// `linkName`
    pub link_name: Option<String>,
    /// `linkDescription`
    pub link_description: Option<String>,
    /// `linkSnippet`
    pub link_snippet: Option<String>,
    /// `expires`
    pub expires: Option<DateTime<Utc>>,
    /// `LookAt` or `Camera`
    pub view_group: TaggedMap,
    /// `Update/targetHref`
    pub target_href: Option<String>,
    /// `Create`, `Delete` or `Change`
    pub update_type: Option<String>,
}

/// One event of a GIS object stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GisObject {
    /// Stream header
    DocumentStart(DocumentStart),
    /// `Document` / `Folder` opened
    ContainerStart(ContainerStart),
    /// `Document` / `Folder` closed
    ContainerEnd,
    /// Placemark, overlay or network link
    Feature(Feature),
    /// Shared `Style`
    Style(Style),
    /// Shared `StyleMap`
    StyleMap(StyleMap),
    /// `Schema`
    Schema(Schema),
    /// `NetworkLinkControl`
    NetworkLinkControl(NetworkLinkControl),
    /// Foreign-namespace subtree
    Element(Element),
}

impl GisObject {
    /// Short type name, as used in log messages
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DocumentStart(_) => "DocumentStart",
            Self::ContainerStart(_) => "ContainerStart",
            Self::ContainerEnd => "ContainerEnd",
            Self::Feature(f) => f.kind.tag(),
            Self::Style(_) => "Style",
            Self::StyleMap(_) => "StyleMap",
            Self::Schema(_) => "Schema",
            Self::NetworkLinkControl(_) => "NetworkLinkControl",
            Self::Element(_) => "Element",
        }
    }

    /// Whether this is a `NetworkLink` feature
    #[must_use]
    pub const fn is_network_link(&self) -> bool {
        matches!(
            self,
            Self::Feature(Feature {
                kind: FeatureKind::NetworkLink(_),
                ..
            })
        )
    }

    /// The feature, if this object is one
    #[must_use]
    pub const fn as_feature(&self) -> Option<&Feature> {
        match self {
            Self::Feature(f) => Some(f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_data_replaces_by_name() {
        let mut common = Common::default();
        common.put_data(SimpleField::new("a"), "1".to_string());
        common.put_data(SimpleField::new("b"), "2".to_string());
        common.put_data(SimpleField::new("a"), "3".to_string());
        assert_eq!(common.data.len(), 2);
        assert_eq!(common.get_data("a"), Some("3"));
    }

    #[test]
    fn test_network_link_detection() {
        let link = GisObject::Feature(Feature::new(FeatureKind::NetworkLink(NetworkLink::default())));
        assert!(link.is_network_link());
        assert_eq!(link.kind(), "NetworkLink");
        let placemark = GisObject::Feature(Feature::new(FeatureKind::Placemark));
        assert!(!placemark.is_network_link());
        assert!(placemark.as_feature().is_some_and(|f| f.overlay().is_none()));
    }

    #[test]
    fn test_screen_units() {
        assert_eq!(ScreenUnit::from_kml("insetPixels"), Some(ScreenUnit::InsetPixels));
        assert_eq!(ScreenUnit::from_kml("FRACTION"), Some(ScreenUnit::Fraction));
        assert_eq!(ScreenUnit::from_kml("inches"), None);
    }

    #[test]
    fn test_objects_serialize() {
        let obj = GisObject::ContainerStart(ContainerStart::new(ContainerKind::Folder));
        let json = serde_json::to_string(&obj).unwrap();
        assert!(json.contains("Folder"));
        let back: GisObject = serde_json::from_str(&json).unwrap();
        assert_eq!(back, obj);
    }
}
