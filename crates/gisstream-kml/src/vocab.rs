//! KML namespaces and the fixed element vocabulary

use crate::xml::QName;
use gisstream_core::{FeatureKind, GroundOverlay, NetworkLink, PhotoOverlay, ScreenOverlay};
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// OGC KML 2.2 namespace
pub const KML_NS: &str = "http://www.opengis.net/kml/2.2";

/// Prefix shared by every Google extension (`gx`) namespace version
pub const NS_GOOGLE_KML_EXT_PREFIX: &str = "http://www.google.com/kml/ext/";

/// Google extension namespace, version 2.2
pub const NS_GOOGLE_KML_EXT: &str = "http://www.google.com/kml/ext/2.2";

/// OASIS xAL address namespace used by `xal:AddressDetails`
pub const NS_OASIS_XAL: &str = "urn:oasis:names:tc:ciq:xsdschema:xAL:2.0";

const KNOWN_KML_NAMESPACES: [&str; 8] = [
    "http://earth.google.com/kml/2.0",
    "http://earth.google.com/kml/2.1",
    "http://earth.google.com/kml/2.2",
    "http://earth.google.com/kml/2.3",
    "http://earth.google.com/kml/3.0",
    KML_NS,
    "http://www.opengis.net/kml/2.3",
    "http://www.opengis.net/kml/3.0",
];

static KML_NAMESPACES: Lazy<RwLock<HashSet<String>>> = Lazy::new(|| {
    RwLock::new(
        KNOWN_KML_NAMESPACES
            .iter()
            .map(|ns| (*ns).to_string())
            .collect(),
    )
});

/// Whether `uri` is one of the accepted KML namespaces, including any
/// nonstandard namespace registered from an earlier document root
#[must_use]
pub fn is_kml_namespace(uri: &str) -> bool {
    KML_NAMESPACES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(uri)
}

/// Accept a nonstandard namespace as KML from now on. Returns `true` when
/// the namespace was not known before.
pub(crate) fn register_kml_namespace(uri: &str) -> bool {
    let uri = uri.trim();
    if uri.is_empty() || is_kml_namespace(uri) {
        return false;
    }
    log::info!("Registering nonstandard KML namespace {uri}");
    KML_NAMESPACES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(uri.to_string())
}

/// Whether an element name belongs to KML: an accepted KML namespace, or no
/// namespace at all (documents without `xmlns`). Unbound prefixes are not
/// KML.
pub(crate) fn is_kml_name(name: &QName) -> bool {
    match &name.ns {
        Some(ns) => is_kml_namespace(ns),
        None => name.prefix.is_none(),
    }
}

/// Whether an element belongs to the Google extension family. An unbound
/// `gx` prefix counts too; producers often forget the declaration.
pub(crate) fn is_google_ext(name: &QName) -> bool {
    match &name.ns {
        Some(ns) => ns.starts_with(NS_GOOGLE_KML_EXT_PREFIX),
        None => name.prefix.as_deref() == Some("gx"),
    }
}

/// Elements the decoder turns into GIS objects at top level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum KmlTag {
    Kml,
    Document,
    Folder,
    Placemark,
    NetworkLink,
    GroundOverlay,
    ScreenOverlay,
    PhotoOverlay,
    Schema,
    NetworkLinkControl,
    Style,
    StyleMap,
}

impl KmlTag {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        let tag = match name {
            "kml" => Self::Kml,
            "Document" => Self::Document,
            "Folder" => Self::Folder,
            "Placemark" => Self::Placemark,
            "NetworkLink" => Self::NetworkLink,
            "GroundOverlay" => Self::GroundOverlay,
            "ScreenOverlay" => Self::ScreenOverlay,
            "PhotoOverlay" => Self::PhotoOverlay,
            "Schema" => Self::Schema,
            "NetworkLinkControl" => Self::NetworkLinkControl,
            "Style" => Self::Style,
            "StyleMap" => Self::StyleMap,
            _ => return None,
        };
        Some(tag)
    }

    pub(crate) const fn is_feature(self) -> bool {
        matches!(
            self,
            Self::Placemark
                | Self::NetworkLink
                | Self::GroundOverlay
                | Self::ScreenOverlay
                | Self::PhotoOverlay
        )
    }

    pub(crate) const fn is_container(self) -> bool {
        matches!(self, Self::Document | Self::Folder)
    }

    /// Empty feature refinement for a feature tag
    pub(crate) fn feature_kind(self) -> Option<FeatureKind> {
        let kind = match self {
            Self::Placemark => FeatureKind::Placemark,
            Self::NetworkLink => FeatureKind::NetworkLink(NetworkLink::default()),
            Self::GroundOverlay => FeatureKind::GroundOverlay(GroundOverlay::default()),
            Self::ScreenOverlay => FeatureKind::ScreenOverlay(ScreenOverlay::default()),
            Self::PhotoOverlay => FeatureKind::PhotoOverlay(PhotoOverlay::default()),
            _ => return None,
        };
        Some(kind)
    }
}

/// KML boolean: `1` or `true` (case-insensitive)
pub(crate) fn is_true(text: &str) -> bool {
    let text = text.trim();
    text == "1" || text.eq_ignore_ascii_case("true")
}

/// Strict KML boolean: `1|true|0|false`, anything else is `None`
pub(crate) fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "1" => Some(true),
        "0" => Some(false),
        t if t.eq_ignore_ascii_case("true") => Some(true),
        t if t.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_namespaces() {
        assert!(is_kml_namespace(KML_NS));
        assert!(is_kml_namespace("http://earth.google.com/kml/2.1"));
        assert!(!is_kml_namespace(NS_GOOGLE_KML_EXT));
        assert!(!is_kml_namespace(""));
    }

    #[test]
    fn test_register_namespace() {
        let ns = "http://example.com/kml/custom-vocab-test";
        assert!(!is_kml_namespace(ns));
        assert!(register_kml_namespace(ns));
        assert!(is_kml_namespace(ns));
        assert!(!register_kml_namespace(ns));
        assert!(!register_kml_namespace("   "));
    }

    #[test]
    fn test_tag_classes() {
        assert!(KmlTag::from_name("Placemark").is_some_and(KmlTag::is_feature));
        assert!(KmlTag::from_name("Folder").is_some_and(KmlTag::is_container));
        assert!(!KmlTag::Schema.is_feature());
        assert_eq!(KmlTag::from_name("placemark"), None);
        assert!(KmlTag::NetworkLink.feature_kind().is_some());
        assert!(KmlTag::Folder.feature_kind().is_none());
    }

    #[test]
    fn test_name_classes() {
        let name = |prefix: Option<&str>, ns: Option<&str>| QName {
            prefix: prefix.map(str::to_string),
            local: "x".to_string(),
            ns: ns.map(str::to_string),
        };
        assert!(is_kml_name(&name(None, None)));
        assert!(is_kml_name(&name(None, Some(KML_NS))));
        assert!(!is_kml_name(&name(Some("foo"), None)));
        assert!(!is_kml_name(&name(Some("gx"), Some(NS_GOOGLE_KML_EXT))));
        assert!(is_google_ext(&name(Some("gx"), None)));
        assert!(is_google_ext(&name(Some("ext"), Some("http://www.google.com/kml/ext/2.3"))));
        assert!(!is_google_ext(&name(None, Some(KML_NS))));
    }

    #[test]
    fn test_kml_booleans() {
        assert!(is_true("1"));
        assert!(is_true(" TRUE "));
        assert!(!is_true("0"));
        assert!(!is_true("yes"));
        assert_eq!(parse_bool("False"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }
}
