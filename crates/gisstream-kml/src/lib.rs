//! # gisstream-kml
//!
//! Streaming KML and KMZ reader for gisstream.
//!
//! Documents are decoded one object at a time into the
//! [`gisstream_core`] object model, so arbitrarily large files are read
//! with bounded memory. On top of the decoder, [`KmlReader`] resolves
//! relative links against the document location and can follow
//! `NetworkLink`s breadth-first into other KML files, KMZ archives and
//! HTTP resources.
//!
//! ## Supported Formats
//!
//! | Format | Extension | Description |
//! |--------|-----------|-------------|
//! | KML | `.kml` | Keyhole Markup Language 2.0 to 2.2, Google extensions |
//! | KMZ | `.kmz` | ZIP archive whose first `.kml` entry is the document |
//!
//! ## Quick Start
//!
//! ### Decode a document
//!
//! ```
//! use gisstream_kml::KmlDecoder;
//! use gisstream_core::{Geometry, GisObject};
//!
//! let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2">
//!   <Placemark>
//!     <name>Summit</name>
//!     <Point><coordinates>-121.76,46.85,4392</coordinates></Point>
//!   </Placemark>
//! </kml>"#;
//!
//! let mut decoder = KmlDecoder::new(kml.as_bytes())?;
//! while let Some(obj) = decoder.read()? {
//!     if let GisObject::Feature(feature) = obj {
//!         assert_eq!(feature.common.name.as_deref(), Some("Summit"));
//!         assert!(matches!(feature.geometry, Some(Geometry::Point(_))));
//!     }
//! }
//! # Ok::<(), gisstream_kml::KmlError>(())
//! ```
//!
//! ### Read a file and its NetworkLinks
//!
//! ```no_run
//! use gisstream_core::GisObject;
//! use gisstream_kml::{KmlReader, UrlRef};
//!
//! let mut reader = KmlReader::from_path("regions.kmz")?;
//! let objects = reader.read_all()?;
//! println!("{} objects, {} links", objects.len(), reader.network_links().len());
//!
//! reader.import_from_network_links_with(&mut |link: &UrlRef, obj: GisObject| {
//!     println!("{link}: {}", obj.kind());
//!     true
//! })?;
//! # Ok::<(), gisstream_kml::KmlError>(())
//! ```
//!
//! ## Link templates
//!
//! `NetworkLink` hrefs are expanded with their `viewFormat` and `httpQuery`
//! templates. Values come from [`LinkDefaults`]: either per reader through
//! [`ReaderOptions::with_link_defaults`], or process-wide through
//! [`set_global_http_query`] and [`set_global_view_format`].

pub mod coords;
pub mod decoder;
pub mod error;
pub mod fetch;
pub(crate) mod geometry;
pub mod importer;
pub mod options;
pub mod reader;
pub mod resolver;
pub mod url_ref;
pub mod vocab;
pub(crate) mod xml;

pub use coords::parse_coordinates;
pub use decoder::KmlDecoder;
pub use error::{KmlError, Result};
pub use fetch::{HTTP_ACCEPT, HTTP_USER_AGENT, MIME_TYPE_KML, MIME_TYPE_KMZ};
pub use importer::ImportHandler;
pub use options::{ReaderOptions, DEFAULT_MAX_LINK_COUNT};
pub use reader::KmlReader;
pub use resolver::{
    global_link_defaults, set_global_http_query, set_global_view_format, LinkDefaults,
    LinkResolver, VIEW_FORMAT_DEFAULT_TEMPLATE,
};
pub use url_ref::{escape_uri, is_absolute_url, is_identifier, UrlRef, KMZ_MARKER};
pub use vocab::{is_kml_namespace, KML_NS, NS_GOOGLE_KML_EXT};
