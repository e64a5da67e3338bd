//! Error types for KML/KMZ reading and link resolution

use gisstream_core::GeoError;
use std::io;
use thiserror::Error;

/// Errors that can occur while reading KML or following its links
#[derive(Debug, Error)]
pub enum KmlError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// XML syntax or encoding error
    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// KMZ archive error
    #[error("ZIP archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// HTTP request failed or returned an error status
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Unparsable URL
    #[error("Invalid URL: {0}")]
    UrlParse(#[from] url::ParseError),

    /// A KMZ-relative path that names no entry in the archive
    #[error("Entry {path} not found in archive {archive}")]
    EntryNotFound {
        /// Archive URL
        archive: String,
        /// Requested relative path
        path: String,
    },

    /// A KMZ archive without any `.kml` entry
    #[error("No KML entry found in archive: {0}")]
    NoKmlInArchive(String),

    /// Malformed internal or external URI
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Unknown link-default property name or blank value
    #[error("Invalid property: {0}")]
    InvalidProperty(String),

    /// Geometry or primitive value construction failed
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeoError),

    /// Document ended inside an open element
    #[error("Unexpected end of document")]
    UnexpectedEof,

    /// Structurally invalid XML not reported by the tokenizer
    #[error("Malformed XML: {0}")]
    Malformed(String),

    /// Link import requested before the root reader was closed
    #[error("Reader must be read to completion and closed before importing network links")]
    ReaderOpen,
}

impl KmlError {
    /// Whether the error means "the target does not exist": a missing archive
    /// entry, a missing local file, or an HTTP 404. Such misses are retried
    /// against the parent link context.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::EntryNotFound { .. } => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            Self::Http(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            _ => false,
        }
    }
}

/// Result type for KML operations
pub type Result<T> = std::result::Result<T, KmlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let missing = KmlError::EntryNotFound {
            archive: "file:///tmp/a.kmz".to_string(),
            path: "b.kml".to_string(),
        };
        assert!(missing.is_not_found());
        assert!(KmlError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).is_not_found());
        assert!(!KmlError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "no")).is_not_found());
        assert!(!KmlError::UnexpectedEof.is_not_found());
    }

    #[test]
    fn test_error_messages() {
        let err = KmlError::EntryNotFound {
            archive: "a.kmz".to_string(),
            path: "x.kml".to_string(),
        };
        assert_eq!(err.to_string(), "Entry x.kml not found in archive a.kmz");
        assert!(KmlError::ReaderOpen.to_string().contains("closed"));
    }
}
