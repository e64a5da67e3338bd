//! Error types for GIS object construction

use thiserror::Error;

/// Errors raised while building geometries and primitive values
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeoError {
    /// Latitude outside [-90, 90] or a non-finite ordinate
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Geometry that violates its structural constraints
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Color text that is not an `AABBGGRR` hex string
    #[error("Invalid color value: {0}")]
    InvalidColor(String),

    /// Date/time text that no supported layout accepts
    #[error("Invalid time value: {0}")]
    InvalidTime(String),
}

/// Result type for GIS object construction
pub type Result<T> = std::result::Result<T, GeoError>;
