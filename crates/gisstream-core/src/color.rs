//! RGBA color values as written in KML (`aabbggrr`)

use crate::error::{GeoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha (255 = opaque)
    pub a: u8,
}

impl Color {
    /// Opaque white
    pub const WHITE: Self = Self::rgba(255, 255, 255, 255);
    /// Opaque black
    pub const BLACK: Self = Self::rgba(0, 0, 0, 255);

    /// Build a color from its components
    #[inline]
    #[must_use]
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse KML color text: eight hex digits in `aabbggrr` order, with an
    /// optional leading `#`. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`GeoError::InvalidColor`] for any other shape.
    pub fn from_kml_hex(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(GeoError::InvalidColor(trimmed.to_string()));
        }
        let byte = |i: usize| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| GeoError::InvalidColor(trimmed.to_string()))
        };
        Ok(Self {
            a: byte(0)?,
            b: byte(2)?,
            g: byte(4)?,
            r: byte(6)?,
        })
    }

    /// Format back into `aabbggrr`
    #[must_use]
    pub fn to_kml_hex(&self) -> String {
        format!("{:02x}{:02x}{:02x}{:02x}", self.a, self.b, self.g, self.r)
    }
}

impl FromStr for Color {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_kml_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_kml_hex())
    }
}
