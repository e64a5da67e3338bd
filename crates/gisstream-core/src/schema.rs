//! User-defined attribute schemas (`Schema` / `SimpleField`)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared type of a schema field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Free text (also used for the legacy `wstring`)
    #[default]
    String,
    /// 32-bit signed integer
    Int,
    /// 32-bit unsigned integer
    UInt,
    /// 16-bit signed integer
    Short,
    /// 16-bit unsigned integer
    UShort,
    /// Single precision float
    Float,
    /// Double precision float
    Double,
    /// Boolean
    Bool,
}

impl FieldType {
    /// Parse a KML type name (case-insensitive). `wstring` maps to
    /// [`FieldType::String`]; anything unknown yields `None`.
    #[must_use]
    pub fn from_kml(name: &str) -> Option<Self> {
        let lower = name.trim().to_ascii_lowercase();
        let ty = match lower.as_str() {
            "string" | "wstring" => Self::String,
            "int" => Self::Int,
            "uint" => Self::UInt,
            "short" => Self::Short,
            "ushort" => Self::UShort,
            "float" => Self::Float,
            "double" => Self::Double,
            "bool" => Self::Bool,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for FieldType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "string",
            Self::Int => "int",
            Self::UInt => "uint",
            Self::Short => "short",
            Self::UShort => "ushort",
            Self::Float => "float",
            Self::Double => "double",
            Self::Bool => "bool",
        };
        write!(f, "{s}")
    }
}

/// A named, typed field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimpleField {
    /// Field name
    pub name: String,
    /// Human readable label
    pub display_name: Option<String>,
    /// Declared type
    pub field_type: FieldType,
}

impl SimpleField {
    /// Untyped (string) field
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            field_type: FieldType::String,
        }
    }
}

/// A schema: ordered, name-keyed field definitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Identifier referenced by `schemaUrl` (escaped URI form)
    pub id: Option<String>,
    /// Schema name; with `parent` set, also an element alias
    pub name: Option<String>,
    /// Legacy parent element name (e.g. `Placemark`)
    pub parent: Option<String>,
    fields: Vec<SimpleField>,
}

impl Schema {
    /// Empty schema
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field by name, keeping its original position
    pub fn put(&mut self, field: SimpleField) {
        if let Some(slot) = self.fields.iter_mut().find(|f| f.name == field.name) {
            *slot = field;
        } else {
            self.fields.push(field);
        }
    }

    /// Field by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SimpleField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields in declaration order
    #[must_use]
    pub fn fields(&self) -> &[SimpleField] {
        &self.fields
    }
}
