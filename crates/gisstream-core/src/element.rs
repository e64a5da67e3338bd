//! Opaque XML subtrees from foreign namespaces

use serde::{Deserialize, Serialize};

/// A namespace binding (`prefix` → `uri`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Prefix; empty for the default namespace
    pub prefix: String,
    /// Namespace URI
    pub uri: String,
}

impl Namespace {
    /// Build a binding.
    ///
    /// Returns `None` when the URI is blank or the prefix is not an XML
    /// name (letters, digits, `.`, `-`, `_`, not starting with a digit).
    #[must_use]
    pub fn new(prefix: &str, uri: &str) -> Option<Self> {
        if uri.trim().is_empty() {
            return None;
        }
        let mut chars = prefix.chars();
        if let Some(first) = chars.next() {
            if !(first.is_alphabetic() || first == '_') {
                return None;
            }
            if !chars.all(|c| c.is_alphanumeric() || matches!(c, '.' | '-' | '_')) {
                return None;
            }
        }
        Some(Self {
            prefix: prefix.to_string(),
            uri: uri.to_string(),
        })
    }
}

/// A structurally preserved element: name, namespace, attributes, text and
/// ordered children
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    /// Namespace of the element itself
    pub namespace: Option<Namespace>,
    /// Local name
    pub name: String,
    /// Attributes in document order; prefixed names keep their prefix
    pub attributes: Vec<(String, String)>,
    /// Namespace declarations made on this element
    pub namespaces: Vec<Namespace>,
    /// Concatenated character content
    pub text: Option<String>,
    /// Child elements
    pub children: Vec<Element>,
}

impl Element {
    /// Element with a name and namespace
    #[must_use]
    pub fn new(namespace: Option<Namespace>, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace prefix, if any
    #[must_use]
    pub fn prefix(&self) -> Option<&str> {
        self.namespace
            .as_ref()
            .map(|ns| ns.prefix.as_str())
            .filter(|p| !p.is_empty())
    }

    /// Namespace URI, if any
    #[must_use]
    pub fn namespace_uri(&self) -> Option<&str> {
        self.namespace.as_ref().map(|ns| ns.uri.as_str())
    }

    /// Attribute value by (possibly prefixed) name
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given local name
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}
