//! Ordered string property bag tagged with its source element name
//!
//! Used for the structurally simple KML groups (`LookAt`, `Camera`,
//! `Region`, `Link`, `Url`, `Icon`). Keys keep first-insertion order;
//! re-inserting a key replaces the value in place.

use serde::{Deserialize, Serialize};

/// Ordered key/value map with an element tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedMap {
    tag: String,
    entries: Vec<(String, String)>,
}

impl TaggedMap {
    /// Empty map for the given element name
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            entries: Vec::new(),
        }
    }

    /// Element name this map was read from
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are present
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace a value, returning the previous one
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, value));
        }
        self.entries.push((key, value));
        None
    }

    /// Value for a key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Whether a key is present
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove a key, returning its value
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    /// Trimmed value, with blank values reported as absent
    #[must_use]
    pub fn get_trimmed(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Value parsed as a float; unparsable values are absent
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        let value = self.get_trimmed(key)?;
        match value.parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                log::debug!("Non-numeric {} value in {}: {value}", key, self.tag);
                None
            }
        }
    }

    /// Value parsed as an integer; unparsable values are absent
    #[must_use]
    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.get_trimmed(key)?.parse().ok()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
