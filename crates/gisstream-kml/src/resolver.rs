//! NetworkLink and overlay href resolution
//!
//! Relative hrefs resolve against the document that contains them. Inside a
//! KMZ archive that means another entry of the same archive, expressed as an
//! archive-entry [`UrlRef`]. Links with an `httpQuery` or `viewFormat`
//! template get a query string built from two tables of client values: the
//! identity a desktop client would report and the viewport it would be
//! showing.

use crate::error::{KmlError, Result};
use crate::url_ref::{escape_uri, is_absolute_url, UrlRef, KMZ_MARKER};
use gisstream_core::TaggedMap;
use log::{debug, warn};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use url::Url;

/// `viewFormat` implied by `viewRefreshMode` `onStop` when none is given
pub const VIEW_FORMAT_DEFAULT_TEMPLATE: &str = "BBOX=[bboxWest],[bboxSouth],[bboxEast],[bboxNorth]";

const HTTP_QUERY_DEFAULTS: [(&str, &str); 4] = [
    ("clientVersion", "5.2.1.1588"),
    ("kmlVersion", "2.2"),
    ("clientName", "Google+Earth"),
    ("language", "en"),
];

const VIEW_FORMAT_DEFAULTS: [(&str, &str); 20] = [
    ("bboxEast", "180"),
    ("bboxNorth", "90"),
    ("bboxSouth", "-45"),
    ("bboxWest", "-180"),
    ("cameraLon", "0"),
    ("cameraLat", "0"),
    ("cameraAlt", "0"),
    ("horizFov", "60"),
    ("horizPixels", "917"),
    ("lookatHeading", "0"),
    ("lookatLat", "0"),
    ("lookatLon", "0"),
    ("lookatRange", "7190000"),
    ("lookatTerrainAlt", "0"),
    ("lookatTerrainLat", "0"),
    ("lookatTerrainLon", "0"),
    ("lookatTilt", "0"),
    ("terrainEnabled", "1"),
    ("vertFov", "56.477"),
    ("vertPixels", "853"),
];

static GLOBAL_DEFAULTS: Lazy<RwLock<LinkDefaults>> =
    Lazy::new(|| RwLock::new(LinkDefaults::default()));

/// Values substituted into `httpQuery` and `viewFormat` templates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDefaults {
    http_query: BTreeMap<String, String>,
    view_format: BTreeMap<String, String>,
}

impl Default for LinkDefaults {
    fn default() -> Self {
        let table = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect()
        };
        Self {
            http_query: table(&HTTP_QUERY_DEFAULTS),
            view_format: table(&VIEW_FORMAT_DEFAULTS),
        }
    }
}

impl LinkDefaults {
    /// Value of an `httpQuery` parameter such as `clientVersion`
    #[must_use]
    pub fn http_query(&self, name: &str) -> Option<&str> {
        self.http_query.get(name).map(String::as_str)
    }

    /// Value of a `viewFormat` parameter such as `bboxWest`
    #[must_use]
    pub fn view_format(&self, name: &str) -> Option<&str> {
        self.view_format.get(name).map(String::as_str)
    }

    /// Replace an `httpQuery` value.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidProperty`] for an unknown name or a blank
    /// value.
    pub fn set_http_query(&mut self, name: &str, value: &str) -> Result<()> {
        set_checked(&mut self.http_query, name, value)
    }

    /// Replace a `viewFormat` value.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidProperty`] for an unknown name or a blank
    /// value.
    pub fn set_view_format(&mut self, name: &str, value: &str) -> Result<()> {
        set_checked(&mut self.view_format, name, value)
    }
}

fn set_checked(table: &mut BTreeMap<String, String>, name: &str, value: &str) -> Result<()> {
    let Some(slot) = table.get_mut(name) else {
        return Err(KmlError::InvalidProperty(format!("unknown property: {name}")));
    };
    if value.trim().is_empty() {
        return Err(KmlError::InvalidProperty(format!(
            "blank value for {name}"
        )));
    }
    *slot = value.to_string();
    Ok(())
}

/// Change an `httpQuery` value for every reader in the process that has no
/// explicit [`LinkDefaults`].
///
/// # Errors
///
/// Returns [`KmlError::InvalidProperty`] for an unknown name or a blank value.
pub fn set_global_http_query(name: &str, value: &str) -> Result<()> {
    GLOBAL_DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set_http_query(name, value)
}

/// Change a `viewFormat` value for every reader in the process that has no
/// explicit [`LinkDefaults`].
///
/// # Errors
///
/// Returns [`KmlError::InvalidProperty`] for an unknown name or a blank value.
pub fn set_global_view_format(name: &str, value: &str) -> Result<()> {
    GLOBAL_DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set_view_format(name, value)
}

/// Snapshot of the process-wide link defaults
#[must_use]
pub fn global_link_defaults() -> LinkDefaults {
    GLOBAL_DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Resolves hrefs found in one root document and the documents it links
#[derive(Debug, Clone)]
pub struct LinkResolver {
    base_url: Option<Url>,
    compressed: bool,
    defaults: Option<LinkDefaults>,
    view_overrides: BTreeMap<String, String>,
}

impl LinkResolver {
    /// Resolver for a root document at `base_url`; `compressed` when the
    /// document was read out of a KMZ archive
    #[must_use]
    pub const fn new(base_url: Option<Url>, compressed: bool) -> Self {
        Self {
            base_url,
            compressed,
            defaults: None,
            view_overrides: BTreeMap::new(),
        }
    }

    /// Use `defaults` instead of the process-wide tables
    #[must_use]
    pub fn with_defaults(mut self, defaults: Option<LinkDefaults>) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    #[must_use]
    pub const fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub(crate) fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    pub(crate) fn set_defaults(&mut self, defaults: Option<LinkDefaults>) {
        self.defaults = defaults;
    }

    /// Override one `viewFormat` value for this resolver only; `None`
    /// removes the override.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidProperty`] for an unknown name or a blank
    /// value.
    pub fn set_view_format(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        if !VIEW_FORMAT_DEFAULTS.iter().any(|(k, _)| *k == name) {
            return Err(KmlError::InvalidProperty(format!("unknown property: {name}")));
        }
        match value {
            None => {
                self.view_overrides.remove(name);
            }
            Some(v) if v.trim().is_empty() => {
                return Err(KmlError::InvalidProperty(format!(
                    "blank value for {name}"
                )));
            }
            Some(v) => {
                self.view_overrides.insert(name.to_string(), v.to_string());
            }
        }
        Ok(())
    }

    /// Effective `viewFormat` value: this resolver's override, else the
    /// configured or process-wide default
    #[must_use]
    pub fn view_format_value(&self, name: &str) -> Option<String> {
        if let Some(v) = self.view_overrides.get(name) {
            return Some(v.clone());
        }
        self.lookup(|d| d.view_format(name).map(str::to_string))
    }

    fn http_query_value(&self, name: &str) -> Option<String> {
        self.lookup(|d| d.http_query(name).map(str::to_string))
    }

    fn lookup<T>(&self, f: impl FnOnce(&LinkDefaults) -> T) -> T {
        match &self.defaults {
            Some(defaults) => f(defaults),
            None => f(&*GLOBAL_DEFAULTS.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Whether a `Region` lies entirely outside the view bounding box
    /// (`bboxNorth` etc.). A missing or inverted box (`north <= south`,
    /// `east <= west`) is never out of view.
    #[must_use]
    pub fn check_region(&self, region: &TaggedMap) -> bool {
        let edges = (
            region.get_f64("north"),
            region.get_f64("south"),
            region.get_f64("east"),
            region.get_f64("west"),
        );
        let (Some(north), Some(south), Some(east), Some(west)) = edges else {
            return false;
        };
        if north <= south || east <= west {
            return false;
        }
        let view = |name: &str, default: f64| {
            self.view_format_value(name)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .unwrap_or(default)
        };
        let view_north = view("bboxNorth", 90.0);
        let view_south = view("bboxSouth", -90.0);
        let view_east = view("bboxEast", 180.0);
        let view_west = view("bboxWest", -180.0);
        if !(-90.0..=90.0).contains(&view_north) || !(-90.0..=90.0).contains(&view_south) {
            debug!("View bounding box latitude out of range");
            return false;
        }

        let lat_overlap = south <= view_north && north >= view_south;
        let lon_overlap = if view_west <= view_east {
            west <= view_east && east >= view_west
        } else {
            // view box crosses the antimeridian
            east >= view_west || west <= view_east
        };
        !(lat_overlap && lon_overlap)
    }

    /// Resolve `href` against `parent` (or the root document). Absolute
    /// hrefs are returned escaped but otherwise unchanged.
    ///
    /// Inside an archive (a KMZ root, or a parent that is an archive entry
    /// or a `.kmz` URL) the result is an archive-entry URI.
    #[must_use]
    pub fn get_link(&self, parent: Option<&UrlRef>, href: &str) -> Option<String> {
        let href = escape_uri(href.trim());
        if is_absolute_url(&href) {
            return Some(href.into_owned());
        }
        let base = match (parent, &self.base_url) {
            (_, None) => {
                warn!("No base URL to resolve relative link {href}");
                return None;
            }
            (Some(parent), Some(_)) => parent.url(),
            (None, Some(base)) => base,
        };
        let in_archive = parent.map_or(self.compressed, |p| {
            p.is_kmz() || p.url().path().to_ascii_lowercase().ends_with(".kmz")
        });
        let resolved = if in_archive {
            UrlRef::new(base, Some(&href)).map(|r| r.uri().to_string())
        } else {
            base.join(&href).map(|u| u.to_string()).map_err(KmlError::from)
        };
        match resolved {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!("Invalid link {href}: {e}");
                None
            }
        }
    }

    /// Final URI of a `Link` / `Icon` map, with `httpQuery` and `viewFormat`
    /// templates expanded. The resolved URI is written back as `href`.
    ///
    /// With `viewRefreshMode` `never` (the default) every viewport value is
    /// sent as `0`; with `onStop` and no `viewFormat` the default `BBOX`
    /// template is used. Local files and archive entries take no query.
    pub fn get_link_href(&self, parent: Option<&UrlRef>, links: &mut TaggedMap) -> Option<String> {
        let href = links.get_trimmed("href").filter(|h| !h.is_empty())?;
        let uri = self.get_link(parent, href)?;

        let http_query = links
            .get_trimmed("httpQuery")
            .filter(|q| !q.is_empty())
            .map(str::to_string);
        let mut view_format = links.get_trimmed("viewFormat").map(str::to_string);
        let refresh_mode = links
            .get_trimmed("viewRefreshMode")
            .filter(|m| !m.is_empty() && *m != "never")
            .map(str::to_string);
        if refresh_mode.as_deref() == Some("onStop") && view_format.is_none() {
            view_format = Some(VIEW_FORMAT_DEFAULT_TEMPLATE.to_string());
        }
        let view_format = view_format.filter(|v| !v.is_empty());

        let local = uri.starts_with("file:") || uri.starts_with(KMZ_MARKER);
        if local || (http_query.is_none() && view_format.is_none()) {
            links.insert("href", uri.as_str());
            return Some(uri);
        }

        let mut out = uri;
        if !out.ends_with('?') {
            out.push(if out.contains('?') { '&' } else { '?' });
        }
        if let Some(query) = &http_query {
            expand_template(&mut out, query, |name| self.http_query_value(name));
        }
        if let Some(format) = &view_format {
            if http_query.is_some() {
                out.push('&');
            }
            let refreshing = refresh_mode.is_some();
            expand_template(&mut out, format, |name| {
                self.view_format_value(name)
                    .map(|v| if refreshing { v } else { "0".to_string() })
            });
        }
        debug!("Expanded link {href} as {out}");
        links.insert("href", out.as_str());
        Some(out)
    }
}

/// Append `template` to `out`, replacing `[name]` with `lookup(name)`.
/// Unknown names stay in the output with the brackets escaped; spaces are
/// escaped too.
fn expand_template(out: &mut String, template: &str, lookup: impl Fn(&str) -> Option<String>) {
    let mut rest = template;
    while let Some(ch) = rest.chars().next() {
        match ch {
            '[' => {
                if let Some(end) = rest[1..].find(']') {
                    if let Some(value) = lookup(&rest[1..=end]) {
                        out.push_str(&value);
                        rest = &rest[end + 2..];
                        continue;
                    }
                }
                out.push_str("%5B");
            }
            ']' => out.push_str("%5D"),
            ' ' => out.push_str("%20"),
            _ => out.push(ch),
        }
        rest = &rest[ch.len_utf8()..];
    }
}
