//! Addressable references to KML documents, including entries inside KMZ
//! archives
//!
//! A link that points into a KMZ archive has no URL of its own, so it is
//! encoded as `kmz<archive-url>?file=<relative-path>` (or `&file=` when the
//! archive URL already has a query). The marker keeps the form distinct from
//! any real URL; the relative path goes last so it survives whatever query
//! the archive URL carries.

use crate::error::{KmlError, Result};
use crate::fetch;
use crate::options::ReaderOptions;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::BufRead;
use std::path::Path;
use url::Url;

/// Prefix of every archive-entry URI
pub const KMZ_MARKER: &str = "kmz";

static ABSOLUTE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]+:/").expect("Invalid absolute URL regex"));

/// A fetchable KML location: a plain URL, or an entry inside a KMZ archive
/// at a URL
#[derive(Debug, Clone)]
pub struct UrlRef {
    uri: String,
    url: Url,
    kmz_rel_path: Option<String>,
}

impl UrlRef {
    /// Reference `url`, or the entry `kmz_rel_path` inside the archive at
    /// `url`.
    ///
    /// Leading `/`, `./` and `../` segments are stripped from the relative
    /// path (archive entries cannot escape the archive root), and characters
    /// illegal in a URI are percent-encoded.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidUri`] when nothing is left of the relative
    /// path.
    ///
    /// # Example
    ///
    /// ```
    /// use gisstream_kml::UrlRef;
    /// use url::Url;
    ///
    /// let archive = Url::parse("http://host/a.kmz")?;
    /// let entry = UrlRef::new(&archive, Some("kml/b.kml"))?;
    /// assert_eq!(entry.uri(), "kmzhttp://host/a.kmz?file=kml/b.kml");
    ///
    /// let back = UrlRef::parse(entry.uri())?;
    /// assert_eq!(back.url(), &archive);
    /// assert_eq!(back.kmz_rel_path(), Some("kml/b.kml"));
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(url: &Url, kmz_rel_path: Option<&str>) -> Result<Self> {
        let Some(rel) = kmz_rel_path else {
            return Ok(Self {
                uri: url.to_string(),
                url: url.clone(),
                kmz_rel_path: None,
            });
        };
        let mut rel = rel.strip_prefix('/').unwrap_or(rel);
        rel = rel.strip_prefix("./").unwrap_or(rel);
        while let Some(rest) = rel.strip_prefix("../") {
            rel = rest;
        }
        if rel.is_empty() {
            return Err(KmlError::InvalidUri(format!(
                "empty archive path for {url}"
            )));
        }
        let rel = escape_uri(rel).into_owned();
        let separator = if url.query().is_some() { '&' } else { '?' };
        Ok(Self {
            uri: format!("{KMZ_MARKER}{url}{separator}file={rel}"),
            url: url.clone(),
            kmz_rel_path: Some(rel),
        })
    }

    /// Decode a URI produced by [`UrlRef::uri`], or accept a plain absolute
    /// URL. An absolute path to an existing local file is accepted too.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidUri`] for relative input or a malformed
    /// archive form, and [`KmlError::UrlParse`] when the archive URL itself
    /// does not parse.
    pub fn parse(uri: &str) -> Result<Self> {
        if let Some(rest) = uri.strip_prefix(KMZ_MARKER) {
            let index = match rest.rfind("file=") {
                Some(i) if i > 1 => i,
                _ => {
                    return Err(KmlError::InvalidUri(format!(
                        "archive reference without a file part: {uri}"
                    )))
                }
            };
            let rel = &rest[index + "file=".len()..];
            if rel.is_empty() {
                return Err(KmlError::InvalidUri(format!(
                    "archive reference with an empty file part: {uri}"
                )));
            }
            let url = Url::parse(&rest[..index - 1])?;
            return Ok(Self {
                uri: uri.to_string(),
                url,
                kmz_rel_path: Some(rel.to_string()),
            });
        }

        let url = match Url::parse(uri) {
            Ok(url) => url,
            Err(e) => {
                let path = Path::new(uri);
                if !(path.is_absolute() && path.exists()) {
                    return Err(KmlError::InvalidUri(format!("{uri}: {e}")));
                }
                Url::from_file_path(path)
                    .map_err(|()| KmlError::InvalidUri(format!("not a file path: {uri}")))?
            }
        };
        Self::new(&url, None)
    }

    /// Encoded form, usable as a map key and accepted by [`UrlRef::parse`]
    #[inline]
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The document URL, or the archive URL for an archive entry
    #[inline]
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Entry path inside the archive, percent-encoded
    #[inline]
    #[must_use]
    pub fn kmz_rel_path(&self) -> Option<&str> {
        self.kmz_rel_path.as_deref()
    }

    /// Whether this names an entry inside a KMZ archive
    #[inline]
    #[must_use]
    pub const fn is_kmz(&self) -> bool {
        self.kmz_rel_path.is_some()
    }

    /// Open the referenced document.
    ///
    /// A plain URL is fetched with content negotiation (a KMZ response
    /// yields its first `.kml` entry). An archive entry is looked up by
    /// name, with `%20` and literal spaces treated alike.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::EntryNotFound`] when the archive has no such
    /// entry, or the I/O, HTTP or archive error that stopped the fetch.
    pub fn open_stream(&self, options: &ReaderOptions) -> Result<Box<dyn BufRead>> {
        match &self.kmz_rel_path {
            Some(rel) => fetch::open_archive_entry(&self.url, rel, options),
            None => Ok(fetch::open_url(&self.url, options)?.source),
        }
    }
}

impl PartialEq for UrlRef {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for UrlRef {}

impl Hash for UrlRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

impl fmt::Display for UrlRef {
    /// Marker removed; a local archive entry is shown as a path inside the
    /// archive (`file:///x/a.kmz/doc.kml`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.uri.strip_prefix(KMZ_MARKER).unwrap_or(&self.uri);
        if self.is_kmz() && self.url.scheme() == "file" {
            let split = s.rfind("?file=").max(s.rfind("&file="));
            if let Some(i) = split {
                return write!(f, "{}/{}", &s[..i], &s[i + "?file=".len()..]);
            }
        }
        f.write_str(s)
    }
}

/// Whether `text` is an absolute URL: a `scheme:/` prefix, a `file:` URL,
/// or an absolute path to an existing local file
#[must_use]
pub fn is_absolute_url(text: &str) -> bool {
    if text.starts_with("file:") || ABSOLUTE_URL.is_match(text) {
        return true;
    }
    let path = Path::new(text);
    path.is_absolute() && path.exists()
}

fn needs_escape(b: u8) -> bool {
    b <= 0x20 || b >= 0x7F || b"\"<>{}|\\^[]`".contains(&b)
}

/// Percent-encode characters that are illegal in a URI reference: controls,
/// space, `"<>{}|\^[]` and backquote, and every non-ASCII character (as its
/// UTF-8 bytes). `%` is left alone so existing escapes survive.
#[must_use]
pub fn escape_uri(text: &str) -> Cow<'_, str> {
    if !text.bytes().any(needs_escape) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len() + 16);
    let mut utf8 = [0u8; 4];
    for c in text.chars() {
        if c.is_ascii() && !needs_escape(c as u8) {
            out.push(c);
            continue;
        }
        for b in c.encode_utf8(&mut utf8).bytes() {
            out.push('%');
            out.push(char::from(HEX_DIGITS[usize::from(b >> 4)]));
            out.push(char::from(HEX_DIGITS[usize::from(b & 0x0F)]));
        }
    }
    log::debug!("Escaped URI {text} as {out}");
    Cow::Owned(out)
}

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

fn hex_value(b: u8) -> Option<u8> {
    char::from(b).to_digit(16).and_then(|d| u8::try_from(d).ok())
}

/// Decode `%HH` escapes; malformed escapes are kept literally
pub(crate) fn unescape_path(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Whether `text` is an XML-style identifier (a local id such as a style
/// reference, rather than a URL): a letter or `_` followed by letters,
/// digits, `.`, `-`, `_` or `%HH` escapes. With `allow_whitespace`, inner
/// whitespace is accepted as well.
#[must_use]
pub fn is_identifier(text: &str, allow_whitespace: bool) -> bool {
    let mut chars = text.chars();
    let mut last = match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => c,
        _ => return false,
    };
    while let Some(c) = chars.next() {
        if c == '%' {
            let escaped = (0..2).all(|_| chars.next().is_some_and(|h| h.is_ascii_hexdigit()));
            if !escaped {
                return false;
            }
            last = '0';
            continue;
        }
        let ok = c.is_alphanumeric()
            || matches!(c, '.' | '-' | '_')
            || (allow_whitespace && c.is_whitespace());
        if !ok {
            return false;
        }
        last = c;
    }
    !last.is_whitespace()
}
