//! KML reader with link resolution
//!
//! [`KmlReader`] wraps a [`KmlDecoder`] and post-processes each object:
//! relative icon hrefs (and, on request, relative `styleUrl`s) are resolved
//! against the document location, and every NetworkLink target is resolved
//! and recorded so the linked documents can be imported once the root
//! document has been read.

use crate::decoder::KmlDecoder;
use crate::error::Result;
use crate::fetch::{self, Opened};
use crate::options::ReaderOptions;
use crate::resolver::LinkResolver;
use crate::url_ref::{is_absolute_url, UrlRef};
use gisstream_core::{
    FeatureKind, GisObject, NetworkLink, Style, StyleMap, StyleSelector, TaggedMap,
};
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::io::{BufRead, Read};
use std::path::Path;
use url::Url;

/// Streaming reader over one root KML or KMZ document.
///
/// # Example
///
/// ```
/// use gisstream_kml::KmlReader;
/// use url::Url;
///
/// let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
///   <NetworkLink><Link><href>more.kml</href></Link></NetworkLink>
/// </Document></kml>"#;
/// let base = Url::parse("http://example.com/data/root.kml")?;
/// let mut reader = KmlReader::from_reader(kml.as_bytes(), Some(base))?;
/// let objects = reader.read_all()?;
/// assert_eq!(objects.len(), 4);
/// assert_eq!(reader.network_links(), ["http://example.com/data/more.kml"]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct KmlReader {
    pub(crate) decoder: Option<KmlDecoder<Box<dyn BufRead>>>,
    pub(crate) resolver: LinkResolver,
    pub(crate) options: ReaderOptions,
    encoding: String,
    /// Resolved NetworkLink URIs in discovery order
    pub(crate) network_links: Vec<String>,
    seen_links: HashSet<String>,
    pub(crate) visited: HashSet<String>,
    pub(crate) max_link_count_exceeded: bool,
    skip_count: usize,
}

impl KmlReader {
    fn open(source: Box<dyn BufRead>, compressed: bool, base_url: Option<Url>) -> Result<Self> {
        let decoder = KmlDecoder::new(source)?;
        Ok(Self {
            encoding: decoder.encoding().to_string(),
            decoder: Some(decoder),
            resolver: LinkResolver::new(base_url, compressed),
            options: ReaderOptions::default(),
            network_links: Vec::new(),
            seen_links: HashSet::new(),
            visited: HashSet::new(),
            max_link_count_exceeded: false,
            skip_count: 0,
        })
    }

    /// Open a local `.kml` or `.kmz` file. For an archive the first `.kml`
    /// entry is read.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened, the archive holds no
    /// KML, or the XML prolog is malformed.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let Opened { source, compressed } = fetch::open_path(path)?;
        let base_url = match path.canonicalize() {
            Ok(abs) => Url::from_file_path(&abs).ok(),
            Err(e) => {
                warn!("Failed to convert {} to a URL: {e}", path.display());
                None
            }
        };
        Self::open(source, compressed, base_url)
    }

    /// Fetch a `file:` or `http(s):` URL. KMZ responses are detected by
    /// media type, extension or magic bytes.
    ///
    /// # Errors
    ///
    /// Returns an error when the fetch fails or the document cannot be
    /// started.
    pub fn from_url(url: &Url, options: ReaderOptions) -> Result<Self> {
        let Opened { source, compressed } = fetch::open_url(url, &options)?;
        Ok(Self::open(source, compressed, Some(url.clone()))?.with_options(options))
    }

    /// Read from any byte stream. Archives are detected by magic bytes;
    /// relative links resolve against `base_url` when given.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream cannot be read or the document
    /// cannot be started.
    pub fn from_reader<R: Read + 'static>(reader: R, base_url: Option<Url>) -> Result<Self> {
        let label = base_url.as_ref().map_or_else(|| "stream".to_string(), Url::to_string);
        let Opened { source, compressed } = fetch::open_reader(reader, &label)?;
        Self::open(source, compressed, base_url)
    }

    /// Read an already-uncompressed KML stream, stating whether it came out
    /// of a KMZ archive so relative links resolve to archive entries.
    ///
    /// # Errors
    ///
    /// Returns an error when the XML prolog is malformed.
    pub fn from_reader_with_base<R: BufRead + 'static>(
        reader: R,
        compressed: bool,
        base_url: Option<Url>,
    ) -> Result<Self> {
        Self::open(Box::new(reader), compressed, base_url)
    }

    /// Apply reader options
    #[must_use]
    pub fn with_options(mut self, options: ReaderOptions) -> Self {
        if let Some(compressed) = options.compressed {
            self.resolver.set_compressed(compressed);
        }
        self.resolver.set_defaults(options.link_defaults.clone());
        self.options = options;
        self
    }

    /// Override one `viewFormat` value for this reader's links; `None`
    /// restores the default.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::InvalidProperty`](crate::KmlError::InvalidProperty)
    /// for an unknown name or a blank value.
    pub fn set_view_format(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        self.resolver.set_view_format(name, value)
    }

    /// Next object of the root document, or `None` at the end or once
    /// closed.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or truncated XML.
    pub fn read(&mut self) -> Result<Option<GisObject>> {
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        match decoder.read()? {
            Some(obj) => Ok(Some(self.process(obj, None, None))),
            None => Ok(None),
        }
    }

    /// Read the rest of the document and close the reader, also on error
    ///
    /// # Errors
    ///
    /// Returns the first read error; the reader is closed either way.
    pub fn read_all(&mut self) -> Result<Vec<GisObject>> {
        let mut objects = Vec::new();
        let result = loop {
            match self.read() {
                Ok(Some(obj)) => objects.push(obj),
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.close();
        result.map(|()| objects)
    }

    /// Release the underlying stream. Safe to call more than once.
    pub fn close(&mut self) {
        if self.decoder.take().is_some() {
            debug!("Closed KML reader");
        }
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.decoder.is_none()
    }

    /// Every NetworkLink target discovered so far, in order, without
    /// duplicates
    #[must_use]
    pub fn network_links(&self) -> &[String] {
        &self.network_links
    }

    /// NetworkLinks skipped because their Region was out of view
    #[must_use]
    pub const fn skip_count(&self) -> usize {
        self.skip_count
    }

    /// Whether the last import stopped at the link bound
    #[must_use]
    pub const fn is_max_link_count_exceeded(&self) -> bool {
        self.max_link_count_exceeded
    }

    /// Links visited by the last import
    #[must_use]
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Declared character encoding of the root document
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.resolver.base_url()
    }

    #[must_use]
    pub const fn options(&self) -> &ReaderOptions {
        &self.options
    }

    /// Resolve the hrefs of one object read from `parent` (the root document
    /// when `None`). Newly found NetworkLink targets are also pushed onto
    /// `discovered`.
    pub(crate) fn process(
        &mut self,
        mut obj: GisObject,
        parent: Option<&UrlRef>,
        discovered: Option<&mut VecDeque<String>>,
    ) -> GisObject {
        match &mut obj {
            GisObject::Feature(feature) => {
                self.rewrite_style_url(parent, &mut feature.common.style_url);
                if let Some(selector) = &mut feature.style {
                    self.rewrite_selector(parent, selector);
                }
                match &mut feature.kind {
                    FeatureKind::NetworkLink(link) => {
                        self.network_link(parent, &feature.common.region, link, discovered);
                    }
                    FeatureKind::GroundOverlay(ground) => {
                        self.rewrite_href(parent, &mut ground.overlay.icon);
                    }
                    FeatureKind::ScreenOverlay(screen) => {
                        self.rewrite_href(parent, &mut screen.overlay.icon);
                    }
                    FeatureKind::PhotoOverlay(photo) => {
                        self.rewrite_href(parent, &mut photo.overlay.icon);
                    }
                    FeatureKind::Placemark => {}
                }
            }
            GisObject::ContainerStart(container) => {
                self.rewrite_style_url(parent, &mut container.common.style_url);
                for selector in &mut container.styles {
                    self.rewrite_selector(parent, selector);
                }
            }
            GisObject::Style(style) => self.rewrite_style(parent, style),
            GisObject::StyleMap(map) => self.rewrite_style_map(parent, map),
            _ => {}
        }
        obj
    }

    fn network_link(
        &mut self,
        parent: Option<&UrlRef>,
        region: &TaggedMap,
        link: &mut NetworkLink,
        discovered: Option<&mut VecDeque<String>>,
    ) {
        if self.options.ignore_inactive_region_links && self.resolver.check_region(region) {
            debug!("Ignoring out of region NetworkLink");
            self.skip_count += 1;
            return;
        }
        let Some(uri) = self.resolver.get_link_href(parent, &mut link.link) else {
            debug!("NetworkLink href is empty or missing");
            return;
        };
        if !self.seen_links.insert(uri.clone()) {
            debug!("Duplicate NetworkLink href {uri}");
            return;
        }
        if let Some(queue) = discovered {
            queue.push_back(uri.clone());
        }
        self.network_links.push(uri);
    }

    fn rewrite_href(&self, parent: Option<&UrlRef>, link: &mut TaggedMap) {
        let Some(href) = link.get_trimmed("href").filter(|h| !h.is_empty()) else {
            return;
        };
        if let Some(uri) = self.resolver.get_link(parent, href) {
            link.insert("href", uri);
        }
    }

    /// Rewrite `other.kml#id` style references; local `#id` references and
    /// absolute URLs are left alone
    fn rewrite_style_url(&self, parent: Option<&UrlRef>, style_url: &mut Option<String>) {
        if !self.options.rewrite_style_urls || self.resolver.base_url().is_none() {
            return;
        }
        let resolved = match style_url.as_deref() {
            Some(url)
                if !is_absolute_url(url) && url.find('#').is_some_and(|i| i > 0) =>
            {
                self.resolver.get_link(parent, url)
            }
            _ => None,
        };
        if let Some(uri) = resolved {
            debug!("Rewrote relative styleUrl as {uri}");
            *style_url = Some(uri);
        }
    }

    fn rewrite_selector(&self, parent: Option<&UrlRef>, selector: &mut StyleSelector) {
        match selector {
            StyleSelector::Style(style) => self.rewrite_style(parent, style),
            StyleSelector::StyleMap(map) => self.rewrite_style_map(parent, map),
        }
    }

    fn rewrite_style_map(&self, parent: Option<&UrlRef>, map: &mut StyleMap) {
        for pair in map.pairs_mut() {
            self.rewrite_style_url(parent, &mut pair.style_url);
            if let Some(style) = &mut pair.style {
                self.rewrite_style(parent, style);
            }
        }
    }

    fn rewrite_style(&self, parent: Option<&UrlRef>, style: &mut Style) {
        let Some(icon) = &mut style.icon else {
            return;
        };
        let resolved = match icon.href.as_deref() {
            Some(href) if !href.is_empty() && !is_absolute_url(href) => {
                self.resolver.get_link(parent, href)
            }
            _ => None,
        };
        if resolved.is_some() {
            icon.href = resolved;
        }
    }
}

impl Drop for KmlReader {
    fn drop(&mut self) {
        self.close();
    }
}

impl Iterator for KmlReader {
    type Item = Result<GisObject>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gisstream_core::Feature;

    const KML_OPEN: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#;

    fn reader(body: &str, base: &str) -> KmlReader {
        let kml = format!("{KML_OPEN}{body}</kml>");
        KmlReader::from_reader(std::io::Cursor::new(kml), Some(Url::parse(base).unwrap())).unwrap()
    }

    fn features(objects: &[GisObject]) -> Vec<&Feature> {
        objects.iter().filter_map(GisObject::as_feature).collect()
    }

    #[test]
    fn test_network_links_are_collected_once() {
        let mut r = reader(
            r#"<Document>
                 <NetworkLink><Link><href>a.kml</href></Link></NetworkLink>
                 <NetworkLink><Url><href>sub/b.kml</href></Url></NetworkLink>
                 <NetworkLink><Link><href>a.kml</href></Link></NetworkLink>
                 <NetworkLink><Link><href> </href></Link></NetworkLink>
               </Document>"#,
            "http://example.com/root/doc.kml",
        );
        let objects = r.read_all().unwrap();
        assert_eq!(features(&objects).len(), 4);
        assert_eq!(
            r.network_links(),
            [
                "http://example.com/root/a.kml",
                "http://example.com/root/sub/b.kml"
            ]
        );
        let link = features(&objects)[0].network_link().unwrap();
        assert_eq!(link.link.get("href"), Some("http://example.com/root/a.kml"));
    }

    #[test]
    fn test_region_pruning() {
        let body = r#"<Document>
             <NetworkLink>
               <Region><LatLonAltBox><north>-50</north><south>-60</south><east>10</east><west>0</west></LatLonAltBox></Region>
               <Link><href>south.kml</href></Link>
             </NetworkLink>
             <NetworkLink>
               <Region><LatLonAltBox><north>-60</north><south>-50</south><east>10</east><west>0</west></LatLonAltBox></Region>
               <Link><href>inverted.kml</href></Link>
             </NetworkLink>
           </Document>"#;
        let mut pruned = reader(body, "http://example.com/doc.kml")
            .with_options(ReaderOptions::default().with_ignore_inactive_region_links(true));
        pruned.set_view_format("bboxSouth", Some("0")).unwrap();
        pruned.read_all().unwrap();
        assert_eq!(pruned.skip_count(), 1);
        assert_eq!(pruned.network_links(), ["http://example.com/inverted.kml"]);

        let mut all = reader(body, "http://example.com/doc.kml");
        all.read_all().unwrap();
        assert_eq!(all.skip_count(), 0);
        assert_eq!(all.network_links().len(), 2);
    }

    #[test]
    fn test_icon_hrefs_are_resolved() {
        let mut r = reader(
            r#"<Document>
                 <Style id="s"><IconStyle><Icon><href>icons/pin.png</href></Icon></IconStyle></Style>
                 <GroundOverlay><Icon><href>maps/overlay.png</href></Icon></GroundOverlay>
                 <Placemark>
                   <Style><IconStyle><Icon><href>http://cdn.example.org/x.png</href></Icon></IconStyle></Style>
                 </Placemark>
               </Document>"#,
            "http://example.com/data/doc.kml",
        );
        let objects = r.read_all().unwrap();
        let GisObject::ContainerStart(doc) = &objects[1] else {
            panic!("expected Document");
        };
        let StyleSelector::Style(style) = &doc.styles[0] else {
            panic!("expected Style");
        };
        assert_eq!(style.icon_url(), Some("http://example.com/data/icons/pin.png"));

        let found = features(&objects);
        let overlay = found[0].overlay().unwrap();
        assert_eq!(
            overlay.icon.get("href"),
            Some("http://example.com/data/maps/overlay.png")
        );
        let Some(StyleSelector::Style(inline)) = &found[1].style else {
            panic!("expected inline Style");
        };
        assert_eq!(inline.icon_url(), Some("http://cdn.example.org/x.png"));
    }

    #[test]
    fn test_style_url_rewriting_is_opt_in() {
        let body = r##"<Placemark><styleUrl>styles.kml#red</styleUrl></Placemark>
                       <Placemark><styleUrl>#local</styleUrl></Placemark>"##;
        let mut plain = reader(body, "http://example.com/data/doc.kml");
        let objects = plain.read_all().unwrap();
        assert_eq!(
            features(&objects)[0].common.style_url.as_deref(),
            Some("styles.kml#red")
        );

        let mut rewriting = reader(body, "http://example.com/data/doc.kml")
            .with_options(ReaderOptions::default().with_rewrite_style_urls(true));
        let objects = rewriting.read_all().unwrap();
        let found = features(&objects);
        assert_eq!(
            found[0].common.style_url.as_deref(),
            Some("http://example.com/data/styles.kml#red")
        );
        assert_eq!(found[1].common.style_url.as_deref(), Some("#local"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut r = reader("<Placemark/>", "http://example.com/doc.kml");
        assert!(!r.is_closed());
        assert!(r.read().unwrap().is_some());
        r.close();
        r.close();
        assert!(r.is_closed());
        assert!(r.read().unwrap().is_none());
    }

    #[test]
    fn test_read_all_closes_on_error() {
        let kml = format!("{KML_OPEN}<Document><Placemark>");
        let mut r = KmlReader::from_reader(std::io::Cursor::new(kml), None).unwrap();
        assert!(r.read_all().is_err());
        assert!(r.is_closed());
    }

    #[test]
    fn test_compressed_override() {
        let r = reader("", "file:///data/root.kml")
            .with_options(ReaderOptions::default().with_compressed(Some(true)));
        assert!(r.resolver.is_compressed());
        assert_eq!(
            r.resolver.get_link(None, "b.kml").as_deref(),
            Some("kmzfile:///data/root.kml?file=b.kml")
        );
    }
}
