//! Recursive NetworkLink import
//!
//! After the root document has been read and closed, the links it
//! discovered are fetched breadth-first. Each linked document is decoded
//! with the same post-processing as the root, relative to its own
//! location, and the links it contains join the back of the queue. A
//! failing link is reported and skipped; its siblings are still imported.

use crate::decoder::KmlDecoder;
use crate::error::{KmlError, Result};
use crate::fetch;
use crate::reader::KmlReader;
use crate::url_ref::UrlRef;
use gisstream_core::GisObject;
use log::{debug, error, info};
use std::collections::VecDeque;
use std::io::BufRead;

/// Receives the objects of linked documents
///
/// Closures `FnMut(&UrlRef, GisObject) -> bool` implement this trait.
pub trait ImportHandler {
    /// Handle one object read from `link`. Returning `false` stops the
    /// import.
    fn handle_event(&mut self, link: &UrlRef, obj: GisObject) -> bool;

    /// Called when a link cannot be fetched or decoded. The import carries
    /// on with the next link.
    fn handle_error(&mut self, uri: &str, error: &KmlError) {
        let _ = (uri, error);
    }
}

impl<F> ImportHandler for F
where
    F: FnMut(&UrlRef, GisObject) -> bool,
{
    fn handle_event(&mut self, link: &UrlRef, obj: GisObject) -> bool {
        self(link, obj)
    }
}

enum LinkOutcome {
    Continue,
    Aborted,
}

impl KmlReader {
    /// Import every linked document and collect its objects. NetworkLinks
    /// are followed rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::ReaderOpen`] if the root document has not been
    /// closed. Failures of individual links are logged and skipped.
    pub fn import_from_network_links(&mut self) -> Result<Vec<GisObject>> {
        let mut objects = Vec::new();
        let mut collect = |_: &UrlRef, obj: GisObject| {
            objects.push(obj);
            true
        };
        self.import_from_network_links_with(&mut collect)?;
        Ok(objects)
    }

    /// Import every linked document, passing objects to `handler`.
    ///
    /// At most `max_link_count` links are visited (see
    /// [`ReaderOptions`](crate::ReaderOptions)); when the bound is hit
    /// [`is_max_link_count_exceeded`](Self::is_max_link_count_exceeded)
    /// reports it. A link is never visited twice.
    ///
    /// # Errors
    ///
    /// Returns [`KmlError::ReaderOpen`] if the root document has not been
    /// closed.
    pub fn import_from_network_links_with<H>(&mut self, handler: &mut H) -> Result<()>
    where
        H: ImportHandler + ?Sized,
    {
        if !self.is_closed() {
            return Err(KmlError::ReaderOpen);
        }
        let mut queue: VecDeque<String> = self.network_links.iter().cloned().collect();
        self.visited.clear();
        self.max_link_count_exceeded = false;
        let max = self.options.max_link_count;

        while let Some(uri) = queue.pop_front() {
            if self.visited.contains(&uri) {
                continue;
            }
            if max > 0 && self.visited.len() >= max {
                info!("Stopping import after {max} NetworkLinks");
                self.max_link_count_exceeded = true;
                break;
            }
            self.visited.insert(uri.clone());

            match self.import_link(&uri, handler, &mut queue) {
                Ok(LinkOutcome::Continue) => {}
                Ok(LinkOutcome::Aborted) => {
                    debug!("Import stopped by handler at {uri}");
                    break;
                }
                Err(e) => {
                    error!("Failed to import {uri}: {e}");
                    handler.handle_error(&uri, &e);
                }
            }
        }
        debug!("Imported {} NetworkLinks", self.visited.len());
        Ok(())
    }

    fn import_link<H>(
        &mut self,
        uri: &str,
        handler: &mut H,
        queue: &mut VecDeque<String>,
    ) -> Result<LinkOutcome>
    where
        H: ImportHandler + ?Sized,
    {
        let mut link = UrlRef::parse(uri)?;
        let source = match link.open_stream(&self.options) {
            Ok(source) => source,
            Err(e) if e.is_not_found() && link.is_kmz() => {
                // the entry may live next to the archive instead of inside it
                let (fallback, source) = self.open_beside_archive(&link)?;
                debug!("{uri} not in archive, read {fallback} instead");
                link = fallback;
                source
            }
            Err(e) => return Err(e),
        };

        let mut decoder = KmlDecoder::new(source)?;
        while let Some(obj) = decoder.read()? {
            let obj = self.process(obj, Some(&link), Some(&mut *queue));
            if obj.is_network_link() {
                continue;
            }
            if !handler.handle_event(&link, obj) {
                return Ok(LinkOutcome::Aborted);
            }
        }
        Ok(LinkOutcome::Continue)
    }

    fn open_beside_archive(&self, link: &UrlRef) -> Result<(UrlRef, Box<dyn BufRead>)> {
        let rel = link.kmz_rel_path().unwrap_or_default();
        let url = link.url().join(rel)?;
        let opened = fetch::open_url(&url, &self.options)?;
        Ok((UrlRef::new(&url, None)?, opened.source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ReaderOptions;
    use std::path::Path;
    use url::Url;

    const KML_OPEN: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#;

    fn write_kml(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), format!("{KML_OPEN}{body}</kml>")).unwrap();
    }

    fn link(href: &str) -> String {
        format!("<NetworkLink><Link><href>{href}</href></Link></NetworkLink>")
    }

    #[test]
    fn test_import_requires_closed_reader() {
        let dir = tempfile::tempdir().unwrap();
        write_kml(dir.path(), "root.kml", "<Placemark/>");
        let mut reader = KmlReader::from_path(dir.path().join("root.kml")).unwrap();
        let err = reader.import_from_network_links().err().unwrap();
        assert!(matches!(err, KmlError::ReaderOpen));
        reader.close();
        assert!(reader.import_from_network_links().unwrap().is_empty());
    }

    #[test]
    fn test_breadth_first_without_cycles() {
        let dir = tempfile::tempdir().unwrap();
        write_kml(
            dir.path(),
            "root.kml",
            &format!("<Document>{}{}</Document>", link("a.kml"), link("b.kml")),
        );
        write_kml(
            dir.path(),
            "a.kml",
            &format!("<Placemark><name>a</name></Placemark>{}", link("c.kml")),
        );
        write_kml(
            dir.path(),
            "b.kml",
            &format!("<Placemark><name>b</name></Placemark>{}", link("a.kml")),
        );
        write_kml(dir.path(), "c.kml", "<Placemark><name>c</name></Placemark>");

        let mut reader = KmlReader::from_path(dir.path().join("root.kml")).unwrap();
        reader.read_all().unwrap();
        let objects = reader.import_from_network_links().unwrap();

        let names: Vec<_> = objects
            .iter()
            .filter_map(GisObject::as_feature)
            .filter_map(|f| f.common.name.as_deref())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(objects.iter().all(|o| !o.is_network_link()));
        assert_eq!(reader.visited_count(), 3);
        assert!(!reader.is_max_link_count_exceeded());
    }

    #[test]
    fn test_failing_link_does_not_stop_siblings() {
        struct Recorder {
            events: usize,
            errors: Vec<String>,
        }
        impl ImportHandler for Recorder {
            fn handle_event(&mut self, _link: &UrlRef, _obj: GisObject) -> bool {
                self.events += 1;
                true
            }
            fn handle_error(&mut self, uri: &str, _error: &KmlError) {
                self.errors.push(uri.to_string());
            }
        }

        let dir = tempfile::tempdir().unwrap();
        write_kml(
            dir.path(),
            "root.kml",
            &format!("{}{}", link("missing.kml"), link("ok.kml")),
        );
        write_kml(dir.path(), "ok.kml", "<Placemark/>");

        let mut reader = KmlReader::from_path(dir.path().join("root.kml")).unwrap();
        reader.read_all().unwrap();
        let mut recorder = Recorder {
            events: 0,
            errors: Vec::new(),
        };
        reader
            .import_from_network_links_with(&mut recorder)
            .unwrap();
        assert_eq!(recorder.errors.len(), 1);
        assert!(recorder.errors[0].ends_with("missing.kml"));
        // DocumentStart and the Placemark of ok.kml
        assert_eq!(recorder.events, 2);
    }

    #[test]
    fn test_handler_can_abort() {
        let dir = tempfile::tempdir().unwrap();
        write_kml(
            dir.path(),
            "root.kml",
            &format!("{}{}", link("a.kml"), link("b.kml")),
        );
        write_kml(dir.path(), "a.kml", "<Placemark/><Placemark/>");
        write_kml(dir.path(), "b.kml", "<Placemark/>");

        let mut reader = KmlReader::from_path(dir.path().join("root.kml")).unwrap();
        reader.read_all().unwrap();
        let mut seen = Vec::new();
        let mut handler = |link: &UrlRef, _obj: GisObject| {
            seen.push(link.to_string());
            seen.len() < 2
        };
        reader.import_from_network_links_with(&mut handler).unwrap();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|s| s.ends_with("a.kml")));
        assert_eq!(reader.visited_count(), 1);
    }

    #[test]
    fn test_link_bound() {
        let dir = tempfile::tempdir().unwrap();
        let links: String = (0..5).map(|i| link(&format!("l{i}.kml"))).collect();
        write_kml(dir.path(), "root.kml", &links);
        for i in 0..5 {
            write_kml(dir.path(), &format!("l{i}.kml"), "<Placemark/>");
        }
        let url = Url::from_file_path(dir.path().join("root.kml")).unwrap();
        let mut reader =
            KmlReader::from_url(&url, ReaderOptions::default().with_max_link_count(3)).unwrap();
        reader.read_all().unwrap();
        reader.import_from_network_links().unwrap();
        assert_eq!(reader.visited_count(), 3);
        assert!(reader.is_max_link_count_exceeded());
    }
}
