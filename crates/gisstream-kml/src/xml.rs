//! Namespace-aware pull cursor over `quick-xml` events
//!
//! The decoder never sees raw `quick-xml` events. This cursor resolves
//! namespace prefixes itself, tracks element depth, owns every string it
//! hands out, and offers one event of look-ahead. Handlers use depth to stay
//! in sync: every `StartTag` records the depth of the element it opens, so
//! "read the children of this element" and "skip to the end of this
//! element" are loops bounded by depth rather than by names.

use crate::error::{KmlError, Result};
use gisstream_core::{Element, Namespace};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::BufRead;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Resolved element name
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct QName {
    pub prefix: Option<String>,
    pub local: String,
    /// Namespace URI; `None` for no namespace or an unbound prefix
    pub ns: Option<String>,
}

impl QName {
    pub(crate) fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }
}

/// An opened element
#[derive(Debug, Clone)]
pub(crate) struct StartTag {
    pub name: QName,
    /// Attributes other than namespace declarations, qualified names kept
    pub attrs: Vec<(String, String)>,
    /// Namespace declarations made on this element (`""` for the default)
    pub ns_decls: Vec<(String, String)>,
    /// Depth of this element; the document root is 1
    pub depth: usize,
}

impl StartTag {
    /// Value of an unprefixed attribute. With duplicated attributes the first
    /// one wins.
    pub(crate) fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn local(&self) -> &str {
        &self.name.local
    }
}

/// A closed element
#[derive(Debug, Clone)]
pub(crate) struct EndTag {
    pub name: QName,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub(crate) enum XmlEvent {
    Start(StartTag),
    End(EndTag),
    Text(String),
    Eof,
}

struct OpenElement {
    name: QName,
    decls: Vec<(Option<String>, String)>,
}

pub(crate) struct XmlCursor<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    open: Vec<OpenElement>,
    peeked: Option<XmlEvent>,
    pending_close: bool,
    depth: usize,
    encoding: Option<String>,
}

impl<R: BufRead> XmlCursor<R> {
    pub(crate) fn new(source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            open: Vec::new(),
            peeked: None,
            pending_close: false,
            depth: 0,
            encoding: None,
        }
    }

    /// Encoding named by the XML declaration, once it has been read
    pub(crate) fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Number of elements open after the last consumed event
    pub(crate) const fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn next(&mut self) -> Result<XmlEvent> {
        let event = match self.peeked.take() {
            Some(event) => event,
            None => self.read_raw()?,
        };
        match &event {
            XmlEvent::Start(tag) => self.depth = tag.depth,
            XmlEvent::End(end) => self.depth = end.depth.saturating_sub(1),
            XmlEvent::Text(_) | XmlEvent::Eof => {}
        }
        Ok(event)
    }

    pub(crate) fn peek(&mut self) -> Result<&XmlEvent> {
        let event = match self.peeked.take() {
            Some(event) => event,
            None => self.read_raw()?,
        };
        Ok(self.peeked.insert(event))
    }

    /// Next direct child of the element opened at `parent_depth`, or `None`
    /// once that element closes. Children the caller does not consume are
    /// passed over on the following call.
    pub(crate) fn next_child(&mut self, parent_depth: usize) -> Result<Option<StartTag>> {
        self.next_below(parent_depth, true)
    }

    /// Next element at any depth inside the element opened at
    /// `parent_depth`, or `None` once that element closes
    pub(crate) fn next_descendant(&mut self, parent_depth: usize) -> Result<Option<StartTag>> {
        self.next_below(parent_depth, false)
    }

    fn next_below(&mut self, parent_depth: usize, direct: bool) -> Result<Option<StartTag>> {
        if self.depth < parent_depth {
            return Ok(None);
        }
        loop {
            match self.next()? {
                XmlEvent::Start(tag) => {
                    if !direct || tag.depth == parent_depth + 1 {
                        return Ok(Some(tag));
                    }
                }
                XmlEvent::End(end) => {
                    if end.depth <= parent_depth {
                        return Ok(None);
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => return Err(KmlError::UnexpectedEof),
            }
        }
    }

    /// Character content of `tag`, which must have just been consumed.
    /// Text inside nested elements is ignored.
    pub(crate) fn read_text(&mut self, tag: &StartTag) -> Result<String> {
        let mut text = String::new();
        if self.depth < tag.depth {
            return Ok(text);
        }
        loop {
            match self.next()? {
                XmlEvent::Text(t) => {
                    if self.depth == tag.depth {
                        text.push_str(&t);
                    }
                }
                XmlEvent::Start(child) => {
                    log::debug!(
                        "Ignoring nested <{}> in text of <{}>",
                        child.name.qualified(),
                        tag.name.qualified()
                    );
                }
                XmlEvent::End(end) => {
                    if end.depth <= tag.depth {
                        return Ok(text);
                    }
                }
                XmlEvent::Eof => return Err(KmlError::UnexpectedEof),
            }
        }
    }

    /// Fast-forward past the end of `tag`. Does nothing when the element has
    /// already been closed.
    pub(crate) fn skip(&mut self, tag: &StartTag) -> Result<()> {
        while self.depth >= tag.depth {
            if let XmlEvent::Eof = self.next()? {
                return Err(KmlError::UnexpectedEof);
            }
        }
        Ok(())
    }

    /// Capture `tag` and its whole subtree as an opaque element
    pub(crate) fn read_element(&mut self, tag: &StartTag) -> Result<Element> {
        let mut stack = vec![to_element(tag)];
        if self.depth < tag.depth {
            return Ok(stack.remove(0));
        }
        loop {
            match self.next()? {
                XmlEvent::Start(child) => stack.push(to_element(&child)),
                XmlEvent::Text(t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.get_or_insert_with(String::new).push_str(&t);
                    }
                }
                XmlEvent::End(_) => {
                    let Some(done) = stack.pop() else {
                        return Err(KmlError::Malformed(format!(
                            "unbalanced element <{}>",
                            tag.name.qualified()
                        )));
                    };
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(done),
                        None => return Ok(done),
                    }
                }
                XmlEvent::Eof => return Err(KmlError::UnexpectedEof),
            }
        }
    }

    fn read_raw(&mut self) -> Result<XmlEvent> {
        if self.pending_close {
            self.pending_close = false;
            return self.close_tag().map(XmlEvent::End);
        }
        let mut buf = std::mem::take(&mut self.buf);
        let result = self.read_raw_into(&mut buf);
        self.buf = buf;
        result
    }

    fn read_raw_into(&mut self, buf: &mut Vec<u8>) -> Result<XmlEvent> {
        loop {
            buf.clear();
            match self.reader.read_event_into(buf)? {
                Event::Start(e) => return self.open_tag(&e).map(XmlEvent::Start),
                Event::Empty(e) => {
                    let tag = self.open_tag(&e)?;
                    self.pending_close = true;
                    return Ok(XmlEvent::Start(tag));
                }
                Event::End(_) => return self.close_tag().map(XmlEvent::End),
                Event::Text(t) => {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(e) => {
                            log::warn!("Keeping raw text with bad entity reference: {e}");
                            self.reader.decoder().decode(&t)?.into_owned()
                        }
                    };
                    if !text.is_empty() {
                        return Ok(XmlEvent::Text(text));
                    }
                }
                Event::CData(c) => {
                    let text = self.reader.decoder().decode(&c)?.into_owned();
                    if !text.is_empty() {
                        return Ok(XmlEvent::Text(text));
                    }
                }
                Event::Decl(decl) => {
                    if let Some(enc) = decl.encoding() {
                        let enc = enc?;
                        self.encoding = Some(String::from_utf8_lossy(&enc).into_owned());
                    }
                }
                Event::Eof => return Ok(XmlEvent::Eof),
                Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            }
        }
    }

    fn open_tag(&mut self, e: &BytesStart<'_>) -> Result<StartTag> {
        let decoder = self.reader.decoder();
        let raw_name = decoder.decode(e.name().as_ref())?.into_owned();
        let mut attrs = Vec::new();
        let mut ns_decls = Vec::new();
        let mut decls = Vec::new();
        for attr in e.attributes().with_checks(false) {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = decoder.decode(attr.key.as_ref())?.into_owned();
            let value = match attr.decode_and_unescape_value(&self.reader) {
                Ok(v) => v.into_owned(),
                Err(_) => decoder.decode(&attr.value)?.into_owned(),
            };
            if key == "xmlns" {
                decls.push((None, value.clone()));
                ns_decls.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                decls.push((Some(prefix.to_string()), value.clone()));
                ns_decls.push((prefix.to_string(), value));
            } else if !attrs.iter().any(|(k, _)| *k == key) {
                attrs.push((key, value));
            }
        }
        let (prefix, local) = split_qname(&raw_name);
        self.open.push(OpenElement {
            name: QName {
                prefix: prefix.clone(),
                local: local.clone(),
                ns: None,
            },
            decls,
        });
        let ns = self.resolve(prefix.as_deref());
        if ns.is_none() {
            if let Some(p) = &prefix {
                log::debug!("Unbound namespace prefix {p} on <{raw_name}>");
            }
        }
        let name = QName { prefix, local, ns };
        if let Some(top) = self.open.last_mut() {
            top.name.ns.clone_from(&name.ns);
        }
        Ok(StartTag {
            name,
            attrs,
            ns_decls,
            depth: self.open.len(),
        })
    }

    fn close_tag(&mut self) -> Result<EndTag> {
        let depth = self.open.len();
        match self.open.pop() {
            Some(element) => Ok(EndTag {
                name: element.name,
                depth,
            }),
            None => Err(KmlError::Malformed(
                "end tag without a matching start tag".to_string(),
            )),
        }
    }

    fn resolve(&self, prefix: Option<&str>) -> Option<String> {
        if prefix == Some("xml") {
            return Some(XML_NS.to_string());
        }
        for element in self.open.iter().rev() {
            for (p, uri) in &element.decls {
                if p.as_deref() == prefix {
                    return (!uri.is_empty()).then(|| uri.clone());
                }
            }
        }
        None
    }
}

fn split_qname(raw: &str) -> (Option<String>, String) {
    match raw.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, raw.to_string()),
    }
}

fn to_element(tag: &StartTag) -> Element {
    let namespace = tag.name.ns.as_deref().and_then(|uri| {
        Namespace::new(tag.name.prefix.as_deref().unwrap_or_default(), uri)
    });
    let mut element = Element::new(namespace, tag.name.local.clone());
    element.attributes.clone_from(&tag.attrs);
    element.namespaces = tag
        .ns_decls
        .iter()
        .filter(|(prefix, _)| !prefix.is_empty())
        .filter_map(|(prefix, uri)| Namespace::new(prefix, uri))
        .collect();
    element
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor(xml: &str) -> XmlCursor<&[u8]> {
        XmlCursor::new(xml.as_bytes())
    }

    fn next_start(c: &mut XmlCursor<&[u8]>) -> StartTag {
        loop {
            match c.next().unwrap() {
                XmlEvent::Start(tag) => return tag,
                XmlEvent::Eof => panic!("no start tag"),
                _ => {}
            }
        }
    }

    #[test]
    fn test_namespace_resolution() {
        let mut c = cursor(
            r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
                 <gx:Tour/><name>x</name><foo:bar/></kml>"#,
        );
        let root = next_start(&mut c);
        assert_eq!(root.name.ns.as_deref(), Some("http://www.opengis.net/kml/2.2"));
        assert_eq!(root.ns_decls.len(), 2);
        let tour = next_start(&mut c);
        assert_eq!(tour.name.local, "Tour");
        assert_eq!(tour.name.ns.as_deref(), Some("http://www.google.com/kml/ext/2.2"));
        assert_eq!(tour.depth, 2);
        let name = next_start(&mut c);
        assert_eq!(name.name.ns.as_deref(), Some("http://www.opengis.net/kml/2.2"));
        let unbound = next_start(&mut c);
        assert_eq!(unbound.name.prefix.as_deref(), Some("foo"));
        assert_eq!(unbound.name.ns, None);
    }

    #[test]
    fn test_children_and_text() {
        let mut c = cursor("<a><b>one<i>x</i> two</b><c><d/></c><e>three</e></a>");
        let a = next_start(&mut c);
        let b = c.next_child(a.depth).unwrap().unwrap();
        assert_eq!(b.local(), "b");
        assert_eq!(c.read_text(&b).unwrap(), "onetwo");
        let cc = c.next_child(a.depth).unwrap().unwrap();
        assert_eq!(cc.local(), "c");
        // <d> is skipped implicitly because it is not a direct child of <a>
        let e = c.next_child(a.depth).unwrap().unwrap();
        assert_eq!(e.local(), "e");
        assert_eq!(c.read_text(&e).unwrap(), "three");
        assert!(c.next_child(a.depth).unwrap().is_none());
        assert_eq!(c.depth(), 0);
    }

    #[test]
    fn test_skip_and_peek() {
        let mut c = cursor("<a><b><c>1</c><c>2</c></b><z/></a>");
        let a = next_start(&mut c);
        let b = next_start(&mut c);
        c.skip(&b).unwrap();
        match c.peek().unwrap() {
            XmlEvent::Start(tag) => assert_eq!(tag.local(), "z"),
            other => panic!("unexpected {other:?}"),
        }
        let z = c.next_child(a.depth).unwrap().unwrap();
        assert_eq!(z.local(), "z");
        c.skip(&z).unwrap();
        c.skip(&z).unwrap();
        assert_eq!(c.depth(), 1);
    }

    #[test]
    fn test_read_element_subtree() {
        let mut c = cursor(
            r#"<atom:author xmlns:atom="http://www.w3.org/2005/Atom" role="x"><atom:name>Jo</atom:name></atom:author>"#,
        );
        let tag = next_start(&mut c);
        let el = c.read_element(&tag).unwrap();
        assert_eq!(el.name, "author");
        assert_eq!(el.prefix(), Some("atom"));
        assert_eq!(el.attribute("role"), Some("x"));
        assert_eq!(el.namespaces.len(), 1);
        assert_eq!(el.child("name").and_then(|n| n.text.as_deref()), Some("Jo"));
    }

    #[test]
    fn test_duplicate_attribute_first_wins() {
        let mut c = cursor(r#"<Data name="a" name="b"/>"#);
        let tag = next_start(&mut c);
        assert_eq!(tag.attr("name"), Some("a"));
    }

    #[test]
    fn test_truncated_document() {
        let mut c = cursor("<a><b>text");
        let a = next_start(&mut c);
        assert!(c.skip(&a).is_err());
    }

    #[test]
    fn test_declared_encoding() {
        let mut c = cursor(r#"<?xml version="1.0" encoding="UTF-8"?><kml/>"#);
        let _ = next_start(&mut c);
        assert_eq!(c.encoding(), Some("UTF-8"));
    }
}
