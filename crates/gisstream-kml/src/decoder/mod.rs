//! Streaming KML decoder
//!
//! [`KmlDecoder`] pulls XML events on demand and turns them into
//! [`GisObject`]s, one per [`KmlDecoder::read`] call. Containers are
//! reported as a `ContainerStart` (emitted as soon as the container's own
//! properties have been read) and a matching `ContainerEnd`; features,
//! shared styles, schemas and foreign elements come out in document order
//! in between.
//!
//! The decoder is lenient. Element handlers return [`ElementError`]: a
//! `Recoverable` error is logged and the offending element is skipped to its
//! end tag, while a `Fatal` error (broken XML, truncated input) ends the
//! stream.

mod properties;
mod schema;
mod styles;

use crate::error::{KmlError, Result};
use crate::geometry::{is_geometry_tag, GeometryBuilder};
use crate::vocab::{is_kml_name, is_true, parse_bool, register_kml_namespace, KmlTag};
use crate::xml::{StartTag, XmlCursor, XmlEvent};
use gisstream_core::{
    Color, ContainerKind, ContainerStart, DocumentStart, DocumentType, Feature, FeatureKind,
    GeoError, GisObject, GroundOverlay, Namespace, NetworkLink, Overlay, PhotoOverlay, Schema,
    ScreenLocation, ScreenOverlay, ScreenUnit, StyleSelector,
};
use log::{debug, warn};
use std::collections::{HashMap, VecDeque};
use std::io::BufRead;

/// Outcome of a failed element handler
#[derive(Debug)]
pub(crate) enum ElementError {
    /// Bad content in one element; skip it and continue
    Recoverable(String),
    /// The stream cannot continue
    Fatal(KmlError),
}

impl From<KmlError> for ElementError {
    fn from(e: KmlError) -> Self {
        Self::Fatal(e)
    }
}

impl From<GeoError> for ElementError {
    fn from(e: GeoError) -> Self {
        Self::Recoverable(e.to_string())
    }
}

type Handled<T> = std::result::Result<T, ElementError>;

/// Where an inline `Style` / `StyleMap` goes
enum StyleSink<'a> {
    Feature(&'a mut Option<StyleSelector>),
    Container(&'a mut Vec<StyleSelector>),
}

impl StyleSink<'_> {
    fn attach(&mut self, selector: StyleSelector) {
        match self {
            Self::Feature(slot) => {
                if slot.is_some() {
                    debug!("Feature has more than one inline style, keeping the last");
                }
                **slot = Some(selector);
            }
            Self::Container(list) => list.push(selector),
        }
    }
}

/// Pull decoder from a buffered KML byte stream to GIS objects.
///
/// # Example
///
/// ```
/// use gisstream_kml::KmlDecoder;
/// use gisstream_core::GisObject;
///
/// let kml = r#"<kml xmlns="http://www.opengis.net/kml/2.2">
///   <Placemark><name>A</name><Point><coordinates>1,2</coordinates></Point></Placemark>
/// </kml>"#;
/// let mut decoder = KmlDecoder::new(kml.as_bytes())?;
/// assert!(matches!(decoder.read()?, Some(GisObject::DocumentStart(_))));
/// let Some(GisObject::Feature(placemark)) = decoder.read()? else { panic!() };
/// assert_eq!(placemark.common.name.as_deref(), Some("A"));
/// assert!(decoder.read()?.is_none());
/// # Ok::<(), gisstream_kml::KmlError>(())
/// ```
pub struct KmlDecoder<R: BufRead> {
    cursor: XmlCursor<R>,
    pending: VecDeque<GisObject>,
    /// Legacy element names declared by `Schema name=… parent=…`
    schema_aliases: HashMap<String, String>,
    /// Schemas seen so far, keyed by escaped id
    schemata: HashMap<String, Schema>,
    encoding: String,
    altitude_dup_logged: bool,
    finished: bool,
}

impl<R: BufRead> KmlDecoder<R> {
    /// Start decoding. Reads the prolog and the root start tag so the
    /// declared encoding and root namespaces are known up front.
    ///
    /// # Errors
    ///
    /// Returns an error when the prolog is not well-formed XML.
    pub fn new(source: R) -> Result<Self> {
        let mut cursor = XmlCursor::new(source);
        loop {
            let at_root = matches!(cursor.peek()?, XmlEvent::Start(_) | XmlEvent::Eof);
            if at_root {
                break;
            }
            cursor.next()?;
        }

        let mut start = DocumentStart::new(DocumentType::Kml);
        if let Some(encoding) = cursor.encoding() {
            start.encoding = encoding.to_string();
        }
        let root = match cursor.peek()? {
            XmlEvent::Start(tag) => Some(tag.clone()),
            _ => None,
        };
        if let Some(root) = root {
            for (prefix, uri) in &root.ns_decls {
                if prefix.is_empty() {
                    continue;
                }
                match Namespace::new(prefix, uri) {
                    Some(ns) => start.namespaces.push(ns),
                    None => warn!("Ignoring invalid namespace declaration {prefix}=\"{uri}\""),
                }
            }
            let ns = root.name.ns.as_deref().unwrap_or_default();
            if root.local() == "kml" {
                register_kml_namespace(ns);
                // the kml wrapper itself is never emitted
                cursor.next()?;
            } else if KmlTag::from_name(root.local())
                .is_some_and(|t| t.is_feature() || t.is_container())
            {
                register_kml_namespace(ns);
            }
        }

        Ok(Self {
            cursor,
            encoding: start.encoding.clone(),
            pending: VecDeque::from([GisObject::DocumentStart(start)]),
            schema_aliases: HashMap::new(),
            schemata: HashMap::new(),
            altitude_dup_logged: false,
            finished: false,
        })
    }

    /// Character encoding declared by the document (`UTF-8` when absent)
    #[must_use]
    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    /// Next object, or `None` at the end of the document.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed or truncated XML. The decoder is
    /// finished afterwards and keeps returning `Ok(None)`.
    pub fn read(&mut self) -> Result<Option<GisObject>> {
        if let Some(obj) = self.pending.pop_front() {
            return Ok(Some(obj));
        }
        if self.finished {
            return Ok(None);
        }
        let result = self.read_next();
        if !matches!(result, Ok(Some(_))) {
            self.finished = true;
        }
        result
    }

    fn read_next(&mut self) -> Result<Option<GisObject>> {
        loop {
            match self.cursor.next()? {
                XmlEvent::Start(tag) => {
                    if let Some(obj) = self.handle_start(&tag)? {
                        return Ok(Some(obj));
                    }
                }
                XmlEvent::End(end) => {
                    if is_kml_name(&end.name)
                        && KmlTag::from_name(self.alias(&end.name.local))
                            .is_some_and(KmlTag::is_container)
                    {
                        return Ok(Some(GisObject::ContainerEnd));
                    }
                }
                XmlEvent::Text(_) => {}
                XmlEvent::Eof => {
                    if self.cursor.depth() > 0 {
                        return Err(KmlError::UnexpectedEof);
                    }
                    return Ok(None);
                }
            }
        }
    }

    fn handle_start(&mut self, tag: &StartTag) -> Result<Option<GisObject>> {
        match self.dispatch(tag) {
            Ok(obj) => Ok(obj),
            Err(ElementError::Recoverable(msg)) => {
                warn!("Skipping <{}>: {msg}", tag.name.qualified());
                self.cursor.skip(tag)?;
                Ok(None)
            }
            Err(ElementError::Fatal(e)) => Err(e),
        }
    }

    fn dispatch(&mut self, tag: &StartTag) -> Handled<Option<GisObject>> {
        if !is_kml_name(&tag.name) {
            debug!("Foreign element <{}>", tag.name.qualified());
            return Ok(Some(GisObject::Element(self.cursor.read_element(tag)?)));
        }
        let kml_tag = KmlTag::from_name(self.alias(tag.local()));
        if let Some(kind) = kml_tag.and_then(KmlTag::feature_kind) {
            return self.handle_feature(tag, kind).map(Some);
        }
        let obj = match kml_tag {
            Some(KmlTag::Document) => self.handle_container(tag, ContainerKind::Document)?,
            Some(KmlTag::Folder) => self.handle_container(tag, ContainerKind::Folder)?,
            Some(KmlTag::Schema) => GisObject::Schema(self.handle_schema(tag)?),
            Some(KmlTag::NetworkLinkControl) => {
                GisObject::NetworkLinkControl(self.handle_network_link_control(tag)?)
            }
            Some(KmlTag::Style) => {
                debug!("Out of order Style element");
                GisObject::Style(self.handle_style(tag)?)
            }
            Some(KmlTag::StyleMap) => {
                debug!("Out of order StyleMap element");
                GisObject::StyleMap(self.handle_style_map(tag)?)
            }
            _ => {
                if tag.name.ns.is_some() {
                    // unknown KML element: its children are read as if top level
                    return Ok(None);
                }
                GisObject::Element(self.cursor.read_element(tag)?)
            }
        };
        Ok(Some(obj))
    }

    fn alias<'a>(&'a self, name: &'a str) -> &'a str {
        self.schema_aliases.get(name).map_or(name, String::as_str)
    }

    fn handle_container(&mut self, tag: &StartTag, kind: ContainerKind) -> Handled<GisObject> {
        let mut container = ContainerStart::new(kind);
        container.common.id = tag.attr("id").map(str::to_string);

        loop {
            let stop = match self.cursor.peek()? {
                XmlEvent::Start(next) => starts_child_object(&self.schema_aliases, next),
                XmlEvent::End(end) => end.depth <= tag.depth,
                XmlEvent::Text(_) => false,
                XmlEvent::Eof => return Err(KmlError::UnexpectedEof.into()),
            };
            if stop {
                break;
            }
            let XmlEvent::Start(child) = self.cursor.next()? else {
                continue;
            };
            if child.depth != tag.depth + 1 {
                continue;
            }
            if child.local() == "open" && is_kml_name(&child.name) {
                container.open = is_true(&self.cursor.read_text(&child)?);
                continue;
            }
            let sink = StyleSink::Container(&mut container.styles);
            match self.handle_property(&mut container.common, sink, &child) {
                Ok(true) => {}
                Ok(false) => debug!("Ignoring {} child <{}>", kind.tag(), child.name.qualified()),
                Err(ElementError::Recoverable(msg)) => {
                    warn!("Skipping {} child <{}>: {msg}", kind.tag(), child.name.qualified());
                    self.cursor.skip(&child)?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(GisObject::ContainerStart(container))
    }

    fn handle_feature(&mut self, tag: &StartTag, kind: FeatureKind) -> Handled<GisObject> {
        let mut feature = Feature::new(kind);
        feature.common.id = tag.attr("id").map(str::to_string);

        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match self.handle_feature_child(&mut feature, &child) {
                Ok(()) => {}
                Err(ElementError::Recoverable(msg)) => {
                    warn!(
                        "Skipping {} child <{}>: {msg}",
                        feature.kind.tag(),
                        child.name.qualified()
                    );
                    self.cursor.skip(&child)?;
                }
                Err(fatal) => return Err(fatal),
            }
        }
        Ok(GisObject::Feature(feature))
    }

    fn handle_feature_child(&mut self, feature: &mut Feature, child: &StartTag) -> Handled<()> {
        let kml = is_kml_name(&child.name);
        if kml && child.local() == "open" {
            if let FeatureKind::NetworkLink(link) = &mut feature.kind {
                link.open = is_true(&self.cursor.read_text(child)?);
                return Ok(());
            }
        }
        let sink = StyleSink::Feature(&mut feature.style);
        if self.handle_property(&mut feature.common, sink, child)? || !kml {
            return Ok(());
        }
        if is_geometry_tag(child.local()) {
            let geometry =
                GeometryBuilder::new(&mut self.cursor, &mut self.altitude_dup_logged).build(child)?;
            if geometry.is_some() {
                if feature.geometry.is_some() {
                    debug!("{} has more than one geometry, keeping the last", feature.kind.tag());
                }
                feature.geometry = geometry;
            }
            return Ok(());
        }
        match &mut feature.kind {
            FeatureKind::Placemark => {}
            FeatureKind::NetworkLink(link) => self.network_link_child(link, child)?,
            FeatureKind::GroundOverlay(ground) => {
                if !self.overlay_child(&mut ground.overlay, child)? {
                    self.ground_overlay_child(ground, child)?;
                }
            }
            FeatureKind::ScreenOverlay(screen) => {
                if !self.overlay_child(&mut screen.overlay, child)? {
                    self.screen_overlay_child(screen, child)?;
                }
            }
            FeatureKind::PhotoOverlay(photo) => {
                if !self.overlay_child(&mut photo.overlay, child)? {
                    self.photo_overlay_child(photo, child)?;
                }
            }
        }
        Ok(())
    }

    fn network_link_child(&mut self, link: &mut NetworkLink, child: &StartTag) -> Handled<()> {
        match child.local() {
            "refreshVisibility" => link.refresh_visibility = is_true(&self.cursor.read_text(child)?),
            "flyToView" => link.fly_to_view = is_true(&self.cursor.read_text(child)?),
            "Link" | "Url" => link.link = self.tagged_data(child)?,
            _ => {}
        }
        Ok(())
    }

    fn overlay_child(&mut self, overlay: &mut Overlay, child: &StartTag) -> Handled<bool> {
        match child.local() {
            "color" => overlay.color = self.color(child)?,
            "drawOrder" => overlay.draw_order = self.int(child)?,
            "Icon" => overlay.icon = self.tagged_data(child)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn ground_overlay_child(&mut self, ground: &mut GroundOverlay, child: &StartTag) -> Handled<()> {
        match child.local() {
            "LatLonBox" => {
                while let Some(edge) = self.cursor.next_child(child.depth)? {
                    let value = self.float(&edge)?;
                    match edge.local() {
                        "north" => ground.north = value,
                        "south" => ground.south = value,
                        "east" => ground.east = value,
                        "west" => {
                            ground.west = value.map(|w| if w < -180.0 { w + 360.0 } else { w });
                        }
                        "rotation" => ground.rotation = value,
                        _ => {}
                    }
                }
            }
            "altitude" => ground.altitude = self.float(child)?,
            "altitudeMode" => ground.altitude_mode = self.text(child)?,
            _ => {}
        }
        Ok(())
    }

    fn screen_overlay_child(&mut self, screen: &mut ScreenOverlay, child: &StartTag) -> Handled<()> {
        match child.local() {
            "overlayXY" => screen.overlay_xy = screen_location(child),
            "screenXY" => screen.screen_xy = screen_location(child),
            "rotationXY" => screen.rotation_xy = screen_location(child),
            "size" => screen.size = screen_location(child),
            "rotation" => {
                screen.rotation = self.float(child)?.map(|r| {
                    if r > 180.0 {
                        debug!("Normalizing ScreenOverlay rotation {r}");
                        r - 360.0
                    } else if r < -180.0 {
                        debug!("Normalizing ScreenOverlay rotation {r}");
                        r + 360.0
                    } else {
                        r
                    }
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn photo_overlay_child(&mut self, photo: &mut PhotoOverlay, child: &StartTag) -> Handled<()> {
        if child.local() == "rotation" {
            if let Some(r) = self.float(child)? {
                if r.abs() <= 180.0 {
                    photo.rotation = Some(r);
                } else {
                    warn!("PhotoOverlay rotation {r} outside [-180, 180]");
                }
            }
        }
        Ok(())
    }

    /// Trimmed text, absent when blank
    fn text(&mut self, tag: &StartTag) -> Handled<Option<String>> {
        let text = self.cursor.read_text(tag)?;
        let text = text.trim();
        Ok((!text.is_empty()).then(|| text.to_string()))
    }

    fn float(&mut self, tag: &StartTag) -> Handled<Option<f64>> {
        let Some(text) = self.text(tag)? else {
            return Ok(None);
        };
        match text.parse::<f64>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                warn!("Invalid number in <{}>: {text}", tag.name.qualified());
                Ok(None)
            }
        }
    }

    fn int(&mut self, tag: &StartTag) -> Handled<Option<i32>> {
        let Some(text) = self.text(tag)? else {
            return Ok(None);
        };
        match text.parse::<i32>() {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                warn!("Invalid integer in <{}>: {text}", tag.name.qualified());
                Ok(None)
            }
        }
    }

    fn boolean(&mut self, tag: &StartTag) -> Handled<Option<bool>> {
        let Some(text) = self.text(tag)? else {
            return Ok(None);
        };
        let value = parse_bool(&text);
        if value.is_none() {
            warn!("Invalid boolean in <{}>: {text}", tag.name.qualified());
        }
        Ok(value)
    }

    fn color(&mut self, tag: &StartTag) -> Handled<Option<Color>> {
        let Some(text) = self.text(tag)? else {
            return Ok(None);
        };
        match Color::from_kml_hex(&text) {
            Ok(color) => Ok(Some(color)),
            Err(e) => {
                warn!("Ignoring <{}>: {e}", tag.name.qualified());
                Ok(None)
            }
        }
    }
}

impl<R: BufRead> Iterator for KmlDecoder<R> {
    type Item = Result<GisObject>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Whether a container header ends at this element: a nested feature,
/// container or `Schema`
fn starts_child_object(aliases: &HashMap<String, String>, tag: &StartTag) -> bool {
    if !is_kml_name(&tag.name) {
        return false;
    }
    let name = aliases.get(tag.local()).map_or(tag.local(), String::as_str);
    KmlTag::from_name(name)
        .is_some_and(|t| t.is_feature() || t.is_container() || t == KmlTag::Schema)
}

/// `x`, `y`, `xunits`, `yunits` attributes; `None` when any is invalid
fn screen_location(tag: &StartTag) -> Option<ScreenLocation> {
    let ordinate = |name: &str| -> Option<f64> {
        let raw = tag.attr(name)?;
        match raw.trim().parse::<f64>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Invalid {name} in <{}>: {raw}", tag.local());
                None
            }
        }
    };
    let units = |name: &str| -> Option<ScreenUnit> {
        match tag.attr(name) {
            None => Some(ScreenUnit::Fraction),
            Some(raw) => {
                let unit = ScreenUnit::from_kml(raw);
                if unit.is_none() {
                    warn!("Invalid {name} in <{}>: {raw}", tag.local());
                }
                unit
            }
        }
    };
    Some(ScreenLocation {
        x: ordinate("x")?,
        y: ordinate("y")?,
        xunits: units("xunits")?,
        yunits: units("yunits")?,
    })
}

#[cfg(test)]
mod tests;
