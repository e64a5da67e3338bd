//! Properties shared by features and containers

use super::{Handled, KmlDecoder, StyleSink};
use crate::url_ref::escape_uri;
use crate::vocab::{is_google_ext, is_kml_name, KML_NS, NS_GOOGLE_KML_EXT_PREFIX};
use crate::xml::StartTag;
use gisstream_core::{
    parse_kml_time, Common, Element, Namespace, SimpleField, StyleSelector, TaggedMap,
};
use log::{debug, warn};
use std::io::BufRead;

impl<R: BufRead> KmlDecoder<R> {
    /// Handle one child of a feature or container. Returns `false` when the
    /// child is a KML element this handler does not know; it is then left
    /// for the caller.
    pub(super) fn handle_property(
        &mut self,
        common: &mut Common,
        mut sink: StyleSink<'_>,
        child: &StartTag,
    ) -> Handled<bool> {
        let local = child.local();
        if !is_kml_name(&child.name) {
            if is_google_ext(&child.name) && matches!(local, "TimeSpan" | "TimeStamp") {
                self.time_primitive(common, child)?;
                return Ok(true);
            }
            let ns = child.name.ns.as_deref().unwrap_or_default();
            if local == "AddressDetails"
                || ns.starts_with("http://www.w3.org/")
                || is_google_ext(&child.name)
            {
                common.elements.push(self.cursor.read_element(child)?);
            } else {
                debug!(
                    "Skipping <{}> in unsupported namespace {ns}",
                    child.name.qualified()
                );
                self.cursor.skip(child)?;
            }
            return Ok(true);
        }

        match local {
            "name" => common.name = self.text(child)?,
            "description" => common.description = self.text(child)?,
            "visibility" => {
                if let Some(visible) = self.boolean(child)? {
                    common.visibility = Some(visible);
                }
            }
            "styleUrl" => common.style_url = self.text(child)?,
            "Style" => {
                let style = self.handle_style(child)?;
                sink.attach(StyleSelector::Style(style));
            }
            "StyleMap" => {
                let map = self.handle_style_map(child)?;
                sink.attach(StyleSelector::StyleMap(map));
            }
            "open" | "Metadata" => self.cursor.skip(child)?,
            "TimeSpan" | "TimeStamp" => self.time_primitive(common, child)?,
            "Region" => self.region(common, child)?,
            "LookAt" | "Camera" => {
                let view = self.tagged_data(child)?;
                if !view.is_empty() {
                    common.view_group = view;
                }
            }
            "ExtendedData" => self.extended_data(common, child)?,
            "Snippet" | "snippet" => {
                common.snippet = Some(self.cursor.read_text(child)?.trim().to_string());
            }
            "address" | "phoneNumber" => {
                if let Some(value) = self.text(child)? {
                    let uri = child.name.ns.as_deref().unwrap_or(KML_NS);
                    let mut element = Element::new(Namespace::new("", uri), local);
                    element.text = Some(value);
                    common.elements.push(element);
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// `TimeStamp/when` sets both bounds; `TimeSpan/begin` and `end` are
    /// independent
    fn time_primitive(&mut self, common: &mut Common, tag: &StartTag) -> Handled<()> {
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            let local = child.local();
            if !matches!(local, "when" | "begin" | "end") {
                continue;
            }
            let Some(text) = self.text(&child)? else {
                continue;
            };
            match parse_kml_time(&text) {
                Ok(time) => match local {
                    "when" => {
                        common.start_time = Some(time);
                        common.end_time = Some(time);
                    }
                    "begin" => common.start_time = Some(time),
                    _ => common.end_time = Some(time),
                },
                Err(e) => warn!("Ignoring {} {local}: {e}", tag.local()),
            }
        }
        Ok(())
    }

    /// `LatLonAltBox` and `Lod` values merged into one map
    fn region(&mut self, common: &mut Common, tag: &StartTag) -> Handled<()> {
        let mut region = TaggedMap::new("Region");
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            if matches!(child.local(), "LatLonAltBox" | "Lod") {
                self.tagged_data_into(&child, &mut region)?;
            }
        }
        if !region.is_empty() {
            common.region = region;
        }
        Ok(())
    }

    /// Leaf children of `tag` as a map named after it
    pub(super) fn tagged_data(&mut self, tag: &StartTag) -> Handled<TaggedMap> {
        let mut map = TaggedMap::new(tag.local());
        self.tagged_data_into(tag, &mut map)?;
        Ok(map)
    }

    fn tagged_data_into(&mut self, tag: &StartTag, map: &mut TaggedMap) -> Handled<()> {
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            let gx = is_google_ext(&child.name);
            if gx {
                let element = self.cursor.read_element(&child)?;
                self.flatten_extension(map, &element, None);
                continue;
            }
            if child.name.ns != tag.name.ns {
                debug!(
                    "Skipping <{}> inside <{}>",
                    child.name.qualified(),
                    tag.local()
                );
                self.cursor.skip(&child)?;
                continue;
            }
            let value = if child.local() == "viewFormat" {
                // an empty viewFormat disables the view parameters
                Some(self.cursor.read_text(&child)?.trim().to_string())
            } else {
                self.text(&child)?
            };
            if let Some(value) = value {
                map.insert(child.local(), value);
            }
        }
        Ok(())
    }

    /// Fold a gx subtree into `map` as `gx:name` / `gx:parent/child` keys.
    /// `gx:altitudeMode` maps onto `altitudeMode` unless the KML one is
    /// already present.
    fn flatten_extension(&mut self, map: &mut TaggedMap, element: &Element, parent: Option<&str>) {
        let prefix = if element
            .namespace_uri()
            .is_some_and(|ns| ns.starts_with(NS_GOOGLE_KML_EXT_PREFIX))
        {
            Some("gx")
        } else {
            element.prefix()
        };
        let name = match prefix {
            Some(p) => format!("{p}:{}", element.name),
            None => element.name.clone(),
        };
        let key = match parent {
            Some(parent) => format!("{parent}/{name}"),
            None => name,
        };

        if !element.children.is_empty() {
            for child in &element.children {
                self.flatten_extension(map, child, Some(key.as_str()));
            }
            return;
        }
        let Some(text) = element
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        else {
            return;
        };
        if key == "gx:altitudeMode" {
            if map.contains_key("altitudeMode") {
                if !self.altitude_dup_logged {
                    self.altitude_dup_logged = true;
                    debug!("{} has both altitudeMode and gx:altitudeMode", map.tag());
                }
            } else {
                map.insert("altitudeMode", text);
            }
        } else {
            map.insert(key, text);
        }
    }

    fn extended_data(&mut self, common: &mut Common, tag: &StartTag) -> Handled<()> {
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            if child.name.ns != tag.name.ns {
                common.extended_elements.push(self.cursor.read_element(&child)?);
                continue;
            }
            match child.local() {
                "Data" => {
                    let Some(name) = child.attr("name").map(str::to_string) else {
                        debug!("Data element without a name");
                        self.cursor.skip(&child)?;
                        continue;
                    };
                    if let Some(value) = self.data_value(&child)? {
                        common.put_data(SimpleField::new(name), value);
                    }
                }
                "SchemaData" => {
                    let schema_url = child.attr("schemaUrl").map(|u| escape_uri(u).into_owned());
                    self.schema_data(common, schema_url.as_deref(), &child)?;
                    if schema_url.is_some() {
                        // the last SchemaData decides the feature's schema
                        common.schema = schema_url;
                    }
                }
                _ => common.extended_elements.push(self.cursor.read_element(&child)?),
            }
        }
        Ok(())
    }

    fn data_value(&mut self, tag: &StartTag) -> Handled<Option<String>> {
        let mut value = None;
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            if child.local() == "value" {
                value = Some(self.cursor.read_text(&child)?);
            }
        }
        Ok(value)
    }

    fn schema_data(
        &mut self,
        common: &mut Common,
        schema_url: Option<&str>,
        tag: &StartTag,
    ) -> Handled<()> {
        let schema = schema_url
            .map(|url| url.strip_prefix('#').unwrap_or(url))
            .and_then(|id| self.schemata.get(id))
            .cloned();
        while let Some(child) = self.cursor.next_descendant(tag.depth)? {
            if child.local() != "SimpleData" {
                continue;
            }
            let Some(name) = child.attr("name").map(str::to_string) else {
                debug!("SimpleData element without a name");
                continue;
            };
            let value = self.cursor.read_text(&child)?;
            let field = schema
                .as_ref()
                .and_then(|s| s.get(&name))
                .cloned()
                .unwrap_or_else(|| SimpleField::new(name));
            common.put_data(field, value);
        }
        Ok(())
    }
}
