//! `Schema` and `NetworkLinkControl` handlers

use super::{Handled, KmlDecoder};
use crate::url_ref::escape_uri;
use crate::xml::StartTag;
use gisstream_core::{parse_kml_time, FieldType, NetworkLinkControl, Schema, SimpleField};
use log::{debug, warn};
use std::io::BufRead;

impl<R: BufRead> KmlDecoder<R> {
    /// Read a `Schema`, remember it for later `SchemaData`, and register the
    /// legacy `name` → `parent` alias when both are given
    pub(super) fn handle_schema(&mut self, tag: &StartTag) -> Handled<Schema> {
        let mut schema = Schema::new();
        schema.id = tag.attr("id").map(|id| escape_uri(id).into_owned());
        let mut name = non_blank(tag.attr("name"));
        let mut parent = non_blank(tag.attr("parent"));
        let mut generated = 0;

        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "SimpleField" => {
                    let field_name = match non_blank(child.attr("name")) {
                        Some(n) => n,
                        None => {
                            let n = format!("gen{generated}");
                            generated += 1;
                            n
                        }
                    };
                    let field_type = match non_blank(child.attr("type")) {
                        None => FieldType::String,
                        Some(ty) => FieldType::from_kml(&ty).unwrap_or_else(|| {
                            warn!("Unknown SimpleField type {ty} for {field_name}, using string");
                            FieldType::String
                        }),
                    };
                    let mut display_name = None;
                    while let Some(part) = self.cursor.next_descendant(child.depth)? {
                        if part.local() == "displayName" {
                            display_name = self.text(&part)?;
                        }
                    }
                    schema.put(SimpleField {
                        name: field_name,
                        display_name,
                        field_type,
                    });
                }
                "parent" => {
                    if let Some(p) = self.text(&child)? {
                        parent = Some(p);
                    }
                }
                "name" => {
                    if let Some(n) = self.text(&child)? {
                        name = Some(n);
                    }
                }
                _ => {}
            }
        }

        if let (Some(alias), Some(target)) = (&name, &parent) {
            debug!("Treating <{alias}> elements as <{target}>");
            self.schema_aliases.insert(alias.clone(), target.clone());
        }
        schema.name = name;
        schema.parent = parent;
        if let Some(id) = &schema.id {
            self.schemata.insert(id.clone(), schema.clone());
        }
        Ok(schema)
    }

    pub(super) fn handle_network_link_control(
        &mut self,
        tag: &StartTag,
    ) -> Handled<NetworkLinkControl> {
        let mut control = NetworkLinkControl::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "minRefreshPeriod" => control.min_refresh_period = self.float(&child)?,
                "maxSessionLength" => control.max_session_length = self.float(&child)?,
                "cookie" => control.cookie = self.text(&child)?,
                "message" => control.message = self.text(&child)?,
                "linkName" => control.link_name = self.text(&child)?,
                "linkDescription" => control.link_description = self.text(&child)?,
                "linkSnippet" => control.link_snippet = self.text(&child)?,
                "expires" => {
                    if let Some(text) = self.text(&child)? {
                        match parse_kml_time(&text) {
                            Ok(time) => control.expires = Some(time),
                            Err(e) => warn!("Ignoring NetworkLinkControl expires: {e}"),
                        }
                    }
                }
                "LookAt" | "Camera" => control.view_group = self.tagged_data(&child)?,
                "Update" => {
                    while let Some(part) = self.cursor.next_child(child.depth)? {
                        match part.local() {
                            "targetHref" => control.target_href = self.text(&part)?,
                            "Create" | "Delete" | "Change" => {
                                control.update_type = Some(part.local().to_string());
                                self.cursor.skip(&part)?;
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(control)
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
