//! `Style` and `StyleMap` handlers

use super::{Handled, KmlDecoder};
use crate::xml::StartTag;
use gisstream_core::{
    BalloonStyle, Color, ColorMode, IconStyle, LabelStyle, LineStyle, ListItemType, ListStyle,
    PolyStyle, Style, StyleMap, StylePair, STYLE_MAP_HIGHLIGHT, STYLE_MAP_NORMAL,
};
use log::{debug, info, warn};
use std::io::BufRead;

impl<R: BufRead> KmlDecoder<R> {
    pub(super) fn handle_style(&mut self, tag: &StartTag) -> Handled<Style> {
        let mut style = Style {
            id: tag.attr("id").map(str::to_string),
            ..Style::default()
        };
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "IconStyle" => style.icon = Some(self.icon_style(&child)?),
                "LineStyle" => style.line = Some(self.line_style(&child)?),
                "PolyStyle" => style.poly = Some(self.poly_style(&child)?),
                "LabelStyle" => style.label = Some(self.label_style(&child)?),
                "BalloonStyle" => style.balloon = Some(self.balloon_style(&child)?),
                "ListStyle" => style.list = Some(self.list_style(&child)?),
                _ => {}
            }
        }
        Ok(style)
    }

    fn icon_style(&mut self, tag: &StartTag) -> Handled<IconStyle> {
        let mut icon = IconStyle::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "color" => icon.color = self.color(&child)?,
                "scale" => icon.scale = self.float(&child)?,
                "heading" => icon.heading = self.float(&child)?,
                "Icon" => {
                    let mut href = String::new();
                    while let Some(part) = self.cursor.next_descendant(child.depth)? {
                        if part.local() == "href" {
                            href = self.text(&part)?.unwrap_or_default();
                        }
                    }
                    icon.href = Some(href);
                }
                _ => {}
            }
        }
        Ok(icon)
    }

    fn line_style(&mut self, tag: &StartTag) -> Handled<LineStyle> {
        let mut line = LineStyle::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "color" => line.color = self.color(&child)?.unwrap_or(Color::WHITE),
                "width" => {
                    if let Some(width) = self.float(&child)? {
                        line.width = width;
                    }
                }
                "colorMode" => line.color_mode = self.color_mode(&child)?,
                _ => {}
            }
        }
        Ok(line)
    }

    fn poly_style(&mut self, tag: &StartTag) -> Handled<PolyStyle> {
        let mut poly = PolyStyle::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "color" => poly.color = self.color(&child)?,
                "fill" => poly.fill = self.boolean(&child)?,
                "outline" => poly.outline = self.boolean(&child)?,
                "colorMode" => poly.color_mode = self.color_mode(&child)?,
                _ => {}
            }
        }
        Ok(poly)
    }

    fn label_style(&mut self, tag: &StartTag) -> Handled<LabelStyle> {
        let mut label = LabelStyle::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "color" => label.color = self.color(&child)?,
                "scale" => {
                    if let Some(scale) = self.float(&child)? {
                        label.scale = scale;
                    }
                }
                _ => {}
            }
        }
        Ok(label)
    }

    fn balloon_style(&mut self, tag: &StartTag) -> Handled<BalloonStyle> {
        let mut balloon = BalloonStyle::default();
        let mut legacy_color = None;
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "bgColor" => balloon.bg_color = self.color(&child)?,
                "color" => legacy_color = self.color(&child)?,
                "textColor" => balloon.text_color = self.color(&child)?,
                "text" => balloon.text = Some(self.cursor.read_text(&child)?.trim().to_string()),
                "displayMode" => balloon.display_mode = self.text(&child)?,
                _ => {}
            }
        }
        if balloon.bg_color.is_none() {
            balloon.bg_color = legacy_color;
        }
        Ok(balloon)
    }

    fn list_style(&mut self, tag: &StartTag) -> Handled<ListStyle> {
        let mut list = ListStyle::default();
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "bgColor" => list.bg_color = self.color(&child)?,
                "listItemType" => {
                    if let Some(text) = self.text(&child)? {
                        list.list_item_type = ListItemType::from_kml(&text);
                        if list.list_item_type.is_none() {
                            warn!("Invalid listItemType: {text}");
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(list)
    }

    fn color_mode(&mut self, tag: &StartTag) -> Handled<ColorMode> {
        Ok(match self.text(tag)?.as_deref() {
            Some("random") => ColorMode::Random,
            None | Some("normal") => ColorMode::Normal,
            Some(other) => {
                warn!("Invalid colorMode: {other}");
                ColorMode::Normal
            }
        })
    }

    pub(super) fn handle_style_map(&mut self, tag: &StartTag) -> Handled<StyleMap> {
        let mut map = StyleMap::new();
        map.id = tag.attr("id").map(str::to_string);
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            if child.local() == "Pair" {
                self.style_map_pair(&mut map, &child)?;
            }
        }
        Ok(map)
    }

    fn style_map_pair(&mut self, map: &mut StyleMap, tag: &StartTag) -> Handled<()> {
        let (mut key, mut style_url, mut style) = (None, None, None);
        while let Some(child) = self.cursor.next_child(tag.depth)? {
            match child.local() {
                "key" => key = self.text(&child)?,
                "styleUrl" => style_url = self.text(&child)?,
                "Style" => style = Some(self.handle_style(&child)?),
                "StyleMap" => {
                    debug!("Skipping StyleMap nested in a Pair");
                    self.cursor.skip(&child)?;
                }
                _ => {}
            }
        }
        if key.is_none() && style_url.is_none() && style.is_none() {
            debug!("Skipping empty StyleMap Pair");
            return Ok(());
        }
        let key = normalize_pair_key(key);
        let pair = StylePair {
            key,
            style_url,
            style,
        };
        if map.contains_key(&pair.key) {
            debug!("Duplicate StyleMap key {}, keeping the first pair", pair.key);
        } else {
            map.add(pair);
        }
        Ok(())
    }
}

fn normalize_pair_key(key: Option<String>) -> String {
    match key {
        None => {
            debug!("StyleMap Pair without a key, assuming {STYLE_MAP_NORMAL}");
            STYLE_MAP_NORMAL.to_string()
        }
        Some(k) if k.eq_ignore_ascii_case(STYLE_MAP_NORMAL) => STYLE_MAP_NORMAL.to_string(),
        Some(k) if k.eq_ignore_ascii_case(STYLE_MAP_HIGHLIGHT) => STYLE_MAP_HIGHLIGHT.to_string(),
        Some(k) => {
            info!("Unknown StyleMap key: {k}");
            k
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_normalization() {
        assert_eq!(normalize_pair_key(Some("NORMAL".to_string())), "normal");
        assert_eq!(normalize_pair_key(Some("Highlight".to_string())), "highlight");
        assert_eq!(normalize_pair_key(None), "normal");
        assert_eq!(normalize_pair_key(Some("hover".to_string())), "hover");
    }
}
