//! Style selectors: `Style` and `StyleMap`

use crate::color::Color;
use serde::{Deserialize, Serialize};

/// `normal` StyleMap key
pub const STYLE_MAP_NORMAL: &str = "normal";
/// `highlight` StyleMap key
pub const STYLE_MAP_HIGHLIGHT: &str = "highlight";

/// Whether a style color is fixed or randomized by the client
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Use the color as given
    #[default]
    Normal,
    /// Random linear scale applied by the client
    Random,
}

/// How a feature list entry is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ListItemType {
    /// Checkbox per item
    Check,
    /// Only one child visible at a time
    RadioFolder,
    /// Children visible but not individually toggleable
    CheckOffOnly,
    /// Children hidden in the list
    CheckHideChildren,
}

impl ListItemType {
    /// Parse the exact KML spelling
    #[must_use]
    pub fn from_kml(text: &str) -> Option<Self> {
        match text {
            "check" => Some(Self::Check),
            "radioFolder" => Some(Self::RadioFolder),
            "checkOffOnly" => Some(Self::CheckOffOnly),
            "checkHideChildren" => Some(Self::CheckHideChildren),
            _ => None,
        }
    }
}

/// `IconStyle`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IconStyle {
    /// Tint
    pub color: Option<Color>,
    /// Scale factor
    pub scale: Option<f64>,
    /// Rotation in degrees
    pub heading: Option<f64>,
    /// Icon href; empty when an `Icon` element was present but had no href
    pub href: Option<String>,
}

/// `LineStyle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineStyle {
    /// Stroke color (white when missing or unparsable)
    pub color: Color,
    /// Stroke width in pixels
    pub width: f64,
    /// Color mode
    pub color_mode: ColorMode,
}

impl Default for LineStyle {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            width: 1.0,
            color_mode: ColorMode::Normal,
        }
    }
}

/// `PolyStyle`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolyStyle {
    /// Fill color
    pub color: Option<Color>,
    /// Fill the polygon
    pub fill: Option<bool>,
    /// Outline the polygon
    pub outline: Option<bool>,
    /// Color mode
    pub color_mode: ColorMode,
}

/// `LabelStyle`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelStyle {
    /// Label color
    pub color: Option<Color>,
    /// Label scale
    pub scale: f64,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            color: None,
            scale: 1.0,
        }
    }
}

/// `BalloonStyle`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalloonStyle {
    /// Background color (`bgColor`, or the legacy `color`)
    pub bg_color: Option<Color>,
    /// Balloon text template; an empty string is preserved
    pub text: Option<String>,
    /// Foreground color
    pub text_color: Option<Color>,
    /// `default` or `hide`
    pub display_mode: Option<String>,
}

/// `ListStyle`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListStyle {
    /// Background color
    pub bg_color: Option<Color>,
    /// Item rendering
    pub list_item_type: Option<ListItemType>,
}

/// A `Style` element with its optional sub-styles
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    /// Element id
    pub id: Option<String>,
    /// `IconStyle`
    pub icon: Option<IconStyle>,
    /// `LineStyle`
    pub line: Option<LineStyle>,
    /// `PolyStyle`
    pub poly: Option<PolyStyle>,
    /// `LabelStyle`
    pub label: Option<LabelStyle>,
    /// `BalloonStyle`
    pub balloon: Option<BalloonStyle>,
    /// `ListStyle`
    pub list: Option<ListStyle>,
}

impl Style {
    /// Icon href if an `IconStyle` is present
    #[must_use]
    pub fn icon_url(&self) -> Option<&str> {
        self.icon.as_ref().and_then(|i| i.href.as_deref())
    }
}

/// One `Pair` of a [`StyleMap`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StylePair {
    /// `normal`, `highlight`, or the literal unrecognized key
    pub key: String,
    /// Referenced style
    pub style_url: Option<String>,
    /// Inline style
    pub style: Option<Style>,
}

/// A `StyleMap`: state name to style
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StyleMap {
    /// Element id
    pub id: Option<String>,
    pairs: Vec<StylePair>,
}

impl StyleMap {
    /// Empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a pair with this key exists
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.pairs.iter().any(|p| p.key == key)
    }

    /// Add a pair. Returns `false` (and keeps the existing pair) when the key
    /// is already mapped.
    pub fn add(&mut self, pair: StylePair) -> bool {
        if self.contains_key(&pair.key) {
            return false;
        }
        self.pairs.push(pair);
        true
    }

    /// Pair by key
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StylePair> {
        self.pairs.iter().find(|p| p.key == key)
    }

    /// Pairs in document order
    #[must_use]
    pub fn pairs(&self) -> &[StylePair] {
        &self.pairs
    }

    /// Mutable pairs in document order
    pub fn pairs_mut(&mut self) -> &mut [StylePair] {
        &mut self.pairs
    }
}

/// Either kind of style selector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StyleSelector {
    /// `Style`
    Style(Style),
    /// `StyleMap`
    StyleMap(StyleMap),
}

impl StyleSelector {
    /// Element id of the selector
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Style(s) => s.id.as_deref(),
            Self::StyleMap(m) => m.id.as_deref(),
        }
    }
}
