//! Selections and the ordered store that owns them.
//!
//! A selection is immutable once stored: every edit builds a replacement
//! value and swaps it in. Identity is the [`SelectionId`] handed out on
//! insertion; the position in the store is only used for "Area #N" labels.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FontSizeError, SelectionError};
use crate::geometry::Rect;

pub const DEFAULT_FONT_SIZE: &str = "16px";
pub const DEFAULT_BACKGROUND: &str = "#ffffff";
pub const DEFAULT_TEXT_COLOR: &str = "#000000";

/// Opaque, never-reused identifier assigned by [`SelectionStore::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SelectionId(u64);

impl fmt::Display for SelectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl TextAlign {
    pub fn as_css(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
            TextAlign::Justify => "justify",
        }
    }
}

impl FromStr for TextAlign {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(TextAlign::Left),
            "center" => Ok(TextAlign::Center),
            "right" => Ok(TextAlign::Right),
            "justify" => Ok(TextAlign::Justify),
            other => Err(format!("unknown text alignment: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontUnit {
    Px,
    Em,
    Rem,
}

impl FontUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontUnit::Px => "px",
            FontUnit::Em => "em",
            FontUnit::Rem => "rem",
        }
    }
}

/// Parsed `font_size`: a non-negative decimal followed by a unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSize {
    pub value: f64,
    pub unit: FontUnit,
}

impl FontSize {
    /// Cell height for a replacement block: one line at 1.2 line-height.
    pub fn line_height(&self) -> FontSize {
        FontSize {
            value: self.value * 1.2,
            unit: self.unit,
        }
    }
}

impl fmt::Display for FontSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factor = 10_000.0;
        let value = (self.value * factor).round() / factor;
        write!(f, "{}{}", value, self.unit.as_str())
    }
}

impl FromStr for FontSize {
    type Err = FontSizeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || FontSizeError {
            value: raw.to_string(),
        };
        let s = raw.trim();
        // "rem" before "em", the latter is a suffix of the former
        let (number, unit) = if let Some(n) = s.strip_suffix("rem") {
            (n, FontUnit::Rem)
        } else if let Some(n) = s.strip_suffix("em") {
            (n, FontUnit::Em)
        } else if let Some(n) = s.strip_suffix("px") {
            (n, FontUnit::Px)
        } else {
            return Err(err());
        };

        let mut parts = number.split('.');
        let int_part = parts.next().unwrap_or_default();
        let frac_part = parts.next();
        if parts.next().is_some()
            || int_part.is_empty()
            || !int_part.bytes().all(|b| b.is_ascii_digit())
            || frac_part.is_some_and(|f| f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()))
        {
            return Err(err());
        }
        let value = number.parse::<f64>().map_err(|_| err())?;
        Ok(FontSize { value, unit })
    }
}

/// Kind-specific payload of a selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SelectionContent {
    Link {
        #[serde(default)]
        url: String,
    },
    Replace {
        #[serde(default)]
        text: String,
        #[serde(default, alias = "textAlign")]
        text_align: TextAlign,
        #[serde(default = "default_font_size", alias = "fontSize")]
        font_size: String,
        #[serde(default = "default_background", alias = "backgroundColor")]
        background_color: String,
        #[serde(default = "default_text_color", alias = "textColor", alias = "color")]
        text_color: String,
    },
}

fn default_font_size() -> String {
    DEFAULT_FONT_SIZE.to_string()
}

fn default_background() -> String {
    DEFAULT_BACKGROUND.to_string()
}

fn default_text_color() -> String {
    DEFAULT_TEXT_COLOR.to_string()
}

impl SelectionContent {
    pub fn empty_link() -> Self {
        SelectionContent::Link { url: String::new() }
    }

    pub fn blank_replace() -> Self {
        SelectionContent::Replace {
            text: String::new(),
            text_align: TextAlign::default(),
            font_size: default_font_size(),
            background_color: default_background(),
            text_color: default_text_color(),
        }
    }

    pub fn for_kind(kind: SelectionKind) -> Self {
        match kind {
            SelectionKind::Link => Self::empty_link(),
            SelectionKind::Replace => Self::blank_replace(),
        }
    }

    pub fn kind(&self) -> SelectionKind {
        match self {
            SelectionContent::Link { .. } => SelectionKind::Link,
            SelectionContent::Replace { .. } => SelectionKind::Replace,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SelectionKind {
    Link,
    Replace,
}

impl SelectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionKind::Link => "link",
            SelectionKind::Replace => "replace",
        }
    }
}

/// Serialized form of a selection: rectangle plus payload, no identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    #[serde(flatten)]
    pub rect: Rect,
    #[serde(flatten)]
    pub content: SelectionContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    id: SelectionId,
    rect: Rect,
    content: SelectionContent,
}

impl Selection {
    pub fn id(&self) -> SelectionId {
        self.id
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn content(&self) -> &SelectionContent {
        &self.content
    }

    pub fn kind(&self) -> SelectionKind {
        self.content.kind()
    }

    /// Non-empty link target, if any.
    pub fn link_url(&self) -> Option<&str> {
        match &self.content {
            SelectionContent::Link { url } if !url.trim().is_empty() => Some(url.as_str()),
            _ => None,
        }
    }

    pub fn to_record(&self) -> SelectionRecord {
        SelectionRecord {
            rect: self.rect,
            content: self.content.clone(),
        }
    }

    /// Build the replacement for this selection after `edit`.
    pub fn edited(&self, edit: &SelectionEdit) -> Result<Selection, SelectionError> {
        let mut rect = self.rect;
        let mut content = self.content.clone();
        let kind = self.kind().as_str();

        match (edit, &mut content) {
            (SelectionEdit::X(v), _) => rect.x = *v,
            (SelectionEdit::Y(v), _) => rect.y = *v,
            (SelectionEdit::Width(v), _) => rect.width = *v,
            (SelectionEdit::Height(v), _) => rect.height = *v,
            (SelectionEdit::Rect(r), _) => rect = *r,
            (SelectionEdit::Url(v), SelectionContent::Link { url }) => *url = v.clone(),
            (SelectionEdit::Text(v), SelectionContent::Replace { text, .. }) => *text = v.clone(),
            (SelectionEdit::TextAlign(v), SelectionContent::Replace { text_align, .. }) => {
                *text_align = *v
            }
            (SelectionEdit::FontSize(v), SelectionContent::Replace { font_size, .. }) => {
                v.parse::<FontSize>()?;
                *font_size = v.trim().to_string();
            }
            (
                SelectionEdit::BackgroundColor(v),
                SelectionContent::Replace {
                    background_color, ..
                },
            ) => *background_color = v.clone(),
            (SelectionEdit::TextColor(v), SelectionContent::Replace { text_color, .. }) => {
                *text_color = v.clone()
            }
            (edit, _) => {
                return Err(SelectionError::KindMismatch {
                    field: edit.field_name(),
                    kind,
                })
            }
        }

        if !rect.has_area() {
            return Err(SelectionError::NonPositiveSize {
                width: rect.width,
                height: rect.height,
            });
        }

        Ok(Selection {
            id: self.id,
            rect,
            content,
        })
    }
}

/// Label shown for the selection at 0-based `position`.
pub fn display_label(position: usize, sel: &Selection) -> String {
    let prefix = match sel.content() {
        SelectionContent::Link { .. } if sel.link_url().is_some() => "Link Area",
        SelectionContent::Link { .. } => "Area",
        SelectionContent::Replace { .. } => "Text Area",
    };
    format!("{prefix} #{}", position + 1)
}

/// One typed field update.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEdit {
    X(i32),
    Y(i32),
    Width(i32),
    Height(i32),
    Rect(Rect),
    Url(String),
    Text(String),
    TextAlign(TextAlign),
    FontSize(String),
    BackgroundColor(String),
    TextColor(String),
}

impl SelectionEdit {
    pub fn field_name(&self) -> &'static str {
        match self {
            SelectionEdit::X(_) => "x",
            SelectionEdit::Y(_) => "y",
            SelectionEdit::Width(_) => "width",
            SelectionEdit::Height(_) => "height",
            SelectionEdit::Rect(_) => "rect",
            SelectionEdit::Url(_) => "url",
            SelectionEdit::Text(_) => "text",
            SelectionEdit::TextAlign(_) => "text_align",
            SelectionEdit::FontSize(_) => "font_size",
            SelectionEdit::BackgroundColor(_) => "background_color",
            SelectionEdit::TextColor(_) => "text_color",
        }
    }

    /// Parse a `field`/`value` pair as typed in an edit form. Numeric fields
    /// that do not parse yield `None`, matching an input box that is ignored
    /// until it holds a number.
    pub fn parse(field: &str, value: &str) -> Option<SelectionEdit> {
        let int = || value.trim().parse::<i32>().ok();
        match field {
            "x" => int().map(SelectionEdit::X),
            "y" => int().map(SelectionEdit::Y),
            "width" => int().map(SelectionEdit::Width),
            "height" => int().map(SelectionEdit::Height),
            "url" => Some(SelectionEdit::Url(value.to_string())),
            "text" => Some(SelectionEdit::Text(value.to_string())),
            "text_align" | "textAlign" => value.parse().ok().map(SelectionEdit::TextAlign),
            "font_size" | "fontSize" => Some(SelectionEdit::FontSize(value.to_string())),
            "background_color" | "backgroundColor" => {
                Some(SelectionEdit::BackgroundColor(value.to_string()))
            }
            "text_color" | "textColor" | "color" => Some(SelectionEdit::TextColor(value.to_string())),
            _ => None,
        }
    }
}

/// Ordered collection of selections; order is creation order.
#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    items: Vec<Selection>,
    next_id: u64,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load records in order, skipping any without positive area.
    pub fn from_records(records: impl IntoIterator<Item = SelectionRecord>) -> Self {
        let mut store = Self::new();
        for (idx, record) in records.into_iter().enumerate() {
            if let Err(err) = store.add(record.rect, record.content) {
                warn!("skipping selection {}: {err}", idx + 1);
            }
        }
        store
    }

    pub fn add(
        &mut self,
        rect: Rect,
        content: SelectionContent,
    ) -> Result<SelectionId, SelectionError> {
        if !rect.has_area() {
            return Err(SelectionError::NonPositiveSize {
                width: rect.width,
                height: rect.height,
            });
        }
        self.next_id += 1;
        let id = SelectionId(self.next_id);
        self.items.push(Selection { id, rect, content });
        Ok(id)
    }

    /// Apply `edit` to the selection `id`. Returns `Ok(false)` when `id` is
    /// no longer in the store.
    pub fn update(&mut self, id: SelectionId, edit: &SelectionEdit) -> Result<bool, SelectionError> {
        let Some(slot) = self.items.iter_mut().find(|s| s.id == id) else {
            return Ok(false);
        };
        *slot = slot.edited(edit)?;
        Ok(true)
    }

    pub fn delete(&mut self, id: SelectionId) -> Option<Selection> {
        let pos = self.position(id)?;
        Some(self.items.remove(pos))
    }

    /// Drop every selection, e.g. when the source image is replaced.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn get(&self, id: SelectionId) -> Option<&Selection> {
        self.items.iter().find(|s| s.id == id)
    }

    pub fn position(&self, id: SelectionId) -> Option<usize> {
        self.items.iter().position(|s| s.id == id)
    }

    pub fn id_at(&self, index: usize) -> Option<SelectionId> {
        self.items.get(index).map(|s| s.id)
    }

    /// "Area #N" style label using the current 1-based position.
    pub fn label(&self, id: SelectionId) -> Option<String> {
        let pos = self.position(id)?;
        Some(display_label(pos, &self.items[pos]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Selection> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[Selection] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Owned copy for a slice run that must not observe later edits.
    pub fn snapshot(&self) -> Vec<Selection> {
        self.items.clone()
    }

    pub fn records(&self) -> Vec<SelectionRecord> {
        self.items.iter().map(Selection::to_record).collect()
    }
}
