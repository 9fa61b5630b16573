// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inline formatting attributes.

use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;

use peniko::Color;

/// A single inline formatting attribute.
///
/// This is a flat tagged variant rather than a trait hierarchy: the interval
/// tree shifting logic in [`FormatLayer`](crate::FormatLayer) only looks at
/// ranges and [`AttributeKind`], so adding a new attribute kind never touches
/// it.
#[derive(Clone, Debug, PartialEq)]
pub enum Attribute {
    /// Bold weight.
    Bold,
    /// Italic style.
    Italic,
    /// Underline decoration.
    Underline,
    /// Strikethrough decoration.
    Strikethrough,
    /// Font family override.
    FontFamily(String),
    /// Font size override, in pixels.
    FontSize(f64),
    /// Foreground color override.
    Color(Color),
    /// Background color override.
    Background(Color),
    /// An attribute this version does not interpret, preserved verbatim
    /// so documents from newer tools round-trip intact.
    Custom {
        /// Attribute name as written in the source document.
        name: String,
        /// Attribute value, unparsed.
        value: String,
    },
}

impl Attribute {
    /// The discriminant for this attribute.
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Bold => AttributeKind::Bold,
            Self::Italic => AttributeKind::Italic,
            Self::Underline => AttributeKind::Underline,
            Self::Strikethrough => AttributeKind::Strikethrough,
            Self::FontFamily(_) => AttributeKind::FontFamily,
            Self::FontSize(_) => AttributeKind::FontSize,
            Self::Color(_) => AttributeKind::Color,
            Self::Background(_) => AttributeKind::Background,
            Self::Custom { .. } => AttributeKind::Custom,
        }
    }
}

/// The kind of an [`Attribute`], independent of its value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Bold weight.
    Bold,
    /// Italic style.
    Italic,
    /// Underline decoration.
    Underline,
    /// Strikethrough decoration.
    Strikethrough,
    /// Font family override.
    FontFamily,
    /// Font size override.
    FontSize,
    /// Foreground color override.
    Color,
    /// Background color override.
    Background,
    /// An uninterpreted attribute carried through for round trips.
    Custom,
}

/// A half-open byte range `[start, end)` carrying one attribute.
///
/// Ranges may overlap (several attributes active at one position); the
/// format layer never stores the same attribute twice over the same
/// interval.
#[derive(Clone, Debug, PartialEq)]
pub struct FormatRange {
    /// The covered byte range in document-global offsets.
    pub range: Range<usize>,
    /// The attribute applied over the range.
    pub attr: Attribute,
}

impl FormatRange {
    /// Create a format range.
    pub fn new(range: Range<usize>, attr: Attribute) -> Self {
        Self { range, attr }
    }

    /// Returns `true` if the range covers no text.
    pub fn is_empty(&self) -> bool {
        self.range.start >= self.range.end
    }

    /// Returns `true` if `position` falls inside the range.
    pub fn contains(&self, position: usize) -> bool {
        self.range.start <= position && position < self.range.end
    }

    /// Returns `true` if the range overlaps `[start, end)`.
    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        self.range.start < end && self.range.end > start
    }
}

/// The merged visual style over one run of text.
///
/// Built by folding all attributes active over a run; value attributes later
/// in the fold win, matching the original merge order (most recently applied
/// range on top).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStyle {
    /// Bold weight.
    pub bold: bool,
    /// Italic style.
    pub italic: bool,
    /// Underline decoration.
    pub underline: bool,
    /// Strikethrough decoration.
    pub strikethrough: bool,
    /// Font family override, if any.
    pub font_family: Option<String>,
    /// Font size override in pixels, if any.
    pub font_size: Option<f64>,
    /// Foreground color override, if any.
    pub color: Option<Color>,
    /// Background color override, if any.
    pub background: Option<Color>,
    /// Uninterpreted attributes active over the run, in application order
    /// with later values winning per name.
    pub custom: Vec<(String, String)>,
}

impl RunStyle {
    /// Fold one attribute into the style.
    pub fn apply(&mut self, attr: &Attribute) {
        match attr {
            Attribute::Bold => self.bold = true,
            Attribute::Italic => self.italic = true,
            Attribute::Underline => self.underline = true,
            Attribute::Strikethrough => self.strikethrough = true,
            Attribute::FontFamily(family) => self.font_family = Some(family.clone()),
            Attribute::FontSize(size) => self.font_size = Some(*size),
            Attribute::Color(color) => self.color = Some(*color),
            Attribute::Background(color) => self.background = Some(*color),
            Attribute::Custom { name, value } => {
                if let Some(slot) = self.custom.iter_mut().find(|(n, _)| n == name) {
                    slot.1 = value.clone();
                } else {
                    self.custom.push((name.clone(), value.clone()));
                }
            }
        }
    }

    /// Build a style by folding `attrs` in order.
    pub fn from_attrs<'a>(attrs: impl IntoIterator<Item = &'a Attribute>) -> Self {
        let mut style = Self::default();
        for attr in attrs {
            style.apply(attr);
        }
        style
    }

    /// Returns `true` if no attribute is active.
    pub fn is_plain(&self) -> bool {
        *self == Self::default()
    }
}
