// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-paragraph line layout.

use core::ops::Range;

use folio_document::{FormatLayer, RunStyle};
use smallvec::SmallVec;

/// The default font size assumed when no [`FontSize`](folio_document::Attribute::FontSize)
/// attribute is active.
pub const DEFAULT_FONT_SIZE: f64 = 16.0;

/// Text measurement, abstracted so layout can run against a real shaping
/// stack or against fixed metrics in tests and headless tools.
///
/// All measurements are in pixels.
pub trait TextMetrics {
    /// The line height for text in `style`.
    fn line_height(&self, style: &RunStyle) -> f64;

    /// The horizontal advance of `ch` in `style`.
    fn advance(&self, ch: char, style: &RunStyle) -> f64;

    /// The advance of a typical character in the default style, used for
    /// paragraph height estimation before real layout runs.
    fn average_advance(&self) -> f64 {
        self.advance('n', &RunStyle::default())
    }
}

/// Fixed-advance metrics: every character is the same width at a given font
/// size, scaled linearly by [`FontSize`](folio_document::Attribute::FontSize)
/// overrides. Tabs count as four advances, other control characters as zero.
#[derive(Clone, Copy, Debug)]
pub struct FixedMetrics {
    line_height: f64,
    advance: f64,
}

impl FixedMetrics {
    /// Metrics with the given line height and per-character advance at the
    /// default font size.
    pub fn new(line_height: f64, advance: f64) -> Self {
        Self {
            line_height,
            advance,
        }
    }

    fn scale(style: &RunStyle) -> f64 {
        style.font_size.map_or(1.0, |size| size / DEFAULT_FONT_SIZE)
    }
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self::new(18.0, 8.0)
    }
}

impl TextMetrics for FixedMetrics {
    fn line_height(&self, style: &RunStyle) -> f64 {
        self.line_height * Self::scale(style)
    }

    fn advance(&self, ch: char, style: &RunStyle) -> f64 {
        let base = match ch {
            '\t' => self.advance * 4.0,
            c if c.is_control() => 0.0,
            _ => self.advance,
        };
        base * Self::scale(style)
    }
}

/// One laid-out line within a paragraph.
#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    /// Byte range of the line's text, local to the paragraph.
    pub range: Range<usize>,
    /// Top of the line, relative to the paragraph top.
    pub y: f64,
    /// Line height in pixels.
    pub height: f64,
    /// Advance width of the line's text.
    pub width: f64,
}

/// The laid-out shape of one paragraph: its lines and the resulting exact
/// height.
#[derive(Clone, Debug, PartialEq)]
pub struct ParagraphLayout {
    /// The wrapped lines, top to bottom. Never empty: an empty paragraph
    /// lays out as one empty line.
    pub lines: SmallVec<[Line; 4]>,
    /// Total paragraph height.
    pub height: f64,
    /// Width of the widest line.
    pub width: f64,
}

impl ParagraphLayout {
    /// The index of the line containing `y` (paragraph-relative), clamped
    /// to the last line.
    pub fn line_at_y(&self, y: f64) -> usize {
        for (i, line) in self.lines.iter().enumerate() {
            if y < line.y + line.height {
                return i;
            }
        }
        self.lines.len() - 1
    }

    /// The index of the line whose byte range contains `offset`
    /// (paragraph-local), clamped to the last line.
    pub fn line_at_offset(&self, offset: usize) -> usize {
        for (i, line) in self.lines.iter().enumerate() {
            if offset < line.range.end {
                return i;
            }
        }
        self.lines.len() - 1
    }
}

/// Lay out one paragraph with greedy word wrapping.
///
/// `text` is the paragraph's text, `para_offset` its document-global start
/// offset (formatting lives in global offsets), and `max_width` the wrap
/// width in pixels. A `max_width` of zero or less disables wrapping.
///
/// Wrapping is greedy: a line breaks at the last space that fits; a single
/// word wider than `max_width` is broken mid-word rather than overflowing.
pub fn layout_paragraph(
    text: &str,
    para_offset: usize,
    format: &FormatLayer,
    metrics: &dyn TextMetrics,
    max_width: f64,
) -> ParagraphLayout {
    let mut lines: SmallVec<[Line; 4]> = SmallVec::new();
    let default_height = metrics.line_height(&RunStyle::default());

    let mut line_start = 0;
    let mut line_width = 0.0_f64;
    let mut line_height = 0.0_f64;
    // Position and accumulated width of the last break opportunity.
    let mut break_at: Option<(usize, f64)> = None;

    let mut chars = text.char_indices().peekable();
    while let Some((pos, ch)) = chars.next() {
        let style = format.merged_style_at(para_offset + pos);
        let advance = metrics.advance(ch, &style);
        let ch_height = metrics.line_height(&style);
        let ch_end = pos + ch.len_utf8();

        let wraps = max_width > 0.0
            && line_width + advance > max_width
            && pos > line_start;
        if wraps {
            let (split, split_width) = match break_at {
                // Break after the last space; it stays on the ended line.
                Some((at, width)) if at > line_start => (at, width),
                _ => (pos, line_width),
            };
            let y = lines.last().map_or(0.0, |l: &Line| l.y + l.height);
            lines.push(Line {
                range: line_start..split,
                y,
                height: line_height.max(default_height),
                width: split_width,
            });
            line_start = split;
            // Re-measure the carried-over tail of the broken line.
            line_width = measure(text, line_start..pos, para_offset, format, metrics);
            line_height = 0.0;
            break_at = None;
        }

        line_width += advance;
        line_height = line_height.max(ch_height);
        if ch == ' ' || ch == '\t' {
            break_at = Some((ch_end, line_width));
        }
    }

    let y = lines.last().map_or(0.0, |l| l.y + l.height);
    lines.push(Line {
        range: line_start..text.len(),
        y,
        height: line_height.max(default_height),
        width: line_width,
    });

    let height = lines.iter().map(|l| l.height).sum();
    let width = lines.iter().map(|l| l.width).fold(0.0, f64::max);
    ParagraphLayout {
        lines,
        height,
        width,
    }
}

fn measure(
    text: &str,
    range: Range<usize>,
    para_offset: usize,
    format: &FormatLayer,
    metrics: &dyn TextMetrics,
) -> f64 {
    text[range.clone()]
        .char_indices()
        .map(|(i, ch)| {
            let style = format.merged_style_at(para_offset + range.start + i);
            metrics.advance(ch, &style)
        })
        .sum()
}

/// Map a paragraph-relative point to a paragraph-local byte offset: the
/// boundary nearest to `x` on the line containing `y`.
pub fn hit_test(
    layout: &ParagraphLayout,
    text: &str,
    para_offset: usize,
    format: &FormatLayer,
    metrics: &dyn TextMetrics,
    x: f64,
    y: f64,
) -> usize {
    let line = &layout.lines[layout.line_at_y(y)];
    let mut cursor = 0.0_f64;
    for (i, ch) in text[line.range.clone()].char_indices() {
        let pos = line.range.start + i;
        let style = format.merged_style_at(para_offset + pos);
        let advance = metrics.advance(ch, &style);
        if x < cursor + advance / 2.0 {
            return pos;
        }
        cursor += advance;
    }
    line.range.end
}

/// The x position of a paragraph-local byte offset on its line, relative to
/// the paragraph's left edge.
pub fn offset_x(
    layout: &ParagraphLayout,
    text: &str,
    para_offset: usize,
    format: &FormatLayer,
    metrics: &dyn TextMetrics,
    offset: usize,
) -> f64 {
    let line = &layout.lines[layout.line_at_offset(offset)];
    let clamped = offset.clamp(line.range.start, line.range.end);
    measure(text, line.range.start..clamped, para_offset, format, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_document::Attribute;

    fn metrics() -> FixedMetrics {
        FixedMetrics::new(10.0, 5.0)
    }

    #[test]
    fn empty_paragraph_is_one_line() {
        let format = FormatLayer::new();
        let layout = layout_paragraph("", 0, &format, &metrics(), 100.0);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.lines[0].range, 0..0);
        assert_eq!(layout.height, 10.0);
        assert_eq!(layout.width, 0.0);
    }

    #[test]
    fn short_text_stays_on_one_line() {
        let format = FormatLayer::new();
        let layout = layout_paragraph("hello", 0, &format, &metrics(), 100.0);
        assert_eq!(layout.lines.len(), 1);
        assert_eq!(layout.width, 25.0);
        assert_eq!(layout.height, 10.0);
    }

    #[test]
    fn wraps_at_word_boundary() {
        let format = FormatLayer::new();
        // 5px per char, 40px wide -> 8 chars per line.
        let layout = layout_paragraph("one two three", 0, &format, &metrics(), 40.0);
        let texts: Vec<&str> = layout
            .lines
            .iter()
            .map(|l| &"one two three"[l.range.clone()])
            .collect();
        assert_eq!(texts, ["one two ", "three"]);
        assert_eq!(layout.height, 20.0);
        assert_eq!(layout.lines[1].y, 10.0);
    }

    #[test]
    fn long_word_breaks_mid_word() {
        let format = FormatLayer::new();
        let layout = layout_paragraph("abcdefghij", 0, &format, &metrics(), 20.0);
        // 4 chars fit per line.
        assert_eq!(layout.lines.len(), 3);
        assert_eq!(layout.lines[0].range, 0..4);
        assert_eq!(layout.lines[1].range, 4..8);
        assert_eq!(layout.lines[2].range, 8..10);
    }

    #[test]
    fn font_size_raises_line_height() {
        let mut format = FormatLayer::new();
        format.add_format(0, 5, Attribute::FontSize(32.0)).unwrap();
        let layout = layout_paragraph("hello world", 0, &format, &metrics(), 0.0);
        assert_eq!(layout.lines.len(), 1);
        // 32px text at 16px default doubles the 10px line height.
        assert_eq!(layout.lines[0].height, 20.0);
        // And widens the first five characters.
        assert_eq!(layout.width, 5.0 * 10.0 + 6.0 * 5.0);
    }

    #[test]
    fn format_offsets_are_document_global() {
        let mut format = FormatLayer::new();
        format.add_format(100, 105, Attribute::FontSize(32.0)).unwrap();
        let local = layout_paragraph("hello", 0, &format, &metrics(), 0.0);
        let global = layout_paragraph("hello", 100, &format, &metrics(), 0.0);
        assert_eq!(local.width, 25.0);
        assert_eq!(global.width, 50.0);
    }

    #[test]
    fn hit_test_rounds_to_nearest_boundary() {
        let format = FormatLayer::new();
        let layout = layout_paragraph("abcd", 0, &format, &metrics(), 0.0);
        let m = metrics();
        assert_eq!(hit_test(&layout, "abcd", 0, &format, &m, 0.0, 5.0), 0);
        assert_eq!(hit_test(&layout, "abcd", 0, &format, &m, 2.0, 5.0), 0);
        // Past the midpoint of 'a'.
        assert_eq!(hit_test(&layout, "abcd", 0, &format, &m, 3.0, 5.0), 1);
        assert_eq!(hit_test(&layout, "abcd", 0, &format, &m, 99.0, 5.0), 4);
    }

    #[test]
    fn hit_test_second_line() {
        let format = FormatLayer::new();
        let text = "one two three";
        let layout = layout_paragraph(text, 0, &format, &metrics(), 40.0);
        let m = metrics();
        // y = 15 falls on the second line ("three").
        assert_eq!(hit_test(&layout, text, 0, &format, &m, 0.0, 15.0), 8);
        assert_eq!(hit_test(&layout, text, 0, &format, &m, 12.0, 15.0), 10);
    }

    #[test]
    fn offset_x_round_trip() {
        let format = FormatLayer::new();
        let text = "one two three";
        let layout = layout_paragraph(text, 0, &format, &metrics(), 40.0);
        let m = metrics();
        assert_eq!(offset_x(&layout, text, 0, &format, &m, 0), 0.0);
        assert_eq!(offset_x(&layout, text, 0, &format, &m, 3), 15.0);
        // Start of the second line.
        assert_eq!(offset_x(&layout, text, 0, &format, &m, 8), 0.0);
        assert_eq!(offset_x(&layout, text, 0, &format, &m, 10), 10.0);
    }
}
