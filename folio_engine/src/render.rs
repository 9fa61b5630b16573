// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Incremental painting: dirty regions, selection, and the paint pass.

use folio_document::{
    AnnotationLayer, AnnotationPayload, DocumentBuffer, FormatLayer, RunStyle,
};
use kurbo::{Point, Rect, Size};
use peniko::Color;

use crate::cache::LayoutCache;
use crate::layout::{self, TextMetrics};
use crate::viewport::ViewportManager;

/// A caret position: a paragraph index plus a byte offset local to that
/// paragraph.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Position {
    /// Paragraph index.
    pub paragraph: usize,
    /// Byte offset within the paragraph's text.
    pub offset: usize,
}

impl Position {
    /// A position at the start of `paragraph`.
    pub fn paragraph_start(paragraph: usize) -> Self {
        Self {
            paragraph,
            offset: 0,
        }
    }
}

/// A selection as an anchor/focus pair. The focus is the end that moves
/// with the cursor; anchor and focus coincide for a caret.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Selection {
    /// The fixed end of the selection.
    pub anchor: Position,
    /// The moving end of the selection, where the caret is drawn.
    pub focus: Position,
}

impl Selection {
    /// A caret at `position`.
    pub fn caret(position: Position) -> Self {
        Self {
            anchor: position,
            focus: position,
        }
    }

    /// Returns `true` if nothing is selected.
    pub fn is_caret(&self) -> bool {
        self.anchor == self.focus
    }

    /// The selection endpoints in document order.
    pub fn ordered(&self) -> (Position, Position) {
        if self.anchor <= self.focus {
            (self.anchor, self.focus)
        } else {
            (self.focus, self.anchor)
        }
    }
}

/// Accumulated screen rectangles needing repaint.
///
/// Overlapping and touching rectangles are coalesced as they arrive, so a
/// burst of edits to one paragraph stays one rectangle. A full invalidation
/// collapses the set to a single flag.
#[derive(Clone, Debug, Default)]
pub struct DirtyRegion {
    rects: Vec<Rect>,
    all: bool,
}

impl DirtyRegion {
    /// An empty region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing needs repainting.
    pub fn is_empty(&self) -> bool {
        !self.all && self.rects.is_empty()
    }

    /// Returns `true` if everything needs repainting.
    pub fn is_all(&self) -> bool {
        self.all
    }

    /// Add one rectangle, merging it with any rectangle it touches.
    pub fn add(&mut self, rect: Rect) {
        if self.all || rect.is_zero_area() {
            return;
        }
        let mut merged = rect;
        // Merging can make the grown rectangle touch earlier ones, so keep
        // folding until nothing intersects.
        loop {
            let mut grew = false;
            self.rects.retain(|existing| {
                if touches(*existing, merged) {
                    merged = merged.union(*existing);
                    grew = true;
                    false
                } else {
                    true
                }
            });
            if !grew {
                break;
            }
        }
        self.rects.push(merged);
    }

    /// Mark everything dirty.
    pub fn mark_all(&mut self) {
        self.all = true;
        self.rects.clear();
    }

    /// The rectangles to repaint, given the current viewport size; empties
    /// the region.
    pub fn take(&mut self, viewport: Size) -> Vec<Rect> {
        if self.all {
            self.all = false;
            self.rects.clear();
            return vec![viewport.to_rect()];
        }
        core::mem::take(&mut self.rects)
    }
}

fn touches(a: Rect, b: Rect) -> bool {
    a.x0 <= b.x1 && b.x0 <= a.x1 && a.y0 <= b.y1 && b.y0 <= a.y1
}

/// Colors and spacing for painting.
#[derive(Clone, Debug)]
pub struct Appearance {
    /// Page background.
    pub background: Color,
    /// Default text color when no [`Color`](folio_document::Attribute::Color)
    /// attribute is active.
    pub text: Color,
    /// Selection highlight fill.
    pub selection: Color,
    /// Caret color.
    pub cursor: Color,
    /// Highlight behind commented text.
    pub comment: Color,
    /// Highlight behind task-marked text.
    pub todo: Color,
    /// Footnote anchor marker color.
    pub footnote: Color,
    /// Left and right text margin in pixels.
    pub margin: f64,
    /// Caret width in pixels.
    pub cursor_width: f64,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            background: Color::WHITE,
            text: Color::BLACK,
            selection: Color::from_rgba8(0x33, 0x66, 0xcc, 0x55),
            cursor: Color::BLACK,
            comment: Color::from_rgba8(0xff, 0xe0, 0x66, 0x66),
            todo: Color::from_rgba8(0x66, 0xcc, 0x66, 0x55),
            footnote: Color::from_rgb8(0x88, 0x55, 0xcc),
            margin: 16.0,
            cursor_width: 1.0,
        }
    }
}

/// The paint backend: the engine describes what to draw through this trait
/// and stays independent of the actual graphics stack.
///
/// All coordinates are in viewport space (already scrolled).
pub trait PaintSurface {
    /// Fill a rectangle.
    fn fill_rect(&mut self, rect: Rect, color: Color);

    /// Draw one run of text with its top-left corner at `origin`.
    fn draw_text(&mut self, origin: Point, text: &str, style: &RunStyle, color: Color);

    /// Stroke a line.
    fn draw_line(&mut self, from: Point, to: Point, color: Color, width: f64);
}

/// Owns the per-frame drawing state: the selection, caret blink phase, and
/// the dirty region accumulating between paints.
#[derive(Debug)]
pub struct RenderEngine {
    appearance: Appearance,
    dirty: DirtyRegion,
    selection: Selection,
    cursor_visible: bool,
    // Viewport-space caret rectangle from the last paint, for blinking.
    cursor_rect: Rect,
}

impl RenderEngine {
    /// Create a render engine with the given appearance.
    pub fn new(appearance: Appearance) -> Self {
        Self {
            appearance,
            dirty: DirtyRegion::new(),
            selection: Selection::default(),
            cursor_visible: true,
            cursor_rect: Rect::ZERO,
        }
    }

    /// The current appearance.
    pub fn appearance(&self) -> &Appearance {
        &self.appearance
    }

    /// Replace the appearance. Everything becomes dirty.
    pub fn set_appearance(&mut self, appearance: Appearance) {
        self.appearance = appearance;
        self.dirty.mark_all();
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Move the selection, dirtying the old and new caret areas. The host
    /// dirties selected paragraphs through the document engine, which knows
    /// their geometry.
    pub fn set_selection(&mut self, selection: Selection) {
        if selection == self.selection {
            return;
        }
        self.selection = selection;
        self.cursor_visible = true;
        self.dirty.add(self.cursor_rect);
    }

    /// Toggle the caret blink phase. Only the caret rectangle is dirtied,
    /// so a blink never repaints text.
    pub fn blink_tick(&mut self) {
        self.cursor_visible = !self.cursor_visible;
        self.dirty.add(self.cursor_rect);
    }

    /// The viewport-space caret rectangle from the last paint.
    /// [`Rect::ZERO`] until a paint has placed the caret.
    pub fn cursor_rect(&self) -> Rect {
        self.cursor_rect
    }

    /// Whether the caret is currently in its visible blink phase.
    pub fn cursor_visible(&self) -> bool {
        self.cursor_visible
    }

    /// Reset the blink phase to visible, as hosts do on every edit.
    pub fn reset_blink(&mut self) {
        if !self.cursor_visible {
            self.cursor_visible = true;
            self.dirty.add(self.cursor_rect);
        }
    }

    /// Access the accumulated dirty region.
    pub fn dirty(&self) -> &DirtyRegion {
        &self.dirty
    }

    /// Add a viewport-space rectangle to the dirty region.
    pub fn add_dirty(&mut self, rect: Rect) {
        self.dirty.add(rect);
    }

    /// Mark the whole viewport dirty.
    pub fn mark_all_dirty(&mut self) {
        self.dirty.mark_all();
    }

    /// Take the rectangles to repaint, clearing the region.
    pub fn take_dirty(&mut self, viewport: Size) -> Vec<Rect> {
        self.dirty.take(viewport)
    }

    /// Paint the part of the document inside `clip` to `surface`.
    ///
    /// `clip` is in viewport space; paragraphs whose strip misses it are
    /// skipped entirely, so painting the union of the dirty rectangles
    /// touches only dirty paragraphs. A redrawn paragraph is painted in
    /// full — hosts that need pixel-exact clipping apply `clip` on the
    /// surface.
    ///
    /// Paragraph layouts are pulled from `cache`, computing any the
    /// viewport needs that are missing. The caller is expected to have
    /// reconciled buffer heights beforehand so `paragraph_y` agrees with
    /// the cached layouts.
    pub fn paint(
        &mut self,
        surface: &mut dyn PaintSurface,
        clip: Rect,
        buffer: &DocumentBuffer,
        formats: &FormatLayer,
        annotations: &AnnotationLayer,
        cache: &mut LayoutCache,
        viewport: &ViewportManager,
        metrics: &dyn TextMetrics,
    ) {
        let size = viewport.size();
        let clip = clip.intersect(size.to_rect());
        if clip.is_zero_area() {
            return;
        }
        let scroll_y = viewport.scroll_y();
        let margin = self.appearance.margin;
        let wrap_width = (size.width - 2.0 * margin).max(0.0);

        surface.fill_rect(clip, self.appearance.background);

        let (sel_start, sel_end) = self.selection.ordered();
        let mut caret_rect = None;

        for index in viewport.visible_range(buffer) {
            let (Ok(text), Ok(para_offset), Ok(para_y), Ok(height)) = (
                buffer.paragraph_text(index),
                buffer.offset_of_paragraph(index),
                buffer.paragraph_y(index),
                buffer.paragraph_height(index),
            ) else {
                break;
            };
            let top = para_y - scroll_y;
            // Clean paragraphs outside the clip keep their pixels.
            if top >= clip.y1 || top + height <= clip.y0 {
                continue;
            }
            let layout = cache
                .get_or_compute(index, || {
                    layout::layout_paragraph(text, para_offset, formats, metrics, wrap_width)
                })
                .clone();

            // Annotation highlights go under the text.
            for entry in annotations.annotations_in_range(para_offset, para_offset + text.len() + 1)
            {
                let color = match entry.payload {
                    AnnotationPayload::Comment { .. } => self.appearance.comment,
                    AnnotationPayload::Todo { .. } => self.appearance.todo,
                    AnnotationPayload::Footnote { .. } => self.appearance.footnote,
                };
                let local_start = entry.range.start.saturating_sub(para_offset);
                let local_end = entry.range.end.saturating_sub(para_offset).min(text.len());
                if entry.is_collapsed() {
                    // Collapsed markers draw as a thin tick at their anchor.
                    let line = &layout.lines[layout.line_at_offset(local_start.min(text.len()))];
                    let x = margin
                        + layout::offset_x(
                            &layout,
                            text,
                            para_offset,
                            formats,
                            metrics,
                            local_start.min(text.len()),
                        );
                    surface.fill_rect(
                        Rect::new(x, top + line.y, x + 2.0, top + line.y + line.height),
                        color,
                    );
                } else {
                    self.fill_text_range(
                        surface,
                        &layout,
                        text,
                        para_offset,
                        formats,
                        metrics,
                        local_start,
                        local_end,
                        top,
                        color,
                    );
                }
            }

            // Selection highlight.
            if !self.selection.is_caret()
                && sel_start.paragraph <= index
                && index <= sel_end.paragraph
            {
                let from = if sel_start.paragraph == index {
                    sel_start.offset
                } else {
                    0
                };
                let to = if sel_end.paragraph == index {
                    sel_end.offset
                } else {
                    text.len()
                };
                self.fill_text_range(
                    surface,
                    &layout,
                    text,
                    para_offset,
                    formats,
                    metrics,
                    from,
                    to,
                    top,
                    self.appearance.selection,
                );
            }

            // Text, split per line into constant-style runs.
            for line in &layout.lines {
                let mut run_start = line.range.start;
                while run_start < line.range.end {
                    let style = formats.merged_style_at(para_offset + run_start);
                    let mut run_end = run_start;
                    while run_end < line.range.end {
                        let next = run_end
                            + text[run_end..]
                                .chars()
                                .next()
                                .map_or(1, char::len_utf8);
                        if formats.merged_style_at(para_offset + run_end) != style {
                            break;
                        }
                        run_end = next;
                    }
                    let x = margin
                        + layout::offset_x(&layout, text, para_offset, formats, metrics, run_start);
                    if let Some(background) = style.background {
                        let end_x = margin
                            + layout::offset_x(&layout, text, para_offset, formats, metrics, run_end);
                        surface.fill_rect(
                            Rect::new(x, top + line.y, end_x, top + line.y + line.height),
                            background,
                        );
                    }
                    let color = style.color.unwrap_or(self.appearance.text);
                    surface.draw_text(
                        Point::new(x, top + line.y),
                        &text[run_start..run_end],
                        &style,
                        color,
                    );
                    run_start = run_end;
                }
            }

            // Caret geometry while we have the layout at hand.
            if self.selection.focus.paragraph == index {
                let offset = self.selection.focus.offset.min(text.len());
                let line = &layout.lines[layout.line_at_offset(offset)];
                let x = margin
                    + layout::offset_x(&layout, text, para_offset, formats, metrics, offset);
                caret_rect = Some(Rect::new(
                    x,
                    top + line.y,
                    x + self.appearance.cursor_width,
                    top + line.y + line.height,
                ));
            }
        }

        // Only a visited focus paragraph refreshes the caret geometry; a
        // paint clipped away from the caret must not lose it.
        if let Some(rect) = caret_rect {
            self.cursor_rect = rect;
            if self.cursor_visible && rect.area() > 0.0 {
                surface.fill_rect(rect, self.appearance.cursor);
            }
        }
    }

    fn fill_text_range(
        &self,
        surface: &mut dyn PaintSurface,
        layout: &crate::layout::ParagraphLayout,
        text: &str,
        para_offset: usize,
        formats: &FormatLayer,
        metrics: &dyn TextMetrics,
        from: usize,
        to: usize,
        top: f64,
        color: Color,
    ) {
        let from = from.min(text.len());
        let to = to.min(text.len());
        if from >= to {
            return;
        }
        for line in &layout.lines {
            let start = from.max(line.range.start);
            let end = to.min(line.range.end);
            if start >= end {
                continue;
            }
            let x0 = self.appearance.margin
                + layout::offset_x(layout, text, para_offset, formats, metrics, start);
            let x1 = self.appearance.margin
                + layout::offset_x(layout, text, para_offset, formats, metrics, end);
            surface.fill_rect(
                Rect::new(x0, top + line.y, x1, top + line.y + line.height),
                color,
            );
        }
    }
}
