// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The editing facade: one object owning the buffer, layers, cache,
//! viewport, and render state, keeping them consistent through every edit.

use folio_document::{
    AnnotationId, AnnotationLayer, Attribute, AttributeKind, DocumentBuffer, Error, FormatLayer,
    FormatRange, HeightState, RunStyle, StructuralChange,
};
use kurbo::{Point, Rect, Size};

use crate::cache::{CacheStats, LayoutCache};
use crate::layout::{self, TextMetrics};
use crate::markup::{parse_markup, serialize_markup, MarkupError};
use crate::render::{Appearance, PaintSurface, Position, RenderEngine, Selection};
use crate::viewport::{ViewportChange, ViewportManager};

/// Default layout cache capacity, in paragraphs. Sized to comfortably hold
/// a viewport plus both buffer zones.
const DEFAULT_CACHE_CAPACITY: usize = 256;

/// The result of one edit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct EditOutcome {
    /// Where the caret lands after the edit.
    pub caret: Position,
    /// Whether paragraphs were added or removed, as opposed to one
    /// paragraph's text changing in place.
    pub structural: bool,
}

/// The document engine: owns all editor state below the host shell.
///
/// Every mutation goes through here so the update order is fixed: the
/// buffer changes first, then the format and annotation layers shift, then
/// the layout cache is invalidated, then dirty regions are recorded. No
/// caller can observe text that moved without its ranges having moved with
/// it.
#[derive(Debug)]
pub struct DocumentEngine<M: TextMetrics> {
    buffer: DocumentBuffer,
    formats: FormatLayer,
    annotations: AnnotationLayer,
    cache: LayoutCache,
    viewport: ViewportManager,
    render: RenderEngine,
    metrics: M,
}

impl<M: TextMetrics + core::fmt::Debug> DocumentEngine<M> {
    /// Create an engine showing an empty document.
    pub fn new(metrics: M, viewport_size: Size) -> Self {
        let mut buffer = DocumentBuffer::new();
        buffer.set_plain_text("");
        let mut engine = Self {
            buffer,
            formats: FormatLayer::new(),
            annotations: AnnotationLayer::new(),
            cache: LayoutCache::new(DEFAULT_CACHE_CAPACITY),
            viewport: ViewportManager::new(viewport_size),
            render: RenderEngine::new(Appearance::default()),
            metrics,
        };
        engine.calibrate_estimates();
        engine
    }

    // --- Accessors ---

    /// The text buffer.
    pub fn buffer(&self) -> &DocumentBuffer {
        &self.buffer
    }

    /// The format layer.
    pub fn formats(&self) -> &FormatLayer {
        &self.formats
    }

    /// The annotation layer.
    pub fn annotations(&self) -> &AnnotationLayer {
        &self.annotations
    }

    /// The viewport.
    pub fn viewport(&self) -> &ViewportManager {
        &self.viewport
    }

    /// Layout cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Zero the layout cache counters.
    pub fn reset_cache_stats(&mut self) {
        self.cache.reset_stats();
    }

    /// The current selection.
    pub fn selection(&self) -> Selection {
        self.render.selection()
    }

    /// Mutable access to annotation state transitions that need no
    /// geometry updates beyond a repaint.
    pub fn resolve_comment(&mut self, id: AnnotationId, resolved: bool) -> bool {
        let changed = self.annotations.resolve_comment(id, resolved);
        if changed {
            self.dirty_annotation(id);
        }
        changed
    }

    /// Mark a task annotation complete or incomplete.
    pub fn complete_todo(&mut self, id: AnnotationId, completed: bool) -> bool {
        let changed = self.annotations.complete_todo(id, completed);
        if changed {
            self.dirty_annotation(id);
        }
        changed
    }

    /// Remove an annotation.
    pub fn remove_annotation(&mut self, id: AnnotationId) -> bool {
        self.dirty_annotation(id);
        self.annotations.remove(id)
    }

    // --- Queries ---

    /// The text between two positions, with `\n` at paragraph breaks.
    /// Argument order does not matter; offsets snap down to character
    /// boundaries.
    pub fn text_of_range(&self, a: Position, b: Position) -> Result<String, Error> {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let start_text = self.buffer.paragraph_text(start.paragraph)?;
        let start_local = clamp_to_boundary(start_text, start.offset);
        if start.paragraph == end.paragraph {
            let end_local = clamp_to_boundary(start_text, end.offset).max(start_local);
            return Ok(start_text[start_local..end_local].to_string());
        }
        let end_text = self.buffer.paragraph_text(end.paragraph)?;
        let end_local = clamp_to_boundary(end_text, end.offset);
        let mut out = String::from(&start_text[start_local..]);
        for index in start.paragraph + 1..end.paragraph {
            out.push('\n');
            out.push_str(self.buffer.paragraph_text(index)?);
        }
        out.push('\n');
        out.push_str(&end_text[..end_local]);
        Ok(out)
    }

    /// The format ranges covering a position.
    pub fn formats_at(&self, pos: Position) -> Result<Vec<FormatRange>, Error> {
        let global = self.global_span(pos, pos)?.0;
        Ok(self.formats.formats_at(global))
    }

    /// The merged style in effect at a position, for toolbar state.
    pub fn style_at(&self, pos: Position) -> Result<RunStyle, Error> {
        let global = self.global_span(pos, pos)?.0;
        Ok(self.formats.merged_style_at(global))
    }

    /// Verify the buffer's cumulative indices, recovering if they drifted.
    ///
    /// On a mismatch the indices are rebuilt, cached layouts are dropped,
    /// and the viewport is marked for repaint; the error is returned so
    /// the host can report the recovery.
    pub fn check_invariants(&mut self) -> Result<(), Error> {
        match self.buffer.ensure_indices() {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(%err, "rebuilt document indices");
                self.cache.invalidate_all();
                self.render.mark_all_dirty();
                Err(err)
            }
        }
    }

    // --- Document I/O ---

    /// Replace the document with parsed markup.
    pub fn load_markup(&mut self, input: &str) -> Result<(), MarkupError> {
        let doc = parse_markup(input)?;
        tracing::debug!(
            paragraphs = doc.buffer.paragraph_count(),
            formats = doc.formats.range_count(),
            annotations = doc.annotations.len(),
            "loaded markup document"
        );
        self.buffer = doc.buffer;
        self.formats = doc.formats;
        self.annotations = doc.annotations;
        self.after_document_replaced();
        Ok(())
    }

    /// Serialize the document to markup.
    pub fn to_markup(&self) -> String {
        serialize_markup(&self.buffer, &self.formats, &self.annotations)
    }

    /// Replace the document with plain text. Formatting and annotations
    /// are cleared.
    pub fn load_plain_text(&mut self, text: &str) {
        self.buffer.set_plain_text(text);
        self.formats = FormatLayer::new();
        self.annotations = AnnotationLayer::new();
        self.after_document_replaced();
    }

    fn after_document_replaced(&mut self) {
        self.calibrate_estimates();
        self.cache.invalidate_all();
        self.render.set_selection(Selection::default());
        self.render.mark_all_dirty();
        let total = self.buffer.total_height();
        self.viewport.scroll_to(0.0, total);
    }

    fn calibrate_estimates(&mut self) {
        let line_height = self
            .metrics
            .line_height(&RunStyle::default());
        self.buffer.set_estimated_line_height(line_height);
        let wrap = self.wrap_width();
        let advance = self.metrics.average_advance();
        if wrap > 0.0 && advance > 0.0 {
            self.buffer
                .set_estimated_chars_per_line((wrap / advance).max(1.0) as usize);
        }
    }

    fn wrap_width(&self) -> f64 {
        let margin = self.render.appearance().margin;
        (self.viewport.size().width - 2.0 * margin).max(0.0)
    }

    // --- Editing ---

    /// Insert `text` at `pos`. Newlines split paragraphs.
    ///
    /// The offset is clamped to the paragraph's length and snapped down to
    /// a character boundary; an invalid paragraph index is an error.
    pub fn insert_text(&mut self, pos: Position, text: &str) -> Result<EditOutcome, Error> {
        let para_text = self.buffer.paragraph_text(pos.paragraph)?.to_string();
        let offset = clamp_to_boundary(&para_text, pos.offset);
        let global = self.buffer.offset_of_paragraph(pos.paragraph)? + offset;

        let caret;
        let structural = text.contains('\n');
        if !structural {
            let mut new_text = String::with_capacity(para_text.len() + text.len());
            new_text.push_str(&para_text[..offset]);
            new_text.push_str(text);
            new_text.push_str(&para_text[offset..]);
            let change = self.buffer.set_paragraph_text(pos.paragraph, &new_text)?;

            self.formats.on_text_inserted(global, text.len());
            self.annotations.on_text_inserted(global, text.len());
            self.apply_structural(change);
            self.dirty_paragraph(pos.paragraph);
            caret = Position {
                paragraph: pos.paragraph,
                offset: offset + text.len(),
            };
        } else {
            let mut pieces = text.split('\n');
            // split('\n') on a string containing '\n' yields >= 2 pieces.
            let first = pieces.next().unwrap_or("");
            let rest: Vec<&str> = pieces.collect();
            let last_index = pos.paragraph + rest.len();

            let head = format!("{}{}", &para_text[..offset], first);
            let mut changes = Vec::with_capacity(rest.len() + 1);
            changes.push(self.buffer.set_paragraph_text(pos.paragraph, &head)?);
            for (i, piece) in rest.iter().enumerate() {
                let at = pos.paragraph + 1 + i;
                let body = if i + 1 == rest.len() {
                    format!("{}{}", piece, &para_text[offset..])
                } else {
                    (*piece).to_string()
                };
                changes.push(self.buffer.insert_paragraph(at, &body)?);
            }

            self.formats.on_text_inserted(global, text.len());
            self.annotations.on_text_inserted(global, text.len());
            for change in changes {
                self.apply_structural(change);
            }
            // Everything below the edit moved.
            self.render.mark_all_dirty();
            caret = Position {
                paragraph: last_index,
                offset: rest.last().map_or(0, |p| p.len()),
            };
        }

        tracing::trace!(
            paragraph = pos.paragraph,
            len = text.len(),
            structural,
            "inserted text"
        );
        self.render.set_selection(Selection::caret(caret));
        self.render.reset_blink();
        Ok(EditOutcome { caret, structural })
    }

    /// Delete the text between two positions, merging paragraphs when the
    /// range crosses a break.
    pub fn delete_range(&mut self, a: Position, b: Position) -> Result<EditOutcome, Error> {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let start_text = self.buffer.paragraph_text(start.paragraph)?.to_string();
        let end_text = self.buffer.paragraph_text(end.paragraph)?.to_string();
        let start_offset = clamp_to_boundary(&start_text, start.offset);
        let end_offset = clamp_to_boundary(&end_text, end.offset);
        let global_start = self.buffer.offset_of_paragraph(start.paragraph)? + start_offset;
        let global_end = self.buffer.offset_of_paragraph(end.paragraph)? + end_offset;
        if global_end <= global_start {
            let caret = Position {
                paragraph: start.paragraph,
                offset: start_offset,
            };
            return Ok(EditOutcome {
                caret,
                structural: false,
            });
        }
        let len = global_end - global_start;
        let structural = start.paragraph != end.paragraph;

        if !structural {
            let mut new_text = String::with_capacity(start_text.len() - len);
            new_text.push_str(&start_text[..start_offset]);
            new_text.push_str(&start_text[end_offset..]);
            let change = self.buffer.set_paragraph_text(start.paragraph, &new_text)?;
            self.apply_structural(change);
            self.dirty_paragraph(start.paragraph);
        } else {
            let merged = format!("{}{}", &start_text[..start_offset], &end_text[end_offset..]);
            let change = self.buffer.set_paragraph_text(start.paragraph, &merged)?;
            self.apply_structural(change);
            for _ in start.paragraph..end.paragraph {
                let removed = self.buffer.remove_paragraph(start.paragraph + 1)?;
                self.apply_structural(removed);
            }
            self.render.mark_all_dirty();
        }

        self.formats.on_text_deleted(global_start, len);
        self.annotations.on_text_deleted(global_start, len);

        tracing::trace!(
            paragraph = start.paragraph,
            len,
            structural,
            "deleted range"
        );
        let caret = Position {
            paragraph: start.paragraph,
            offset: start_offset,
        };
        self.render.set_selection(Selection::caret(caret));
        self.render.reset_blink();
        Ok(EditOutcome { caret, structural })
    }

    // --- Formatting ---

    /// Apply `attr` over the span between two positions.
    pub fn apply_format(&mut self, a: Position, b: Position, attr: Attribute) -> Result<(), Error> {
        let (start, end) = self.global_span(a, b)?;
        if start < end {
            self.formats.add_format(start, end, attr)?;
            self.after_format_change(a, b);
        }
        Ok(())
    }

    /// Toggle `attr` over the span between two positions. Returns whether
    /// the span ends up formatted.
    pub fn toggle_format(
        &mut self,
        a: Position,
        b: Position,
        attr: Attribute,
    ) -> Result<bool, Error> {
        let (start, end) = self.global_span(a, b)?;
        if start >= end {
            return Ok(false);
        }
        let applied = self.formats.toggle_format(start, end, attr)?;
        self.after_format_change(a, b);
        Ok(applied)
    }

    /// Remove attributes of `kind` over the span between two positions.
    pub fn remove_format(
        &mut self,
        a: Position,
        b: Position,
        kind: AttributeKind,
    ) -> Result<bool, Error> {
        let (start, end) = self.global_span(a, b)?;
        let removed = self.formats.remove_format(start, end, kind);
        if removed {
            self.after_format_change(a, b);
        }
        Ok(removed)
    }

    fn after_format_change(&mut self, a: Position, b: Position) {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        for index in start.paragraph..=end.paragraph {
            self.cache.invalidate(index);
            // Size and family changes can rewrap; keep the old measured
            // height as the guess until layout runs again.
            let _ = self.buffer.mark_height_stale(index);
            self.dirty_paragraph(index);
        }
    }

    // --- Annotations ---

    /// Anchor a comment to the span between two positions.
    pub fn add_comment(
        &mut self,
        a: Position,
        b: Position,
        text: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        let (start, end) = self.global_span(a, b)?;
        let id = self.annotations.add_comment(start, end, text, author)?;
        self.dirty_annotation(id);
        Ok(id)
    }

    /// Anchor a task marker to the span between two positions.
    pub fn add_todo(
        &mut self,
        a: Position,
        b: Position,
        label: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        let (start, end) = self.global_span(a, b)?;
        let id = self.annotations.add_todo(start, end, label)?;
        self.dirty_annotation(id);
        Ok(id)
    }

    /// Anchor a footnote to the span between two positions.
    pub fn add_footnote(
        &mut self,
        a: Position,
        b: Position,
        reference: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        let (start, end) = self.global_span(a, b)?;
        let id = self.annotations.add_footnote(start, end, reference)?;
        self.dirty_annotation(id);
        Ok(id)
    }

    // --- Selection and hit testing ---

    /// Move the selection, dirtying the paragraphs it leaves and enters.
    pub fn set_selection(&mut self, selection: Selection) {
        let old = self.render.selection();
        for index in selection_paragraphs(old).chain(selection_paragraphs(selection)) {
            self.dirty_paragraph(index);
        }
        self.render.set_selection(selection);
    }

    /// Map a viewport-space point to a document position.
    pub fn hit_test(&mut self, point: Point) -> Position {
        if self.buffer.paragraph_count() == 0 {
            return Position::default();
        }
        let doc_y = point.y + self.viewport.scroll_y();
        let index = self.buffer.paragraph_at_y(doc_y.max(0.0));
        let (Ok(text), Ok(para_offset), Ok(para_y)) = (
            self.buffer.paragraph_text(index).map(str::to_string),
            self.buffer.offset_of_paragraph(index),
            self.buffer.paragraph_y(index),
        ) else {
            return Position::default();
        };
        let wrap_width = self.wrap_width();
        let formats = &self.formats;
        let metrics = &self.metrics;
        let layout = self
            .cache
            .get_or_compute(index, || {
                layout::layout_paragraph(&text, para_offset, formats, metrics, wrap_width)
            })
            .clone();
        let margin = self.render.appearance().margin;
        let offset = layout::hit_test(
            &layout,
            &text,
            para_offset,
            &self.formats,
            &self.metrics,
            (point.x - margin).max(0.0),
            doc_y - para_y,
        );
        Position {
            paragraph: index,
            offset,
        }
    }

    // --- Viewport ---

    /// Scroll by `delta` pixels. Returns what changed.
    pub fn on_scroll(&mut self, delta: f64) -> ViewportChange {
        let change = self.viewport.scroll_by(delta, self.buffer.total_height());
        if !change.is_noop() {
            // The whole viewport shifts; repaint it and drop layouts that
            // fell out of the buffer zone.
            self.render.mark_all_dirty();
            self.cache.trim_to(self.viewport.retained_range(&self.buffer));
        }
        change
    }

    /// Scroll the minimum distance that brings a paragraph fully into
    /// view.
    pub fn scroll_to_paragraph(&mut self, index: usize) -> Result<ViewportChange, Error> {
        let change = self.viewport.scroll_to_paragraph(&self.buffer, index)?;
        if !change.is_noop() {
            self.render.mark_all_dirty();
            self.cache.trim_to(self.viewport.retained_range(&self.buffer));
        }
        Ok(change)
    }

    /// Resize the viewport. The wrap width changes, so every cached layout
    /// and measured height is stale.
    pub fn on_resize(&mut self, size: Size) -> ViewportChange {
        let old_width = self.viewport.size().width;
        let change = self.viewport.set_size(size, self.buffer.total_height());
        if change.resized {
            if self.viewport.size().width != old_width {
                self.cache.invalidate_all();
                for index in 0..self.buffer.paragraph_count() {
                    let _ = self.buffer.mark_height_stale(index);
                }
                self.calibrate_estimates();
            }
            self.render.mark_all_dirty();
        }
        change
    }

    // --- Frames ---

    /// Reconcile layouts for the retained range: lay out any paragraph
    /// whose height is not measured, promote its height, and release
    /// layouts outside the buffer zone.
    ///
    /// Called before every paint; this is the only place estimated heights
    /// become measured ones.
    pub fn prepare_frame(&mut self) {
        let retained = self.viewport.retained_range(&self.buffer);
        let wrap_width = self.wrap_width();
        let mut promoted = 0_usize;
        let mut measured_height = 0.0;
        let mut measured_lines = 0_usize;
        for index in retained.clone() {
            let needs_layout = !self.cache.contains(index)
                || self.buffer.height_state(index) != Ok(HeightState::Valid);
            if !needs_layout {
                continue;
            }
            let (Ok(text), Ok(para_offset)) = (
                self.buffer.paragraph_text(index).map(str::to_string),
                self.buffer.offset_of_paragraph(index),
            ) else {
                break;
            };
            self.cache.invalidate(index);
            let formats = &self.formats;
            let metrics = &self.metrics;
            let layout = self.cache.get_or_compute(index, || {
                layout::layout_paragraph(&text, para_offset, formats, metrics, wrap_width)
            });
            let height = layout.height;
            measured_height += layout.height;
            measured_lines += layout.lines.len();
            // Promote in the same step so total_height and the cached
            // layout never disagree for this paragraph.
            let _ = self.buffer.set_paragraph_height(index, height);
            promoted += 1;
        }
        if promoted > 0 {
            tracing::trace!(promoted, ?retained, "reconciled paragraph heights");
            // Feed measured line heights back into the estimator so the
            // guesses for unmeasured paragraphs track real content.
            if measured_lines > 0 {
                self.buffer
                    .set_estimated_line_height(measured_height / measured_lines as f64);
            }
            // Height corrections above the viewport move content; re-clamp.
            self.viewport
                .scroll_by(0.0, self.buffer.total_height());
        }
        self.cache.trim_to(retained);
    }

    /// Repaint everything dirty since the last paint, consuming the dirty
    /// region. Runs [`prepare_frame`](Self::prepare_frame) first; a paint
    /// with nothing dirty draws nothing.
    pub fn paint(&mut self, surface: &mut dyn PaintSurface) {
        self.prepare_frame();
        let rects = self.render.take_dirty(self.viewport.size());
        let Some(clip) = rects.into_iter().reduce(|a, b| a.union(b)) else {
            return;
        };
        self.paint_region(surface, clip);
    }

    /// Paint the document inside `clip` (viewport space), regardless of
    /// the dirty region. For host expose events.
    pub fn paint_clip(&mut self, surface: &mut dyn PaintSurface, clip: Rect) {
        self.prepare_frame();
        self.paint_region(surface, clip);
    }

    fn paint_region(&mut self, surface: &mut dyn PaintSurface, clip: Rect) {
        self.render.paint(
            surface,
            clip,
            &self.buffer,
            &self.formats,
            &self.annotations,
            &mut self.cache,
            &self.viewport,
            &self.metrics,
        );
    }

    /// Take the rectangles needing repaint since the last call.
    pub fn take_dirty(&mut self) -> Vec<Rect> {
        self.render.take_dirty(self.viewport.size())
    }

    /// Advance the caret blink phase.
    pub fn blink_tick(&mut self) {
        self.render.blink_tick();
    }

    /// The viewport-space caret rectangle from the last paint, for host
    /// concerns like IME candidate window placement.
    pub fn cursor_rect(&self) -> Rect {
        self.render.cursor_rect()
    }

    // --- Helpers ---

    fn global_span(&self, a: Position, b: Position) -> Result<(usize, usize), Error> {
        let (start, end) = if a <= b { (a, b) } else { (b, a) };
        let start_text = self.buffer.paragraph_text(start.paragraph)?;
        let start_local = clamp_to_boundary(start_text, start.offset);
        let end_text = self.buffer.paragraph_text(end.paragraph)?;
        let end_local = clamp_to_boundary(end_text, end.offset);
        Ok((
            self.buffer.offset_of_paragraph(start.paragraph)? + start_local,
            self.buffer.offset_of_paragraph(end.paragraph)? + end_local,
        ))
    }

    /// Route a buffer edit receipt to the layout cache, so cached layouts
    /// stay keyed to the paragraphs they were computed for.
    fn apply_structural(&mut self, change: StructuralChange) {
        match change {
            StructuralChange::Edited { index, .. } => {
                self.cache.invalidate(index);
            }
            StructuralChange::Inserted { index, .. } => {
                self.cache.on_paragraph_inserted(index);
            }
            StructuralChange::Removed { index, .. } => {
                self.cache.on_paragraph_removed(index);
            }
        }
    }

    fn dirty_paragraph(&mut self, index: usize) {
        let (Ok(y), Ok(height)) = (self.buffer.paragraph_y(index), self.buffer.paragraph_height(index))
        else {
            return;
        };
        let top = y - self.viewport.scroll_y();
        let size = self.viewport.size();
        if top + height < 0.0 || top > size.height {
            return;
        }
        self.render
            .add_dirty(Rect::new(0.0, top, size.width, top + height));
    }

    fn dirty_annotation(&mut self, id: AnnotationId) {
        let Some(entry) = self.annotations.get(id) else {
            return;
        };
        let (start, _) = self.buffer.paragraph_at_offset(entry.range.start);
        let (end, _) = self.buffer.paragraph_at_offset(entry.range.end);
        for index in start..=end {
            self.dirty_paragraph(index);
        }
    }
}

fn selection_paragraphs(selection: Selection) -> core::ops::RangeInclusive<usize> {
    let (start, end) = selection.ordered();
    start.paragraph..=end.paragraph
}

/// Snap `offset` down to the nearest character boundary within `text`.
fn clamp_to_boundary(text: &str, offset: usize) -> usize {
    let mut offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
