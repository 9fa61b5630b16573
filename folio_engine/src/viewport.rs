// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scroll position, visible range, and scrollbar geometry.

use core::ops::Range;

use folio_document::DocumentBuffer;
use kurbo::Size;

/// Minimum scrollbar thumb size as a fraction of the track, so the thumb
/// stays grabbable on very long documents.
const MIN_THUMB_FRACTION: f64 = 0.05;

/// Paragraphs kept laid out above and below the visible range.
pub const DEFAULT_BUFFER_ZONE: usize = 50;

/// What changed in one viewport update, for deciding how much to repaint.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ViewportChange {
    /// Vertical scroll movement in pixels (positive is down).
    pub scroll_delta: f64,
    /// Whether the viewport dimensions changed.
    pub resized: bool,
}

impl ViewportChange {
    /// Returns `true` if nothing visible changed.
    pub fn is_noop(&self) -> bool {
        self.scroll_delta == 0.0 && !self.resized
    }
}

/// Tracks the scroll offset and viewport size, and maps them to paragraph
/// ranges through the buffer's height index.
///
/// The scroll offset is always kept clamped to `[0, total_height - viewport
/// height]`; callers never see an overscrolled position.
#[derive(Clone, Debug)]
pub struct ViewportManager {
    size: Size,
    scroll_y: f64,
    buffer_zone: usize,
}

impl ViewportManager {
    /// Create a viewport of the given size, scrolled to the top.
    pub fn new(size: Size) -> Self {
        Self {
            size,
            scroll_y: 0.0,
            buffer_zone: DEFAULT_BUFFER_ZONE,
        }
    }

    /// The viewport dimensions in pixels.
    pub fn size(&self) -> Size {
        self.size
    }

    /// The current vertical scroll offset in pixels.
    pub fn scroll_y(&self) -> f64 {
        self.scroll_y
    }

    /// Paragraphs retained above and below the visible range.
    pub fn buffer_zone(&self) -> usize {
        self.buffer_zone
    }

    /// Override the buffer zone size.
    pub fn set_buffer_zone(&mut self, paragraphs: usize) {
        self.buffer_zone = paragraphs;
    }

    /// Resize the viewport, re-clamping the scroll offset against
    /// `total_height`.
    pub fn set_size(&mut self, size: Size, total_height: f64) -> ViewportChange {
        let resized = size != self.size;
        self.size = size;
        let mut change = self.scroll_to(self.scroll_y, total_height);
        change.resized = resized;
        change
    }

    /// Scroll to an absolute offset, clamped to the document.
    pub fn scroll_to(&mut self, y: f64, total_height: f64) -> ViewportChange {
        let max_scroll = (total_height - self.size.height).max(0.0);
        let clamped = y.clamp(0.0, max_scroll);
        let delta = clamped - self.scroll_y;
        self.scroll_y = clamped;
        ViewportChange {
            scroll_delta: delta,
            resized: false,
        }
    }

    /// Scroll by a relative amount, clamped to the document.
    pub fn scroll_by(&mut self, delta: f64, total_height: f64) -> ViewportChange {
        self.scroll_to(self.scroll_y + delta, total_height)
    }

    /// The paragraphs intersecting the viewport, as a half-open index
    /// range. Empty for an empty document.
    pub fn visible_range(&self, buffer: &DocumentBuffer) -> Range<usize> {
        if buffer.paragraph_count() == 0 {
            return 0..0;
        }
        let first = buffer.paragraph_at_y(self.scroll_y);
        let last = buffer.paragraph_at_y(self.scroll_y + self.size.height);
        first..(last + 1).min(buffer.paragraph_count())
    }

    /// The visible range widened by the buffer zone on both sides. Layouts
    /// inside this range are kept cached; the rest may be released.
    pub fn retained_range(&self, buffer: &DocumentBuffer) -> Range<usize> {
        let visible = self.visible_range(buffer);
        let start = visible.start.saturating_sub(self.buffer_zone);
        let end = (visible.end + self.buffer_zone).min(buffer.paragraph_count());
        start..end
    }

    /// Scroll the minimum distance that brings the paragraph fully into
    /// view. Paragraphs taller than the viewport align to its top. Errors
    /// if `index` is out of range.
    pub fn scroll_to_paragraph(
        &mut self,
        buffer: &DocumentBuffer,
        index: usize,
    ) -> Result<ViewportChange, folio_document::Error> {
        let top = buffer.paragraph_y(index)?;
        let bottom = top + buffer.paragraph_height(index)?;
        let total = buffer.total_height();
        if top < self.scroll_y {
            Ok(self.scroll_to(top, total))
        } else if bottom > self.scroll_y + self.size.height {
            Ok(self.scroll_to((bottom - self.size.height).min(top), total))
        } else {
            Ok(ViewportChange::default())
        }
    }

    /// Returns `true` if the document overflows the viewport vertically.
    pub fn is_scrollbar_needed(&self, total_height: f64) -> bool {
        total_height > self.size.height
    }

    /// Returns `true` if any part of the paragraph intersects the
    /// viewport. Out-of-range indices are simply not visible.
    pub fn is_paragraph_visible(&self, buffer: &DocumentBuffer, index: usize) -> bool {
        self.visible_range(buffer).contains(&index)
    }

    /// Returns `true` if the paragraph falls inside the retained range, so
    /// its layout should stay cached.
    pub fn is_paragraph_in_buffer(&self, buffer: &DocumentBuffer, index: usize) -> bool {
        self.retained_range(buffer).contains(&index)
    }

    /// The viewport in document coordinates: the rectangle from the scroll
    /// offset down to the bottom of the visible area.
    pub fn viewport_rect(&self) -> kurbo::Rect {
        kurbo::Rect::new(0.0, self.scroll_y, self.size.width, self.scroll_y + self.size.height)
    }

    /// Scrollbar thumb length as a fraction of the track, floored so the
    /// thumb never vanishes.
    pub fn thumb_fraction(&self, total_height: f64) -> f64 {
        if total_height <= self.size.height {
            return 1.0;
        }
        (self.size.height / total_height).clamp(MIN_THUMB_FRACTION, 1.0)
    }

    /// Scrollbar thumb top as a fraction of the track, in
    /// `[0, 1 - thumb_fraction]`.
    pub fn thumb_offset_fraction(&self, total_height: f64) -> f64 {
        let max_scroll = total_height - self.size.height;
        if max_scroll <= 0.0 {
            return 0.0;
        }
        let travel = 1.0 - self.thumb_fraction(total_height);
        (self.scroll_y / max_scroll) * travel
    }

    /// Scroll so the thumb's top sits at `fraction` of the track, for
    /// thumb dragging.
    pub fn set_scrollbar_position(&mut self, fraction: f64, total_height: f64) -> ViewportChange {
        let y = self.scroll_for_thumb_fraction(fraction, total_height);
        self.scroll_to(y, total_height)
    }

    /// Map a scrollbar track fraction back to a scroll offset, for thumb
    /// dragging.
    pub fn scroll_for_thumb_fraction(&self, fraction: f64, total_height: f64) -> f64 {
        let max_scroll = (total_height - self.size.height).max(0.0);
        let travel = 1.0 - self.thumb_fraction(total_height);
        if travel <= 0.0 {
            return 0.0;
        }
        (fraction / travel).clamp(0.0, 1.0) * max_scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(paragraphs: usize, height: f64) -> DocumentBuffer {
        let mut buffer = DocumentBuffer::new();
        buffer.set_plain_text(&vec!["para"; paragraphs].join("\n"));
        for i in 0..paragraphs {
            buffer.set_paragraph_height(i, height).unwrap();
        }
        buffer
    }

    #[test]
    fn scroll_clamps_to_document() {
        let mut vp = ViewportManager::new(Size::new(800.0, 600.0));
        let change = vp.scroll_to(250.0, 1000.0);
        assert_eq!(change.scroll_delta, 250.0);
        assert_eq!(vp.scroll_y(), 250.0);
        vp.scroll_to(5000.0, 1000.0);
        assert_eq!(vp.scroll_y(), 400.0);
        vp.scroll_by(-9999.0, 1000.0);
        assert_eq!(vp.scroll_y(), 0.0);
        // Document shorter than the viewport pins to the top.
        vp.scroll_to(10.0, 300.0);
        assert_eq!(vp.scroll_y(), 0.0);
    }

    #[test]
    fn resize_reclamps_scroll() {
        let mut vp = ViewportManager::new(Size::new(800.0, 600.0));
        vp.scroll_to(400.0, 1000.0);
        let change = vp.set_size(Size::new(800.0, 900.0), 1000.0);
        assert!(change.resized);
        assert_eq!(vp.scroll_y(), 100.0);
        assert_eq!(change.scroll_delta, -300.0);
    }

    #[test]
    fn visible_and_retained_ranges() {
        // 200 paragraphs, 10px each.
        let buf = buffer(200, 10.0);
        let mut vp = ViewportManager::new(Size::new(800.0, 100.0));
        vp.set_buffer_zone(5);
        assert_eq!(vp.visible_range(&buf), 0..11);
        assert_eq!(vp.retained_range(&buf), 0..16);

        vp.scroll_to(995.0, 2000.0);
        // 995..1095 covers paragraphs 99..=109.
        assert_eq!(vp.visible_range(&buf), 99..110);
        assert_eq!(vp.retained_range(&buf), 94..115);

        vp.scroll_to(1900.0, 2000.0);
        assert_eq!(vp.visible_range(&buf), 190..200);
        assert_eq!(vp.retained_range(&buf), 185..200);
    }

    #[test]
    fn empty_document_has_empty_ranges() {
        let mut buf = DocumentBuffer::new();
        buf.set_plain_text("");
        let vp = ViewportManager::new(Size::new(800.0, 600.0));
        // An "empty" buffer still holds one empty paragraph.
        assert_eq!(vp.visible_range(&buf).start, 0);
    }

    #[test]
    fn scroll_to_paragraph_moves_minimally() {
        let buf = buffer(200, 10.0);
        let mut vp = ViewportManager::new(Size::new(800.0, 100.0));

        // Already visible: no movement.
        let change = vp.scroll_to_paragraph(&buf, 3).unwrap();
        assert!(change.is_noop());

        // Below the viewport: bottom-aligns.
        vp.scroll_to_paragraph(&buf, 50).unwrap();
        assert_eq!(vp.scroll_y(), 410.0);
        assert!(vp.is_paragraph_visible(&buf, 50));

        // Above the viewport: top-aligns.
        vp.scroll_to_paragraph(&buf, 10).unwrap();
        assert_eq!(vp.scroll_y(), 100.0);

        assert!(vp.scroll_to_paragraph(&buf, 500).is_err());
    }

    #[test]
    fn visibility_and_buffer_membership() {
        let buf = buffer(200, 10.0);
        let mut vp = ViewportManager::new(Size::new(800.0, 100.0));
        vp.set_buffer_zone(5);
        vp.scroll_to(500.0, 2000.0);
        // 500..600 covers paragraphs 50..=60.
        assert!(vp.is_paragraph_visible(&buf, 50));
        assert!(vp.is_paragraph_visible(&buf, 60));
        assert!(!vp.is_paragraph_visible(&buf, 61));
        assert!(vp.is_paragraph_in_buffer(&buf, 45));
        assert!(vp.is_paragraph_in_buffer(&buf, 65));
        assert!(!vp.is_paragraph_in_buffer(&buf, 44));

        assert!(vp.is_scrollbar_needed(2000.0));
        assert!(!vp.is_scrollbar_needed(50.0));

        let rect = vp.viewport_rect();
        assert_eq!(rect.y0, 500.0);
        assert_eq!(rect.y1, 600.0);
        assert_eq!(rect.width(), 800.0);
    }

    #[test]
    fn thumb_geometry() {
        let mut vp = ViewportManager::new(Size::new(800.0, 100.0));
        // Short document: full-track thumb, no travel.
        assert_eq!(vp.thumb_fraction(50.0), 1.0);
        assert_eq!(vp.thumb_offset_fraction(50.0), 0.0);
        // 1000px document: thumb is a tenth of the track.
        assert_eq!(vp.thumb_fraction(1000.0), 0.1);
        // Very long document: thumb floors at 5%.
        assert_eq!(vp.thumb_fraction(1_000_000.0), MIN_THUMB_FRACTION);

        vp.scroll_to(900.0, 1000.0);
        let offset = vp.thumb_offset_fraction(1000.0);
        assert!((offset - 0.9).abs() < 1e-9);
        // Dragging the thumb back to that fraction reproduces the offset.
        let back = vp.scroll_for_thumb_fraction(offset, 1000.0);
        assert!((back - 900.0).abs() < 1e-9);

        vp.set_scrollbar_position(0.0, 1000.0);
        assert_eq!(vp.scroll_y(), 0.0);
        vp.set_scrollbar_position(offset, 1000.0);
        assert!((vp.scroll_y() - 900.0).abs() < 1e-9);
    }
}
