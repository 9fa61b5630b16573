// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Character-range formatting layered over the document buffer.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::attribute::{Attribute, AttributeKind, FormatRange, RunStyle};
use crate::Error;

struct Node {
    range: FormatRange,
    // Largest range end anywhere in this subtree, for overlap pruning.
    max_end: usize,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

impl Node {
    fn new(range: FormatRange) -> Box<Self> {
        let max_end = range.range.end;
        Box::new(Self {
            range,
            max_end,
            left: None,
            right: None,
        })
    }

    fn refresh_max_end(&mut self) {
        let mut max = self.range.range.end;
        if let Some(left) = &self.left {
            max = max.max(left.max_end);
        }
        if let Some(right) = &self.right {
            max = max.max(right.max_end);
        }
        self.max_end = max;
    }
}

/// Interval tree over format ranges: a BST ordered by range start, with each
/// node augmented by the maximum end in its subtree so overlap queries can
/// prune whole branches.
#[derive(Default)]
struct IntervalTree {
    root: Option<Box<Node>>,
    len: usize,
}

impl IntervalTree {
    fn insert(&mut self, range: FormatRange) {
        if range.is_empty() {
            return;
        }
        insert_node(&mut self.root, range);
        self.len += 1;
    }

    fn collect_at(&self, position: usize, out: &mut Vec<FormatRange>) {
        collect_at(self.root.as_deref(), position, out);
    }

    fn collect_overlapping(&self, start: usize, end: usize, out: &mut Vec<FormatRange>) {
        collect_overlapping(self.root.as_deref(), start, end, out);
    }

    fn all(&self) -> Vec<FormatRange> {
        let mut out = Vec::with_capacity(self.len);
        collect_all(self.root.as_deref(), &mut out);
        out
    }

    fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// Remove every range matching `predicate`. Rebuilds from an in-order
    /// walk; removal is rare next to queries and shifts.
    fn retain(&mut self, mut predicate: impl FnMut(&FormatRange) -> bool) -> usize {
        let before = self.len;
        let mut kept = self.all();
        kept.retain(|r| predicate(r));
        self.rebuild_from(kept);
        before - self.len
    }

    fn rebuild_from(&mut self, ranges: Vec<FormatRange>) {
        self.clear();
        // Ranges arrive sorted by start; build balanced to keep walks log-ish.
        self.root = build_balanced(ranges);
        self.len = count(self.root.as_deref());
    }

    /// Shift every range at or after `position` by `delta` bytes. Straddling
    /// ranges have only their end adjusted (shrinking toward `position` on
    /// deletion). Subtrees that end at or before `position` are skipped via
    /// the `max_end` augmentation.
    fn shift(&mut self, position: usize, delta: isize) {
        shift_node(self.root.as_deref_mut(), position, delta);
        // Shifting can collapse straddling ranges to empty; prune them.
        if delta < 0 {
            self.retain(|r| !r.is_empty());
        }
    }
}

fn insert_node(slot: &mut Option<Box<Node>>, range: FormatRange) {
    match slot {
        None => *slot = Some(Node::new(range)),
        Some(node) => {
            if range.range.start < node.range.range.start {
                insert_node(&mut node.left, range);
            } else {
                insert_node(&mut node.right, range);
            }
            node.refresh_max_end();
        }
    }
}

fn collect_at(node: Option<&Node>, position: usize, out: &mut Vec<FormatRange>) {
    let Some(node) = node else { return };
    if node.range.contains(position) {
        out.push(node.range.clone());
    }
    if let Some(left) = node.left.as_deref() {
        if left.max_end > position {
            collect_at(Some(left), position, out);
        }
    }
    if node.range.range.start <= position {
        collect_at(node.right.as_deref(), position, out);
    }
}

fn collect_overlapping(node: Option<&Node>, start: usize, end: usize, out: &mut Vec<FormatRange>) {
    let Some(node) = node else { return };
    if node.range.overlaps(start, end) {
        out.push(node.range.clone());
    }
    if let Some(left) = node.left.as_deref() {
        if left.max_end > start {
            collect_overlapping(Some(left), start, end, out);
        }
    }
    if node.range.range.start < end {
        collect_overlapping(node.right.as_deref(), start, end, out);
    }
}

fn collect_all(node: Option<&Node>, out: &mut Vec<FormatRange>) {
    let Some(node) = node else { return };
    collect_all(node.left.as_deref(), out);
    out.push(node.range.clone());
    collect_all(node.right.as_deref(), out);
}

fn count(node: Option<&Node>) -> usize {
    node.map_or(0, |n| 1 + count(n.left.as_deref()) + count(n.right.as_deref()))
}

fn build_balanced(mut ranges: Vec<FormatRange>) -> Option<Box<Node>> {
    fn build(slice: &mut [Option<FormatRange>]) -> Option<Box<Node>> {
        if slice.is_empty() {
            return None;
        }
        let mid = slice.len() / 2;
        let range = slice[mid].take()?;
        let mut node = Node::new(range);
        let (left, rest) = slice.split_at_mut(mid);
        node.left = build(left);
        node.right = build(&mut rest[1..]);
        node.refresh_max_end();
        Some(node)
    }
    let mut slots: Vec<Option<FormatRange>> = ranges.drain(..).map(Some).collect();
    build(&mut slots)
}

fn shift_node(node: Option<&mut Node>, position: usize, delta: isize) {
    let Some(node) = node else { return };

    // Untouched subtree: every range in it ends at or before the edit point.
    if node.max_end <= position {
        return;
    }

    let range = &mut node.range.range;
    if range.start >= position {
        if delta >= 0 {
            range.start += delta as usize;
            range.end += delta as usize;
        } else {
            let abs = (-delta) as usize;
            range.start = range.start.saturating_sub(abs).max(position);
            range.end = range.end.saturating_sub(abs).max(position);
        }
    } else if range.end > position {
        // Straddles the edit point: only the end moves.
        if delta >= 0 {
            range.end += delta as usize;
        } else {
            let abs = (-delta) as usize;
            let delete_end = position + abs;
            range.end = if range.end <= delete_end {
                position
            } else {
                range.end - abs
            };
        }
    }

    shift_node(node.left.as_deref_mut(), position, delta);
    shift_node(node.right.as_deref_mut(), position, delta);
    node.refresh_max_end();
}

/// Store of character-range formatting attributes.
///
/// Positions are document-global byte offsets as defined by
/// [`DocumentBuffer`](crate::DocumentBuffer). The layer never decides
/// formatting policy on its own: inserted text is left unformatted (ranges
/// straddling the insertion point are split, not extended), and it is up to
/// the editing command above to re-extend formatting when that is wanted.
#[derive(Default)]
pub struct FormatLayer {
    tree: IntervalTree,
}

impl core::fmt::Debug for FormatLayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FormatLayer")
            .field("ranges", &self.tree.len)
            .finish()
    }
}

impl FormatLayer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of stored ranges.
    pub fn range_count(&self) -> usize {
        self.tree.len
    }

    /// Apply `attr` over `[start, end)`.
    ///
    /// The same attribute is never duplicated over the same interval: any
    /// existing ranges of this kind with an identical value are merged with
    /// the new span where they touch it.
    pub fn add_format(&mut self, start: usize, end: usize, attr: Attribute) -> Result<(), Error> {
        if start >= end {
            return Err(Error::invalid_range(start, end, end));
        }
        let mut merged_start = start;
        let mut merged_end = end;
        let mut overlapping = Vec::new();
        // Include adjacency so touching equal ranges coalesce.
        let scan_start = start.saturating_sub(1);
        self.tree
            .collect_overlapping(scan_start, end + 1, &mut overlapping);
        let mut absorbed = false;
        for existing in &overlapping {
            if existing.attr == attr {
                merged_start = merged_start.min(existing.range.start);
                merged_end = merged_end.max(existing.range.end);
                absorbed = true;
            }
        }
        if absorbed {
            self.tree
                .retain(|r| !(r.attr == attr && r.range.start >= merged_start && r.range.end <= merged_end));
        }
        self.tree
            .insert(FormatRange::new(merged_start..merged_end, attr));
        Ok(())
    }

    /// Remove every attribute of `kind` over `[start, end)`, trimming
    /// partially overlapping ranges. Returns `false` when nothing matched.
    pub fn remove_format(&mut self, start: usize, end: usize, kind: AttributeKind) -> bool {
        if start >= end {
            return false;
        }
        let mut overlapping = Vec::new();
        self.tree.collect_overlapping(start, end, &mut overlapping);
        overlapping.retain(|r| r.attr.kind() == kind);
        if overlapping.is_empty() {
            return false;
        }
        self.tree
            .retain(|r| !(r.attr.kind() == kind && r.overlaps(start, end)));
        // Re-add the parts that stick out of the removal span.
        for range in overlapping {
            if range.range.start < start {
                self.tree
                    .insert(FormatRange::new(range.range.start..start, range.attr.clone()));
            }
            if range.range.end > end {
                self.tree
                    .insert(FormatRange::new(end..range.range.end, range.attr));
            }
        }
        true
    }

    /// Remove all formatting over `[start, end)`, splitting partial
    /// overlaps.
    pub fn clear_formats(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        let mut overlapping = Vec::new();
        self.tree.collect_overlapping(start, end, &mut overlapping);
        self.tree.retain(|r| !r.overlaps(start, end));
        for range in overlapping {
            if range.range.start < start {
                self.tree
                    .insert(FormatRange::new(range.range.start..start, range.attr.clone()));
            }
            if range.range.end > end {
                self.tree
                    .insert(FormatRange::new(end..range.range.end, range.attr));
            }
        }
    }

    /// Remove every range in the layer.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Toggle `attr` over `[start, end)`: removed when the whole span
    /// already carries the attribute's kind, applied otherwise. Returns
    /// `true` when the span ends up formatted.
    pub fn toggle_format(&mut self, start: usize, end: usize, attr: Attribute) -> Result<bool, Error> {
        if start >= end {
            return Err(Error::invalid_range(start, end, end));
        }
        let kind = attr.kind();
        if self.has_format_in_range(start, end, kind) {
            self.remove_format(start, end, kind);
            Ok(false)
        } else {
            self.add_format(start, end, attr)?;
            Ok(true)
        }
    }

    /// All attributes active at `position`.
    pub fn formats_at(&self, position: usize) -> Vec<FormatRange> {
        let mut out = Vec::new();
        self.tree.collect_at(position, &mut out);
        out
    }

    /// All ranges overlapping `[start, end)`.
    pub fn formats_in_range(&self, start: usize, end: usize) -> Vec<FormatRange> {
        let mut out = Vec::new();
        self.tree.collect_overlapping(start, end, &mut out);
        out
    }

    /// The merged visual style at `position`.
    pub fn merged_style_at(&self, position: usize) -> RunStyle {
        let ranges = self.formats_at(position);
        RunStyle::from_attrs(ranges.iter().map(|r| &r.attr))
    }

    /// Returns `true` if some range of `kind` covers `position`.
    pub fn has_format_at(&self, position: usize, kind: AttributeKind) -> bool {
        self.formats_at(position)
            .iter()
            .any(|r| r.attr.kind() == kind)
    }

    /// Returns `true` if ranges of `kind` jointly cover all of
    /// `[start, end)`.
    pub fn has_format_in_range(&self, start: usize, end: usize, kind: AttributeKind) -> bool {
        let mut ranges: Vec<_> = self
            .formats_in_range(start, end)
            .into_iter()
            .filter(|r| r.attr.kind() == kind)
            .collect();
        if ranges.is_empty() {
            return false;
        }
        ranges.sort_by_key(|r| r.range.start);
        let mut covered_to = start;
        for range in ranges {
            if range.range.start > covered_to {
                return false;
            }
            covered_to = covered_to.max(range.range.end);
            if covered_to >= end {
                return true;
            }
        }
        false
    }

    /// React to `len` bytes inserted at `position`.
    ///
    /// Ranges wholly before are untouched; ranges at or after shift by
    /// `+len`; ranges straddling the point are split so the inserted text
    /// carries no formatting.
    pub fn on_text_inserted(&mut self, position: usize, len: usize) {
        if len == 0 {
            return;
        }
        // Pull out straddlers first; the blanket shift below must not see them.
        let mut straddling: Vec<FormatRange> = self
            .formats_at(position)
            .into_iter()
            .filter(|r| r.range.start < position && r.range.end > position)
            .collect();
        if !straddling.is_empty() {
            self.tree
                .retain(|r| !(r.range.start < position && r.range.end > position));
        }
        self.tree.shift(position, len as isize);
        for range in straddling.drain(..) {
            self.tree
                .insert(FormatRange::new(range.range.start..position, range.attr.clone()));
            self.tree
                .insert(FormatRange::new(position + len..range.range.end + len, range.attr));
        }
    }

    /// React to `len` bytes deleted at `position`.
    ///
    /// Ranges fully inside the deleted span are removed; partial overlaps
    /// are truncated; later ranges shift by `-len`.
    pub fn on_text_deleted(&mut self, position: usize, len: usize) {
        if len == 0 {
            return;
        }
        let delete_end = position + len;
        self.tree
            .retain(|r| !(r.range.start >= position && r.range.end <= delete_end));
        self.tree.shift(position, -(len as isize));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn bold(layer: &FormatLayer, position: usize) -> bool {
        layer.has_format_at(position, AttributeKind::Bold)
    }

    #[test]
    fn add_and_query() {
        let mut layer = FormatLayer::new();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        layer.add_format(8, 14, Attribute::Italic).unwrap();

        assert!(bold(&layer, 5));
        assert!(bold(&layer, 9));
        assert!(!bold(&layer, 10));
        let at_nine = layer.formats_at(9);
        assert_eq!(at_nine.len(), 2);
        let style = layer.merged_style_at(9);
        assert!(style.bold && style.italic);
        assert!(layer.formats_in_range(0, 5).is_empty());
        assert_eq!(layer.formats_in_range(9, 11).len(), 2);
    }

    #[test]
    fn same_attribute_never_duplicated() {
        let mut layer = FormatLayer::new();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        layer.add_format(8, 12, Attribute::Bold).unwrap();
        let ranges = layer.formats_in_range(0, 20);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range, 5..12);
    }

    #[test]
    fn insert_splits_straddling_range() {
        // [5,10) bold, insert 3 at 7 -> [5,7) and [10,13),
        // inserted [7,10) unformatted.
        let mut layer = FormatLayer::new();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        layer.on_text_inserted(7, 3);

        let mut ranges = layer.formats_in_range(0, 20);
        ranges.sort_by_key(|r| r.range.start);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].range, 5..7);
        assert_eq!(ranges[1].range, 10..13);
        assert!(!bold(&layer, 7));
        assert!(!bold(&layer, 9));
        assert!(bold(&layer, 10));
    }

    #[test]
    fn insert_at_boundaries_does_not_split() {
        let mut layer = FormatLayer::new();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        // At the start: the whole range shifts, insertion stays plain.
        layer.on_text_inserted(5, 2);
        let ranges = layer.formats_in_range(0, 20);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range, 7..12);
        // At the end: nothing moves.
        layer.on_text_inserted(12, 2);
        let ranges = layer.formats_in_range(0, 20);
        assert_eq!(ranges[0].range, 7..12);
    }

    #[test]
    fn delete_shrinks_straddling_range() {
        // [5,10) bold, delete [6,9) -> [5,7) bold.
        let mut layer = FormatLayer::new();
        layer.add_format(5, 10, Attribute::Bold).unwrap();
        layer.on_text_deleted(6, 3);

        let ranges = layer.formats_in_range(0, 20);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range, 5..7);
    }

    #[test]
    fn delete_removes_contained_and_shifts_later() {
        let mut layer = FormatLayer::new();
        layer.add_format(5, 8, Attribute::Bold).unwrap();
        layer.add_format(20, 25, Attribute::Italic).unwrap();
        layer.on_text_deleted(4, 6);

        let ranges = layer.formats_in_range(0, 30);
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].range, 14..19);
        assert_eq!(ranges[0].attr, Attribute::Italic);
    }

    #[test]
    fn remove_format_trims_partial_overlap() {
        let mut layer = FormatLayer::new();
        layer.add_format(0, 20, Attribute::Bold).unwrap();
        layer.add_format(0, 20, Attribute::Italic).unwrap();
        assert!(layer.remove_format(5, 10, AttributeKind::Bold));

        let mut bold_ranges: Vec<_> = layer
            .formats_in_range(0, 30)
            .into_iter()
            .filter(|r| r.attr.kind() == AttributeKind::Bold)
            .collect();
        bold_ranges.sort_by_key(|r| r.range.start);
        assert_eq!(bold_ranges.len(), 2);
        assert_eq!(bold_ranges[0].range, 0..5);
        assert_eq!(bold_ranges[1].range, 10..20);
        // Italic untouched.
        assert!(layer.has_format_in_range(0, 20, AttributeKind::Italic));
        // Removing again reports nothing matched.
        assert!(!layer.remove_format(5, 10, AttributeKind::Bold));
    }

    #[test]
    fn toggle_round_trip() {
        let mut layer = FormatLayer::new();
        assert!(layer.toggle_format(3, 9, Attribute::Underline).unwrap());
        assert!(layer.has_format_in_range(3, 9, AttributeKind::Underline));
        assert!(!layer.toggle_format(3, 9, Attribute::Underline).unwrap());
        assert!(!layer.has_format_at(4, AttributeKind::Underline));
    }

    #[test]
    fn coverage_check_requires_full_span() {
        let mut layer = FormatLayer::new();
        layer.add_format(0, 4, Attribute::Bold).unwrap();
        layer.add_format(6, 10, Attribute::Bold).unwrap();
        assert!(!layer.has_format_in_range(0, 10, AttributeKind::Bold));
        layer.add_format(4, 6, Attribute::Bold).unwrap();
        assert!(layer.has_format_in_range(0, 10, AttributeKind::Bold));
    }

    #[test]
    fn value_attributes_coexist_with_flags() {
        let mut layer = FormatLayer::new();
        let red = peniko::Color::from_rgb8(255, 0, 0);
        layer.add_format(2, 8, Attribute::Color(red)).unwrap();
        layer.add_format(2, 8, Attribute::Bold).unwrap();
        let style = layer.merged_style_at(4);
        assert_eq!(style.color, Some(red));
        assert!(style.bold);
    }

    #[test]
    fn many_ranges_queries_stay_correct() {
        let mut layer = FormatLayer::new();
        for i in 0..200 {
            let start = i * 10;
            layer.add_format(start, start + 5, Attribute::Italic).unwrap();
        }
        assert_eq!(layer.range_count(), 200);
        assert_eq!(layer.formats_at(1003).len(), 1);
        assert!(layer.formats_at(1007).is_empty());
        assert_eq!(layer.formats_in_range(995, 1025).len(), 3);
        layer.on_text_deleted(0, 1000);
        // The first hundred ranges are gone, the rest shifted down.
        assert_eq!(layer.range_count(), 100);
        assert_eq!(layer.formats_at(3).len(), 1);
        let expected = vec![0..5];
        assert_eq!(
            layer
                .formats_in_range(0, 6)
                .iter()
                .map(|r| r.range.clone())
                .collect::<Vec<_>>(),
            expected
        );
    }
}
