// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Anchored annotations: comments, TODO markers, footnotes.

use alloc::string::String;
use alloc::vec::Vec;
use core::ops::Range;

use crate::Error;

/// Stable identity of one annotation, unique within its layer for the
/// lifetime of the document.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnnotationId(u64);

impl AnnotationId {
    /// The raw numeric value, for serialization.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The content carried by an annotation.
///
/// Each variant keeps an `extra` list of attribute key/value pairs it does
/// not understand, so documents written by newer tools survive a load/save
/// cycle here without losing data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AnnotationPayload {
    /// A reviewer comment on the anchored text.
    Comment {
        /// The comment body.
        text: String,
        /// Who left the comment.
        author: String,
        /// Whether the comment thread has been resolved.
        resolved: bool,
        /// Unrecognized attributes, preserved verbatim.
        extra: Vec<(String, String)>,
    },
    /// A task marker on the anchored text.
    Todo {
        /// Short task label.
        label: String,
        /// Whether the task is done.
        completed: bool,
        /// Unrecognized attributes, preserved verbatim.
        extra: Vec<(String, String)>,
    },
    /// A footnote anchor.
    Footnote {
        /// The footnote body text.
        reference: String,
        /// Unrecognized attributes, preserved verbatim.
        extra: Vec<(String, String)>,
    },
}

/// One annotation anchored to a byte range of the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AnnotationEntry {
    /// Stable identity within the layer.
    pub id: AnnotationId,
    /// Anchored byte range in document-global offsets. May be empty when
    /// the anchored text was deleted; see [`AnnotationEntry::is_collapsed`].
    pub range: Range<usize>,
    /// The annotation content.
    pub payload: AnnotationPayload,
}

impl AnnotationEntry {
    /// Returns `true` if the anchored text has been deleted out from under
    /// the annotation, leaving a zero-length marker.
    pub fn is_collapsed(&self) -> bool {
        self.range.start >= self.range.end
    }
}

/// Store of annotations anchored to document ranges.
///
/// Entries are kept sorted by range start. Annotation counts are small next
/// to format ranges (tens to hundreds, not thousands), so queries walk the
/// vector; edit adjustment is a single pass either way.
///
/// Unlike format ranges, an annotation is a single unit of content and
/// cannot be split: text inserted inside its anchor extends the anchor, and
/// deleting the whole anchor collapses the annotation to a zero-length
/// marker at the deletion point rather than discarding it.
#[derive(Debug, Default)]
pub struct AnnotationLayer {
    entries: Vec<AnnotationEntry>,
    next_id: u64,
}

impl AnnotationLayer {
    /// Create an empty layer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of annotations, collapsed markers included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the layer holds no annotations.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Anchor a comment to `[start, end)`.
    pub fn add_comment(
        &mut self,
        start: usize,
        end: usize,
        text: impl Into<String>,
        author: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        self.add(
            start,
            end,
            AnnotationPayload::Comment {
                text: text.into(),
                author: author.into(),
                resolved: false,
                extra: Vec::new(),
            },
        )
    }

    /// Anchor a task marker to `[start, end)`.
    pub fn add_todo(
        &mut self,
        start: usize,
        end: usize,
        label: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        self.add(
            start,
            end,
            AnnotationPayload::Todo {
                label: label.into(),
                completed: false,
                extra: Vec::new(),
            },
        )
    }

    /// Anchor a footnote to `[start, end)`.
    pub fn add_footnote(
        &mut self,
        start: usize,
        end: usize,
        reference: impl Into<String>,
    ) -> Result<AnnotationId, Error> {
        self.add(
            start,
            end,
            AnnotationPayload::Footnote {
                reference: reference.into(),
                extra: Vec::new(),
            },
        )
    }

    /// Anchor an arbitrary payload to `[start, end)`. Zero-length anchors
    /// are allowed (collapsed markers round-trip through serialization).
    pub fn add(
        &mut self,
        start: usize,
        end: usize,
        payload: AnnotationPayload,
    ) -> Result<AnnotationId, Error> {
        if start > end {
            return Err(Error::invalid_range(start, end, end));
        }
        let id = AnnotationId(self.next_id);
        self.next_id += 1;
        let entry = AnnotationEntry {
            id,
            range: start..end,
            payload,
        };
        let at = self
            .entries
            .partition_point(|e| e.range.start <= start);
        self.entries.insert(at, entry);
        Ok(id)
    }

    /// Remove the annotation with `id`. Returns `false` if absent.
    pub fn remove(&mut self, id: AnnotationId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Remove every annotation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Look up one annotation by id.
    pub fn get(&self, id: AnnotationId) -> Option<&AnnotationEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// All annotations, sorted by anchor start.
    pub fn iter(&self) -> impl Iterator<Item = &AnnotationEntry> {
        self.entries.iter()
    }

    /// Annotations whose anchor overlaps `[start, end)`. Collapsed markers
    /// match when their position falls inside the range.
    pub fn annotations_in_range(&self, start: usize, end: usize) -> Vec<&AnnotationEntry> {
        self.entries
            .iter()
            .filter(|e| {
                if e.is_collapsed() {
                    start <= e.range.start && e.range.start < end
                } else {
                    e.range.start < end && e.range.end > start
                }
            })
            .collect()
    }

    /// Annotations whose anchor covers `position`.
    pub fn annotations_at(&self, position: usize) -> Vec<&AnnotationEntry> {
        self.entries
            .iter()
            .filter(|e| e.range.start <= position && position < e.range.end)
            .collect()
    }

    /// Mark a comment resolved or unresolved. Returns `false` if `id` is
    /// absent or not a comment.
    pub fn resolve_comment(&mut self, id: AnnotationId, resolved: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(AnnotationEntry {
                payload: AnnotationPayload::Comment { resolved: r, .. },
                ..
            }) => {
                *r = resolved;
                true
            }
            _ => false,
        }
    }

    /// Mark a task complete or incomplete. Returns `false` if `id` is
    /// absent or not a task.
    pub fn complete_todo(&mut self, id: AnnotationId, completed: bool) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(AnnotationEntry {
                payload: AnnotationPayload::Todo { completed: c, .. },
                ..
            }) => {
                *c = completed;
                true
            }
            _ => false,
        }
    }

    /// React to `len` bytes inserted at `position`.
    ///
    /// An anchor straddling the insertion point grows to cover the new
    /// text; anchors at or after the point shift by `+len`.
    pub fn on_text_inserted(&mut self, position: usize, len: usize) {
        if len == 0 {
            return;
        }
        for entry in &mut self.entries {
            if entry.range.start >= position && !(entry.is_collapsed() && entry.range.start == position) {
                entry.range.start += len;
                entry.range.end += len;
            } else if entry.range.end > position {
                entry.range.end += len;
            }
        }
    }

    /// React to `len` bytes deleted at `position`.
    ///
    /// An anchor whose text is entirely deleted collapses to a zero-length
    /// marker at the deletion point; partial overlaps are truncated and
    /// later anchors shift by `-len`.
    pub fn on_text_deleted(&mut self, position: usize, len: usize) {
        if len == 0 {
            return;
        }
        let delete_end = position + len;
        for entry in &mut self.entries {
            let clamp = |offset: usize| {
                if offset <= position {
                    offset
                } else if offset >= delete_end {
                    offset - len
                } else {
                    position
                }
            };
            entry.range.start = clamp(entry.range.start);
            entry.range.end = clamp(entry.range.end);
        }
        // Clamping keeps start <= end, so no re-sort is needed, but entries
        // may now be collapsed; they stay in the layer as markers.
        debug_assert!(self
            .entries
            .windows(2)
            .all(|w| w[0].range.start <= w[1].range.start));
    }
}
