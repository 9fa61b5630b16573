// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paragraph-indexed text storage with a cumulative height index.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::height_index::HeightIndex;
use crate::Error;

/// Validity of a paragraph's cached height.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum HeightState {
    /// The cached height is stale; the previous value is kept as the best
    /// available guess until layout runs again.
    Invalid,
    /// The height is a statistical estimate; layout has not run yet.
    #[default]
    Estimated,
    /// The height came from a computed layout.
    Valid,
}

/// Description of a structural mutation, returned by every buffer edit.
///
/// The engine routes this to the layout cache in the same logical step as
/// the mutation (format and annotation range shifts happen alongside), so
/// no reader can observe text that has changed without its layouts and
/// ranges having moved with it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StructuralChange {
    /// A paragraph was inserted at `index`.
    Inserted {
        /// Index of the new paragraph.
        index: usize,
        /// Document-global byte offset of the inserted span.
        offset: usize,
        /// Inserted byte length, including the paragraph break.
        len: usize,
    },
    /// The paragraph at `index` was removed.
    Removed {
        /// Index of the removed paragraph.
        index: usize,
        /// Document-global byte offset of the removed span.
        offset: usize,
        /// Removed byte length, including the paragraph break.
        len: usize,
    },
    /// The text of the paragraph at `index` was replaced.
    Edited {
        /// Index of the edited paragraph.
        index: usize,
        /// Document-global byte offset of the paragraph start.
        offset: usize,
        /// Byte length of the old text.
        old_len: usize,
        /// Byte length of the new text.
        new_len: usize,
    },
}

#[derive(Clone, Debug)]
struct Paragraph {
    text: String,
    height: f64,
    state: HeightState,
}

/// Paragraph-indexed text storage with an embedded cumulative height index.
///
/// Owns all paragraph text exclusively. Two Fenwick trees run alongside the
/// paragraph list: one over pixel heights (O(log n) `paragraph_y` /
/// `paragraph_at_y`) and one over byte lengths (O(log n) global-offset ↔
/// paragraph resolution). Document-global offsets count each paragraph as
/// its text length plus one byte for the terminating break, so
/// `char_len() == plain_text().len() + 1` for a non-empty document.
///
/// Heights start out as estimates derived from text length and a calibrated
/// average line height; the layout cache promotes them to measured values
/// via [`set_paragraph_height`](Self::set_paragraph_height).
#[derive(Clone, Debug)]
pub struct DocumentBuffer {
    paragraphs: Vec<Paragraph>,
    heights: HeightIndex<f64>,
    lengths: HeightIndex<usize>,
    line_height: f64,
    chars_per_line: usize,
    valid_count: usize,
}

impl Default for DocumentBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentBuffer {
    /// Default estimated line height in pixels, before calibration.
    pub const DEFAULT_LINE_HEIGHT: f64 = 18.0;

    /// Default estimated characters per wrapped line, before calibration.
    pub const DEFAULT_CHARS_PER_LINE: usize = 80;

    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            paragraphs: Vec::new(),
            heights: HeightIndex::new(),
            lengths: HeightIndex::new(),
            line_height: Self::DEFAULT_LINE_HEIGHT,
            chars_per_line: Self::DEFAULT_CHARS_PER_LINE,
            valid_count: 0,
        }
    }

    /// Create a buffer from plain text, splitting paragraphs on `\n`.
    pub fn from_plain_text(text: &str) -> Self {
        let mut buffer = Self::new();
        buffer.set_plain_text(text);
        buffer
    }

    // --- Text content ---

    /// Replace the whole document, splitting paragraphs on `\n`.
    ///
    /// All heights reset to estimates; the caller is responsible for
    /// clearing any layers and caches keyed to the old content.
    pub fn set_plain_text(&mut self, text: &str) {
        self.paragraphs = text
            .split('\n')
            .map(|line| Paragraph {
                text: line.to_string(),
                height: 0.0,
                state: HeightState::Estimated,
            })
            .collect();
        self.valid_count = 0;
        self.rebuild_indices();
    }

    /// The whole document as plain text, paragraphs joined with `\n`.
    pub fn plain_text(&self) -> String {
        let mut out = String::with_capacity(self.lengths.total());
        for (i, para) in self.paragraphs.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&para.text);
        }
        out
    }

    /// Returns `true` if the buffer holds no paragraphs.
    pub fn is_empty(&self) -> bool {
        self.paragraphs.is_empty()
    }

    /// Total document length in bytes, counting one break per paragraph.
    pub fn char_len(&self) -> usize {
        self.lengths.total()
    }

    // --- Paragraph access ---

    /// The number of paragraphs.
    pub fn paragraph_count(&self) -> usize {
        self.paragraphs.len()
    }

    /// The text of the paragraph at `index`.
    pub fn paragraph_text(&self, index: usize) -> Result<&str, Error> {
        self.paragraphs
            .get(index)
            .map(|p| p.text.as_str())
            .ok_or_else(|| Error::out_of_range(index, self.paragraphs.len()))
    }

    /// The byte length of the paragraph at `index`, excluding the break.
    pub fn paragraph_len(&self, index: usize) -> Result<usize, Error> {
        self.paragraphs
            .get(index)
            .map(|p| p.text.len())
            .ok_or_else(|| Error::out_of_range(index, self.paragraphs.len()))
    }

    /// Document-global byte offset of the start of paragraph `index`.
    pub fn offset_of_paragraph(&self, index: usize) -> Result<usize, Error> {
        if index >= self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        Ok(self.lengths.prefix_sum(index))
    }

    /// The paragraph containing the document-global byte offset `offset`,
    /// and the local offset within it. Offsets past the end resolve to the
    /// end of the last paragraph.
    pub fn paragraph_at_offset(&self, offset: usize) -> (usize, usize) {
        if self.paragraphs.is_empty() {
            return (0, 0);
        }
        let index = self.lengths.find_by_prefix(offset);
        let start = self.lengths.prefix_sum(index);
        let local = (offset - start).min(self.paragraphs[index].text.len());
        (index, local)
    }

    // --- Mutation ---

    /// Insert a paragraph at `index` (`0..=count`). Its height starts as an
    /// estimate.
    pub fn insert_paragraph(&mut self, index: usize, text: &str) -> Result<StructuralChange, Error> {
        if index > self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        let estimated = self.estimate_height(text);
        let len = text.len() + 1;
        self.paragraphs.insert(
            index,
            Paragraph {
                text: text.to_string(),
                height: estimated,
                state: HeightState::Estimated,
            },
        );
        self.heights.insert(index, estimated)?;
        self.lengths.insert(index, len)?;
        Ok(StructuralChange::Inserted {
            index,
            offset: self.lengths.prefix_sum(index),
            len,
        })
    }

    /// Remove the paragraph at `index`.
    pub fn remove_paragraph(&mut self, index: usize) -> Result<StructuralChange, Error> {
        if index >= self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        let offset = self.lengths.prefix_sum(index);
        let para = self.paragraphs.remove(index);
        if para.state == HeightState::Valid {
            self.valid_count -= 1;
        }
        self.heights.remove(index)?;
        let len = self.lengths.remove(index)?;
        Ok(StructuralChange::Removed { index, offset, len })
    }

    /// Replace the text of the paragraph at `index`. The cached height
    /// drops back to an estimate for the new text.
    pub fn set_paragraph_text(
        &mut self,
        index: usize,
        text: &str,
    ) -> Result<StructuralChange, Error> {
        if index >= self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        let offset = self.lengths.prefix_sum(index);
        let old_len = self.paragraphs[index].text.len();
        let estimated = self.estimate_height(text);
        {
            let para = &mut self.paragraphs[index];
            if para.state == HeightState::Valid {
                self.valid_count -= 1;
            }
            para.text = text.to_string();
            para.height = estimated;
            para.state = HeightState::Estimated;
        }
        self.heights.set(index, estimated)?;
        self.lengths.set(index, text.len() + 1)?;
        Ok(StructuralChange::Edited {
            index,
            offset,
            old_len,
            new_len: text.len(),
        })
    }

    // --- Heights ---

    /// Sum of all paragraph heights (estimated or measured).
    pub fn total_height(&self) -> f64 {
        self.heights.total()
    }

    /// The cached height of the paragraph at `index`.
    pub fn paragraph_height(&self, index: usize) -> Result<f64, Error> {
        self.heights.value(index)
    }

    /// The height validity of the paragraph at `index`.
    pub fn height_state(&self, index: usize) -> Result<HeightState, Error> {
        self.paragraphs
            .get(index)
            .map(|p| p.state)
            .ok_or_else(|| Error::out_of_range(index, self.paragraphs.len()))
    }

    /// Record a measured height for the paragraph at `index`, promoting it
    /// to [`HeightState::Valid`] and updating prefix sums in the same
    /// operation. Returns the previous cached height.
    pub fn set_paragraph_height(&mut self, index: usize, height: f64) -> Result<f64, Error> {
        let count = self.paragraphs.len();
        let para = self
            .paragraphs
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range(index, count))?;
        let old = para.height;
        if para.state != HeightState::Valid {
            self.valid_count += 1;
        }
        para.height = height;
        para.state = HeightState::Valid;
        self.heights.set(index, height)?;
        Ok(old)
    }

    /// Drop the paragraph's height back to a fresh estimate for its text.
    pub fn invalidate_height(&mut self, index: usize) -> Result<(), Error> {
        if index >= self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        let estimated = self.estimate_height(&self.paragraphs[index].text);
        let para = &mut self.paragraphs[index];
        if para.state == HeightState::Valid {
            self.valid_count -= 1;
        }
        para.height = estimated;
        para.state = HeightState::Estimated;
        self.heights.set(index, estimated)
    }

    /// Mark the paragraph's height stale without re-estimating.
    ///
    /// Used when only formatting or wrap width changed: the previous
    /// measured height is a better guess than a cold estimate.
    pub fn mark_height_stale(&mut self, index: usize) -> Result<(), Error> {
        let count = self.paragraphs.len();
        let para = self
            .paragraphs
            .get_mut(index)
            .ok_or_else(|| Error::out_of_range(index, count))?;
        if para.state == HeightState::Valid {
            self.valid_count -= 1;
        }
        para.state = HeightState::Invalid;
        Ok(())
    }

    /// Vertical offset of the top of paragraph `index`, O(log n).
    pub fn paragraph_y(&self, index: usize) -> Result<f64, Error> {
        if index >= self.paragraphs.len() {
            return Err(Error::out_of_range(index, self.paragraphs.len()));
        }
        Ok(self.heights.prefix_sum(index))
    }

    /// The paragraph containing vertical offset `y`, O(log n). Clamped to
    /// the last paragraph; 0 for an empty buffer.
    pub fn paragraph_at_y(&self, y: f64) -> usize {
        self.heights.find_by_prefix(y)
    }

    /// How many paragraphs currently hold a measured height.
    pub fn valid_height_count(&self) -> usize {
        self.valid_count
    }

    // --- Estimation ---

    /// Set the calibrated average line height used for estimates.
    pub fn set_estimated_line_height(&mut self, line_height: f64) {
        if line_height > 0.0 {
            self.line_height = line_height;
        }
    }

    /// The calibrated average line height.
    pub fn estimated_line_height(&self) -> f64 {
        self.line_height
    }

    /// Set the calibrated characters-per-wrapped-line used for estimates.
    pub fn set_estimated_chars_per_line(&mut self, chars: usize) {
        if chars > 0 {
            self.chars_per_line = chars;
        }
    }

    /// Estimate the height of `text` from its length and the calibrated
    /// line metrics. Always a whole multiple of the line height.
    pub fn estimate_height(&self, text: &str) -> f64 {
        if text.is_empty() {
            return self.line_height;
        }
        let chars = text.chars().count();
        let lines = chars.div_ceil(self.chars_per_line).max(1);
        lines as f64 * self.line_height
    }

    // --- Invariants ---

    /// Verify that both cumulative indices agree with the paragraph list.
    ///
    /// Returns `true` when consistent. On mismatch this is a bug upstream:
    /// debug builds assert; release callers should recover via
    /// [`ensure_indices`](Self::ensure_indices) and log the error.
    pub fn verify_indices(&self) -> bool {
        let ok = self.indices_consistent();
        debug_assert!(ok, "cumulative index out of sync with paragraph list");
        ok
    }

    /// Check both cumulative indices and rebuild them if out of sync.
    ///
    /// The returned error means the rebuild already happened; it carries
    /// the violation so the caller can log it.
    pub fn ensure_indices(&mut self) -> Result<(), Error> {
        if self.indices_consistent() {
            Ok(())
        } else {
            self.rebuild_indices();
            Err(Error::invariant_violation(self.paragraphs.len()))
        }
    }

    fn indices_consistent(&self) -> bool {
        let heights_ok = self.heights.is_consistent() && self.heights.len() == self.paragraphs.len();
        let lengths_ok = self.lengths.is_consistent()
            && self.lengths.len() == self.paragraphs.len()
            && self
                .paragraphs
                .iter()
                .enumerate()
                .all(|(i, p)| self.lengths.value(i) == Ok(p.text.len() + 1));
        heights_ok && lengths_ok
    }

    /// Rebuild both cumulative indices from the paragraph list.
    pub fn rebuild_indices(&mut self) {
        self.heights = HeightIndex::with_len(self.paragraphs.len(), 0.0);
        self.lengths = HeightIndex::with_len(self.paragraphs.len(), 0);
        for i in 0..self.paragraphs.len() {
            let estimate = self.estimate_height(&self.paragraphs[i].text);
            let para = &mut self.paragraphs[i];
            if para.state != HeightState::Valid {
                para.height = estimate;
            }
            let height = para.height;
            let len = para.text.len() + 1;
            // Indices were just resized to match, so these cannot fail.
            let _ = self.heights.set(i, height);
            let _ = self.lengths.set(i, len);
        }
    }
}
