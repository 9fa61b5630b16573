// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fenwick-tree cumulative index over per-paragraph values.

use alloc::vec;
use alloc::vec::Vec;

use crate::Error;

/// A value that can be summed by a [`HeightIndex`].
///
/// Implemented for `f64` (pixel heights) and `usize` (byte lengths). Values
/// must be non-negative; subtraction is only ever performed against a prefix
/// that already contains the subtrahend.
pub trait IndexSummand:
    Copy
    + Default
    + PartialOrd
    + core::ops::Add<Output = Self>
    + core::ops::Sub<Output = Self>
    + core::ops::AddAssign
    + core::ops::SubAssign
    + core::fmt::Debug
{
    /// Equality with the tolerance appropriate for the value type.
    ///
    /// Fenwick prefix sums accumulate in a different order than a straight
    /// scan, so floating-point sums need an epsilon here.
    fn sum_eq(self, other: Self) -> bool;
}

impl IndexSummand for f64 {
    fn sum_eq(self, other: Self) -> bool {
        (self - other).abs() < 1e-6
    }
}

impl IndexSummand for usize {
    fn sum_eq(self, other: Self) -> bool {
        self == other
    }
}

/// An array-backed Fenwick (binary indexed) tree keyed by paragraph index.
///
/// Each leaf holds one paragraph's contribution; `prefix_sum(i)` is the sum
/// of contributions of paragraphs `0..i` and is maintained through point
/// updates in O(log n). Structural insert/remove rebuilds the tree in O(n),
/// which is the rare path (text edits within a paragraph only touch `set`).
#[derive(Clone, Debug, Default)]
pub struct HeightIndex<T: IndexSummand> {
    values: Vec<T>,
    // 1-indexed Fenwick array, values.len() + 1 slots.
    tree: Vec<T>,
}

impl<T: IndexSummand> HeightIndex<T> {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            tree: vec![T::default()],
        }
    }

    /// Create an index of `len` leaves, each holding `value`.
    pub fn with_len(len: usize, value: T) -> Self {
        let mut index = Self {
            values: vec![value; len],
            tree: vec![T::default(); len + 1],
        };
        index.rebuild();
        index
    }

    /// The number of leaves.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the index has no leaves.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Remove all leaves.
    pub fn clear(&mut self) {
        self.values.clear();
        self.tree.clear();
        self.tree.push(T::default());
    }

    /// The value of leaf `index`.
    pub fn value(&self, index: usize) -> Result<T, Error> {
        self.values
            .get(index)
            .copied()
            .ok_or_else(|| Error::out_of_range(index, self.values.len()))
    }

    /// Replace the value of leaf `index`, updating prefix sums in O(log n).
    pub fn set(&mut self, index: usize, value: T) -> Result<(), Error> {
        let old = self.value(index)?;
        self.values[index] = value;
        if value >= old {
            self.add_to_tree(index, value - old);
        } else {
            self.sub_from_tree(index, old - value);
        }
        Ok(())
    }

    /// Sum of leaves `0..index`. An `index` past the end sums everything.
    pub fn prefix_sum(&self, index: usize) -> T {
        let mut i = index.min(self.values.len());
        let mut sum = T::default();
        while i > 0 {
            sum += self.tree[i];
            i -= lowbit(i);
        }
        sum
    }

    /// Sum of all leaves.
    pub fn total(&self) -> T {
        self.prefix_sum(self.values.len())
    }

    /// The index of the leaf whose cumulative span contains `target`, i.e.
    /// the largest `i` with `prefix_sum(i) <= target`, clamped to the last
    /// leaf. Returns 0 for an empty index.
    ///
    /// Binary descent through the Fenwick array, O(log n).
    pub fn find_by_prefix(&self, target: T) -> usize {
        if self.values.is_empty() || target <= T::default() {
            return 0;
        }

        let mut pos = 0;
        let mut sum = T::default();
        let mut bit = highest_bit(self.values.len());
        while bit > 0 {
            let next = pos + bit;
            if next < self.tree.len() && sum + self.tree[next] <= target {
                pos = next;
                sum += self.tree[next];
            }
            bit >>= 1;
        }

        // pos is the count of leaves wholly before target; clamp past-the-end.
        pos.min(self.values.len() - 1)
    }

    /// Insert a leaf at `index`, shifting later leaves up.
    pub fn insert(&mut self, index: usize, value: T) -> Result<(), Error> {
        if index > self.values.len() {
            return Err(Error::out_of_range(index, self.values.len()));
        }
        self.values.insert(index, value);
        self.tree = vec![T::default(); self.values.len() + 1];
        self.rebuild();
        Ok(())
    }

    /// Remove the leaf at `index`, shifting later leaves down.
    pub fn remove(&mut self, index: usize) -> Result<T, Error> {
        if index >= self.values.len() {
            return Err(Error::out_of_range(index, self.values.len()));
        }
        let removed = self.values.remove(index);
        self.tree = vec![T::default(); self.values.len() + 1];
        self.rebuild();
        Ok(removed)
    }

    /// Recompute the Fenwick array from the leaf values.
    pub fn rebuild(&mut self) {
        for slot in &mut self.tree {
            *slot = T::default();
        }
        for i in 0..self.values.len() {
            let v = self.values[i];
            self.add_to_tree(i, v);
        }
    }

    /// Verify that the Fenwick array agrees with the leaf values.
    ///
    /// O(n log n); intended for debug assertions and the release-mode
    /// recovery path, not for hot-path use.
    pub fn is_consistent(&self) -> bool {
        let mut running = T::default();
        for i in 0..self.values.len() {
            if !self.prefix_sum(i).sum_eq(running) {
                return false;
            }
            running += self.values[i];
        }
        self.total().sum_eq(running)
    }

    fn add_to_tree(&mut self, index: usize, delta: T) {
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] += delta;
            i += lowbit(i);
        }
    }

    fn sub_from_tree(&mut self, index: usize, delta: T) {
        let mut i = index + 1;
        while i < self.tree.len() {
            self.tree[i] -= delta;
            i += lowbit(i);
        }
    }
}

fn lowbit(x: usize) -> usize {
    x & x.wrapping_neg()
}

fn highest_bit(n: usize) -> usize {
    let mut bit = 1;
    while bit <= n {
        bit <<= 1;
    }
    bit >> 1
}
