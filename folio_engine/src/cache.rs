// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! LRU cache of per-paragraph layouts.

use core::ops::Range;

use hashbrown::HashMap;

use crate::layout::ParagraphLayout;

struct Entry {
    layout: ParagraphLayout,
    last_used: u64,
}

/// Counters for cache behavior, used by instrumentation and tests.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Layouts computed because they were absent.
    pub computed: usize,
    /// Lookups served from the cache.
    pub hits: usize,
    /// Entries dropped by capacity pressure or trimming.
    pub evictions: usize,
}

/// An LRU cache of [`ParagraphLayout`]s keyed by paragraph index.
///
/// The cache is the laziness mechanism of the engine: only paragraphs the
/// viewport (plus its buffer zone) actually asks for are ever laid out, and
/// a logical clock stamped on each access drives least-recently-used
/// eviction once `capacity` is exceeded.
///
/// Keys are paragraph indices, so structural edits must be reported through
/// [`on_paragraph_inserted`](Self::on_paragraph_inserted) and
/// [`on_paragraph_removed`](Self::on_paragraph_removed) to keep keys
/// aligned with the buffer.
pub struct LayoutCache {
    entries: HashMap<usize, Entry>,
    capacity: usize,
    clock: u64,
    stats: CacheStats,
}

impl core::fmt::Debug for LayoutCache {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayoutCache")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("stats", &self.stats)
            .finish()
    }
}

impl LayoutCache {
    /// Create a cache holding at most `capacity` paragraph layouts.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// The maximum number of cached layouts.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of cached layouts.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if a layout for `index` is cached.
    pub fn contains(&self, index: usize) -> bool {
        self.entries.contains_key(&index)
    }

    /// The cached layout for `index`, if any, refreshing its LRU stamp.
    pub fn get(&mut self, index: usize) -> Option<&ParagraphLayout> {
        self.clock += 1;
        let clock = self.clock;
        match self.entries.get_mut(&index) {
            Some(entry) => {
                entry.last_used = clock;
                self.stats.hits += 1;
                Some(&entry.layout)
            }
            None => None,
        }
    }

    /// The layout for `index`, computing and caching it on a miss.
    pub fn get_or_compute(
        &mut self,
        index: usize,
        compute: impl FnOnce() -> ParagraphLayout,
    ) -> &ParagraphLayout {
        self.clock += 1;
        let clock = self.clock;
        if !self.entries.contains_key(&index) {
            self.stats.computed += 1;
            let layout = compute();
            self.entries.insert(
                index,
                Entry {
                    layout,
                    last_used: clock,
                },
            );
            self.evict_over_capacity(index);
        } else {
            self.stats.hits += 1;
        }
        let entry = self
            .entries
            .get_mut(&index)
            .unwrap_or_else(|| unreachable!("entry inserted above"));
        entry.last_used = clock;
        &entry.layout
    }

    /// Drop the cached layout for `index`. Returns `false` if absent.
    pub fn invalidate(&mut self, index: usize) -> bool {
        self.entries.remove(&index).is_some()
    }

    /// Drop every cached layout whose paragraph index falls in `range`.
    /// Returns the number of layouts dropped.
    pub fn invalidate_range(&mut self, range: Range<usize>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&key, _| !range.contains(&key));
        before - self.entries.len()
    }

    /// Drop every cached layout.
    pub fn invalidate_all(&mut self) {
        tracing::debug!(dropped = self.entries.len(), "layout cache cleared");
        self.entries.clear();
    }

    /// Remap keys after a paragraph was inserted at `index`: cached layouts
    /// at or after it move up by one.
    pub fn on_paragraph_inserted(&mut self, index: usize) {
        self.remap(|key| Some(if key >= index { key + 1 } else { key }));
    }

    /// Remap keys after the paragraph at `index` was removed: its layout is
    /// dropped and later ones move down by one.
    pub fn on_paragraph_removed(&mut self, index: usize) {
        self.remap(|key| {
            use core::cmp::Ordering::*;
            match key.cmp(&index) {
                Less => Some(key),
                Equal => None,
                Greater => Some(key - 1),
            }
        });
    }

    /// Drop every cached layout outside `keep`, regardless of recency.
    ///
    /// This is the buffer-zone release pass: after a scroll settles, the
    /// engine keeps the visible range plus its buffer and releases the
    /// rest.
    pub fn trim_to(&mut self, keep: Range<usize>) {
        let before = self.entries.len();
        self.entries.retain(|&key, _| keep.contains(&key));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::trace!(dropped, ?keep, "trimmed layout cache to viewport");
            self.stats.evictions += dropped;
        }
    }

    /// Counters accumulated since construction or the last
    /// [`reset_stats`](Self::reset_stats).
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Zero the counters.
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }

    fn remap(&mut self, map: impl Fn(usize) -> Option<usize>) {
        let mut remapped = HashMap::with_capacity(self.entries.len());
        for (key, entry) in self.entries.drain() {
            if let Some(new_key) = map(key) {
                remapped.insert(new_key, entry);
            }
        }
        self.entries = remapped;
    }

    fn evict_over_capacity(&mut self, just_inserted: usize) {
        while self.entries.len() > self.capacity {
            let Some(&victim) = self
                .entries
                .iter()
                .filter(|(&key, _)| key != just_inserted)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key)
            else {
                break;
            };
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            tracing::trace!(paragraph = victim, "evicted least recently used layout");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    use crate::layout::Line;

    fn layout(height: f64) -> ParagraphLayout {
        ParagraphLayout {
            lines: smallvec![Line {
                range: 0..0,
                y: 0.0,
                height,
                width: 0.0,
            }],
            height,
            width: 0.0,
        }
    }

    #[test]
    fn miss_computes_once() {
        let mut cache = LayoutCache::new(8);
        let first = cache.get_or_compute(3, || layout(10.0)).height;
        let second = cache
            .get_or_compute(3, || unreachable!("must be cached"))
            .height;
        assert_eq!(first, second);
        assert_eq!(cache.stats().computed, 1);
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn lru_eviction_order() {
        let mut cache = LayoutCache::new(2);
        cache.get_or_compute(0, || layout(1.0));
        cache.get_or_compute(1, || layout(2.0));
        // Touch 0 so 1 is the least recently used.
        cache.get(0);
        cache.get_or_compute(2, || layout(3.0));
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let mut cache = LayoutCache::new(8);
        cache.get_or_compute(5, || layout(10.0));
        assert!(cache.invalidate(5));
        assert!(!cache.invalidate(5));
        cache.get_or_compute(5, || layout(12.0));
        assert_eq!(cache.stats().computed, 2);
    }

    #[test]
    fn invalidate_range_drops_only_window() {
        let mut cache = LayoutCache::new(16);
        for i in 0..8 {
            cache.get_or_compute(i, || layout(1.0));
        }
        assert_eq!(cache.invalidate_range(2..5), 3);
        assert!(cache.contains(1));
        assert!(!cache.contains(2));
        assert!(!cache.contains(4));
        assert!(cache.contains(5));
        assert_eq!(cache.invalidate_range(2..5), 0);
    }

    #[test]
    fn structural_remapping() {
        let mut cache = LayoutCache::new(8);
        cache.get_or_compute(0, || layout(1.0));
        cache.get_or_compute(1, || layout(2.0));
        cache.get_or_compute(2, || layout(3.0));

        cache.on_paragraph_inserted(1);
        assert!(cache.contains(0));
        assert!(!cache.contains(1));
        assert!(cache.contains(2));
        assert!(cache.contains(3));

        cache.on_paragraph_removed(2);
        assert!(cache.contains(0));
        assert!(cache.contains(2));
        assert!(!cache.contains(3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn trim_to_keeps_only_window() {
        let mut cache = LayoutCache::new(100);
        for i in 0..50 {
            cache.get_or_compute(i, || layout(1.0));
        }
        cache.trim_to(10..20);
        assert_eq!(cache.len(), 10);
        assert!(cache.contains(10));
        assert!(cache.contains(19));
        assert!(!cache.contains(9));
        assert!(!cache.contains(20));
        assert_eq!(cache.stats().evictions, 40);
    }
}
