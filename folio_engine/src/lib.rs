// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layout, viewport, and rendering engine for Folio documents.
//!
//! This crate sits on top of [`folio_document`] and turns its paragraph
//! buffer into pixels: a lazy per-paragraph layout cache driven by the
//! viewport, scroll and resize handling, dirty-region tracking for
//! incremental repaints, and the tagged markup import/export format.
//!
//! Text measurement goes through the [`TextMetrics`] trait so the engine
//! can be driven by a real shaping stack or, in tests and headless use, by
//! fixed-advance metrics.
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod cache;
mod engine;
mod layout;
mod markup;
mod render;
mod viewport;

pub use crate::cache::{CacheStats, LayoutCache};
pub use crate::engine::{DocumentEngine, EditOutcome};
pub use crate::layout::{
    hit_test, layout_paragraph, offset_x, FixedMetrics, Line, ParagraphLayout, TextMetrics,
    DEFAULT_FONT_SIZE,
};
pub use crate::markup::{parse_markup, serialize_markup, MarkupDocument, MarkupError};
pub use crate::render::{
    Appearance, DirtyRegion, PaintSurface, Position, RenderEngine, Selection,
};
pub use crate::viewport::{ViewportChange, ViewportManager, DEFAULT_BUFFER_ZONE};

pub use folio_document as document;
