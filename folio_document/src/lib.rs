// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Document storage for a long-document rich-text editor.
//!
//! This crate holds the paragraph-indexed text buffer with its cumulative
//! height index, plus the two positional layers stacked on top of it: the
//! format layer (character-range attributes) and the annotation layer
//! (comments, TODO markers, footnote anchors). Layout and painting live in
//! `folio_engine`; everything here is pure data and index maintenance.
//!
//! ## Features
//!
//! - `std` (enabled by default): passes `std` through to `peniko`.
//! - `libm`: math fallback for `no_std` targets.
// These lints shouldn't apply to examples or tests.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
// These lints shouldn't apply to examples.
#![warn(clippy::print_stdout, clippy::print_stderr)]
// Targeting e.g. 32-bit means structs containing usize can give false positives for 64-bit.
#![cfg_attr(target_pointer_width = "64", warn(clippy::trivially_copy_pass_by_ref))]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

extern crate alloc;

mod annotation;
mod attribute;
mod buffer;
mod error;
mod format;
mod height_index;

pub use crate::annotation::{
    AnnotationEntry, AnnotationId, AnnotationLayer, AnnotationPayload,
};
pub use crate::attribute::{Attribute, AttributeKind, FormatRange, RunStyle};
pub use crate::buffer::{DocumentBuffer, HeightState, StructuralChange};
pub use crate::error::{Error, ErrorKind};
pub use crate::format::FormatLayer;
pub use crate::height_index::{HeightIndex, IndexSummand};
