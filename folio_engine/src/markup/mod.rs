// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The tagged document format.
//!
//! A document is a `<doc>` element holding one `<p>` per paragraph. Inside a
//! paragraph, formatting is expressed with `<b>`, `<i>`, `<u>`, `<s>` and
//! `<span>` (value attributes: `color`, `background`, `family`, `size`), and
//! annotations with `<comment>`, `<todo>` and `<footnote>` wrapper tags whose
//! element content is the anchored text. Zero-length annotation markers are
//! written as self-closing tags.
//!
//! An annotation spanning several paragraphs is written once per paragraph
//! with the same `id`; the parser merges those pieces back into one anchor.
//! Unrecognized attributes on annotation tags are preserved and written back
//! on save; unrecognized elements are skipped, keeping their text.

mod lexer;
mod parser;
mod serializer;

use folio_document::{AnnotationLayer, DocumentBuffer, FormatLayer};

pub use parser::parse_markup;
pub use serializer::serialize_markup;

/// A parsed document: buffer plus both positional layers, with all ranges
/// already in document-global offsets.
#[derive(Debug)]
pub struct MarkupDocument {
    /// The paragraph text.
    pub buffer: DocumentBuffer,
    /// Character formatting.
    pub formats: FormatLayer,
    /// Comments, tasks, and footnotes.
    pub annotations: AnnotationLayer,
}

/// A syntax error in markup input, located for diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarkupError {
    message: String,
    offset: usize,
    line: usize,
    column: usize,
}

impl MarkupError {
    pub(crate) fn new(message: impl Into<String>, offset: usize, line: usize, column: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            line,
            column,
        }
    }

    /// Human-readable description of what went wrong.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Byte offset into the input.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// One-based line number.
    pub fn line(&self) -> usize {
        self.line
    }

    /// One-based column number, in characters.
    pub fn column(&self) -> usize {
        self.column
    }
}

impl core::fmt::Display for MarkupError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{} at line {}, column {}",
            self.message, self.line, self.column
        )
    }
}

impl std::error::Error for MarkupError {}
