// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Markup parsing: tokens to a [`MarkupDocument`].

use folio_document::{
    AnnotationLayer, AnnotationPayload, Attribute, DocumentBuffer, FormatLayer,
};
use hashbrown::HashMap;
use peniko::Color;

use super::lexer::{Lexer, Token};
use super::{MarkupDocument, MarkupError};

enum Frame {
    Doc,
    Para,
    Format {
        name: String,
        attrs: Vec<Attribute>,
        start: usize,
    },
    Annotation {
        name: String,
        key: String,
    },
    // Unrecognized element: transparent inside a paragraph, opaque outside.
    Unknown {
        name: String,
    },
}

struct PendingAnnotation {
    payload: AnnotationPayload,
    start: usize,
    end: usize,
    order: usize,
}

/// Parse a tagged document.
///
/// The result's format and annotation ranges are in document-global byte
/// offsets matching the returned buffer.
pub fn parse_markup(input: &str) -> Result<MarkupDocument, MarkupError> {
    Parser::new(input).run()
}

struct Parser<'a> {
    lexer: Lexer<'a>,
    frames: Vec<Frame>,
    paragraphs: Vec<String>,
    current: Option<String>,
    offset: usize,
    formats: FormatLayer,
    pending: HashMap<String, PendingAnnotation>,
    next_order: usize,
    saw_doc: bool,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lexer: Lexer::new(input),
            frames: Vec::new(),
            paragraphs: Vec::new(),
            current: None,
            offset: 0,
            formats: FormatLayer::new(),
            pending: HashMap::new(),
            next_order: 0,
            saw_doc: false,
        }
    }

    fn run(mut self) -> Result<MarkupDocument, MarkupError> {
        while let Some(token) = self.lexer.next_token()? {
            match token {
                Token::Text(text) => self.on_text(&text)?,
                Token::StartTag {
                    name,
                    attrs,
                    self_closing,
                } => self.on_start_tag(name, attrs, self_closing)?,
                Token::EndTag { name } => self.on_end_tag(&name)?,
            }
        }
        if let Some(frame) = self.frames.last() {
            let name = frame_name(frame);
            return Err(self.lexer.error(format!("unclosed '<{name}>' at end of input")));
        }
        if !self.saw_doc {
            return Err(self.lexer.error("expected a '<doc>' root element"));
        }

        let mut buffer = DocumentBuffer::new();
        if self.paragraphs.is_empty() {
            buffer.set_plain_text("");
        } else {
            for (i, text) in self.paragraphs.iter().enumerate() {
                // Indices grow with the loop, so this cannot fail.
                let _ = buffer.insert_paragraph(i, text);
            }
        }

        let mut annotations = AnnotationLayer::new();
        let mut pending: Vec<PendingAnnotation> = self.pending.drain().map(|(_, p)| p).collect();
        pending.sort_by_key(|p| (p.start, p.order));
        for entry in pending {
            // Ranges were produced by the cursor, so start <= end holds.
            let _ = annotations.add(entry.start, entry.end, entry.payload);
        }

        Ok(MarkupDocument {
            buffer,
            formats: self.formats,
            annotations,
        })
    }

    fn in_paragraph(&self) -> bool {
        self.current.is_some()
    }

    fn on_text(&mut self, text: &str) -> Result<(), MarkupError> {
        if let Some(current) = &mut self.current {
            current.push_str(text);
            self.offset += text.len();
            return Ok(());
        }
        // Inside an unrecognized element outside any paragraph, text is
        // dropped with the element; elsewhere only whitespace may appear
        // between tags.
        let inside_unknown = matches!(self.frames.last(), Some(Frame::Unknown { .. }));
        if !inside_unknown && !text.chars().all(char::is_whitespace) {
            return Err(self.lexer.error("text outside a '<p>' element"));
        }
        Ok(())
    }

    fn on_start_tag(
        &mut self,
        name: String,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    ) -> Result<(), MarkupError> {
        match name.as_str() {
            "doc" => {
                if self.saw_doc || !self.frames.is_empty() {
                    return Err(self.lexer.error("'<doc>' must be the single root element"));
                }
                self.saw_doc = true;
                if !self_closing {
                    self.frames.push(Frame::Doc);
                }
            }
            "p" => {
                if !matches!(self.frames.last(), Some(Frame::Doc)) {
                    return Err(self.lexer.error("'<p>' must be a direct child of '<doc>'"));
                }
                self.current = Some(String::new());
                if self_closing {
                    self.finish_paragraph();
                } else {
                    self.frames.push(Frame::Para);
                }
            }
            "b" | "i" | "u" | "s" | "span" => {
                if !self.in_paragraph() {
                    return Err(self
                        .lexer
                        .error(format!("'<{name}>' is only valid inside '<p>'")));
                }
                let attrs = self.format_attrs(&name, attrs)?;
                // A self-closing format tag covers no text; drop it.
                if !self_closing {
                    self.frames.push(Frame::Format {
                        name,
                        attrs,
                        start: self.offset,
                    });
                }
            }
            "comment" | "todo" | "footnote" => {
                if !self.in_paragraph() {
                    return Err(self
                        .lexer
                        .error(format!("'<{name}>' is only valid inside '<p>'")));
                }
                let key = self.record_annotation(&name, attrs);
                if !self_closing {
                    self.frames.push(Frame::Annotation { name, key });
                }
            }
            _ => {
                if !self_closing {
                    self.frames.push(Frame::Unknown { name });
                }
            }
        }
        Ok(())
    }

    fn on_end_tag(&mut self, name: &str) -> Result<(), MarkupError> {
        let Some(frame) = self.frames.pop() else {
            return Err(self.lexer.error(format!("unmatched '</{name}>'")));
        };
        let expected = frame_name(&frame);
        if expected != name {
            return Err(self
                .lexer
                .error(format!("expected '</{expected}>', found '</{name}>'")));
        }
        match frame {
            Frame::Doc | Frame::Unknown { .. } => {}
            Frame::Para => self.finish_paragraph(),
            Frame::Format { attrs, start, .. } => {
                for attr in attrs {
                    if start < self.offset {
                        // The range is non-empty and ordered, so this holds.
                        let _ = self.formats.add_format(start, self.offset, attr);
                    }
                }
            }
            Frame::Annotation { key, .. } => {
                if let Some(pending) = self.pending.get_mut(&key) {
                    pending.end = pending.end.max(self.offset);
                }
            }
        }
        Ok(())
    }

    fn finish_paragraph(&mut self) {
        if let Some(text) = self.current.take() {
            self.paragraphs.push(text);
            // Account for the paragraph break.
            self.offset += 1;
        }
    }

    fn format_attrs(
        &self,
        name: &str,
        attrs: Vec<(String, String)>,
    ) -> Result<Vec<Attribute>, MarkupError> {
        match name {
            "b" => Ok(vec![Attribute::Bold]),
            "i" => Ok(vec![Attribute::Italic]),
            "u" => Ok(vec![Attribute::Underline]),
            "s" => Ok(vec![Attribute::Strikethrough]),
            "span" => {
                let mut out = Vec::new();
                for (key, value) in attrs {
                    match key.as_str() {
                        "color" => out.push(Attribute::Color(self.parse_color(&value)?)),
                        "background" => out.push(Attribute::Background(self.parse_color(&value)?)),
                        "family" => out.push(Attribute::FontFamily(value)),
                        "size" => {
                            let size: f64 = value.parse().map_err(|_| {
                                self.lexer.error(format!("invalid size '{value}'"))
                            })?;
                            out.push(Attribute::FontSize(size));
                        }
                        // Unrecognized span attributes are carried through
                        // uninterpreted and re-emitted on save.
                        _ => out.push(Attribute::Custom { name: key, value }),
                    }
                }
                Ok(out)
            }
            _ => unreachable!("format_attrs called for '{name}'"),
        }
    }

    fn parse_color(&self, value: &str) -> Result<Color, MarkupError> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        let parse_byte = |s: &str| u8::from_str_radix(s, 16).ok();
        let parsed = match hex.len() {
            6 => Some((
                parse_byte(&hex[0..2]),
                parse_byte(&hex[2..4]),
                parse_byte(&hex[4..6]),
                Some(255),
            )),
            8 => Some((
                parse_byte(&hex[0..2]),
                parse_byte(&hex[2..4]),
                parse_byte(&hex[4..6]),
                parse_byte(&hex[6..8]),
            )),
            _ => None,
        };
        match parsed {
            Some((Some(r), Some(g), Some(b), Some(a))) => Ok(Color::from_rgba8(r, g, b, a)),
            _ => Err(self.lexer.error(format!("invalid color '{value}'"))),
        }
    }

    fn record_annotation(&mut self, name: &str, attrs: Vec<(String, String)>) -> String {
        let mut id = None;
        let mut author = String::new();
        let mut text = String::new();
        let mut label = String::new();
        let mut reference = String::new();
        let mut resolved = false;
        let mut completed = false;
        let mut extra = Vec::new();
        for (key, value) in attrs {
            match (name, key.as_str()) {
                (_, "id") => id = Some(value),
                ("comment", "author") => author = value,
                ("comment", "text") => text = value,
                ("comment", "resolved") => resolved = parse_bool(&value),
                ("todo", "label") => label = value,
                ("todo", "completed") => completed = parse_bool(&value),
                ("footnote", "ref") => reference = value,
                _ => extra.push((key, value)),
            }
        }
        // Pieces without an id cannot merge across paragraphs; give each a
        // key no real id can collide with.
        let key = match id {
            Some(id) => format!("id:{id}"),
            None => format!("anon:{}", self.next_order),
        };
        if let Some(pending) = self.pending.get_mut(&key) {
            // A later piece of a multi-paragraph annotation: widen only.
            pending.start = pending.start.min(self.offset);
            pending.end = pending.end.max(self.offset);
            return key;
        }
        let payload = match name {
            "comment" => AnnotationPayload::Comment {
                text,
                author,
                resolved,
                extra,
            },
            "todo" => AnnotationPayload::Todo {
                label,
                completed,
                extra,
            },
            _ => AnnotationPayload::Footnote { reference, extra },
        };
        self.pending.insert(
            key.clone(),
            PendingAnnotation {
                payload,
                start: self.offset,
                end: self.offset,
                order: self.next_order,
            },
        );
        self.next_order += 1;
        key
    }
}

fn frame_name(frame: &Frame) -> &str {
    match frame {
        Frame::Doc => "doc",
        Frame::Para => "p",
        Frame::Format { name, .. }
        | Frame::Annotation { name, .. }
        | Frame::Unknown { name } => name,
    }
}

fn parse_bool(value: &str) -> bool {
    value == "true" || value == "1"
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_document::AttributeKind;

    #[test]
    fn plain_paragraphs() {
        let doc = parse_markup("<doc>\n<p>first</p>\n<p>second</p>\n</doc>\n").unwrap();
        assert_eq!(doc.buffer.paragraph_count(), 2);
        assert_eq!(doc.buffer.paragraph_text(0).unwrap(), "first");
        assert_eq!(doc.buffer.paragraph_text(1).unwrap(), "second");
        assert_eq!(doc.formats.range_count(), 0);
        assert!(doc.annotations.is_empty());
    }

    #[test]
    fn empty_document_is_one_empty_paragraph() {
        let doc = parse_markup("<doc></doc>").unwrap();
        assert_eq!(doc.buffer.paragraph_count(), 1);
        assert_eq!(doc.buffer.paragraph_text(0).unwrap(), "");
    }

    #[test]
    fn format_ranges_use_global_offsets() {
        let doc = parse_markup("<doc><p>plain <b>bold</b></p><p><i>lean</i></p></doc>").unwrap();
        let bold = doc.formats.formats_in_range(0, 100);
        let bold: Vec<_> = bold
            .iter()
            .filter(|r| r.attr.kind() == AttributeKind::Bold)
            .collect();
        assert_eq!(bold.len(), 1);
        assert_eq!(bold[0].range, 6..10);
        // Second paragraph starts at offset 11.
        let italic: Vec<_> = doc
            .formats
            .formats_in_range(0, 100)
            .into_iter()
            .filter(|r| r.attr.kind() == AttributeKind::Italic)
            .collect();
        assert_eq!(italic[0].range, 11..15);
    }

    #[test]
    fn nested_and_span_formats() {
        let doc = parse_markup(
            r##"<doc><p><b>bo<i>th</i></b> <span color="#ff0000" size="24">big red</span></p></doc>"##,
        )
        .unwrap();
        assert!(doc.formats.has_format_in_range(0, 4, AttributeKind::Bold));
        assert!(doc.formats.has_format_in_range(2, 4, AttributeKind::Italic));
        assert!(!doc.formats.has_format_at(1, AttributeKind::Italic));
        let style = doc.formats.merged_style_at(6);
        assert_eq!(style.color, Some(Color::from_rgb8(255, 0, 0)));
        assert_eq!(style.font_size, Some(24.0));
    }

    #[test]
    fn unknown_span_attributes_are_preserved() {
        let doc =
            parse_markup(r#"<doc><p><span lang="sv" size="18">hej</span></p></doc>"#).unwrap();
        let style = doc.formats.merged_style_at(1);
        assert_eq!(style.font_size, Some(18.0));
        assert_eq!(
            style.custom,
            vec![("lang".to_string(), "sv".to_string())]
        );
    }

    #[test]
    fn annotations_with_attrs() {
        let doc = parse_markup(
            r#"<doc><p>see <comment id="7" author="ann" resolved="true" text="check" due="friday">this</comment></p></doc>"#,
        )
        .unwrap();
        assert_eq!(doc.annotations.len(), 1);
        let entry = doc.annotations.iter().next().unwrap();
        assert_eq!(entry.range, 4..8);
        match &entry.payload {
            AnnotationPayload::Comment {
                text,
                author,
                resolved,
                extra,
            } => {
                assert_eq!(text, "check");
                assert_eq!(author, "ann");
                assert!(resolved);
                assert_eq!(extra, &[("due".to_string(), "friday".to_string())]);
            }
            other => panic!("wrong payload: {other:?}"),
        }
    }

    #[test]
    fn collapsed_marker_round_trips() {
        let doc =
            parse_markup(r#"<doc><p>ab<todo id="1" label="here"/>cd</p></doc>"#).unwrap();
        let entry = doc.annotations.iter().next().unwrap();
        assert_eq!(entry.range, 2..2);
        assert!(entry.is_collapsed());
    }

    #[test]
    fn multi_paragraph_annotation_merges_by_id() {
        let doc = parse_markup(
            r#"<doc><p>a<comment id="9" author="x" text="t">bc</comment></p><p><comment id="9" author="x" text="t">de</comment>f</p></doc>"#,
        )
        .unwrap();
        assert_eq!(doc.annotations.len(), 1);
        // "abc\nde f": piece one covers 1..3, piece two 4..6; the merged
        // anchor spans the paragraph break.
        assert_eq!(doc.annotations.iter().next().unwrap().range, 1..6);
    }

    #[test]
    fn unknown_elements_are_transparent_in_paragraphs() {
        let doc =
            parse_markup(r#"<doc><meta version="2">ignored</meta><p>a<wavy>b</wavy>c</p></doc>"#)
                .unwrap();
        assert_eq!(doc.buffer.paragraph_text(0).unwrap(), "abc");
    }

    #[test]
    fn escaped_text_decodes() {
        let doc = parse_markup("<doc><p>a &lt; b &amp;&amp; c &gt; d</p></doc>").unwrap();
        assert_eq!(doc.buffer.paragraph_text(0).unwrap(), "a < b && c > d");
    }

    #[test]
    fn structural_errors_are_located() {
        let err = parse_markup("<doc><p>one</doc>").unwrap_err();
        assert!(err.message().contains("</p>"), "got: {}", err.message());
        assert_eq!(err.line(), 1);

        assert!(parse_markup("<p>no root</p>").is_err());
        assert!(parse_markup("<doc><p>open</p>").is_err());
        assert!(parse_markup("<doc>stray</doc>").is_err());
        assert!(parse_markup("<doc><p><b>x</p></b></doc>").is_err());
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(parse_markup(r##"<doc><p><span color="#zz0000">x</span></p></doc>"##).is_err());
        assert!(parse_markup(r#"<doc><p><span size="wide">x</span></p></doc>"#).is_err());
    }
}
