// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Markup serialization: buffer and layers back to tagged text.

use std::collections::BTreeSet;

use folio_document::{
    AnnotationEntry, AnnotationLayer, AnnotationPayload, DocumentBuffer, FormatLayer, RunStyle,
};
use peniko::Color;

use super::lexer::{escape_attr, escape_text};

/// Serialize a document to tagged markup.
///
/// Output is one `<p>` per paragraph inside a `<doc>` root. Each paragraph
/// is segmented at every formatting or annotation boundary and tags are
/// opened and closed per segment, which keeps nesting proper even when
/// ranges overlap without nesting; the parser coalesces adjacent equal
/// ranges back together on load. Annotations spanning several paragraphs
/// are written once per paragraph under the same `id`.
pub fn serialize_markup(
    buffer: &DocumentBuffer,
    formats: &FormatLayer,
    annotations: &AnnotationLayer,
) -> String {
    let mut out = String::with_capacity(buffer.char_len() + 64);
    out.push_str("<doc>\n");
    for index in 0..buffer.paragraph_count() {
        write_paragraph(&mut out, buffer, formats, annotations, index);
    }
    out.push_str("</doc>\n");
    out
}

fn write_paragraph(
    out: &mut String,
    buffer: &DocumentBuffer,
    formats: &FormatLayer,
    annotations: &AnnotationLayer,
    index: usize,
) {
    let (Ok(text), Ok(start)) = (buffer.paragraph_text(index), buffer.offset_of_paragraph(index))
    else {
        return;
    };
    let end = start + text.len();

    // Split the paragraph at every position where the active formatting or
    // annotation set can change.
    let mut cuts = BTreeSet::new();
    cuts.insert(start);
    cuts.insert(end);
    for range in formats.formats_in_range(start, end + 1) {
        cuts.insert(range.range.start.clamp(start, end));
        cuts.insert(range.range.end.clamp(start, end));
    }
    let active: Vec<&AnnotationEntry> = annotations.annotations_in_range(start, end + 1);
    for entry in &active {
        cuts.insert(entry.range.start.clamp(start, end));
        cuts.insert(entry.range.end.clamp(start, end));
    }

    out.push_str("<p>");
    let positions: Vec<usize> = cuts.into_iter().collect();
    for (i, &pos) in positions.iter().enumerate() {
        for entry in &active {
            if entry.is_collapsed() && entry.range.start == pos {
                write_annotation_tag(out, entry, true);
            }
        }
        let Some(&next) = positions.get(i + 1) else {
            break;
        };

        let mut covering: Vec<&AnnotationEntry> = active
            .iter()
            .copied()
            .filter(|e| !e.is_collapsed() && e.range.start <= pos && e.range.end >= next)
            .collect();
        covering.sort_by_key(|e| (e.range.start, e.id));
        for entry in &covering {
            write_annotation_tag(out, entry, false);
        }

        let style = formats.merged_style_at(pos);
        let closers = write_format_tags(out, &style);

        escape_text(&text[pos - start..next - start], out);

        for closer in closers.iter().rev() {
            out.push_str(closer);
        }
        for entry in covering.iter().rev() {
            out.push_str("</");
            out.push_str(annotation_tag_name(entry));
            out.push('>');
        }
    }
    out.push_str("</p>\n");
}

/// Open the format tags for `style`, returning the closing tags in opening
/// order.
fn write_format_tags(out: &mut String, style: &RunStyle) -> Vec<&'static str> {
    let mut closers = Vec::new();
    if style.bold {
        out.push_str("<b>");
        closers.push("</b>");
    }
    if style.italic {
        out.push_str("<i>");
        closers.push("</i>");
    }
    if style.underline {
        out.push_str("<u>");
        closers.push("</u>");
    }
    if style.strikethrough {
        out.push_str("<s>");
        closers.push("</s>");
    }
    let has_span = style.font_family.is_some()
        || style.font_size.is_some()
        || style.color.is_some()
        || style.background.is_some()
        || !style.custom.is_empty();
    if has_span {
        out.push_str("<span");
        if let Some(family) = &style.font_family {
            write_attr(out, "family", family);
        }
        if let Some(size) = style.font_size {
            write_attr(out, "size", &format_number(size));
        }
        if let Some(color) = style.color {
            write_attr(out, "color", &color_hex(color));
        }
        if let Some(color) = style.background {
            write_attr(out, "background", &color_hex(color));
        }
        for (key, value) in &style.custom {
            write_attr(out, key, value);
        }
        out.push('>');
        closers.push("</span>");
    }
    closers
}

fn write_annotation_tag(out: &mut String, entry: &AnnotationEntry, self_closing: bool) {
    out.push('<');
    out.push_str(annotation_tag_name(entry));
    write_attr(out, "id", &entry.id.to_string());
    let extra = match &entry.payload {
        AnnotationPayload::Comment {
            text,
            author,
            resolved,
            extra,
        } => {
            write_attr(out, "author", author);
            write_attr(out, "resolved", bool_str(*resolved));
            write_attr(out, "text", text);
            extra
        }
        AnnotationPayload::Todo {
            label,
            completed,
            extra,
        } => {
            write_attr(out, "label", label);
            write_attr(out, "completed", bool_str(*completed));
            extra
        }
        AnnotationPayload::Footnote { reference, extra } => {
            write_attr(out, "ref", reference);
            extra
        }
    };
    for (key, value) in extra {
        write_attr(out, key, value);
    }
    out.push_str(if self_closing { "/>" } else { ">" });
}

fn annotation_tag_name(entry: &AnnotationEntry) -> &'static str {
    match entry.payload {
        AnnotationPayload::Comment { .. } => "comment",
        AnnotationPayload::Todo { .. } => "todo",
        AnnotationPayload::Footnote { .. } => "footnote",
    }
}

fn write_attr(out: &mut String, name: &str, value: &str) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    escape_attr(value, out);
    out.push('"');
}

fn bool_str(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

fn format_number(value: f64) -> String {
    // Sizes are usually whole points; keep them clean in the output.
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn color_hex(color: Color) -> String {
    let rgba = color.to_rgba8();
    if rgba.a == 255 {
        format!("#{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b)
    } else {
        format!("#{:02x}{:02x}{:02x}{:02x}", rgba.r, rgba.g, rgba.b, rgba.a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_document::Attribute;

    fn doc(text: &str) -> DocumentBuffer {
        DocumentBuffer::from_plain_text(text)
    }

    #[test]
    fn plain_paragraphs() {
        let buffer = doc("first\nsecond");
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &AnnotationLayer::new());
        assert_eq!(markup, "<doc>\n<p>first</p>\n<p>second</p>\n</doc>\n");
    }

    #[test]
    fn escapes_reserved_characters() {
        let buffer = doc("a < b && c");
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &AnnotationLayer::new());
        assert_eq!(markup, "<doc>\n<p>a &lt; b &amp;&amp; c</p>\n</doc>\n");
    }

    #[test]
    fn bold_run_is_wrapped() {
        let buffer = doc("plain bold");
        let mut formats = FormatLayer::new();
        formats.add_format(6, 10, Attribute::Bold).unwrap();
        let markup = serialize_markup(&buffer, &formats, &AnnotationLayer::new());
        assert_eq!(markup, "<doc>\n<p>plain <b>bold</b></p>\n</doc>\n");
    }

    #[test]
    fn overlapping_formats_segment_cleanly() {
        // bold [0,6), italic [4,8): segments 0..4 b, 4..6 b+i, 6..8 i.
        let buffer = doc("abcdefgh");
        let mut formats = FormatLayer::new();
        formats.add_format(0, 6, Attribute::Bold).unwrap();
        formats.add_format(4, 8, Attribute::Italic).unwrap();
        let markup = serialize_markup(&buffer, &formats, &AnnotationLayer::new());
        assert_eq!(
            markup,
            "<doc>\n<p><b>abcd</b><b><i>ef</i></b><i>gh</i></p>\n</doc>\n"
        );
    }

    #[test]
    fn span_attributes() {
        let buffer = doc("red");
        let mut formats = FormatLayer::new();
        formats
            .add_format(0, 3, Attribute::Color(Color::from_rgb8(255, 0, 0)))
            .unwrap();
        formats.add_format(0, 3, Attribute::FontSize(24.0)).unwrap();
        let markup = serialize_markup(&buffer, &formats, &AnnotationLayer::new());
        assert_eq!(
            markup,
            "<doc>\n<p><span size=\"24\" color=\"#ff0000\">red</span></p>\n</doc>\n"
        );
    }

    #[test]
    fn unknown_span_attributes_are_reemitted() {
        let buffer = doc("hej");
        let mut formats = FormatLayer::new();
        formats
            .add_format(
                0,
                3,
                Attribute::Custom {
                    name: "lang".into(),
                    value: "sv".into(),
                },
            )
            .unwrap();
        let markup = serialize_markup(&buffer, &formats, &AnnotationLayer::new());
        assert_eq!(markup, "<doc>\n<p><span lang=\"sv\">hej</span></p>\n</doc>\n");
    }

    #[test]
    fn comment_wrapper_with_attrs() {
        let buffer = doc("see this here");
        let mut annotations = AnnotationLayer::new();
        let id = annotations.add_comment(4, 8, "why?", "ann").unwrap();
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &annotations);
        let expected = format!(
            "<doc>\n<p>see <comment id=\"{id}\" author=\"ann\" resolved=\"false\" text=\"why?\">this</comment> here</p>\n</doc>\n"
        );
        assert_eq!(markup, expected);
    }

    #[test]
    fn collapsed_marker_is_self_closing() {
        let buffer = doc("abcd");
        let mut annotations = AnnotationLayer::new();
        let id = annotations
            .add(2, 2, AnnotationPayload::Todo {
                label: "here".into(),
                completed: false,
                extra: Vec::new(),
            })
            .unwrap();
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &annotations);
        let expected = format!(
            "<doc>\n<p>ab<todo id=\"{id}\" label=\"here\" completed=\"false\"/>cd</p>\n</doc>\n"
        );
        assert_eq!(markup, expected);
    }

    #[test]
    fn multi_paragraph_annotation_written_per_paragraph() {
        let buffer = doc("abc\ndef");
        let mut annotations = AnnotationLayer::new();
        // Covers "bc\nde" (offsets 1..6 with the break at 3).
        let id = annotations.add_footnote(1, 6, "note").unwrap();
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &annotations);
        let expected = format!(
            "<doc>\n<p>a<footnote id=\"{id}\" ref=\"note\">bc</footnote></p>\n<p><footnote id=\"{id}\" ref=\"note\">de</footnote>f</p>\n</doc>\n"
        );
        assert_eq!(markup, expected);
    }

    #[test]
    fn extra_attributes_survive() {
        let buffer = doc("x");
        let mut annotations = AnnotationLayer::new();
        let id = annotations
            .add(0, 1, AnnotationPayload::Comment {
                text: "t".into(),
                author: "a".into(),
                resolved: false,
                extra: vec![("due".into(), "friday".into())],
            })
            .unwrap();
        let markup = serialize_markup(&buffer, &FormatLayer::new(), &annotations);
        assert!(markup.contains(&format!(
            "<comment id=\"{id}\" author=\"a\" resolved=\"false\" text=\"t\" due=\"friday\">"
        )));
    }
}
