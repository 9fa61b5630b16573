// Copyright 2025 the Folio Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Round-trip tests for the tagged document format.

use folio_engine::document::{AnnotationPayload, Attribute};
use folio_engine::{parse_markup, serialize_markup, MarkupDocument};
use peniko::Color;

fn round_trip(doc: &MarkupDocument) -> MarkupDocument {
    let markup = serialize_markup(&doc.buffer, &doc.formats, &doc.annotations);
    parse_markup(&markup).unwrap_or_else(|e| panic!("re-parse failed: {e}\n{markup}"))
}

/// Per-character formatting must be identical after a save/load cycle, even
/// though range boundaries may be cut differently.
fn assert_same_styles(a: &MarkupDocument, b: &MarkupDocument) {
    assert_eq!(a.buffer.plain_text(), b.buffer.plain_text());
    for offset in 0..a.buffer.char_len() {
        assert_eq!(
            a.formats.merged_style_at(offset),
            b.formats.merged_style_at(offset),
            "style diverged at offset {offset}"
        );
    }
}

fn assert_same_annotations(a: &MarkupDocument, b: &MarkupDocument) {
    let left: Vec<_> = a.annotations.iter().map(|e| (e.range.clone(), e.payload.clone())).collect();
    let right: Vec<_> = b.annotations.iter().map(|e| (e.range.clone(), e.payload.clone())).collect();
    assert_eq!(left, right);
}

#[test]
fn formatted_document_round_trips() {
    let source = concat!(
        "<doc>\n",
        "<p>The <b>quick</b> brown <i>fox</i> jumps</p>\n",
        "<p><b><i>over</i></b> the <u>lazy</u> <s>dog</s></p>\n",
        "<p>plain closing paragraph</p>\n",
        "</doc>\n",
    );
    let doc = parse_markup(source).unwrap();
    let again = round_trip(&doc);
    assert_same_styles(&doc, &again);
    assert_same_annotations(&doc, &again);
}

#[test]
fn span_values_round_trip() {
    let source = concat!(
        "<doc>\n",
        "<p><span color=\"#ff0000\">red</span> and ",
        "<span background=\"#00ff0080\" family=\"Iosevka\" size=\"13.5\">marked</span></p>\n",
        "</doc>\n",
    );
    let doc = parse_markup(source).unwrap();
    let style = doc.formats.merged_style_at(0);
    assert_eq!(style.color, Some(Color::from_rgb8(255, 0, 0)));
    let style = doc.formats.merged_style_at(9);
    assert_eq!(style.font_family.as_deref(), Some("Iosevka"));
    assert_eq!(style.font_size, Some(13.5));

    let again = round_trip(&doc);
    assert_same_styles(&doc, &again);
}

#[test]
fn overlapping_formats_survive_re_segmentation() {
    // Build overlapping (non-nested) ranges directly, then save and load.
    let doc = parse_markup("<doc><p>abcdefghij</p></doc>").unwrap();
    let mut doc = doc;
    doc.formats.add_format(0, 6, Attribute::Bold).unwrap();
    doc.formats.add_format(4, 10, Attribute::Italic).unwrap();
    doc.formats.add_format(2, 8, Attribute::Underline).unwrap();

    let again = round_trip(&doc);
    assert_same_styles(&doc, &again);
}

#[test]
fn annotations_round_trip_with_payloads() {
    let mut doc = parse_markup("<doc><p>alpha beta gamma</p><p>delta</p></doc>").unwrap();
    let c = doc.annotations.add_comment(0, 5, "intro?", "reviewer").unwrap();
    doc.annotations.resolve_comment(c, true);
    doc.annotations.add_todo(6, 10, "tighten wording").unwrap();
    doc.annotations.add_footnote(11, 16, "gamma ray source").unwrap();

    let again = round_trip(&doc);
    assert_same_styles(&doc, &again);
    assert_same_annotations(&doc, &again);
}

#[test]
fn multi_paragraph_annotation_round_trips() {
    let mut doc = parse_markup("<doc><p>first paragraph</p><p>second one</p></doc>").unwrap();
    // Anchor spans the paragraph break: "paragraph\nsecond".
    doc.annotations.add_comment(6, 21, "spans the break", "x").unwrap();

    let again = round_trip(&doc);
    assert_eq!(again.annotations.len(), 1);
    assert_same_annotations(&doc, &again);
}

#[test]
fn collapsed_markers_round_trip() {
    let mut doc = parse_markup("<doc><p>some text</p></doc>").unwrap();
    doc.annotations
        .add(4, 4, AnnotationPayload::Todo {
            label: "resume here".into(),
            completed: false,
            extra: vec![],
        })
        .unwrap();

    let again = round_trip(&doc);
    let entry = again.annotations.iter().next().unwrap();
    assert!(entry.is_collapsed());
    assert_eq!(entry.range, 4..4);
}

#[test]
fn unknown_annotation_attributes_survive() {
    let source = "<doc>\n<p><comment id=\"0\" author=\"a\" resolved=\"false\" text=\"t\" priority=\"high\" due=\"2026-01-01\">x</comment></p>\n</doc>\n";
    let doc = parse_markup(source).unwrap();
    let markup = serialize_markup(&doc.buffer, &doc.formats, &doc.annotations);
    assert!(markup.contains("priority=\"high\""), "{markup}");
    assert!(markup.contains("due=\"2026-01-01\""), "{markup}");
    let again = parse_markup(&markup).unwrap();
    assert_same_annotations(&doc, &again);
}

#[test]
fn unknown_span_attributes_survive() {
    let source = "<doc>\n<p><span lang=\"sv\">hej</span> world</p>\n</doc>\n";
    let doc = parse_markup(source).unwrap();
    let saved = serialize_markup(&doc.buffer, &doc.formats, &doc.annotations);
    assert_eq!(saved, source);
    let again = parse_markup(&saved).unwrap();
    assert_same_styles(&doc, &again);
}

#[test]
fn escaping_round_trips() {
    let mut doc = parse_markup("<doc><p>seed</p></doc>").unwrap();
    doc.buffer.set_plain_text("a < b && \"c\" > d");
    doc.annotations
        .add_comment(0, 5, "uses <angle> & \"quotes\"", "a&b")
        .unwrap();
    let again = round_trip(&doc);
    assert_eq!(again.buffer.plain_text(), "a < b && \"c\" > d");
    assert_same_annotations(&doc, &again);
}

#[test]
fn serialization_is_stable() {
    // A second save of a loaded document is byte-identical.
    let mut doc = parse_markup("<doc><p>stable output check</p></doc>").unwrap();
    doc.formats.add_format(0, 6, Attribute::Bold).unwrap();
    doc.annotations.add_todo(7, 13, "verify").unwrap();

    let first = serialize_markup(&doc.buffer, &doc.formats, &doc.annotations);
    let reloaded = parse_markup(&first).unwrap();
    let second = serialize_markup(&reloaded.buffer, &reloaded.formats, &reloaded.annotations);
    assert_eq!(first, second);
}

#[test]
fn malformed_inputs_report_location() {
    let err = parse_markup("<doc>\n<p>fine</p>\n<p>broken").unwrap_err();
    assert_eq!(err.line(), 3);
    assert!(err.offset() > 0);

    let err = parse_markup("<doc><p>a <b>b</i> c</p></doc>").unwrap_err();
    assert!(err.message().contains("</b>"), "{}", err.message());
}
