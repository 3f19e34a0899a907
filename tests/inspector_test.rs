//! Integration tests for structural inspection.

mod common;

use common::{document_with_pages, page_id, pdf_with_pages, text_page};
use lopdf::{dictionary, Document, Object, Stream, StringFormat};
use pdfremedy::{
    inspect_bytes, parse_instructions, remediate, to_json, Error, InspectOptions, Inspector,
    InterpretOptions, JsonFormat,
};
use sha2::{Digest, Sha256};

fn save(doc: &mut Document) -> Vec<u8> {
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn literal(text: &str) -> Object {
    Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
}

/// A one-page document whose page also uses an embedded TrueType `/F2`.
fn embedded_font_pdf() -> Vec<u8> {
    let mut doc = document_with_pages(&["BT /F2 12 Tf 72 700 Td (AB) Tj ET"]);
    let program = doc.add_object(Stream::new(
        dictionary! { "Length1" => 8 },
        b"\x00\x01\x00\x00\x00\x00\x00\x00".to_vec(),
    ));
    let descriptor = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => "Subset+Body",
        "Flags" => 32,
        "FontFile2" => program,
    });
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "TrueType",
        "BaseFont" => "Subset+Body",
        "FirstChar" => 65,
        "LastChar" => 66,
        "Widths" => vec![Object::Integer(600), Object::Integer(600)],
        "FontDescriptor" => descriptor,
    });
    let page = page_id(&doc, 1);
    doc.get_dictionary_mut(page)
        .unwrap()
        .get_mut(b"Resources")
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .get_mut(b"Font")
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("F2", font);
    save(&mut doc)
}

#[test]
fn test_untagged_document() {
    let bytes = pdf_with_pages(&[&text_page(&[(700.0, "Hello")]), ""]);
    let report = inspect_bytes(&bytes).unwrap();

    assert_eq!(report.document.page_count, 2);
    assert_eq!(report.document.pdf_version, "1.7");
    assert_eq!(report.document.file_size_bytes, bytes.len() as u64);
    assert_eq!(report.document.file_hash, hex::encode(Sha256::digest(&bytes)));
    assert!(!report.document.tagged);
    assert!(!report.document.has_struct_tree_root);
    assert!(report.structure_tree.is_none());
    assert!(report.outlines.is_empty());

    let page = report.page(1).unwrap();
    assert_eq!(page.fonts_used, vec!["F1"]);
    assert_eq!(page.content_operators.len(), 1);
    assert!(page.mcids.is_empty());

    assert_eq!(report.fonts.len(), 1);
    let font = &report.fonts[0];
    assert_eq!(font.base_font, "Helvetica");
    assert!(!font.embedded);
    assert!(!font.has_to_unicode);
}

#[test]
fn test_font_repair_is_visible_in_report() {
    let set = parse_instructions(
        r#"
version: "1.0"
fonts:
  - op: write_tounicode
    font: F1
    page: 1
    mappings:
      72: H
      105: i
"#,
        None,
    )
    .unwrap();
    let input = pdf_with_pages(&[&text_page(&[(700.0, "Hi")])]);
    let output = remediate(&input, &set, InterpretOptions::default()).unwrap();
    let report = inspect_bytes(&output).unwrap();

    let font = &report.fonts[0];
    assert!(font.has_to_unicode);
    let to_unicode = font.to_unicode.as_ref().unwrap();
    assert_eq!(to_unicode.mapping_count, 2);
    assert!(to_unicode.valid);
    assert!(!to_unicode.maps_notdef);
}

#[test]
fn test_font_program_digest_and_hex() {
    let bytes = embedded_font_pdf();

    let report = inspect_bytes(&bytes).unwrap();
    let font = report
        .fonts
        .iter()
        .find(|f| f.base_font == "Subset+Body")
        .unwrap();
    assert!(font.embedded);
    assert_eq!(font.resource_names, vec!["F2"]);
    let program = font.font_program.as_ref().unwrap();
    assert_eq!(program.key, "FontFile2");
    assert_eq!(program.length, 8);
    assert_eq!(
        program.sha256,
        hex::encode(Sha256::digest(b"\x00\x01\x00\x00\x00\x00\x00\x00"))
    );
    assert!(program.raw_hex.is_none());
    assert!(!to_json(&report, JsonFormat::Compact).unwrap().contains("rawHex"));

    let with_programs = Inspector::new(InspectOptions::default().with_font_programs(true))
        .inspect(&bytes)
        .unwrap();
    let font = with_programs
        .fonts
        .iter()
        .find(|f| f.base_font == "Subset+Body")
        .unwrap();
    assert_eq!(
        font.font_program.as_ref().unwrap().raw_hex.as_deref(),
        Some("0001000000000000")
    );
}

#[test]
fn test_outline_with_explicit_destination() {
    let mut doc = document_with_pages(&["", ""]);
    let second = page_id(&doc, 2);
    let outlines = doc.new_object_id();
    let item = doc.add_object(dictionary! {
        "Title" => literal("Appendix"),
        "Parent" => outlines,
        "Dest" => vec![Object::Reference(second), Object::Name(b"Fit".to_vec())],
    });
    doc.objects.insert(
        outlines,
        Object::Dictionary(dictionary! {
            "Type" => "Outlines",
            "First" => item,
            "Last" => item,
            "Count" => 1,
        }),
    );
    let catalog = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    doc.get_dictionary_mut(catalog)
        .unwrap()
        .set("Outlines", outlines);

    let report = inspect_bytes(&save(&mut doc)).unwrap();
    assert_eq!(report.outlines.len(), 1);
    assert_eq!(report.outlines[0].title, "Appendix");
    assert_eq!(report.outlines[0].page, Some(2));
    assert!(!report.outlines[0].has_structure_element);
}

#[test]
fn test_json_uses_camel_case() {
    let bytes = pdf_with_pages(&[&text_page(&[(700.0, "Hello")])]);
    let report = inspect_bytes(&bytes).unwrap();

    let pretty = to_json(&report, JsonFormat::Pretty).unwrap();
    let compact = to_json(&report, JsonFormat::Compact).unwrap();
    assert!(pretty.len() > compact.len());
    for key in [
        "\"pageCount\"",
        "\"fileHash\"",
        "\"hasStructTreeRoot\"",
        "\"contentOperators\"",
        "\"colorPairs\"",
        "\"contrastRatio\"",
    ] {
        assert!(compact.contains(key), "missing {}", key);
    }

    let value: serde_json::Value = serde_json::from_str(&compact).unwrap();
    assert_eq!(value["pages"][0]["contentOperators"][0]["text"], "Hello");
}

#[test]
fn test_operator_listing_can_be_disabled() {
    let bytes = pdf_with_pages(&[&text_page(&[(700.0, "Hello")])]);
    let report = Inspector::new(
        InspectOptions::default()
            .with_content_operators(false)
            .with_color_pairs(false),
    )
    .inspect(&bytes)
    .unwrap();

    assert!(report.pages[0].content_operators.is_empty());
    assert!(report.color_pairs.is_empty());
    assert_eq!(report.pages[0].fonts_used, vec!["F1"]);
}

#[test]
fn test_rejects_non_pdf_input() {
    assert!(matches!(inspect_bytes(b"not a pdf"), Err(Error::UnknownFormat)));
}
