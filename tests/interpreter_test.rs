//! End-to-end tests for applying instruction sets to documents.

mod common;

use common::{contains, load, page_operators, pdf_with_pages, text_page};
use lopdf::dictionary;
use pdfremedy::content::OperatorKind;
use pdfremedy::{
    inspect_bytes, parse_instructions, remediate, BboxOrigin, Error, InterpretOptions, Remedy,
};

fn report_pages() -> Vec<u8> {
    let first = format!(
        "{}\nBT /F1 24 Tf 72 700 Td (Annual Report) Tj ET\n\
         BT /F1 18 Tf 72 650 Td (Overview) Tj ET\n\
         BT /F1 14 Tf 72 600 Td (Details) Tj ET\n\
         BT /F1 12 Tf 72 550 Td (Revenue grew in every quarter.) Tj ET",
        text_page(&[(30.0, "Page 1")])
    );
    pdf_with_pages(&[&first, ""])
}

const INSTRUCTIONS: &str = r#"
version: "1.0"
metadata:
  language: en-US
  title: Annual Report
  display_doc_title: true
  mark_info: true
  pdfua_identifier: 1
  tab_order: S
structure:
  role: Document
  children:
    - id: h1
      role: H1
    - id: h2
      role: H2
    - id: h3
      role: H3
      actual_text: Details and notes
    - id: body
      role: P
    - id: email
      role: Form
content_tagging:
  - node: h1
    page: 1
    bbox: { x: 60, y: 690, width: 400, height: 40 }
  - node: h2
    page: 1
    bbox: { x: 60, y: 640, width: 400, height: 35 }
  - node: h3
    page: 1
    bbox: { x: 60, y: 590, width: 400, height: 30 }
  - node: body
    page: 1
    bbox: { x: 60, y: 540, width: 400, height: 25 }
artifacts:
  - page: 1
    type: footer
    bbox: { x: 0, y: 0, width: 612, height: 50 }
annotations:
  - op: create_widget
    page: 1
    rect: { x: 72, y: 400, width: 200, height: 20 }
    field_name: email
    field_type: Tx
    tooltip: Email address
    node: email
ocr:
  - page: 2
    words:
      - text: Scanned
        bbox: { x: 72, y: 700, width: 60, height: 12 }
        confidence: 0.95
      - text: noise
        bbox: { x: 72, y: 680, width: 40, height: 12 }
        confidence: 0.2
bookmarks:
  generate_from_headings: true
"#;

fn options() -> InterpretOptions {
    InterpretOptions::default()
        .with_processor("TestSuite", "2.1")
        .with_compression(false)
        .with_ocr_min_confidence(0.5)
}

#[test]
fn test_full_pipeline_byte_contracts() {
    let set = parse_instructions(INSTRUCTIONS, None).unwrap();
    let output = remediate(&report_pages(), &set, options()).unwrap();

    assert!(contains(&output, b"BDC"));
    assert!(contains(&output, b"EMC"));
    assert!(contains(&output, b"3 Tr"));
    assert!(contains(&output, b"(TestSuite 2.1)"));
    assert!(contains(&output, b"/Processor"));
}

#[test]
fn test_full_pipeline_structure() {
    let set = parse_instructions(INSTRUCTIONS, None).unwrap();
    let output = remediate(&report_pages(), &set, options()).unwrap();
    let report = inspect_bytes(&output).unwrap();

    let document = &report.document;
    assert!(document.tagged);
    assert!(document.has_struct_tree_root);
    assert_eq!(document.language.as_deref(), Some("en-US"));
    assert_eq!(document.display_doc_title, Some(true));
    assert_eq!(document.pdfua_part, Some(1));
    assert_eq!(document.info.get("Title").map(String::as_str), Some("Annual Report"));

    let tree = report.structure_tree.as_ref().unwrap();
    assert_eq!(tree.children.len(), 1);
    let root = &tree.children[0];
    assert_eq!(root.role, "Document");
    let roles: Vec<_> = root.children.iter().map(|e| e.role.as_str()).collect();
    assert_eq!(roles, vec!["H1", "H2", "H3", "P", "Form"]);
    for heading in &root.children[..4] {
        assert_eq!(heading.content.len(), 1, "{} has one MCID", heading.role);
        assert_eq!(heading.content[0].page, Some(1));
    }
    assert_eq!(root.children[4].annotations.len(), 1);

    let page = report.page(1).unwrap();
    assert_eq!(page.tab_order.as_deref(), Some("S"));
    assert_eq!(page.mcids, page.structured_mcids);
    assert_eq!(page.mcids.len(), 4);

    let footer = page
        .content_operators
        .iter()
        .find(|op| op.text.as_deref() == Some("Page 1"))
        .unwrap();
    assert!(footer.artifact);
    assert!(footer.mcid.is_none());

    let widget = &page.annotations[0];
    assert_eq!(widget.subtype.as_deref(), Some("Widget"));
    assert_eq!(widget.field_type.as_deref(), Some("Tx"));
    assert_eq!(widget.tooltip.as_deref(), Some("Email address"));
    assert!(widget.struct_parent.is_some());
}

#[test]
fn test_headings_become_nested_bookmarks() {
    let set = parse_instructions(INSTRUCTIONS, None).unwrap();
    let output = remediate(&report_pages(), &set, options()).unwrap();
    let report = inspect_bytes(&output).unwrap();

    assert_eq!(report.outlines.len(), 1);
    let h1 = &report.outlines[0];
    assert_eq!(h1.title, "Annual Report");
    assert_eq!(h1.page, Some(1));
    assert_eq!(h1.children.len(), 1);
    let h2 = &h1.children[0];
    assert_eq!(h2.title, "Overview");
    assert_eq!(h2.children.len(), 1);
    assert_eq!(h2.children[0].title, "Details and notes");
    assert!(h2.children[0].children.is_empty());
}

#[test]
fn test_ocr_layer_is_invisible_and_filtered() {
    let set = parse_instructions(INSTRUCTIONS, None).unwrap();
    let output = remediate(&report_pages(), &set, options()).unwrap();

    let doc = load(&output);
    let operators = page_operators(&doc, 2);
    assert!(operators.iter().any(|op| op == "Tr"));
    assert_eq!(operators.iter().filter(|op| *op == "Tj").count(), 1);

    let report = inspect_bytes(&output).unwrap();
    let page = report.page(2).unwrap();
    let word = page
        .content_operators
        .iter()
        .find(|op| op.text.as_deref() == Some("Scanned"))
        .unwrap();
    assert!(word.invisible);
    // Only page 1's visible text is paired.
    assert_eq!(report.color_pairs.len(), 1);
    assert_eq!(report.color_pairs[0].background, "#FFFFFF");
    assert_eq!(report.color_pairs[0].count, 5);
}

#[test]
fn test_running_twice_keeps_one_ocr_word() {
    let set = parse_instructions(
        r#"
version: "1.0"
ocr:
  - page: 1
    words:
      - text: Scanned
        bbox: { x: 72, y: 700, width: 60, height: 12 }
"#,
        None,
    )
    .unwrap();
    let once = remediate(&pdf_with_pages(&[""]), &set, options()).unwrap();
    let twice = remediate(&once, &set, options()).unwrap();

    let doc = load(&twice);
    let shown = page_operators(&doc, 1)
        .into_iter()
        .filter(|op| op == "Tj")
        .count();
    assert_eq!(shown, 1);
}

#[test]
fn test_strict_mode_fails_on_unmatched_region() {
    let set = parse_instructions(
        r#"
version: "1.0"
structure:
  role: Document
  children:
    - id: p
      role: P
content_tagging:
  - node: p
    page: 1
    bbox: { x: 300, y: 100, width: 50, height: 50 }
"#,
        None,
    )
    .unwrap();
    let input = pdf_with_pages(&[&text_page(&[(700.0, "Hello")])]);

    let err = remediate(&input, &set, options()).unwrap_err();
    assert!(matches!(err, Error::UnresolvedRegion { page: 1, .. }));

    let output = remediate(&input, &set, options().lenient()).unwrap();
    let report = inspect_bytes(&output).unwrap();
    assert!(report.page(1).unwrap().mcids.is_empty());
}

#[test]
fn test_page_out_of_range() {
    let set = parse_instructions(
        r#"
version: "1.0"
artifacts:
  - page: 3
    type: header
    bbox: { x: 0, y: 740, width: 612, height: 52 }
"#,
        None,
    )
    .unwrap();
    let err = remediate(&pdf_with_pages(&["", ""]), &set, options()).unwrap_err();
    assert!(matches!(err, Error::PageOutOfRange(3, 2)));
}

#[test]
fn test_top_left_origin_flips_declared_boxes() {
    let text = "Header";
    let input = pdf_with_pages(&[&text_page(&[(750.0, text)])]);
    let instructions = r#"
version: "1.0"
artifacts:
  - page: 1
    type: header
    bbox: { x: 0, y: 0, width: 612, height: 60 }
"#;

    let result = Remedy::new()
        .uncompressed()
        .top_left_origin()
        .instructions_text(instructions)
        .unwrap()
        .apply(&input)
        .unwrap();
    let report = result.inspect().unwrap();
    let op = &report.page(1).unwrap().content_operators[0];
    assert_eq!(op.text.as_deref(), Some(text));
    assert!(op.artifact);

    let bottom_left = Remedy::new().instructions_text(instructions).unwrap();
    assert!(matches!(
        bottom_left.apply(&input),
        Err(Error::UnresolvedRegion { .. })
    ));
    assert_eq!(
        InterpretOptions::default().top_left_origin().resolver.origin,
        BboxOrigin::TopLeft
    );
}

#[test]
fn test_apply_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.pdf");
    let output = dir.path().join("out.pdf");
    let instructions = dir.path().join("fix.json");
    std::fs::write(&input, pdf_with_pages(&[""])).unwrap();
    std::fs::write(
        &instructions,
        r#"{ "version": "1.0", "metadata": { "language": "de", "mark_info": true } }"#,
    )
    .unwrap();

    let result = Remedy::new()
        .instructions_file(&instructions)
        .unwrap()
        .apply_file(&input, &output)
        .unwrap();
    assert!(!result.is_empty());

    let report = pdfremedy::inspect_file(&output).unwrap();
    assert_eq!(report.document.language.as_deref(), Some("de"));
    assert!(report.document.tagged);
    assert!(report.document.info.contains_key("ModDate"));
    assert!(report.document.mod_date.is_some());
}

#[test]
fn test_language_only_adds_no_structure_and_keeps_producer() {
    let mut doc = common::document_with_pages(&[""]);
    let info = doc.add_object(dictionary! {
        "Producer" => lopdf::Object::string_literal("Scanner 9"),
    });
    doc.trailer.set("Info", info);
    let mut input = Vec::new();
    doc.save_to(&mut input).unwrap();

    let set = parse_instructions("version: \"1.0\"\nmetadata:\n  language: fr\n", None).unwrap();
    let output = remediate(&input, &set, InterpretOptions::default()).unwrap();
    let report = inspect_bytes(&output).unwrap();

    assert_eq!(report.document.language.as_deref(), Some("fr"));
    assert!(!report.document.has_struct_tree_root);
    assert!(report.structure_tree.is_none());
    assert_eq!(
        report.document.info.get("Producer").map(String::as_str),
        Some("Scanner 9")
    );
    assert!(report.document.info["Processor"].starts_with("pdfremedy "));
}

#[test]
fn test_ocr_over_scanned_image_page() {
    let mut doc = common::document_with_pages(&["q 612 0 0 792 0 0 cm /Im1 Do Q"]);
    let image = doc.add_object(lopdf::Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => 1,
            "Height" => 1,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8,
        },
        vec![0x80],
    ));
    let page = common::page_id(&doc, 1);
    doc.get_dictionary_mut(page)
        .unwrap()
        .get_mut(b"Resources")
        .unwrap()
        .as_dict_mut()
        .unwrap()
        .set("XObject", dictionary! { "Im1" => image });
    let mut input = Vec::new();
    doc.save_to(&mut input).unwrap();

    let set = parse_instructions(
        r#"
version: "1.0"
ocr:
  - page: 1
    words:
      - text: Invoice
        bbox: { x: 100, y: 600, width: 80, height: 14 }
"#,
        None,
    )
    .unwrap();
    let output = remediate(&input, &set, options()).unwrap();

    assert!(contains(&output, b"3 Tr"));
    assert!(contains(&output, b"(Invoice) Tj"));
    let operators = page_operators(&load(&output), 1);
    assert_eq!(operators.iter().filter(|op| *op == "Do").count(), 1);
    let report = inspect_bytes(&output).unwrap();
    let kinds: Vec<_> = report
        .page(1)
        .unwrap()
        .content_operators
        .iter()
        .map(|op| op.kind)
        .collect();
    assert_eq!(kinds, vec![OperatorKind::Image, OperatorKind::Text]);
}
