//! Walks a page content stream and reports every drawing operator.

use std::collections::{BTreeSet, HashMap};

use lopdf::content::Operation;
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};

use super::state::{color_hex, ColorSpace, GraphicsState, TextMatrix};
use crate::error::Result;
use crate::font::LoadedFont;
use crate::geometry::{BoundingBox, Matrix, Positioned};
use crate::pdf::objects::{dict_get, dict_get_dict, dict_get_name, name, number, resolve};
use crate::pdf::{page_resources, DocumentHandle};

/// Graphics-state nesting beyond this depth is ignored.
const MAX_STATE_DEPTH: usize = 256;

/// What a drawing operator puts on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKind {
    Text,
    Image,
    Path,
}

/// A text-showing, image or path-painting operator with its computed extent.
#[derive(Debug, Clone)]
pub struct DrawnOperator {
    /// Index of the operator in the page's operation list.
    pub index: usize,
    /// First operation belonging to this drawing (a path's first
    /// construction operator; `index` otherwise).
    pub start: usize,
    pub operator: String,
    pub kind: OperatorKind,
    pub bbox: Option<BoundingBox>,
    /// Ordinal of the enclosing `BT … ET` object.
    pub text_object: Option<usize>,
    /// Ordinal of the innermost open marked-content sequence.
    pub marked_scope: Option<usize>,
    pub marked: bool,
    pub mcid: Option<i64>,
    pub artifact: bool,
    /// Font resource name for text operators.
    pub font: Option<String>,
    pub codes: Vec<u32>,
    pub text: Option<String>,
    /// Whether every shown code decodes to Unicode.
    pub unicode_mapped: bool,
    pub render_mode: i64,
    pub fill_color: Option<String>,
    /// Whether a path operator fills its area.
    pub filled: bool,
}

impl Positioned for DrawnOperator {
    fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }
}

impl DrawnOperator {
    /// Inside an MCID-bearing or Artifact sequence already.
    pub fn is_tagged(&self) -> bool {
        self.mcid.is_some() || self.artifact
    }

    /// Text render mode 3 (neither fill nor stroke).
    pub fn is_invisible(&self) -> bool {
        self.kind == OperatorKind::Text && self.render_mode == 3
    }
}

/// All drawing operators of one page.
#[derive(Debug, Clone, Default)]
pub struct PageScan {
    pub operators: Vec<DrawnOperator>,
    /// MCIDs opened anywhere in the content stream.
    pub mcids: BTreeSet<i64>,
    /// Total number of operations in the stream.
    pub operation_count: usize,
}

impl PageScan {
    /// Smallest MCID above every one used on the page, `None` on overflow.
    pub fn next_mcid(&self) -> Option<i64> {
        match self.mcids.iter().next_back() {
            Some(m) => m.checked_add(1).map(|next| next.max(0)),
            None => Some(0),
        }
    }
}

/// Decode and scan a page of a handle.
pub fn scan_page(
    handle: &DocumentHandle,
    page_id: ObjectId,
) -> Result<(Vec<Operation>, PageScan)> {
    let operations = handle.page_operations(page_id)?;
    let resources = page_resources(handle.document(), page_id)
        .cloned()
        .unwrap_or_default();
    let scan = ContentScanner::new(handle.document(), &resources).scan(&operations);
    Ok((operations, scan))
}

#[derive(Debug, Clone)]
struct MarkedSequence {
    ordinal: usize,
    mcid: Option<i64>,
    artifact: bool,
}

/// Interprets operations against a resource dictionary.
pub struct ContentScanner<'a> {
    doc: &'a Document,
    resources: &'a Dictionary,
    fonts: HashMap<Vec<u8>, LoadedFont>,
}

impl<'a> ContentScanner<'a> {
    pub fn new(doc: &'a Document, resources: &'a Dictionary) -> Self {
        Self {
            doc,
            resources,
            fonts: HashMap::new(),
        }
    }

    pub fn scan(mut self, operations: &[Operation]) -> PageScan {
        let mut scan = PageScan {
            operation_count: operations.len(),
            ..PageScan::default()
        };
        let mut state = GraphicsState::default();
        let mut stack: Vec<GraphicsState> = Vec::new();
        let mut text = TextMatrix::default();
        let mut text_object: Option<usize> = None;
        let mut text_objects = 0usize;
        let mut marked: Vec<MarkedSequence> = Vec::new();
        let mut marked_count = 0usize;
        let mut path_points: Vec<(f64, f64)> = Vec::new();
        let mut path_start: Option<usize> = None;
        let mut current_point = (0.0, 0.0);

        for (index, op) in operations.iter().enumerate() {
            let operands = &op.operands;
            let num = |i: usize| operands.get(i).and_then(number);
            let mut drawn: Option<DrawnOperator> = None;

            match op.operator.as_str() {
                "q" => {
                    if stack.len() < MAX_STATE_DEPTH {
                        stack.push(state.clone());
                    }
                }
                "Q" => {
                    if let Some(saved) = stack.pop() {
                        state = saved;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_operands(operands) {
                        state.ctm = m.multiply(&state.ctm);
                    }
                }

                // Colour
                "g" => {
                    state.fill_space = ColorSpace::Gray;
                    state.fill_color = color_hex(ColorSpace::Gray, &numbers(operands));
                }
                "rg" => {
                    state.fill_space = ColorSpace::Rgb;
                    state.fill_color = color_hex(ColorSpace::Rgb, &numbers(operands));
                }
                "k" => {
                    state.fill_space = ColorSpace::Cmyk;
                    state.fill_color = color_hex(ColorSpace::Cmyk, &numbers(operands));
                }
                "cs" => {
                    let space = operands
                        .first()
                        .and_then(name)
                        .map(|n| self.color_space(&n))
                        .unwrap_or(ColorSpace::Other);
                    state.fill_space = space;
                    state.fill_color = match space {
                        ColorSpace::Gray => color_hex(space, &[0.0]),
                        ColorSpace::Rgb => color_hex(space, &[0.0, 0.0, 0.0]),
                        ColorSpace::Cmyk => color_hex(space, &[0.0, 0.0, 0.0, 1.0]),
                        ColorSpace::Other => None,
                    };
                }
                "sc" | "scn" => {
                    state.fill_color = color_hex(state.fill_space, &numbers(operands));
                }

                // Text objects and state
                "BT" => {
                    text_object = Some(text_objects);
                    text_objects += 1;
                    text = TextMatrix::default();
                }
                "ET" => text_object = None,
                "Tf" => {
                    if let Some(font) = operands.first().and_then(|o| match o {
                        Object::Name(n) => Some(n.clone()),
                        _ => None,
                    }) {
                        state.font = Some(font);
                    }
                    state.font_size = num(1).unwrap_or(state.font_size);
                }
                "Tc" => state.char_spacing = num(0).unwrap_or(0.0),
                "Tw" => state.word_spacing = num(0).unwrap_or(0.0),
                "Tz" => state.horizontal_scale = num(0).unwrap_or(100.0) / 100.0,
                "TL" => state.leading = num(0).unwrap_or(0.0),
                "Ts" => state.rise = num(0).unwrap_or(0.0),
                "Tr" => state.render_mode = operands.first().and_then(number).unwrap_or(0.0) as i64,
                "Td" => text.translate(num(0).unwrap_or(0.0), num(1).unwrap_or(0.0)),
                "TD" => {
                    let ty = num(1).unwrap_or(0.0);
                    state.leading = -ty;
                    text.translate(num(0).unwrap_or(0.0), ty);
                }
                "Tm" => {
                    if let Some(m) = matrix_operands(operands) {
                        text.set(m);
                    }
                }
                "T*" => text.translate(0.0, -state.leading),

                // Text showing
                "Tj" | "'" | "\"" | "TJ" => {
                    match op.operator.as_str() {
                        "'" => text.translate(0.0, -state.leading),
                        "\"" => {
                            state.word_spacing = num(0).unwrap_or(state.word_spacing);
                            state.char_spacing = num(1).unwrap_or(state.char_spacing);
                            text.translate(0.0, -state.leading);
                        }
                        _ => {}
                    }
                    drawn = Some(self.show_text(index, op, &state, &mut text));
                }

                // XObjects and inline images
                "Do" => {
                    if let Some(xobject) = operands.first().and_then(name) {
                        drawn = Some(self.draw_xobject(index, &xobject, &state));
                    }
                }
                "BI" => {
                    let bbox = state.ctm.transform_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
                    drawn = Some(DrawnOperator::new(
                        index,
                        index,
                        "BI",
                        OperatorKind::Image,
                        Some(bbox),
                    ));
                }

                // Path construction
                "m" => {
                    path_start.get_or_insert(index);
                    if let (Some(x), Some(y)) = (num(0), num(1)) {
                        current_point = (x, y);
                        path_points.push(state.ctm.transform_point(x, y));
                    }
                }
                "l" => {
                    path_start.get_or_insert(index);
                    if let (Some(x), Some(y)) = (num(0), num(1)) {
                        current_point = (x, y);
                        path_points.push(state.ctm.transform_point(x, y));
                    }
                }
                "c" | "v" | "y" => {
                    path_start.get_or_insert(index);
                    let values = numbers(operands);
                    for pair in values.chunks(2) {
                        if let [x, y] = pair {
                            path_points.push(state.ctm.transform_point(*x, *y));
                        }
                    }
                    if op.operator == "v" {
                        path_points.push(state.ctm.transform_point(current_point.0, current_point.1));
                    }
                    if let [.., x, y] = values.as_slice() {
                        current_point = (*x, *y);
                    }
                }
                "re" => {
                    path_start.get_or_insert(index);
                    if let [x, y, w, h] = numbers(operands).as_slice() {
                        let rect = BoundingBox::from_corners(*x, *y, x + w, y + h);
                        let device = state.ctm.transform_bbox(&rect);
                        path_points.push((device.x, device.y));
                        path_points.push((device.right(), device.top()));
                        current_point = (*x, *y);
                    }
                }
                "h" => {}

                // Path painting
                "S" | "s" | "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => {
                    let start = path_start.take().unwrap_or(index);
                    let bbox = BoundingBox::from_points(path_points.drain(..));
                    let mut item =
                        DrawnOperator::new(index, start, &op.operator, OperatorKind::Path, bbox);
                    item.filled = !matches!(op.operator.as_str(), "S" | "s");
                    drawn = Some(item);
                }
                "n" => {
                    path_start = None;
                    path_points.clear();
                }

                // Marked content
                "BMC" | "BDC" => {
                    let tag = operands.first().and_then(name).unwrap_or_default();
                    let mcid = if op.operator == "BDC" {
                        operands.get(1).and_then(|props| self.mcid(props))
                    } else {
                        None
                    };
                    if let Some(mcid) = mcid {
                        scan.mcids.insert(mcid);
                    }
                    marked.push(MarkedSequence {
                        ordinal: marked_count,
                        mcid,
                        artifact: tag == "Artifact",
                    });
                    marked_count += 1;
                }
                "EMC" => {
                    marked.pop();
                }
                _ => {}
            }

            if let Some(mut item) = drawn {
                item.text_object = text_object;
                item.marked = !marked.is_empty();
                item.marked_scope = marked.last().map(|m| m.ordinal);
                item.mcid = marked.iter().rev().find_map(|m| m.mcid);
                item.artifact = marked.iter().any(|m| m.artifact);
                item.render_mode = state.render_mode;
                item.fill_color = state.fill_color.clone();
                scan.operators.push(item);
            }
        }

        scan
    }

    fn show_text(
        &mut self,
        index: usize,
        op: &Operation,
        state: &GraphicsState,
        text: &mut TextMatrix,
    ) -> DrawnOperator {
        let font_name = state.font.clone().unwrap_or_default();
        let font = self.font(&font_name).clone();
        let size = state.font_size;
        let scale = state.horizontal_scale;

        let mut codes = Vec::new();
        let mut width = 0.0;
        let measure = |bytes: &[u8], width: &mut f64, codes: &mut Vec<u32>| {
            for code in font.codes(bytes) {
                let mut advance = font.advance(code) * size + state.char_spacing;
                if !font.composite && code == 32 {
                    advance += state.word_spacing;
                }
                *width += advance * scale;
                codes.push(code);
            }
        };

        let shown: Vec<&Object> = match op.operator.as_str() {
            "TJ" => match op.operands.first() {
                Some(Object::Array(items)) => items.iter().collect(),
                _ => Vec::new(),
            },
            "\"" => op.operands.get(2).into_iter().collect(),
            _ => op.operands.first().into_iter().collect(),
        };
        for item in shown {
            match item {
                Object::String(bytes, _) => measure(bytes, &mut width, &mut codes),
                other => {
                    if let Some(adjust) = number(other) {
                        width -= adjust / 1000.0 * size * scale;
                    }
                }
            }
        }

        let bbox = (size > 0.0).then(|| text.run_bbox(state, width));
        text.advance(width);

        let (decoded, mapped) = font.decode(&codes);
        let mut item = DrawnOperator::new(index, index, &op.operator, OperatorKind::Text, bbox);
        item.font = Some(String::from_utf8_lossy(&font_name).to_string());
        item.text = Some(decoded);
        item.unicode_mapped = mapped && !codes.is_empty();
        item.codes = codes;
        item
    }

    fn draw_xobject(&self, index: usize, resource: &str, state: &GraphicsState) -> DrawnOperator {
        let xobject = dict_get_dict(self.doc, self.resources, b"XObject")
            .and_then(|xobjects| dict_get(self.doc, xobjects, resource.as_bytes()));
        let dict = match xobject {
            Some(Object::Stream(stream)) => Some(&stream.dict),
            _ => None,
        };
        let subtype = dict.and_then(|d| dict_get_name(self.doc, d, b"Subtype"));

        match (subtype.as_deref(), dict) {
            (Some("Form"), Some(form)) => {
                let matrix = dict_get(self.doc, form, b"Matrix")
                    .and_then(|m| match m {
                        Object::Array(items) => matrix_operands(items),
                        _ => None,
                    })
                    .unwrap_or(Matrix::IDENTITY);
                let bbox = dict_get(self.doc, form, b"BBox")
                    .and_then(|b| crate::pdf::objects::rect(self.doc, b))
                    .map(|b| matrix.multiply(&state.ctm).transform_bbox(&b));
                DrawnOperator::new(index, index, "Do", OperatorKind::Path, bbox)
            }
            (Some("Image"), _) => {
                let bbox = state.ctm.transform_bbox(&BoundingBox::new(0.0, 0.0, 1.0, 1.0));
                DrawnOperator::new(index, index, "Do", OperatorKind::Image, Some(bbox))
            }
            _ => {
                log::debug!("XObject /{} not found or not drawable", resource);
                DrawnOperator::new(index, index, "Do", OperatorKind::Image, None)
            }
        }
    }

    fn font(&mut self, resource: &[u8]) -> &LoadedFont {
        let doc = self.doc;
        let resources = self.resources;
        self.fonts.entry(resource.to_vec()).or_insert_with(|| {
            let entry = dict_get_dict(doc, resources, b"Font")
                .and_then(|fonts| fonts.get(resource).ok());
            let id = entry.and_then(|e| match e {
                Object::Reference(id) => Some(*id),
                _ => None,
            });
            match entry.map(|e| resolve(doc, e)) {
                Some(Object::Dictionary(font)) => LoadedFont::load(doc, font, id),
                _ => {
                    log::debug!(
                        "Font resource /{} not found",
                        String::from_utf8_lossy(resource)
                    );
                    LoadedFont::missing()
                }
            }
        })
    }

    fn color_space(&self, space: &str) -> ColorSpace {
        let direct = ColorSpace::from_name(space);
        if direct != ColorSpace::Other {
            return direct;
        }
        let Some(spaces) = dict_get_dict(self.doc, self.resources, b"ColorSpace") else {
            return ColorSpace::Other;
        };
        match dict_get(self.doc, spaces, space.as_bytes()) {
            Some(Object::Name(n)) => ColorSpace::from_name(&String::from_utf8_lossy(n)),
            Some(Object::Array(items)) => {
                match items.first().map(|o| resolve(self.doc, o)).and_then(name) {
                    Some(family) if family == "ICCBased" => items
                        .get(1)
                        .and_then(|stream| match resolve(self.doc, stream) {
                            Object::Stream(s) => dict_get(self.doc, &s.dict, b"N").and_then(number),
                            _ => None,
                        })
                        .map(|n| match n as i64 {
                            1 => ColorSpace::Gray,
                            3 => ColorSpace::Rgb,
                            4 => ColorSpace::Cmyk,
                            _ => ColorSpace::Other,
                        })
                        .unwrap_or(ColorSpace::Other),
                    Some(family) => ColorSpace::from_name(&family),
                    None => ColorSpace::Other,
                }
            }
            _ => ColorSpace::Other,
        }
    }

    fn mcid(&self, props: &Object) -> Option<i64> {
        property_mcid(self.doc, self.resources, props)
    }
}

/// MCID from a BDC property list, inline or named in `/Properties`.
pub fn property_mcid(doc: &Document, resources: &Dictionary, props: &Object) -> Option<i64> {
    let dict = match props {
        Object::Dictionary(dict) => Some(dict),
        Object::Name(key) => dict_get_dict(doc, resources, b"Properties")
            .and_then(|all| dict_get_dict(doc, all, key)),
        _ => None,
    }?;
    match dict_get(doc, dict, b"MCID")? {
        Object::Integer(mcid) => Some(*mcid),
        _ => None,
    }
}

impl DrawnOperator {
    fn new(
        index: usize,
        start: usize,
        operator: &str,
        kind: OperatorKind,
        bbox: Option<BoundingBox>,
    ) -> Self {
        Self {
            index,
            start,
            operator: operator.to_string(),
            kind,
            bbox,
            text_object: None,
            marked_scope: None,
            marked: false,
            mcid: None,
            artifact: false,
            font: None,
            codes: Vec::new(),
            text: None,
            unicode_mapped: false,
            render_mode: 0,
            fill_color: None,
            filled: false,
        }
    }
}

fn numbers(operands: &[Object]) -> Vec<f64> {
    operands.iter().filter_map(number).collect()
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    match numbers(operands).as_slice() {
        [a, b, c, d, e, f] => Some(Matrix::new(*a, *b, *c, *d, *e, *f)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::Content;
    use lopdf::dictionary;

    fn scan(content: &str, doc: &Document, resources: &Dictionary) -> PageScan {
        let content = Content::decode(content.as_bytes()).unwrap();
        ContentScanner::new(doc, resources).scan(&content.operations)
    }

    fn helvetica_resources() -> Dictionary {
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => "Helvetica",
                    "Encoding" => "WinAnsiEncoding",
                },
            },
        }
    }

    #[test]
    fn test_text_operator_bbox_and_text() {
        let doc = Document::with_version("1.7");
        let resources = helvetica_resources();
        let scan = scan("BT /F1 10 Tf 100 700 Td (Hello) Tj ET", &doc, &resources);
        assert_eq!(scan.operators.len(), 1);
        let op = &scan.operators[0];
        assert_eq!(op.kind, OperatorKind::Text);
        assert_eq!(op.index, 3);
        assert_eq!(op.text.as_deref(), Some("Hello"));
        assert!(op.unicode_mapped);
        assert_eq!(op.text_object, Some(0));
        // five glyphs at the 500-unit default width
        assert_eq!(op.bbox, Some(BoundingBox::new(100.0, 698.0, 25.0, 10.0)));
    }

    #[test]
    fn test_tj_advances_text_position() {
        let doc = Document::with_version("1.7");
        let resources = helvetica_resources();
        let scan = scan(
            "BT /F1 10 Tf 0 0 Td (ab) Tj [(c) -1000 (d)] TJ ET",
            &doc,
            &resources,
        );
        let second = scan.operators[1].bbox.unwrap();
        assert_eq!(second.x, 10.0);
        assert_eq!(second.width, 20.0);
    }

    #[test]
    fn test_path_range_and_fill() {
        let doc = Document::with_version("1.7");
        let resources = Dictionary::new();
        let scan = scan(
            "1 0 0 rg 10 10 m 50 10 l 50 40 l h f 0 0 100 20 re S",
            &doc,
            &resources,
        );
        assert_eq!(scan.operators.len(), 2);
        let fill = &scan.operators[0];
        assert_eq!((fill.start, fill.index), (1, 5));
        assert!(fill.filled);
        assert_eq!(fill.fill_color.as_deref(), Some("#FF0000"));
        assert_eq!(fill.bbox, Some(BoundingBox::new(10.0, 10.0, 40.0, 30.0)));
        let stroke = &scan.operators[1];
        assert_eq!((stroke.start, stroke.index), (6, 7));
        assert!(!stroke.filled);
    }

    #[test]
    fn test_image_uses_ctm() {
        let mut doc = Document::with_version("1.7");
        let image = doc.add_object(lopdf::Stream::new(
            dictionary! { "Type" => "XObject", "Subtype" => "Image", "Width" => 1, "Height" => 1 },
            vec![0],
        ));
        let resources = dictionary! { "XObject" => dictionary! { "Im1" => image } };
        let scan = scan("q 200 0 0 100 50 60 cm /Im1 Do Q", &doc, &resources);
        let op = &scan.operators[0];
        assert_eq!(op.kind, OperatorKind::Image);
        assert_eq!(op.bbox, Some(BoundingBox::new(50.0, 60.0, 200.0, 100.0)));
    }

    #[test]
    fn test_marked_content_tracking() {
        let doc = Document::with_version("1.7");
        let resources = helvetica_resources();
        let scan = scan(
            "/P <</MCID 3>> BDC BT /F1 12 Tf (a) Tj ET EMC \
             /Artifact BMC 0 0 10 10 re f EMC \
             BT /F1 12 Tf (b) Tj ET",
            &doc,
            &resources,
        );
        assert_eq!(scan.operators[0].mcid, Some(3));
        assert!(scan.operators[1].artifact);
        assert!(scan.operators[1].marked);
        assert!(!scan.operators[2].is_tagged());
        assert!(!scan.operators[2].marked);
        assert_eq!(scan.next_mcid(), Some(4));
    }

    #[test]
    fn test_next_mcid_overflow() {
        let full = PageScan {
            mcids: BTreeSet::from([2, i64::MAX]),
            ..PageScan::default()
        };
        assert_eq!(full.next_mcid(), None);
        let negative = PageScan {
            mcids: BTreeSet::from([-7]),
            ..PageScan::default()
        };
        assert_eq!(negative.next_mcid(), Some(0));
        assert_eq!(PageScan::default().next_mcid(), Some(0));
    }

    #[test]
    fn test_invisible_text() {
        let doc = Document::with_version("1.7");
        let resources = helvetica_resources();
        let scan = scan("BT 3 Tr /F1 12 Tf (x) Tj ET", &doc, &resources);
        assert!(scan.operators[0].is_invisible());
    }
}
