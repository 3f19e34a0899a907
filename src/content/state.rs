//! Graphics and text state tracked while walking a content stream.

use crate::geometry::{BoundingBox, Matrix};

/// Default fill colour of a new graphics state.
pub const BLACK: &str = "#000000";

/// Colour space selected by `cs`, or implied by `g`/`rg`/`k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSpace {
    Gray,
    Rgb,
    Cmyk,
    /// Pattern, separation, indexed, ICC with unknown component count, …
    Other,
}

impl ColorSpace {
    /// Map a colour space name; ICC and calibrated spaces are guessed from
    /// the component count of the first `sc`/`scn`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "DeviceGray" | "G" | "CalGray" => ColorSpace::Gray,
            "DeviceRGB" | "RGB" | "CalRGB" => ColorSpace::Rgb,
            "DeviceCMYK" | "CMYK" => ColorSpace::Cmyk,
            _ => ColorSpace::Other,
        }
    }
}

/// Convert colour components to `#RRGGBB`.
pub fn color_hex(space: ColorSpace, components: &[f64]) -> Option<String> {
    let (r, g, b) = match (space, components) {
        (ColorSpace::Gray, [gray]) => (*gray, *gray, *gray),
        (ColorSpace::Rgb, [r, g, b]) => (*r, *g, *b),
        (ColorSpace::Cmyk, [c, m, y, k]) => (
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        ),
        (ColorSpace::Other, [gray]) => (*gray, *gray, *gray),
        (ColorSpace::Other, [r, g, b]) => (*r, *g, *b),
        (ColorSpace::Other, [c, m, y, k]) => (
            (1.0 - c) * (1.0 - k),
            (1.0 - m) * (1.0 - k),
            (1.0 - y) * (1.0 - k),
        ),
        _ => return None,
    };
    let channel = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
    Some(format!(
        "#{:02X}{:02X}{:02X}",
        channel(r),
        channel(g),
        channel(b)
    ))
}

/// Parameters saved and restored by `q`/`Q`.
#[derive(Debug, Clone)]
pub struct GraphicsState {
    pub ctm: Matrix,
    pub fill_space: ColorSpace,
    pub fill_color: Option<String>,
    pub font: Option<Vec<u8>>,
    pub font_size: f64,
    pub char_spacing: f64,
    pub word_spacing: f64,
    /// `Tz` as a fraction (100 → 1.0).
    pub horizontal_scale: f64,
    pub leading: f64,
    pub rise: f64,
    pub render_mode: i64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: Matrix::IDENTITY,
            fill_space: ColorSpace::Gray,
            fill_color: Some(BLACK.to_string()),
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scale: 1.0,
            leading: 0.0,
            rise: 0.0,
            render_mode: 0,
        }
    }
}

/// Text and text line matrices of the current text object.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextMatrix {
    pub matrix: Matrix,
    pub line: Matrix,
}

impl TextMatrix {
    /// `Tm`: set both matrices.
    pub fn set(&mut self, m: Matrix) {
        self.matrix = m;
        self.line = m;
    }

    /// `Td`: move to the start of the next line, offset from the current one.
    pub fn translate(&mut self, tx: f64, ty: f64) {
        self.line = Matrix::translation(tx, ty).multiply(&self.line);
        self.matrix = self.line;
    }

    /// Advance the text matrix after showing a glyph run.
    pub fn advance(&mut self, tx: f64) {
        self.matrix = Matrix::translation(tx, 0.0).multiply(&self.matrix);
    }

    /// Device-space box of a run of width `tx` (unscaled text space)
    /// starting at the current text position.
    pub fn run_bbox(&self, state: &GraphicsState, tx: f64) -> BoundingBox {
        let size = state.font_size;
        let local = BoundingBox::from_corners(
            0.0,
            state.rise - 0.2 * size,
            tx,
            state.rise + 0.8 * size,
        );
        self.matrix.multiply(&state.ctm).transform_bbox(&local)
    }
}
