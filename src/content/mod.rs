//! Content-stream interpretation shared by the handlers and the inspector.

mod scanner;
mod state;

pub use scanner::{
    property_mcid, scan_page, ContentScanner, DrawnOperator, OperatorKind, PageScan,
};
pub use state::{color_hex, ColorSpace, GraphicsState, TextMatrix, BLACK};
