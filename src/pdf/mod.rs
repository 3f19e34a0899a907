//! Access to the lopdf document model.

mod document;
pub mod objects;
pub mod text;

pub use document::{
    deflate, inherited, page_box, page_content, page_number, page_resources, DocumentHandle,
};
