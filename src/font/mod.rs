//! Font data: encodings, ToUnicode maps, metrics and subset descriptors.

pub mod cmap;
pub mod encoding;
pub mod metrics;
pub mod subset;
pub mod truetype;

pub use cmap::ToUnicodeCMap;
pub use metrics::{descendant_font, LoadedFont};
