//! Page geometry: boxes, transforms, and region resolution.

mod bbox;
mod resolver;

pub use bbox::{BoundingBox, Matrix};
pub use resolver::{overlap_ratio, BboxOrigin, BboxResolver, Positioned, ResolverConfig};
