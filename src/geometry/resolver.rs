//! Correlating declared regions with content-stream operators.

use super::bbox::BoundingBox;

/// Anything with an optional computed extent on the page.
pub trait Positioned {
    fn bbox(&self) -> Option<BoundingBox>;
}

impl Positioned for BoundingBox {
    fn bbox(&self) -> Option<BoundingBox> {
        Some(*self)
    }
}

impl Positioned for Option<BoundingBox> {
    fn bbox(&self) -> Option<BoundingBox> {
        *self
    }
}

/// Where the y axis of declared boxes starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BboxOrigin {
    /// PDF convention: y grows upward from the bottom edge of the page.
    #[default]
    BottomLeft,
    /// Raster convention: y grows downward from the top edge of the page.
    TopLeft,
}

/// Matching policy for the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolverConfig {
    /// Points by which the target box is grown before the containment test.
    pub containment_tolerance: f64,
    /// Minimum share of an operator's area that must fall inside the target
    /// for the best-overlap fallback to pick it.
    pub min_overlap_ratio: f64,
    /// Coordinate origin of declared boxes.
    pub origin: BboxOrigin,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            containment_tolerance: 2.0,
            min_overlap_ratio: 0.1,
            origin: BboxOrigin::BottomLeft,
        }
    }
}

impl ResolverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the containment tolerance in points.
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.containment_tolerance = tolerance.max(0.0);
        self
    }

    /// Set the fallback overlap threshold (0..=1).
    pub fn with_min_overlap_ratio(mut self, ratio: f64) -> Self {
        self.min_overlap_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Set the coordinate origin of declared boxes.
    pub fn with_origin(mut self, origin: BboxOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// Resolves declared regions against positioned items.
#[derive(Debug, Clone, Copy, Default)]
pub struct BboxResolver {
    config: ResolverConfig,
}

impl BboxResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Convert a declared box into default user space for a page whose
    /// MediaBox is `page_box`.
    pub fn to_user_space(&self, declared: &BoundingBox, page_box: &BoundingBox) -> BoundingBox {
        match self.config.origin {
            BboxOrigin::BottomLeft => BoundingBox::new(
                page_box.x + declared.x,
                page_box.y + declared.y,
                declared.width,
                declared.height,
            ),
            BboxOrigin::TopLeft => BoundingBox::new(
                page_box.x + declared.x,
                page_box.top() - declared.y - declared.height,
                declared.width,
                declared.height,
            ),
        }
    }

    /// Indices of the items that belong to `target`, in input order.
    ///
    /// Items contained in the tolerance-grown target are all selected. When
    /// none is, the single item with the largest overlap ratio is chosen if
    /// it reaches the configured threshold; ties keep the earliest item.
    /// Items without an extent are never selected.
    pub fn resolve<T: Positioned>(&self, items: &[T], target: &BoundingBox) -> Vec<usize> {
        let contained = self.contained(items, target);
        if !contained.is_empty() {
            return contained;
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, item) in items.iter().enumerate() {
            let Some(bbox) = item.bbox() else { continue };
            let ratio = overlap_ratio(&bbox, target);
            if ratio < self.config.min_overlap_ratio || ratio <= 0.0 {
                continue;
            }
            match best {
                Some((_, best_ratio)) if ratio <= best_ratio => {}
                _ => best = Some((index, ratio)),
            }
        }

        match best {
            Some((index, ratio)) => {
                log::trace!(
                    "No operator contained in region; falling back to item {} (overlap {:.2})",
                    index,
                    ratio
                );
                vec![index]
            }
            None => Vec::new(),
        }
    }

    /// Indices of items strictly contained in the tolerance-grown target.
    pub fn contained<T: Positioned>(&self, items: &[T], target: &BoundingBox) -> Vec<usize> {
        let grown = target.expand(self.config.containment_tolerance);
        items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                item.bbox()
                    .filter(|bbox| grown.contains(bbox))
                    .map(|_| index)
            })
            .collect()
    }
}

/// Share of `item` covered by `target`.
///
/// Degenerate items (zero width or height, e.g. hairlines) count as fully
/// covered when they touch the target at all.
pub fn overlap_ratio(item: &BoundingBox, target: &BoundingBox) -> f64 {
    let Some(intersection) = item.intersection(target) else {
        return 0.0;
    };
    let area = item.area();
    if area <= f64::EPSILON {
        return 1.0;
    }
    (intersection.area() / area).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes() -> Vec<Option<BoundingBox>> {
        vec![
            Some(BoundingBox::new(10.0, 700.0, 100.0, 12.0)),
            Some(BoundingBox::new(10.0, 680.0, 100.0, 12.0)),
            None,
            Some(BoundingBox::new(300.0, 100.0, 50.0, 50.0)),
        ]
    }

    #[test]
    fn test_strict_containment_with_tolerance() {
        let resolver = BboxResolver::default();
        let target = BoundingBox::new(11.0, 679.0, 98.0, 34.0);
        assert_eq!(resolver.resolve(&boxes(), &target), vec![0, 1]);
    }

    #[test]
    fn test_fallback_picks_best_overlap() {
        let resolver = BboxResolver::default();
        // Covers most of item 3 but not all of it.
        let target = BoundingBox::new(310.0, 100.0, 60.0, 50.0);
        assert_eq!(resolver.resolve(&boxes(), &target), vec![3]);
    }

    #[test]
    fn test_fallback_threshold() {
        let resolver = BboxResolver::new(ResolverConfig::new().with_min_overlap_ratio(0.9));
        let target = BoundingBox::new(330.0, 100.0, 60.0, 50.0);
        assert!(resolver.resolve(&boxes(), &target).is_empty());
    }

    #[test]
    fn test_fallback_ties_keep_first() {
        let items = vec![
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        ];
        let resolver = BboxResolver::default();
        let target = BoundingBox::new(5.0, 0.0, 20.0, 10.0);
        assert_eq!(resolver.resolve(&items, &target), vec![0]);
    }

    #[test]
    fn test_no_items_under_region() {
        let resolver = BboxResolver::default();
        let target = BoundingBox::new(500.0, 500.0, 10.0, 10.0);
        assert!(resolver.resolve(&boxes(), &target).is_empty());
    }

    #[test]
    fn test_top_left_origin() {
        let resolver = BboxResolver::new(ResolverConfig::new().with_origin(BboxOrigin::TopLeft));
        let page = BoundingBox::new(0.0, 0.0, 612.0, 792.0);
        let converted = resolver.to_user_space(&BoundingBox::new(10.0, 20.0, 100.0, 30.0), &page);
        assert_eq!(converted, BoundingBox::new(10.0, 742.0, 100.0, 30.0));
    }

    #[test]
    fn test_overlap_ratio_hairline() {
        let line = BoundingBox::new(0.0, 50.0, 100.0, 0.0);
        let target = BoundingBox::new(0.0, 40.0, 10.0, 20.0);
        assert_eq!(overlap_ratio(&line, &target), 1.0);
    }
}
