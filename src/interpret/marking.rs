//! Selecting untagged content under a region and bracketing it with
//! marked-content operators.

use std::ops::RangeInclusive;

use lopdf::content::Operation;
use lopdf::Object;

use super::options::ErrorMode;
use crate::content::{DrawnOperator, OperatorKind, PageScan};
use crate::error::{Error, Result};
use crate::geometry::{BboxResolver, BoundingBox};

/// Positions in `scan.operators` of untagged operators matching `target`.
pub fn select_untagged(scan: &PageScan, resolver: &BboxResolver, target: &BoundingBox) -> Vec<usize> {
    let candidates: Vec<(usize, &DrawnOperator)> = scan
        .operators
        .iter()
        .enumerate()
        .filter(|(_, op)| !op.is_tagged())
        .collect();
    let boxes: Vec<Option<BoundingBox>> = candidates.iter().map(|(_, op)| op.bbox).collect();
    resolver
        .resolve(&boxes, target)
        .into_iter()
        .map(|i| candidates[i].0)
        .collect()
}

/// Like [`select_untagged`], but every untagged operator when no region is
/// given.
pub fn select_region(
    scan: &PageScan,
    resolver: &BboxResolver,
    target: Option<&BoundingBox>,
) -> Vec<usize> {
    match target {
        Some(target) => select_untagged(scan, resolver, target),
        None => scan
            .operators
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.is_tagged())
            .map(|(position, _)| position)
            .collect(),
    }
}

/// Operation ranges to bracket, one per group of adjacent operators that
/// share a text object and a marked-content scope. Paths and images always
/// form their own group.
pub fn group_ranges(scan: &PageScan, positions: &[usize]) -> Vec<RangeInclusive<usize>> {
    let mut ranges: Vec<RangeInclusive<usize>> = Vec::new();
    let mut previous: Option<usize> = None;
    for &position in positions {
        let op = &scan.operators[position];
        let joins = previous.is_some_and(|prev| {
            let last = &scan.operators[prev];
            prev + 1 == position
                && op.kind == OperatorKind::Text
                && last.kind == OperatorKind::Text
                && op.text_object.is_some()
                && op.text_object == last.text_object
                && op.marked_scope == last.marked_scope
        });
        match ranges.last_mut() {
            Some(range) if joins => *range = *range.start()..=op.index,
            _ => ranges.push(op.start..=op.index),
        }
        previous = Some(position);
    }
    ranges
}

/// Wrap each range in `BDC … EMC`; `begin` builds the opening operator for
/// the n-th range.
pub fn wrap_ranges<F>(
    operations: Vec<Operation>,
    ranges: &[RangeInclusive<usize>],
    mut begin: F,
) -> Vec<Operation>
where
    F: FnMut(usize) -> Operation,
{
    let mut openers: Vec<(usize, Operation)> = Vec::with_capacity(ranges.len());
    for (n, range) in ranges.iter().enumerate() {
        openers.push((*range.start(), begin(n)));
    }

    let mut wrapped = Vec::with_capacity(operations.len() + ranges.len() * 2);
    let mut openers = openers.into_iter().peekable();
    let mut closers: Vec<usize> = ranges.iter().map(|r| *r.end()).collect();
    closers.sort_unstable();
    let mut closers = closers.into_iter().peekable();

    for (index, op) in operations.into_iter().enumerate() {
        while let Some((_, opener)) = openers.next_if(|(start, _)| *start == index) {
            wrapped.push(opener);
        }
        wrapped.push(op);
        while closers.next_if(|end| *end == index).is_some() {
            wrapped.push(Operation::new("EMC", vec![]));
        }
    }
    wrapped
}

/// `/<tag> <<props>> BDC`.
pub fn begin_marked(tag: &str, properties: lopdf::Dictionary) -> Operation {
    Operation::new(
        "BDC",
        vec![
            Object::Name(tag.as_bytes().to_vec()),
            Object::Dictionary(properties),
        ],
    )
}

/// Fail or warn when a region matched nothing, depending on the mode.
pub fn unresolved(mode: ErrorMode, page: u32, bbox: &BoundingBox, what: &str) -> Result<()> {
    match mode {
        ErrorMode::Strict => Err(Error::UnresolvedRegion {
            page,
            x: bbox.x,
            y: bbox.y,
            width: bbox.width,
            height: bbox.height,
        }),
        ErrorMode::Lenient => {
            log::warn!(
                "No content for {} on page {} inside [{}, {}, {}, {}]; skipping",
                what,
                page,
                bbox.x,
                bbox.y,
                bbox.width,
                bbox.height
            );
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentScanner;
    use lopdf::content::Content;
    use lopdf::{dictionary, Dictionary, Document};

    fn resources() -> Dictionary {
        dictionary! {
            "Font" => dictionary! {
                "F1" => dictionary! { "Subtype" => "Type1", "BaseFont" => "Helvetica" },
            },
        }
    }

    fn scan(content: &str) -> (Vec<Operation>, PageScan) {
        let doc = Document::with_version("1.7");
        let ops = Content::decode(content.as_bytes()).unwrap().operations;
        let resources = resources();
        let scan = ContentScanner::new(&doc, &resources).scan(&ops);
        (ops, scan)
    }

    fn operators(ops: &[Operation]) -> Vec<&str> {
        ops.iter().map(|op| op.operator.as_str()).collect()
    }

    #[test]
    fn test_groups_adjacent_text_in_one_object() {
        let (ops, scan) = scan("BT /F1 10 Tf 0 700 Td (a) Tj (b) Tj ET 0 0 10 10 re f");
        let positions = select_untagged(
            &scan,
            &BboxResolver::default(),
            &BoundingBox::new(0.0, 690.0, 100.0, 30.0),
        );
        assert_eq!(positions, vec![0, 1]);
        let ranges = group_ranges(&scan, &positions);
        assert_eq!(ranges, vec![3..=4]);

        let wrapped = wrap_ranges(ops, &ranges, |n| {
            begin_marked("P", dictionary! { "MCID" => n as i64 })
        });
        assert_eq!(
            operators(&wrapped),
            vec!["BT", "Tf", "Td", "BDC", "Tj", "Tj", "EMC", "ET", "re", "f"]
        );
    }

    #[test]
    fn test_paths_are_separate_groups() {
        let (ops, scan) = scan("0 0 10 10 re f 20 0 10 10 re f");
        let positions = select_untagged(
            &scan,
            &BboxResolver::default(),
            &BoundingBox::new(0.0, 0.0, 40.0, 20.0),
        );
        let ranges = group_ranges(&scan, &positions);
        assert_eq!(ranges, vec![0..=1, 2..=3]);
        let wrapped = wrap_ranges(ops, &ranges, |_| begin_marked("Artifact", dictionary! {}));
        assert_eq!(
            operators(&wrapped),
            vec!["BDC", "re", "f", "EMC", "BDC", "re", "f", "EMC"]
        );
    }

    #[test]
    fn test_tagged_content_is_not_selected() {
        let (_, scan) = scan("/P <</MCID 0>> BDC 0 0 10 10 re f EMC");
        let positions = select_untagged(
            &scan,
            &BboxResolver::default(),
            &BoundingBox::new(0.0, 0.0, 40.0, 20.0),
        );
        assert!(positions.is_empty());
    }

    #[test]
    fn test_unresolved_modes() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert!(matches!(
            unresolved(ErrorMode::Strict, 2, &bbox, "tagging"),
            Err(Error::UnresolvedRegion { page: 2, .. })
        ));
        assert!(unresolved(ErrorMode::Lenient, 2, &bbox, "tagging").is_ok());
    }
}
