//! Text and background colour pairs with their WCAG contrast ratio.

use std::collections::BTreeMap;

use super::report::ColorPairReport;
use crate::content::{DrawnOperator, OperatorKind, PageScan, BLACK};

/// Page colour assumed behind text with no filled shape under it.
pub const PAGE_BACKGROUND: &str = "#FFFFFF";

/// Count foreground/background pairs over the visible text of the pages.
///
/// The background of a text operator is the fill colour of the last
/// filled path painted before it whose box encloses the text.
pub fn color_pairs<'a>(scans: impl IntoIterator<Item = &'a PageScan>) -> Vec<ColorPairReport> {
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for scan in scans {
        for (position, op) in scan.operators.iter().enumerate() {
            if op.kind != OperatorKind::Text || op.is_invisible() {
                continue;
            }
            if op.text.as_deref().map_or(true, |t| t.trim().is_empty()) {
                continue;
            }
            let foreground = op.fill_color.clone().unwrap_or_else(|| BLACK.to_string());
            let background = background(&scan.operators[..position], op);
            *counts.entry((foreground, background)).or_default() += 1;
        }
    }

    counts
        .into_iter()
        .map(|((foreground, background), count)| ColorPairReport {
            contrast_ratio: contrast_ratio(&foreground, &background)
                .map_or(0.0, |ratio| (ratio * 100.0).round() / 100.0),
            foreground,
            background,
            count,
        })
        .collect()
}

fn background(earlier: &[DrawnOperator], text: &DrawnOperator) -> String {
    let Some(bbox) = text.bbox else {
        return PAGE_BACKGROUND.to_string();
    };
    earlier
        .iter()
        .rev()
        .filter(|op| op.kind == OperatorKind::Path && op.filled)
        .find(|op| op.bbox.is_some_and(|shape| shape.expand(0.5).contains(&bbox)))
        .and_then(|op| op.fill_color.clone())
        .unwrap_or_else(|| PAGE_BACKGROUND.to_string())
}

/// `(L1 + 0.05) / (L2 + 0.05)` for two `#RRGGBB` colours.
pub fn contrast_ratio(first: &str, second: &str) -> Option<f64> {
    let a = relative_luminance(first)?;
    let b = relative_luminance(second)?;
    let (light, dark) = if a >= b { (a, b) } else { (b, a) };
    Some((light + 0.05) / (dark + 0.05))
}

fn relative_luminance(hex: &str) -> Option<f64> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| -> Option<f64> {
        let value = u8::from_str_radix(hex.get(i..i + 2)?, 16).ok()? as f64 / 255.0;
        Some(if value <= 0.03928 {
            value / 12.92
        } else {
            ((value + 0.055) / 1.055).powf(2.4)
        })
    };
    Some(0.2126 * channel(0)? + 0.7152 * channel(2)? + 0.0722 * channel(4)?)
}
