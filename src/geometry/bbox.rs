//! Rectangles and affine transforms in PDF user space.

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle given by its lower-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from two opposite corners in any order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        let (left, right) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        let (bottom, top) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        Self::new(left, bottom, right - left, top - bottom)
    }

    /// Smallest box covering all points; `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = (f64, f64)>>(points: I) -> Option<Self> {
        let mut iter = points.into_iter();
        let (x, y) = iter.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (x, y, x, y);
        for (x, y) in iter {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        Some(Self::from_corners(min_x, min_y, max_x, max_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Whether `other` lies entirely inside this box (edges inclusive).
    pub fn contains(&self, other: &BoundingBox) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.top() <= self.top()
    }

    /// Whether the point lies inside this box (edges inclusive).
    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.top()
    }

    /// Overlapping region, if the boxes intersect with positive extent or touch.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        let left = self.x.max(other.x);
        let bottom = self.y.max(other.y);
        let right = self.right().min(other.right());
        let top = self.top().min(other.top());
        if right < left || top < bottom {
            return None;
        }
        Some(BoundingBox::from_corners(left, bottom, right, top))
    }

    /// Smallest box covering both.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::from_corners(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.top().max(other.top()),
        )
    }

    /// PDF rectangle array order: `[llx lly urx ury]`.
    pub fn to_rect(&self) -> [f64; 4] {
        [self.x, self.y, self.right(), self.top()]
    }
}

/// PDF transformation matrix `[a b c d e f]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn multiply(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn transform_point(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Bounding box of a transformed rectangle.
    pub fn transform_bbox(&self, bbox: &BoundingBox) -> BoundingBox {
        let corners = [
            self.transform_point(bbox.x, bbox.y),
            self.transform_point(bbox.right(), bbox.y),
            self.transform_point(bbox.x, bbox.top()),
            self.transform_point(bbox.right(), bbox.top()),
        ];
        BoundingBox::from_points(corners).unwrap_or(*bbox)
    }

    /// Approximate uniform scale factor (vertical axis).
    pub fn vertical_scale(&self) -> f64 {
        (self.c * self.c + self.d * self.d).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains_and_intersection() {
        let outer = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let inner = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));

        let partial = BoundingBox::new(90.0, 90.0, 20.0, 20.0);
        let overlap = outer.intersection(&partial).unwrap();
        assert_eq!(overlap, BoundingBox::new(90.0, 90.0, 10.0, 10.0));
        assert!(outer
            .intersection(&BoundingBox::new(200.0, 0.0, 5.0, 5.0))
            .is_none());
    }

    #[test]
    fn test_matrix_multiply_translate_scale() {
        let scale = Matrix::new(2.0, 0.0, 0.0, 2.0, 0.0, 0.0);
        let shift = Matrix::translation(10.0, 5.0);
        let m = scale.multiply(&shift);
        assert_eq!(m.transform_point(1.0, 1.0), (12.0, 7.0));
        let m = shift.multiply(&scale);
        assert_eq!(m.transform_point(1.0, 1.0), (22.0, 12.0));
    }

    #[test]
    fn test_transform_bbox_rotation() {
        let rotate = Matrix::new(0.0, 1.0, -1.0, 0.0, 0.0, 0.0);
        let bbox = rotate.transform_bbox(&BoundingBox::new(0.0, 0.0, 10.0, 5.0));
        assert_eq!(bbox, BoundingBox::new(-5.0, 0.0, 5.0, 10.0));
    }
}
