use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned rectangle given by its top-left corner and its extent.
///
/// This project uses the standard convention of the left side of the image being x=0 and the top
/// of the image being y=0. Width and height are never negative; the constructors refuse to build
/// a rectangle that would break that.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Rectangle {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

impl Rectangle {
    /// Checks if a box has valid parameters before constructing.
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self, String> {
        if !(x.is_finite() && y.is_finite() && width.is_finite() && height.is_finite()) {
            Err(format!(
                "Failed to create Rectangle, non-finite value in ({}, {}, {}, {}).",
                x, y, width, height
            ))
        } else if width < 0.0 {
            Err(format!("Failed to create Rectangle, width is negative ({}).", width))
        } else if height < 0.0 {
            Err(format!("Failed to create Rectangle, height is negative ({}).", height))
        } else {
            Ok(Rectangle { x, y, width, height })
        }
    }

    /// Builds a rectangle from its left, top, right and bottom edges.
    pub fn from_corners(left: f32, top: f32, right: f32, bottom: f32) -> Result<Self, String> {
        if left > right {
            return Err(format!(
                "Failed to create Rectangle, value for left > value for right ({} > {}).",
                left, right
            ));
        }
        if top > bottom {
            return Err(format!(
                "Failed to create Rectangle, value for top > value for bottom ({} > {}).",
                top, bottom
            ));
        }
        Rectangle::new(left, top, right - left, bottom - top)
    }

    /// Builds a rectangle from a centre point and an extent, the encoding YOLO heads emit.
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Result<Self, String> {
        Rectangle::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn left(&self) -> f32 {
        self.x
    }

    pub fn top(&self) -> f32 {
        self.y
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_degenerate(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Area shared by both rectangles, zero when they do not touch.
    pub fn intersection_area(&self, other: &Rectangle) -> f32 {
        let overlap_w = (self.right().min(other.right()) - self.left().max(other.left())).max(0.0);
        let overlap_h = (self.bottom().min(other.bottom()) - self.top().max(other.top())).max(0.0);
        overlap_w * overlap_h
    }

    /// Intersection area divided by union area, in [0, 1].
    ///
    /// Two identical rectangles always score 1.0, including zero-area ones where the ratio
    /// itself would be 0/0.
    pub fn intersection_over_union(&self, other: &Rectangle) -> f32 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return if self == other { 1.0 } else { 0.0 };
        }
        (intersection / union).clamp(0.0, 1.0)
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Rectangle {{ x: {}, y: {}, width: {}, height: {} }}",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f32, y: f32, w: f32, h: f32) -> Rectangle {
        Rectangle::new(x, y, w, h).unwrap()
    }

    #[test]
    fn rejects_negative_extent() {
        assert!(Rectangle::new(0.0, 0.0, -1.0, 1.0).is_err());
        assert!(Rectangle::new(0.0, 0.0, 1.0, -1.0).is_err());
        assert!(Rectangle::from_corners(5.0, 0.0, 4.0, 1.0).is_err());
        assert!(Rectangle::new(f32::NAN, 0.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn corners_and_center_agree() {
        let r = Rectangle::from_corners(10.0, 20.0, 30.0, 60.0).unwrap();
        assert_eq!((r.x(), r.y(), r.width(), r.height()), (10.0, 20.0, 20.0, 40.0));
        assert_eq!(r.center(), (20.0, 40.0));
        let c = Rectangle::from_center(20.0, 40.0, 20.0, 40.0).unwrap();
        assert_eq!(r, c);
    }

    #[test]
    fn iou_with_itself_is_one() {
        let a = rect(3.0, 4.0, 17.5, 9.25);
        assert_eq!(a.intersection_over_union(&a), 1.0);
        let point_like = rect(3.0, 4.0, 0.0, 0.0);
        assert_eq!(point_like.intersection_over_union(&point_like), 1.0);
    }

    #[test]
    fn iou_is_symmetric() {
        let a = rect(0.0, 0.0, 10.0, 10.0);
        let b = rect(5.0, 2.0, 10.0, 4.0);
        assert_eq!(a.intersection_over_union(&b), b.intersection_over_union(&a));
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(2.0, 2.0, 1.0, 1.0);
        assert_eq!(a.intersection_over_union(&b), 0.0);
        // Touching edges share no area.
        let c = rect(1.0, 0.0, 1.0, 1.0);
        assert_eq!(a.intersection_over_union(&c), 0.0);
    }

    #[test]
    fn iou_known_value() {
        // 20x20 boxes offset by (2, 2): intersection 18*18 = 324, union 800 - 324 = 476.
        let a = rect(10.0, 10.0, 20.0, 20.0);
        let b = rect(12.0, 12.0, 20.0, 20.0);
        let iou = a.intersection_over_union(&b);
        assert!((iou - 324.0 / 476.0).abs() < 1e-6);
    }
}
