// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry helpers — point distances, corner ordering, rectified output size,
// and default inset corners.

use flatscan_core::{Corners, Point};
use imageproc::geometry::contour_area;
use imageproc::point::Point as PixelPoint;

/// Fraction of the shorter image side used as the default corner inset.
pub const DEFAULT_MARGIN_RATIO: f32 = 0.05;

/// Euclidean distance between two points.
pub fn distance(a: Point, b: Point) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Assign canonical corner order to four unordered points.
///
/// Uses the sum/difference heuristic: the top-left corner has the smallest
/// `x + y`, the bottom-right the largest; the top-right has the largest
/// `x - y`, the bottom-left the smallest.
///
/// Assumes the document is roughly upright. Quadrilaterals rotated by more
/// than 45 degrees can come back misordered.
pub fn sort_corners(points: [Point; 4]) -> Corners {
    let by = |key: fn(&Point) -> f32, want_max: bool| -> Point {
        let mut best = points[0];
        for p in &points[1..] {
            let better = if want_max {
                key(p) > key(&best)
            } else {
                key(p) < key(&best)
            };
            if better {
                best = *p;
            }
        }
        best
    };

    let sum = |p: &Point| p.x + p.y;
    let diff = |p: &Point| p.x - p.y;

    Corners::new(
        by(sum, false),
        by(diff, true),
        by(sum, true),
        by(diff, false),
    )
}

/// Pixel size of the rectified page for a corner set.
///
/// Width is the longer of the top and bottom edges, height the longer of the
/// left and right edges, so no content is cropped. Never returns zero.
pub fn calculate_output_size(corners: &Corners) -> (u32, u32) {
    let top = distance(corners.top_left, corners.top_right);
    let bottom = distance(corners.bottom_left, corners.bottom_right);
    let left = distance(corners.top_left, corners.bottom_left);
    let right = distance(corners.top_right, corners.bottom_right);

    let width = top.max(bottom).round().max(1.0) as u32;
    let height = left.max(right).round().max(1.0) as u32;
    (width, height)
}

/// Corners inset from the image bounds by `margin` pixels.
///
/// With no margin given, 5% of the shorter side is used. The margin is
/// clamped so the rectangle never inverts on tiny images.
pub fn default_corners(width: u32, height: u32, margin: Option<f32>) -> Corners {
    let (w, h) = (width as f32, height as f32);
    let margin = margin
        .unwrap_or(w.min(h) * DEFAULT_MARGIN_RATIO)
        .clamp(0.0, w.min(h) / 2.0);

    Corners::new(
        Point::new(margin, margin),
        Point::new(w - margin, margin),
        Point::new(w - margin, h - margin),
        Point::new(margin, h - margin),
    )
}

/// Area of the quadrilateral, via imageproc's shoelace `contour_area`.
pub fn quad_area(corners: &Corners) -> f32 {
    let pts = corners.to_array().map(|p| PixelPoint::new(p.x, p.y));
    contour_area(&pts) as f32
}

/// Clamp a point into `[0, width] x [0, height]`.
pub fn clamp_point(point: Point, width: u32, height: u32) -> Point {
    Point::new(
        point.x.clamp(0.0, width as f32),
        point.y.clamp(0.0, height as f32),
    )
}

/// Axis-aligned bounding box `(min_x, min_y, max_x, max_y)` of the corners.
pub fn bounding_box(corners: &Corners) -> (f32, f32, f32, f32) {
    corners.to_array().iter().fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skewed() -> Corners {
        Corners::new(
            Point::new(40.0, 30.0),
            Point::new(360.0, 50.0),
            Point::new(380.0, 470.0),
            Point::new(20.0, 450.0),
        )
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn sort_corners_from_shuffled_points() {
        let c = skewed();
        let shuffled = [c.bottom_right, c.top_left, c.bottom_left, c.top_right];
        assert_eq!(sort_corners(shuffled), c);
    }

    #[test]
    fn sort_corners_is_idempotent() {
        let once = sort_corners(skewed().to_array());
        let twice = sort_corners(once.to_array());
        assert_eq!(once, twice);
    }

    #[test]
    fn output_size_uses_longest_opposing_sides() {
        let c = skewed();
        let (w, h) = calculate_output_size(&c);

        let top = distance(c.top_left, c.top_right);
        let bottom = distance(c.bottom_left, c.bottom_right);
        let left = distance(c.top_left, c.bottom_left);
        let right = distance(c.top_right, c.bottom_right);
        assert_eq!(w, top.max(bottom).round() as u32);
        assert_eq!(h, left.max(right).round() as u32);
        assert!(w > 0 && h > 0);
    }

    #[test]
    fn output_size_of_axis_aligned_rectangle() {
        let c = default_corners(1000, 1400, Some(0.0));
        assert_eq!(calculate_output_size(&c), (1000, 1400));
    }

    #[test]
    fn output_size_never_zero() {
        let p = Point::new(5.0, 5.0);
        assert_eq!(calculate_output_size(&Corners::new(p, p, p, p)), (1, 1));
    }

    #[test]
    fn default_corners_form_inset_rectangle() {
        for &(w, h, m) in &[(1000u32, 1400u32, 50.0f32), (640, 480, 0.0), (33, 17, 4.0)] {
            let c = default_corners(w, h, Some(m));
            for p in c.to_array() {
                assert!(p.x >= m && p.x <= w as f32 - m, "x out of range: {p:?}");
                assert!(p.y >= m && p.y <= h as f32 - m, "y out of range: {p:?}");
            }
            assert_eq!(c.top_left.y, c.top_right.y);
            assert_eq!(c.bottom_left.y, c.bottom_right.y);
            assert_eq!(c.top_left.x, c.bottom_left.x);
            assert_eq!(c.top_right.x, c.bottom_right.x);
        }
    }

    #[test]
    fn default_margin_is_five_percent_of_short_side() {
        let c = default_corners(1000, 2000, None);
        assert_eq!(c.top_left, Point::new(50.0, 50.0));
        assert_eq!(c.bottom_right, Point::new(950.0, 1950.0));
    }

    #[test]
    fn oversized_margin_is_clamped() {
        let c = default_corners(10, 10, Some(40.0));
        assert_eq!(c.top_left, Point::new(5.0, 5.0));
        assert_eq!(c.bottom_right, Point::new(5.0, 5.0));
    }

    #[test]
    fn quad_area_ignores_winding() {
        let c = default_corners(10, 5, Some(0.0));
        assert!((quad_area(&c) - 50.0).abs() < 1e-3);

        let reversed = Corners::new(c.top_left, c.bottom_left, c.bottom_right, c.top_right);
        assert!((quad_area(&reversed) - 50.0).abs() < 1e-3);
    }

    #[test]
    fn clamp_point_to_bounds() {
        assert_eq!(
            clamp_point(Point::new(-3.0, 120.0), 100, 100),
            Point::new(0.0, 100.0)
        );
    }
}
