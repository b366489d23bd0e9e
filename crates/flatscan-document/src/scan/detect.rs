// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document boundary detection — grayscale, blur, Canny, morphological close,
// external contours, and polygon approximation down to a quadrilateral.

use flatscan_core::{Corners, DetectionConfig, Point};
use image::{DynamicImage, GrayImage};
use imageproc::contours::{BorderType, Contour, find_contours};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::morphology::close;
use imageproc::point::Point as PixelPoint;
use tracing::{debug, info, instrument, trace, warn};

use crate::geometry::{clamp_point, default_corners, sort_corners};

/// Outcome of [`EdgeDetector::detect_or_default`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Detection {
    /// A quadrilateral was found in the image.
    Found(Corners),
    /// Nothing usable was found; these are the default inset corners.
    Fallback(Corners),
}

impl Detection {
    pub fn corners(&self) -> Corners {
        match self {
            Self::Found(c) | Self::Fallback(c) => *c,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Locates the document quadrilateral in a photo.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdgeDetector {
    config: DetectionConfig,
}

impl EdgeDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Find the document corners, or `None` when no contour reduces to
    /// exactly four vertices.
    ///
    /// ## Pipeline
    ///
    /// 1. Convert to grayscale
    /// 2. Gaussian blur to suppress paper texture
    /// 3. Canny edge detection
    /// 4. Morphological close (3x3) to bridge gaps in the outline
    /// 5. External contour extraction
    /// 6. Drop contours smaller than `min_area_ratio` of the image
    /// 7. Largest first, approximate each polygon and take the first quad
    /// 8. Canonical corner ordering
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn detect(&self, image: &DynamicImage) -> Option<Corners> {
        let (width, height) = (image.width(), image.height());
        if width < 3 || height < 3 {
            warn!("Image too small for edge detection");
            return None;
        }

        let mut scratch = Scratch::default();

        let gray = scratch.hold(image.to_luma8());
        let sigma = kernel_sigma(self.config.blur_kernel);
        let blurred = gaussian_blur_f32(gray, sigma);
        let blurred = scratch.hold(blurred);
        debug!(sigma, "Applied Gaussian blur");

        let edges = canny(blurred, self.config.canny_low, self.config.canny_high);
        let edges = scratch.hold(edges);
        let closed = close(edges, Norm::LInf, 1);
        let closed = scratch.hold(closed);

        let contours: Vec<Contour<i32>> = find_contours(closed);
        debug!(
            scratch_bytes = scratch.allocated_bytes(),
            "Edge map ready"
        );
        let min_area = self.config.min_area_ratio as f64 * width as f64 * height as f64;

        let mut candidates: Vec<(f64, &Contour<i32>)> = contours
            .iter()
            .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
            .map(|c| (contour_area(&c.points), c))
            .filter(|(area, _)| *area >= min_area)
            .collect();
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0));
        debug!(
            contours = contours.len(),
            candidates = candidates.len(),
            min_area,
            "Contours filtered"
        );

        for (area, contour) in candidates {
            let points = &contour.points;
            if points.len() < 8 {
                continue;
            }
            let perimeter = arc_length(points, true);
            if perimeter <= 0.0 {
                continue;
            }
            let epsilon = self.config.approx_epsilon * perimeter;
            if epsilon.is_nan() || epsilon <= 0.0 {
                continue;
            }
            let vertices = simplify_closed(points, epsilon);
            trace!(area, perimeter, vertices = vertices.len(), "Approximated contour");

            if let &[a, b, c, d] = vertices.as_slice() {
                let refined = refine_corners(points, [a, b, c, d], epsilon)
                    .map(|p| clamp_point(p, width, height));
                let corners = sort_corners(refined);
                info!(?corners, area, "Document quadrilateral detected");
                return Some(corners);
            }
        }

        warn!("No quadrilateral contour found");
        None
    }

    /// Detect corners, falling back to the default inset rectangle.
    pub fn detect_or_default(&self, image: &DynamicImage) -> Detection {
        match self.detect(image) {
            Some(corners) => Detection::Found(corners),
            None => Detection::Fallback(default_corners(image.width(), image.height(), None)),
        }
    }
}

/// Sigma for a Gaussian kernel of the given size, using the usual
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8` rule.
fn kernel_sigma(kernel: u32) -> f32 {
    let k = kernel.max(1) as f32;
    (0.3 * ((k - 1.0) * 0.5 - 1.0) + 0.8).max(0.5)
}

fn to_point(p: PixelPoint<i32>) -> Point {
    Point::new(p.x as f32, p.y as f32)
}

/// Contour indices of a simplified closed contour, in contour order.
///
/// The contour is cut at its two mutually farthest points (found from the
/// start point) and each arc is simplified as an open curve, so no vertex
/// depends on where the tracer happened to start.
fn simplify_closed(points: &[PixelPoint<i32>], epsilon: f64) -> Vec<usize> {
    let n = points.len();
    let a = farthest_from(points, points[0]);
    let b = farthest_from(points, points[a]);
    let (i, j) = (a.min(b), a.max(b));
    if i == j {
        return Vec::new();
    }

    let forward = &points[i..=j];
    let backward: Vec<PixelPoint<i32>> = points[j..].iter().chain(&points[..=i]).copied().collect();

    let mut vertices: Vec<usize> = arc_indices(forward, &approximate_polygon_dp(forward, epsilon, false))
        .into_iter()
        .map(|k| i + k)
        .collect();
    // The arcs share their end points; each is kept once.
    vertices.pop();
    let mut tail: Vec<usize> = arc_indices(&backward, &approximate_polygon_dp(&backward, epsilon, false))
        .into_iter()
        .map(|k| (j + k) % n)
        .collect();
    tail.pop();
    vertices.extend(tail);
    vertices
}

fn farthest_from(points: &[PixelPoint<i32>], origin: PixelPoint<i32>) -> usize {
    points
        .iter()
        .enumerate()
        .max_by_key(|(_, p)| {
            let (dx, dy) = ((p.x - origin.x) as i64, (p.y - origin.y) as i64);
            dx * dx + dy * dy
        })
        .map_or(0, |(index, _)| index)
}

/// Positions of the simplified points within `arc`, searched in order.
fn arc_indices(arc: &[PixelPoint<i32>], simplified: &[PixelPoint<i32>]) -> Vec<usize> {
    let mut from = 0;
    simplified
        .iter()
        .filter_map(|p| {
            let k = from + arc[from..].iter().position(|q| q == p)?;
            from = k;
            Some(k)
        })
        .collect()
}

/// Sub-pixel corners: fit a line to the middle of each side and intersect
/// neighbouring sides. A corner keeps its contour vertex when a side is too
/// short to fit or the intersection lands more than `max_shift` away.
fn refine_corners(points: &[PixelPoint<i32>], vertices: [usize; 4], max_shift: f64) -> [Point; 4] {
    let n = points.len();
    let sides: Vec<Option<Line>> = (0..4)
        .map(|k| {
            let (start, end) = (vertices[k], vertices[(k + 1) % 4]);
            let len = (end + n - start) % n + 1;
            let trim = (len / 8).max(2);
            if len < 2 * trim + 5 {
                return None;
            }
            let side = (start + trim..start + len - trim).map(|idx| points[idx % n]);
            fit_line(side)
        })
        .collect();

    std::array::from_fn(|k| {
        let vertex = points[vertices[k]];
        let fallback = to_point(vertex);
        let (Some(incoming), Some(outgoing)) = (&sides[(k + 3) % 4], &sides[k]) else {
            return fallback;
        };
        match incoming.intersect(outgoing) {
            Some((x, y))
                if ((x - vertex.x as f64).hypot(y - vertex.y as f64)) <= max_shift =>
            {
                Point::new(x as f32, y as f32)
            }
            _ => fallback,
        }
    })
}

/// A line through `origin` along the unit vector `dir`.
struct Line {
    origin: (f64, f64),
    dir: (f64, f64),
}

impl Line {
    fn intersect(&self, other: &Line) -> Option<(f64, f64)> {
        let denom = self.dir.0 * other.dir.1 - self.dir.1 * other.dir.0;
        if denom.abs() < 1e-6 {
            return None;
        }
        let (dx, dy) = (other.origin.0 - self.origin.0, other.origin.1 - self.origin.1);
        let t = (dx * other.dir.1 - dy * other.dir.0) / denom;
        Some((self.origin.0 + t * self.dir.0, self.origin.1 + t * self.dir.1))
    }
}

/// Total least squares fit: the principal axis of the points.
fn fit_line(points: impl Iterator<Item = PixelPoint<i32>> + Clone) -> Option<Line> {
    let count = points.clone().count();
    if count < 2 {
        return None;
    }
    let n = count as f64;
    let (sx, sy) = points
        .clone()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let (mx, my) = (sx / n, sy / n);
    let (sxx, syy, sxy) = points.fold((0.0, 0.0, 0.0), |(a, b, c), p| {
        let (dx, dy) = (p.x as f64 - mx, p.y as f64 - my);
        (a + dx * dx, b + dy * dy, c + dx * dy)
    });
    if sxx + syy <= f64::EPSILON {
        return None;
    }
    let theta = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    Some(Line {
        origin: (mx, my),
        dir: (theta.cos(), theta.sin()),
    })
}

// -- Scratch buffers ----------------------------------------------------------

/// Owns every intermediate raster of one detection call.
///
/// All buffers are freed together when the scratch goes out of scope, on the
/// success path, the no-match path, and during unwinding alike.
#[derive(Default)]
struct Scratch {
    buffers: Vec<GrayImage>,
}

impl Scratch {
    /// Take ownership of a buffer and hand back a borrow of it.
    fn hold(&mut self, buffer: GrayImage) -> &GrayImage {
        self.buffers.push(buffer);
        &self.buffers[self.buffers.len() - 1]
    }

    fn allocated_bytes(&self) -> usize {
        self.buffers.iter().map(|b| b.as_raw().len()).sum()
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        trace!(
            buffers = self.buffers.len(),
            bytes = self.allocated_bytes(),
            "Released detection scratch buffers"
        );
    }
}
