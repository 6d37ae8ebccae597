//! Partial affine motion estimation and frame warping.
//!
//! The estimated transform allows rotation, translation, and uniform scale
//! but no shear, and maps the current frame's content onto its
//! predecessor's coordinate frame; warping the current frame by it cancels
//! the estimated camera motion.

use image::{Rgb, RgbImage};

use super::flow::TrackedPoint;

/// Minimum point correspondences required to attempt an estimate.
pub const MIN_CORRESPONDENCES: usize = 4;
/// Hypothesis rounds for the robust fit.
const RANSAC_ROUNDS: usize = 64;
/// Residual below which a correspondence counts as an inlier, in pixels.
const INLIER_THRESHOLD: f64 = 3.0;

/// A 2x3 affine matrix in row-major order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionTransform {
    pub m: [[f64; 3]; 2],
}

impl MotionTransform {
    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        }
    }

    /// Build from similarity parameters `a = s*cos(t)`, `b = s*sin(t)` and a
    /// translation.
    fn from_params(a: f64, b: f64, tx: f64, ty: f64) -> Self {
        Self {
            m: [[a, -b, tx], [b, a, ty]],
        }
    }

    /// Map a point through the transform.
    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m[0][0] * x + self.m[0][1] * y + self.m[0][2],
            self.m[1][0] * x + self.m[1][1] * y + self.m[1][2],
        )
    }

    /// Translation component.
    pub fn translation(&self) -> (f64, f64) {
        (self.m[0][2], self.m[1][2])
    }

    /// Rotation component, in radians.
    pub fn rotation(&self) -> f64 {
        self.m[1][0].atan2(self.m[0][0])
    }

    /// Uniform scale component.
    pub fn scale(&self) -> f64 {
        (self.m[0][0] * self.m[0][0] + self.m[1][0] * self.m[1][0]).sqrt()
    }

    /// Inverse transform, or `None` when degenerate.
    pub fn inverse(&self) -> Option<Self> {
        let [[a, b, tx], [c, d, ty]] = self.m;
        let det = a * d - b * c;
        if det.abs() < 1e-12 {
            return None;
        }
        let ia = d / det;
        let ib = -b / det;
        let ic = -c / det;
        let id = a / det;
        Some(Self {
            m: [
                [ia, ib, -(ia * tx + ib * ty)],
                [ic, id, -(ic * tx + id * ty)],
            ],
        })
    }
}

/// Robustly fit a partial affine transform mapping `curr` points onto
/// `prev` points.
///
/// Two-point hypotheses are generated on a fixed stride schedule (keeping
/// the result deterministic), scored by inlier count, and the best inlier
/// set is refined with a least-squares fit. Returns `None` when fewer than
/// [`MIN_CORRESPONDENCES`] inliers support any hypothesis.
pub fn estimate_partial_affine(matches: &[TrackedPoint]) -> Option<MotionTransform> {
    let n = matches.len();
    if n < MIN_CORRESPONDENCES {
        return None;
    }

    let mut best_inliers: Vec<usize> = Vec::new();
    for round in 0..RANSAC_ROUNDS {
        let i = round % n;
        let j = (i + 1 + (round * 7919) % (n - 1)) % n;
        if i == j {
            continue;
        }

        let Some(hypothesis) = fit_two_points(&matches[i], &matches[j]) else {
            continue;
        };

        let inliers: Vec<usize> = (0..n)
            .filter(|&k| residual(&hypothesis, &matches[k]) < INLIER_THRESHOLD)
            .collect();
        if inliers.len() > best_inliers.len() {
            best_inliers = inliers;
        }
    }

    if best_inliers.len() < MIN_CORRESPONDENCES {
        return None;
    }

    let inlier_matches: Vec<TrackedPoint> =
        best_inliers.iter().map(|&k| matches[k]).collect();
    fit_similarity(&inlier_matches)
}

/// Exact similarity transform through two correspondences.
fn fit_two_points(p: &TrackedPoint, q: &TrackedPoint) -> Option<MotionTransform> {
    // Solve z' = s*z + t over complex coordinates, from = curr, to = prev
    let (fx1, fy1) = (p.curr.0 as f64, p.curr.1 as f64);
    let (fx2, fy2) = (q.curr.0 as f64, q.curr.1 as f64);
    let (tx1, ty1) = (p.prev.0 as f64, p.prev.1 as f64);
    let (tx2, ty2) = (q.prev.0 as f64, q.prev.1 as f64);

    let dfx = fx2 - fx1;
    let dfy = fy2 - fy1;
    let dtx = tx2 - tx1;
    let dty = ty2 - ty1;

    let denom = dfx * dfx + dfy * dfy;
    if denom < 1e-9 {
        return None;
    }

    let a = (dtx * dfx + dty * dfy) / denom;
    let b = (dty * dfx - dtx * dfy) / denom;
    let tx = tx1 - (a * fx1 - b * fy1);
    let ty = ty1 - (b * fx1 + a * fy1);
    Some(MotionTransform::from_params(a, b, tx, ty))
}

/// Least-squares similarity transform mapping `curr` points onto `prev`.
pub fn fit_similarity(matches: &[TrackedPoint]) -> Option<MotionTransform> {
    let n = matches.len();
    if n < 2 {
        return None;
    }
    let nf = n as f64;

    // Centroids of both point sets
    let (mut mfx, mut mfy, mut mtx, mut mty) = (0.0, 0.0, 0.0, 0.0);
    for m in matches {
        mfx += m.curr.0 as f64;
        mfy += m.curr.1 as f64;
        mtx += m.prev.0 as f64;
        mty += m.prev.1 as f64;
    }
    mfx /= nf;
    mfy /= nf;
    mtx /= nf;
    mty /= nf;

    // Closed-form similarity fit on centered coordinates
    let mut num_a = 0.0;
    let mut num_b = 0.0;
    let mut denom = 0.0;
    for m in matches {
        let fx = m.curr.0 as f64 - mfx;
        let fy = m.curr.1 as f64 - mfy;
        let tx = m.prev.0 as f64 - mtx;
        let ty = m.prev.1 as f64 - mty;
        num_a += fx * tx + fy * ty;
        num_b += fx * ty - fy * tx;
        denom += fx * fx + fy * fy;
    }
    if denom < 1e-9 {
        return None;
    }

    let a = num_a / denom;
    let b = num_b / denom;
    let tx = mtx - (a * mfx - b * mfy);
    let ty = mty - (b * mfx + a * mfy);
    Some(MotionTransform::from_params(a, b, tx, ty))
}

/// Distance between a transformed `curr` point and its `prev` observation.
fn residual(t: &MotionTransform, m: &TrackedPoint) -> f64 {
    let (x, y) = t.apply(m.curr.0 as f64, m.curr.1 as f64);
    let dx = x - m.prev.0 as f64;
    let dy = y - m.prev.1 as f64;
    (dx * dx + dy * dy).sqrt()
}

/// Warp an RGB frame by a transform.
///
/// Output pixel `(x, y)` samples the source at the inverse-mapped position,
/// so the frame's content moves forward through the transform. Samples
/// falling outside the source are black.
pub fn warp_rgb(frame: &RgbImage, transform: &MotionTransform) -> RgbImage {
    let Some(inverse) = transform.inverse() else {
        return frame.clone();
    };

    let (w, h) = frame.dimensions();
    let mut out = RgbImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let (sx, sy) = inverse.apply(x as f64, y as f64);
            out.put_pixel(x, y, sample_rgb(frame, sx as f32, sy as f32));
        }
    }
    out
}

/// Bilinear RGB sample; black outside the image.
fn sample_rgb(img: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return Rgb([0, 0, 0]);
    }

    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let mut channels = [0u8; 3];
    for (c, channel) in channels.iter_mut().enumerate() {
        let p00 = img.get_pixel(x0, y0).0[c] as f32;
        let p10 = img.get_pixel(x1, y0).0[c] as f32;
        let p01 = img.get_pixel(x0, y1).0[c] as f32;
        let p11 = img.get_pixel(x1, y1).0[c] as f32;
        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        *channel = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spread_points() -> Vec<(f32, f32)> {
        (0..5)
            .flat_map(|i| (0..4).map(move |j| (30.0 + 40.0 * i as f32, 25.0 + 35.0 * j as f32)))
            .collect()
    }

    fn matches_through(t: &MotionTransform, points: &[(f32, f32)]) -> Vec<TrackedPoint> {
        // t maps curr -> prev, so generate prev from curr
        points
            .iter()
            .map(|&(x, y)| {
                let (px, py) = t.apply(x as f64, y as f64);
                TrackedPoint {
                    prev: (px as f32, py as f32),
                    curr: (x, y),
                }
            })
            .collect()
    }

    fn assert_transform_close(a: &MotionTransform, b: &MotionTransform, tol: f64) {
        for row in 0..2 {
            for col in 0..3 {
                assert!(
                    (a.m[row][col] - b.m[row][col]).abs() < tol,
                    "m[{row}][{col}]: {} vs {}",
                    a.m[row][col],
                    b.m[row][col]
                );
            }
        }
    }

    #[test]
    fn test_identity_apply() {
        let t = MotionTransform::identity();
        assert_eq!(t.apply(3.0, 4.0), (3.0, 4.0));
        assert_eq!(t.translation(), (0.0, 0.0));
        assert_eq!(t.rotation(), 0.0);
        assert!((t.scale() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let t = MotionTransform::from_params(0.98 * 0.1f64.cos(), 0.98 * 0.1f64.sin(), 5.0, -3.0);
        let inv = t.inverse().unwrap();
        let (x, y) = inv.apply(t.apply(12.0, 7.0).0, t.apply(12.0, 7.0).1);
        assert!((x - 12.0).abs() < 1e-9);
        assert!((y - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_similarity_exact_recovery() {
        let truth =
            MotionTransform::from_params(1.02 * 0.1f64.cos(), 1.02 * 0.1f64.sin(), 5.0, -3.0);
        let matches = matches_through(&truth, &spread_points());

        let fitted = fit_similarity(&matches).unwrap();
        assert_transform_close(&fitted, &truth, 1e-4);
        assert!((fitted.scale() - 1.02).abs() < 1e-3);
        assert!((fitted.rotation() - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_estimate_rejects_too_few() {
        let truth = MotionTransform::from_params(1.0, 0.0, 2.0, 2.0);
        let matches = matches_through(&truth, &[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert!(estimate_partial_affine(&matches).is_none());
    }

    #[test]
    fn test_estimate_robust_to_outliers() {
        let truth = MotionTransform::from_params(1.0, 0.0, -4.0, -3.0);
        let mut matches = matches_through(&truth, &spread_points());
        // A quarter of the tracks are garbage
        for k in 0..5 {
            matches.push(TrackedPoint {
                prev: (200.0 + 30.0 * k as f32, 10.0),
                curr: (15.0, 180.0 - 20.0 * k as f32),
            });
        }

        let fitted = estimate_partial_affine(&matches).unwrap();
        assert_transform_close(&fitted, &truth, 0.05);
        let (tx, ty) = fitted.translation();
        assert!((tx + 4.0).abs() < 0.05);
        assert!((ty + 3.0).abs() < 0.05);
    }

    #[test]
    fn test_warp_translation_moves_content() {
        // A bright dot at (10, 10) translated by (+3, +2) lands at (13, 12)
        let mut img = RgbImage::new(32, 32);
        img.put_pixel(10, 10, Rgb([250, 250, 250]));

        let t = MotionTransform::from_params(1.0, 0.0, 3.0, 2.0);
        let warped = warp_rgb(&img, &t);
        assert_eq!(warped.get_pixel(13, 12).0, [250, 250, 250]);
        assert_eq!(warped.get_pixel(10, 10).0, [0, 0, 0]);
    }

    #[test]
    fn test_warp_identity_is_noop() {
        let mut img = RgbImage::new(16, 16);
        img.put_pixel(5, 9, Rgb([10, 200, 30]));
        let warped = warp_rgb(&img, &MotionTransform::identity());
        assert_eq!(warped, img);
    }
}
