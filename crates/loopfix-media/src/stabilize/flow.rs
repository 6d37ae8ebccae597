//! Pyramidal Lucas-Kanade point tracking.

use ndarray::Array2;

/// Number of pyramid levels (including the base).
pub const PYRAMID_LEVELS: usize = 3;
/// Half-width of the tracking window (21x21 window).
const WINDOW_RADIUS: i32 = 10;
/// Newton iterations per pyramid level.
const MAX_ITERATIONS: usize = 10;
/// Stop iterating once the update is below this, in pixels.
const CONVERGENCE_EPS: f32 = 0.01;
/// Per-sample minimum eigenvalue of the gradient matrix for a trackable window.
const MIN_EIGENVALUE: f32 = 0.05;

/// Image pyramid of float luma planes, halved per level by 2x2 averaging.
pub struct Pyramid {
    pub levels: Vec<Array2<f32>>,
}

impl Pyramid {
    /// Build a pyramid from a full-resolution plane.
    pub fn new(base: Array2<f32>, levels: usize) -> Self {
        let mut pyramid = vec![base];
        for _ in 1..levels {
            let prev = pyramid.last().expect("pyramid has a base level");
            let (h, w) = prev.dim();
            if h < 16 || w < 16 {
                break;
            }
            let (nh, nw) = (h / 2, w / 2);
            let mut next = Array2::zeros((nh, nw));
            for y in 0..nh {
                for x in 0..nw {
                    next[[y, x]] = 0.25
                        * (prev[[2 * y, 2 * x]]
                            + prev[[2 * y, 2 * x + 1]]
                            + prev[[2 * y + 1, 2 * x]]
                            + prev[[2 * y + 1, 2 * x + 1]]);
                }
            }
            pyramid.push(next);
        }
        Self { levels: pyramid }
    }

    /// Full-resolution plane.
    pub fn base(&self) -> &Array2<f32> {
        &self.levels[0]
    }
}

/// A point tracked from the previous frame into the current one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPoint {
    /// Position in the previous frame.
    pub prev: (f32, f32),
    /// Position in the current frame.
    pub curr: (f32, f32),
}

/// Track `points` from `prev` into `curr`, keeping only successes.
pub fn track_points(prev: &Pyramid, curr: &Pyramid, points: &[(f32, f32)]) -> Vec<TrackedPoint> {
    points
        .iter()
        .filter_map(|&p| {
            track_single(prev, curr, p).map(|c| TrackedPoint { prev: p, curr: c })
        })
        .collect()
}

fn track_single(prev: &Pyramid, curr: &Pyramid, point: (f32, f32)) -> Option<(f32, f32)> {
    let top = prev.levels.len().min(curr.levels.len()).checked_sub(1)?;

    // Flow is carried down the pyramid, doubling at each finer level
    let mut flow = (0.0f32, 0.0f32);
    for level in (0..=top).rev() {
        let scale = (1u32 << level) as f32;
        let scaled = (point.0 / scale, point.1 / scale);
        flow = refine_at_level(&prev.levels[level], &curr.levels[level], scaled, flow)?;
        if level > 0 {
            flow = (2.0 * flow.0, 2.0 * flow.1);
        }
    }

    let tracked = (point.0 + flow.0, point.1 + flow.1);
    let (h, w) = curr.base().dim();
    let in_bounds = tracked.0 >= 0.0
        && tracked.1 >= 0.0
        && tracked.0 <= (w - 1) as f32
        && tracked.1 <= (h - 1) as f32;
    in_bounds.then_some(tracked)
}

/// One level of iterative LK refinement around `p`, starting from `init`.
fn refine_at_level(
    prev: &Array2<f32>,
    curr: &Array2<f32>,
    p: (f32, f32),
    init: (f32, f32),
) -> Option<(f32, f32)> {
    // Window samples from the previous frame: position, gradient, intensity
    let mut window = Vec::with_capacity(((2 * WINDOW_RADIUS + 1) * (2 * WINDOW_RADIUS + 1)) as usize);
    let mut gxx = 0.0f32;
    let mut gxy = 0.0f32;
    let mut gyy = 0.0f32;
    for dy in -WINDOW_RADIUS..=WINDOW_RADIUS {
        for dx in -WINDOW_RADIUS..=WINDOW_RADIUS {
            let x = p.0 + dx as f32;
            let y = p.1 + dy as f32;
            let gx = 0.5 * (sample(prev, x + 1.0, y) - sample(prev, x - 1.0, y));
            let gy = 0.5 * (sample(prev, x, y + 1.0) - sample(prev, x, y - 1.0));
            let value = sample(prev, x, y);
            window.push((x, y, gx, gy, value));
            gxx += gx * gx;
            gxy += gx * gy;
            gyy += gy * gy;
        }
    }

    let count = window.len() as f32;
    let trace = gxx + gyy;
    let delta = ((gxx - gyy) * (gxx - gyy) + 4.0 * gxy * gxy).sqrt();
    if 0.5 * (trace - delta) / count < MIN_EIGENVALUE {
        return None;
    }
    let det = gxx * gyy - gxy * gxy;
    if det.abs() < 1e-6 {
        return None;
    }

    let mut v = init;
    for _ in 0..MAX_ITERATIONS {
        let mut bx = 0.0f32;
        let mut by = 0.0f32;
        for &(x, y, gx, gy, value) in &window {
            let diff = value - sample(curr, x + v.0, y + v.1);
            bx += gx * diff;
            by += gy * diff;
        }
        let dx = (gyy * bx - gxy * by) / det;
        let dy = (gxx * by - gxy * bx) / det;
        v.0 += dx;
        v.1 += dy;
        if dx * dx + dy * dy < CONVERGENCE_EPS * CONVERGENCE_EPS {
            break;
        }
    }

    Some(v)
}

/// Bilinear sample with edge clamping.
pub(crate) fn sample(img: &Array2<f32>, x: f32, y: f32) -> f32 {
    let (h, w) = img.dim();
    let x = x.clamp(0.0, (w - 1) as f32);
    let y = y.clamp(0.0, (h - 1) as f32);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let top = img[[y0, x0]] * (1.0 - fx) + img[[y0, x1]] * fx;
    let bottom = img[[y1, x0]] * (1.0 - fx) + img[[y1, x1]] * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Analytic texture defined everywhere, so shifted copies stay consistent.
    fn pattern(x: f32, y: f32) -> f32 {
        128.0 + 60.0 * (0.11 * x).sin() * (0.13 * y).cos() + 30.0 * (0.05 * (x + y)).sin()
    }

    fn plane_from(w: usize, h: usize, dx: f32, dy: f32) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| pattern(x as f32 - dx, y as f32 - dy))
    }

    #[test]
    fn test_pyramid_dimensions() {
        let base = plane_from(128, 96, 0.0, 0.0);
        let pyr = Pyramid::new(base, 3);
        assert_eq!(pyr.levels.len(), 3);
        assert_eq!(pyr.levels[0].dim(), (96, 128));
        assert_eq!(pyr.levels[1].dim(), (48, 64));
        assert_eq!(pyr.levels[2].dim(), (24, 32));
    }

    #[test]
    fn test_pyramid_stops_when_small() {
        let base = plane_from(20, 20, 0.0, 0.0);
        let pyr = Pyramid::new(base, 4);
        // 20 -> 10, then too small to halve again
        assert_eq!(pyr.levels.len(), 2);
    }

    #[test]
    fn test_sample_bilinear() {
        let img = Array2::from_shape_fn((2, 2), |(y, x)| (y * 2 + x) as f32 * 10.0);
        assert!((sample(&img, 0.5, 0.5) - 15.0).abs() < 1e-4);
        // Clamped outside
        assert!((sample(&img, -5.0, -5.0) - 0.0).abs() < 1e-4);
    }

    #[test]
    fn test_tracks_known_translation() {
        let prev = Pyramid::new(plane_from(160, 120, 0.0, 0.0), PYRAMID_LEVELS);
        let curr = Pyramid::new(plane_from(160, 120, 4.0, 3.0), PYRAMID_LEVELS);

        let points: Vec<(f32, f32)> = (0..4)
            .flat_map(|i| (0..3).map(move |j| (40.0 + 25.0 * i as f32, 35.0 + 25.0 * j as f32)))
            .collect();

        let tracked = track_points(&prev, &curr, &points);
        assert!(tracked.len() >= points.len() / 2, "too few tracks survived");
        for t in &tracked {
            let dx = t.curr.0 - t.prev.0;
            let dy = t.curr.1 - t.prev.1;
            assert!((dx - 4.0).abs() < 0.5, "dx = {dx}");
            assert!((dy - 3.0).abs() < 0.5, "dy = {dy}");
        }
    }

    #[test]
    fn test_flat_window_rejected() {
        let prev = Pyramid::new(Array2::from_elem((64, 64), 100.0), PYRAMID_LEVELS);
        let curr = Pyramid::new(Array2::from_elem((64, 64), 100.0), PYRAMID_LEVELS);
        let tracked = track_points(&prev, &curr, &[(32.0, 32.0)]);
        assert!(tracked.is_empty());
    }
}
