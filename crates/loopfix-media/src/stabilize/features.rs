//! Trackable-point detection (Shi-Tomasi minimum-eigenvalue corners).

use ndarray::Array2;

/// Upper bound on detected corners per frame.
pub const MAX_CORNERS: usize = 200;
/// Response threshold relative to the strongest corner.
pub const QUALITY_LEVEL: f32 = 0.01;
/// Minimum separation between accepted corners, in pixels.
pub const MIN_DISTANCE: f32 = 30.0;

/// Detect high-contrast trackable points in a grayscale plane.
///
/// Returns corner positions `(x, y)` ordered by decreasing response,
/// thinned so no two accepted corners are closer than `min_distance`.
pub fn detect_corners(
    gray: &Array2<f32>,
    max_corners: usize,
    quality_level: f32,
    min_distance: f32,
) -> Vec<(f32, f32)> {
    let (h, w) = gray.dim();
    if h < 8 || w < 8 || max_corners == 0 {
        return Vec::new();
    }

    // Central-difference gradients
    let mut ix = Array2::<f32>::zeros((h, w));
    let mut iy = Array2::<f32>::zeros((h, w));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            ix[[y, x]] = 0.5 * (gray[[y, x + 1]] - gray[[y, x - 1]]);
            iy[[y, x]] = 0.5 * (gray[[y + 1, x]] - gray[[y - 1, x]]);
        }
    }

    // Minimum eigenvalue of the 3x3-windowed structure tensor
    let mut response = Array2::<f32>::zeros((h, w));
    let mut max_response = 0.0f32;
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let mut sxx = 0.0;
            let mut sxy = 0.0;
            let mut syy = 0.0;
            for dy in 0..3 {
                for dx in 0..3 {
                    let gx = ix[[y + dy - 1, x + dx - 1]];
                    let gy = iy[[y + dy - 1, x + dx - 1]];
                    sxx += gx * gx;
                    sxy += gx * gy;
                    syy += gy * gy;
                }
            }
            let trace = sxx + syy;
            let delta = ((sxx - syy) * (sxx - syy) + 4.0 * sxy * sxy).sqrt();
            let lambda_min = 0.5 * (trace - delta);
            response[[y, x]] = lambda_min;
            if lambda_min > max_response {
                max_response = lambda_min;
            }
        }
    }

    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = quality_level * max_response;

    // Candidates: local maxima above the quality threshold
    let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
    for y in 2..h - 2 {
        for x in 2..w - 2 {
            let r = response[[y, x]];
            if r < threshold {
                continue;
            }
            let mut is_max = true;
            'nb: for dy in 0..3 {
                for dx in 0..3 {
                    if dy == 1 && dx == 1 {
                        continue;
                    }
                    if response[[y + dy - 1, x + dx - 1]] > r {
                        is_max = false;
                        break 'nb;
                    }
                }
            }
            if is_max {
                candidates.push((r, x, y));
            }
        }
    }

    // Strongest first; position breaks ties so the order is deterministic
    candidates.sort_unstable_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| (a.2, a.1).cmp(&(b.2, b.1)))
    });

    let min_dist_sq = min_distance * min_distance;
    let mut selected: Vec<(f32, f32)> = Vec::with_capacity(max_corners.min(candidates.len()));
    for (_, x, y) in candidates {
        let (cx, cy) = (x as f32, y as f32);
        let far_enough = selected.iter().all(|&(sx, sy)| {
            let dx = sx - cx;
            let dy = sy - cy;
            dx * dx + dy * dy >= min_dist_sq
        });
        if far_enough {
            selected.push((cx, cy));
            if selected.len() >= max_corners {
                break;
            }
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(w: usize, h: usize, f: impl Fn(usize, usize) -> f32) -> Array2<f32> {
        Array2::from_shape_fn((h, w), |(y, x)| f(x, y))
    }

    #[test]
    fn test_flat_image_has_no_corners() {
        let flat = plane(64, 64, |_, _| 100.0);
        assert!(detect_corners(&flat, 50, 0.01, 5.0).is_empty());
    }

    #[test]
    fn test_detects_square_corners() {
        // Bright square on dark background: strongest responses sit at its corners
        let img = plane(64, 64, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                200.0
            } else {
                20.0
            }
        });

        let corners = detect_corners(&img, 50, 0.05, 4.0);
        assert!(!corners.is_empty());
        for &(x, y) in &corners {
            let near_corner = [(20.0, 20.0), (39.0, 20.0), (20.0, 39.0), (39.0, 39.0)]
                .iter()
                .any(|&(cx, cy): &(f32, f32)| (x - cx).abs() <= 3.0 && (y - cy).abs() <= 3.0);
            assert!(near_corner, "corner ({x}, {y}) not near a square corner");
        }
    }

    #[test]
    fn test_min_distance_respected() {
        let img = plane(96, 96, |x, y| {
            (128.0 + 60.0 * (x as f32 * 0.4).sin() * (y as f32 * 0.4).cos()).max(0.0)
        });

        let min_distance = 10.0;
        let corners = detect_corners(&img, 200, 0.01, min_distance);
        assert!(corners.len() > 1);
        for (i, &(ax, ay)) in corners.iter().enumerate() {
            for &(bx, by) in &corners[i + 1..] {
                let d = ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt();
                assert!(d >= min_distance, "corners {d:.1}px apart");
            }
        }
    }

    #[test]
    fn test_max_corners_cap() {
        let img = plane(128, 128, |x, y| {
            128.0 + 60.0 * (x as f32 * 0.5).sin() * (y as f32 * 0.5).cos()
        });
        let corners = detect_corners(&img, 10, 0.01, 2.0);
        assert!(corners.len() <= 10);
    }
}
