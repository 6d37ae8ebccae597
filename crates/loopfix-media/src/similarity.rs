//! Frame similarity scoring and seam search.
//!
//! The score blends two cheap signals over equal-sized grayscale buffers:
//! normalized cross-correlation (structure) and inverted mean absolute
//! pixel difference (brightness). The unweighted average is a tunable
//! constant, not a tuned formula.
//!
//! The search is all-pairs over the sampled sequence, O(n^2) in sampled
//! frames; sampling already reduces n by the stride, which keeps this
//! affordable. Rows are scored in parallel, but the reduction is sequential
//! in row order so the earliest-`position_a` tie-break is deterministic.

use image::GrayImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

use loopfix_models::SeamCandidate;

use crate::frame::GrayFrame;

/// Similarity of two equal-sized grayscale buffers, higher is more similar.
///
/// `(ncc + (1 - mad/255)) / 2`, where `ncc` is the zero-mean normalized
/// cross-correlation and `mad` the mean absolute difference. Flat buffers
/// have no defined correlation; two flat buffers count as fully correlated
/// and the difference term separates them, keeping the score total-ordered.
pub fn similarity_score(a: &GrayImage, b: &GrayImage) -> f64 {
    let pa = a.as_raw();
    let pb = b.as_raw();
    if pa.len() != pb.len() || pa.is_empty() {
        return 0.0;
    }
    let n = pa.len() as f64;

    let mean_a = pa.iter().map(|&v| v as f64).sum::<f64>() / n;
    let mean_b = pb.iter().map(|&v| v as f64).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    let mut abs_diff = 0.0;
    for (&va, &vb) in pa.iter().zip(pb.iter()) {
        let da = va as f64 - mean_a;
        let db = vb as f64 - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
        abs_diff += (va as f64 - vb as f64).abs();
    }

    let ncc = if var_a > f64::EPSILON && var_b > f64::EPSILON {
        cov / (var_a * var_b).sqrt()
    } else if var_a <= f64::EPSILON && var_b <= f64::EPSILON {
        1.0
    } else {
        0.0
    };

    let mad = abs_diff / n;
    (ncc + (1.0 - mad / 255.0)) / 2.0
}

/// Find the most similar pair of sampled frames separated by at least
/// `min_gap` sampled frames.
///
/// Returns `None` when no pair satisfies the gap (sequence too short) or
/// when cancelled mid-search; the caller distinguishes the two by checking
/// its cancellation flag. `progress` receives the fraction of comparison
/// rows completed.
pub fn find_seam<F>(
    frames: &[GrayFrame],
    min_gap: usize,
    cancel: Option<&watch::Receiver<bool>>,
    progress: F,
) -> Option<SeamCandidate>
where
    F: Fn(f64) + Send + Sync,
{
    let n = frames.len();
    let min_gap = min_gap.max(1);
    if n <= min_gap {
        return None;
    }

    let total_rows = n - min_gap;
    let rows_done = AtomicUsize::new(0);

    let row_best: Vec<Option<(usize, usize, f64)>> = (0..total_rows)
        .into_par_iter()
        .map(|i| {
            if cancel.map_or(false, |rx| *rx.borrow()) {
                return None;
            }

            let current = &frames[i].pixels;
            let mut best: Option<(usize, f64)> = None;
            for (j, later) in frames.iter().enumerate().skip(i + min_gap) {
                let score = similarity_score(current, &later.pixels);
                // Strict comparison keeps the earliest j on ties.
                if best.map_or(true, |(_, s)| score > s) {
                    best = Some((j, score));
                }
            }

            let done = rows_done.fetch_add(1, Ordering::Relaxed) + 1;
            progress(done as f64 / total_rows as f64);

            best.map(|(j, score)| (i, j, score))
        })
        .collect();

    if cancel.map_or(false, |rx| *rx.borrow()) {
        return None;
    }

    let mut winner: Option<(usize, usize, f64)> = None;
    for cand in row_best.into_iter().flatten() {
        // Strict comparison keeps the earliest position_a on ties.
        if winner.map_or(true, |(_, _, s)| cand.2 > s) {
            winner = Some(cand);
        }
    }

    winner.map(|(position_a, position_b, score)| SeamCandidate {
        position_a,
        position_b,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::SAMPLE_STRIDE;

    fn gray(w: u32, h: u32, f: impl Fn(u32, u32) -> u8) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| image::Luma([f(x, y)]))
    }

    /// Deterministic textured frame, distinct per seed.
    fn textured(seed: u32) -> GrayImage {
        gray(16, 12, |x, y| {
            let v = x
                .wrapping_mul(31)
                .wrapping_add(y.wrapping_mul(17))
                .wrapping_add(seed.wrapping_mul(97));
            (v % 251) as u8
        })
    }

    fn frame(index: usize, pixels: GrayImage) -> GrayFrame {
        GrayFrame {
            index,
            source_frame: index * SAMPLE_STRIDE,
            timestamp_secs: index as f64,
            pixels,
        }
    }

    #[test]
    fn test_identical_frames_score_one() {
        let a = textured(7);
        assert!((similarity_score(&a, &a.clone()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_orders_by_similarity() {
        let base = textured(1);
        let near = gray(16, 12, |x, y| {
            base.get_pixel(x, y).0[0].saturating_add(3)
        });
        let far = textured(2);

        let s_near = similarity_score(&base, &near);
        let s_far = similarity_score(&base, &far);
        assert!(s_near > s_far);
    }

    #[test]
    fn test_flat_frames() {
        let black = gray(8, 8, |_, _| 0);
        let white = gray(8, 8, |_, _| 255);
        // Same flat level scores maximal
        assert!((similarity_score(&black, &black.clone()) - 1.0).abs() < 1e-9);
        // Different flat levels separated by the difference term
        assert!(similarity_score(&black, &white) < 0.6);
    }

    #[test]
    fn test_find_seam_respects_gap() {
        let frames: Vec<GrayFrame> = (0..20).map(|i| frame(i, textured(i as u32))).collect();
        let seam = find_seam(&frames, 8, None, |_| {}).unwrap();
        assert!(seam.position_b - seam.position_a >= 8);
    }

    #[test]
    fn test_find_seam_too_short() {
        let frames: Vec<GrayFrame> = (0..5).map(|i| frame(i, textured(i as u32))).collect();
        assert!(find_seam(&frames, 10, None, |_| {}).is_none());
        assert!(find_seam(&[], 1, None, |_| {}).is_none());
    }

    #[test]
    fn test_find_seam_picks_duplicates() {
        // Duplicate pattern at 3 and 17, everything else distinct
        let frames: Vec<GrayFrame> = (0..20)
            .map(|i| {
                let seed = if i == 3 || i == 17 { 1000 } else { i as u32 };
                frame(i, textured(seed))
            })
            .collect();

        let seam = find_seam(&frames, 10, None, |_| {}).unwrap();
        assert_eq!((seam.position_a, seam.position_b), (3, 17));
        assert!((seam.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_find_seam_tie_break_earliest() {
        // Identical pattern at 0, 10, and 20: pairs (0,10), (0,20), (10,20)
        // all score 1.0; earliest position_a then earliest position_b wins.
        let frames: Vec<GrayFrame> = (0..21)
            .map(|i| {
                let seed = if i % 10 == 0 { 500 } else { i as u32 };
                frame(i, textured(seed))
            })
            .collect();

        let seam = find_seam(&frames, 10, None, |_| {}).unwrap();
        assert_eq!((seam.position_a, seam.position_b), (0, 10));
    }

    #[test]
    fn test_find_seam_agrees_with_brute_force() {
        let frames: Vec<GrayFrame> = (0..30).map(|i| frame(i, textured(i as u32 * 3))).collect();
        let min_gap = 7;

        let mut brute: Option<(usize, usize, f64)> = None;
        for i in 0..frames.len() {
            for j in (i + min_gap)..frames.len() {
                let s = similarity_score(&frames[i].pixels, &frames[j].pixels);
                if brute.map_or(true, |(_, _, bs)| s > bs) {
                    brute = Some((i, j, s));
                }
            }
        }

        let seam = find_seam(&frames, min_gap, None, |_| {}).unwrap();
        let (bi, bj, bs) = brute.unwrap();
        assert_eq!((seam.position_a, seam.position_b), (bi, bj));
        assert!((seam.score - bs).abs() < 1e-12);
    }

    #[test]
    fn test_find_seam_reports_progress() {
        use std::sync::Mutex;
        let frames: Vec<GrayFrame> = (0..12).map(|i| frame(i, textured(i as u32))).collect();
        let fractions = Mutex::new(Vec::new());
        find_seam(&frames, 4, None, |f| fractions.lock().unwrap().push(f)).unwrap();
        let fractions = fractions.lock().unwrap();
        assert!(!fractions.is_empty());
        assert!(fractions.iter().any(|&f| (f - 1.0).abs() < 1e-9));
    }
}
