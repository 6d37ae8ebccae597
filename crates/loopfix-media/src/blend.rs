//! Cross-dissolve synthesis for the interior seam.

use image::RgbImage;

/// Linearly blend from the tail's last frame toward the head's first frame.
///
/// Frame `k` of the result is `(1 - k/N) * last_tail + (k/N) * first_head`
/// for `k = 0..N-1`, so the sequence starts exactly on the tail's last
/// frame and approaches (without reaching) the head's first. Mismatched
/// dimensions or a zero count yield an empty sequence, which the assembler
/// treats as a hard cut.
pub fn cross_dissolve(last_tail: &RgbImage, first_head: &RgbImage, count: u32) -> Vec<RgbImage> {
    if count == 0 || last_tail.dimensions() != first_head.dimensions() {
        return Vec::new();
    }

    let (w, h) = last_tail.dimensions();
    let tail = last_tail.as_raw();
    let head = first_head.as_raw();

    (0..count)
        .map(|k| {
            let alpha = k as f32 / count as f32;
            let pixels: Vec<u8> = tail
                .iter()
                .zip(head.iter())
                .map(|(&t, &h)| {
                    ((1.0 - alpha) * t as f32 + alpha * h as f32)
                        .round()
                        .clamp(0.0, 255.0) as u8
                })
                .collect();
            RgbImage::from_raw(w, h, pixels).expect("blend buffer matches dimensions")
        })
        .collect()
}
