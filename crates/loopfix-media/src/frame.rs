//! Frame types shared by the sampling and stabilization paths.

use image::{GrayImage, RgbImage};
use ndarray::Array2;

/// A reduced-resolution grayscale frame from the sampled sequence.
///
/// Immutable once created; positions index into the sampled sequence, not
/// the source timeline.
#[derive(Debug, Clone)]
pub struct GrayFrame {
    /// Index in the sampled sequence.
    pub index: usize,
    /// Index of the corresponding frame in the source timeline.
    pub source_frame: usize,
    /// Timestamp on the source timeline, in seconds.
    pub timestamp_secs: f64,
    /// Pixel data.
    pub pixels: GrayImage,
}

/// Convert an RGB frame to a float luma plane (Rec.601 weights).
///
/// The plane is indexed `[row, col]`, matching ndarray convention.
pub fn luma_plane(rgb: &RgbImage) -> Array2<f32> {
    let (w, h) = rgb.dimensions();
    let mut plane = Array2::zeros((h as usize, w as usize));
    for (x, y, px) in rgb.enumerate_pixels() {
        let [r, g, b] = px.0;
        plane[[y as usize, x as usize]] =
            0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
    }
    plane
}

/// Convert a grayscale image to a float plane.
pub fn gray_plane(gray: &GrayImage) -> Array2<f32> {
    let (w, h) = gray.dimensions();
    let mut plane = Array2::zeros((h as usize, w as usize));
    for (x, y, px) in gray.enumerate_pixels() {
        plane[[y as usize, x as usize]] = px.0[0] as f32;
    }
    plane
}
