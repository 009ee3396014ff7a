//! Image preparation for OCR passes
//!
//! Grayscale conversion, size normalization, and the contrast/sharpen
//! enhancement used for small print.

use image::{imageops::FilterType, DynamicImage, GrayImage};
use tracing::debug;

/// Upscale factor bounds applied to small images
const MIN_UPSCALE: u32 = 2;
const MAX_UPSCALE: u32 = 4;

/// Convert to 8-bit luminance
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    image.to_luma8()
}

/// Bring an image into the size band the OCR engine reads reliably
///
/// A smaller side below `min_dimension` is upscaled by an integer factor in
/// 2..=4; a larger side above `max_dimension` is downscaled to it.
pub fn fit_for_ocr(image: &GrayImage, min_dimension: u32, max_dimension: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }

    let shorter = w.min(h);
    let longer = w.max(h);

    if shorter < min_dimension {
        let scale = min_dimension.div_ceil(shorter).clamp(MIN_UPSCALE, MAX_UPSCALE);
        let (new_w, new_h) = (w * scale, h * scale);
        if max_dimension == 0 || new_w.max(new_h) <= max_dimension {
            debug!("Upscaling {}x{} by {}x for OCR", w, h, scale);
            return image::imageops::resize(image, new_w, new_h, FilterType::CatmullRom);
        }
    }

    if max_dimension > 0 && longer > max_dimension {
        let ratio = max_dimension as f32 / longer as f32;
        let new_w = ((w as f32 * ratio).round() as u32).max(1);
        let new_h = ((h as f32 * ratio).round() as u32).max(1);
        debug!("Downscaling {}x{} to {}x{} for OCR", w, h, new_w, new_h);
        return image::imageops::resize(image, new_w, new_h, FilterType::Triangle);
    }

    image.clone()
}

/// Mean luminance, rounded to the nearest level
pub fn mean_luminance(image: &GrayImage) -> f32 {
    let pixels = image.as_raw();
    if pixels.is_empty() {
        return 0.0;
    }
    let sum: u64 = pixels.iter().map(|&p| p as u64).sum();
    (sum as f32 / pixels.len() as f32).round()
}

/// Scale contrast around the image mean
///
/// `factor` 1.0 is the identity, 0.0 yields a flat mean-gray image.
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let mean = mean_luminance(image);
    let mut result = image.clone();
    for pixel in result.pixels_mut() {
        let adjusted = (pixel[0] as f32 - mean) * factor + mean;
        pixel[0] = adjusted.round().clamp(0.0, 255.0) as u8;
    }
    result
}

/// 3x3 sharpen
pub fn sharpen(image: &GrayImage) -> GrayImage {
    imageproc::filter::sharpen3x3(image)
}
