//! Image preprocessing for the classifier model
//!
//! Decoding, resize + center crop, normalization and tensor conversion
//! following the ImageNet evaluation transform.

use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::{Array3, Array4};

use crate::config::ClassifierSettings;
use crate::error::ModelError;

/// Preprocessing configuration
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Shorter side after resize (typically 256)
    pub resize_shorter: u32,
    /// Square crop fed to the network (typically 224)
    pub input_size: u32,
    /// Mean values for normalization [R, G, B]
    pub mean: [f32; 3],
    /// Std values for normalization [R, G, B]
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self::from(&ClassifierSettings::default())
    }
}

impl From<&ClassifierSettings> for PreprocessConfig {
    fn from(settings: &ClassifierSettings) -> Self {
        Self {
            resize_shorter: settings.resize_shorter,
            input_size: settings.input_size,
            mean: settings.mean,
            std: settings.std,
        }
    }
}

/// Decode raw bytes of any supported container format
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(bytes)
}

/// Side of the centered square that survives resize-shorter-then-crop
///
/// Resizing the shorter side to `resize_shorter` and cropping `input_size`
/// keeps a square of `shorter * input_size / resize_shorter` source pixels.
pub fn crop_side(width: u32, height: u32, resize_shorter: u32, input_size: u32) -> u32 {
    let shorter = width.min(height) as u64;
    let side = (shorter * input_size as u64 + resize_shorter as u64 / 2) / resize_shorter as u64;
    (side as u32).clamp(1, width.min(height))
}

/// Crop a centered `size` x `size` square
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let x = w.saturating_sub(size) / 2;
    let y = h.saturating_sub(size) / 2;
    image::imageops::crop_imm(image, x, y, size.min(w), size.min(h)).to_image()
}

/// Convert RGB image to HWC f32 array scaled to 0-1
pub fn rgb_to_f32(image: &RgbImage) -> Array3<f32> {
    let (w, h) = image.dimensions();
    let mut rgb = Array3::<f32>::zeros((h as usize, w as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            rgb[[y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
        }
    }

    rgb
}

/// Normalize image with mean and std
pub fn normalize(image: &mut Array3<f32>, mean: &[f32; 3], std: &[f32; 3]) {
    for ((_, _, c), value) in image.indexed_iter_mut() {
        *value = (*value - mean[c]) / std[c];
    }
}

/// Convert HWC image to NCHW tensor (batch size 1)
pub fn hwc_to_nchw(image: &Array3<f32>) -> Array4<f32> {
    let (h, w, c) = image.dim();
    let chw = image.view().permuted_axes([2, 0, 1]);
    let mut tensor = Array4::<f32>::zeros((1, c, h, w));
    tensor.index_axis_mut(ndarray::Axis(0), 0).assign(&chw);
    tensor
}

/// Full preprocessing pipeline for classification
pub fn preprocess_for_classification(
    image: &DynamicImage,
    config: &PreprocessConfig,
) -> Result<Array4<f32>, ModelError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ModelError::InvalidInput(format!(
            "image dimensions must be non-zero (got {}x{})",
            image.width(),
            image.height()
        )));
    }
    if config.input_size == 0 || config.resize_shorter < config.input_size {
        return Err(ModelError::InvalidInput(format!(
            "resize_shorter ({}) must be at least input_size ({})",
            config.resize_shorter, config.input_size
        )));
    }

    // 1. Crop the centered square in source pixels, then resize it to the input size
    let rgb = image.to_rgb8();
    let side = crop_side(rgb.width(), rgb.height(), config.resize_shorter, config.input_size);
    let cropped = center_crop(&rgb, side);
    let resized = image::imageops::resize(&cropped, config.input_size, config.input_size, FilterType::Triangle);

    // 2. Scale and normalize
    let mut array = rgb_to_f32(&resized);
    normalize(&mut array, &config.mean, &config.std);

    // 3. Convert to NCHW tensor
    Ok(hwc_to_nchw(&array))
}
