use image::ImageFormat;
use log::debug;

use crate::{dataset::DatasetShape, error::DatasetError};

/// Decode a PNG sprite sheet into normalized pixels, one per source pixel.
///
/// The sheet is grayscale stored as RGBA, so only the red channel is read.
/// Pixels are laid out row-major, which for the MNIST sheet means one
/// 784-pixel row per image.
pub fn decode_images(bytes: &[u8], shape: &DatasetShape) -> Result<Vec<f32>, DatasetError> {
    let sheet = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.into_rgba8();
    let (width, height) = sheet.dimensions();

    let pixel_count = width as usize * height as usize;
    if pixel_count != shape.pixel_count() {
        return Err(DatasetError::ShapeMismatch {
            what: "sprite sheet",
            expected: shape.pixel_count(),
            actual: pixel_count,
        });
    }

    let pixels: Vec<f32> = sheet
        .as_raw()
        .chunks_exact(4)
        .map(|rgba| rgba[0] as f32 / 255.0)
        .collect();
    debug!("decoded {}x{} sprite sheet", width, height);

    Ok(pixels)
}

/// Labels are already one-hot bytes; only the length is checked.
pub fn decode_labels(bytes: &[u8], shape: &DatasetShape) -> Result<Vec<u8>, DatasetError> {
    if bytes.len() != shape.label_count() {
        return Err(DatasetError::ShapeMismatch {
            what: "label blob",
            expected: shape.label_count(),
            actual: bytes.len(),
        });
    }

    Ok(bytes.to_vec())
}
