//! Image codec helpers - everything that touches pixels
//!
//! Includes:
//! - Decoding staged or fetched bytes
//! - Encoding into the asset's declared format
//! - Crop/resize used by sized versions

use anyhow::{Context, Result, bail};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

use crate::models::asset::AssetFormat;

// ────────────────────────────────────────────────────────────────
// Decoding
// ────────────────────────────────────────────────────────────────

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let decoders: Vec<fn(&[u8]) -> Result<DynamicImage>> = vec![image_crate_decoder];

    for decoder in decoders {
        match decoder(bytes) {
            Ok(decoded_image) => return Ok(decoded_image),
            Err(_) => continue,
        }
    }

    bail!("all decoders failed for {} bytes of input", bytes.len());
}

fn image_crate_decoder(bytes: &[u8]) -> Result<DynamicImage> {
    let dynamic_image = image::load_from_memory(bytes)
        .context("image crate failed to decode image from memory")?;
    Ok(dynamic_image)
}

/// Read only the header to find `(width, height)`.
pub fn encoded_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .context("failed to sniff image format")?
        .into_dimensions()
        .context("failed to read image dimensions")
}

// ────────────────────────────────────────────────────────────────
// Encoding
// ────────────────────────────────────────────────────────────────

pub fn encode_image(dynamic_image: &DynamicImage, format: AssetFormat) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    // JPEG has no alpha channel
    let result = match format {
        AssetFormat::Jpg => DynamicImage::ImageRgb8(dynamic_image.to_rgb8())
            .write_to(&mut buffer, format.image_format()),
        _ => dynamic_image.write_to(&mut buffer, format.image_format()),
    };
    result.context(format!("failed to encode image as {}", format.extension()))?;
    Ok(buffer.into_inner())
}

// ────────────────────────────────────────────────────────────────
// Resizing
// ────────────────────────────────────────────────────────────────

/// Fill `width`x`height` exactly (cropping the overflow) when both are given;
/// scale proportionally when only one is.
pub fn crop_resize(
    dynamic_image: &DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
) -> DynamicImage {
    match (width, height) {
        (Some(width), Some(height)) => {
            dynamic_image.resize_to_fill(width, height, FilterType::Lanczos3)
        }
        (None, None) => dynamic_image.clone(),
        _ => {
            let (nwidth, nheight) = scaled_width_height(
                dynamic_image.width(),
                dynamic_image.height(),
                width,
                height,
            );
            dynamic_image.resize_exact(nwidth, nheight, FilterType::Lanczos3)
        }
    }
}

/// Scale `(width, height)` so the constrained side matches, preserving aspect ratio
pub fn scaled_width_height(
    width: u32,
    height: u32,
    target_width: Option<u32>,
    target_height: Option<u32>,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    let scale = |side: u32, from: u32, to: u32| -> u32 {
        ((side as u64 * to as u64) / from as u64).max(1) as u32
    };
    match (target_width, target_height) {
        (Some(w), None) => (w, scale(height, width, w)),
        (None, Some(h)) => (scale(width, height, h), h),
        (Some(w), Some(h)) => (w, h),
        (None, None) => (width, height),
    }
}
