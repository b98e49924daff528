use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};
use tracing::debug;

use super::IngestError;

/// Pixel dimensions; `0x0` when the bytes could not be probed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Whether an upload of `format` should be re-encoded to WebP.
///
/// Animated-capable legacy formats are always kept as-is, and so is anything
/// the built-in decoders cannot read (svg, avif, ...).
pub fn should_transcode(format: &str, convert_to_webp: bool) -> bool {
    convert_to_webp && !common::format::is_animated_legacy(format) && is_decodable(format)
}

fn is_decodable(format: &str) -> bool {
    ImageFormat::from_extension(format).is_some_and(|f| f.reading_enabled())
}

/// Re-encode `bytes` as lossy WebP at `quality` (1-100).
pub fn transcode_to_webp(bytes: &[u8], quality: u8) -> Result<Vec<u8>, IngestError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| IngestError::Processing(format!("Failed to decode image: {e}")))?;

    // libwebp only takes 8-bit RGB(A).
    let prepared = if decoded.color().has_alpha() {
        DynamicImage::ImageRgba8(decoded.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(decoded.to_rgb8())
    };

    let encoder = webp::Encoder::from_image(&prepared)
        .map_err(|e| IngestError::Processing(format!("Failed to prepare WebP encoder: {e}")))?;
    let encoded = encoder
        .encode_simple(false, f32::from(quality))
        .map_err(|e| IngestError::Processing(format!("Failed to encode WebP: {e:?}")))?;
    let out = encoded.to_vec();

    debug!(
        quality,
        input = bytes.len(),
        output = out.len(),
        "Transcoded image to WebP"
    );
    Ok(out)
}

/// Probe width and height from the image header. Never fails.
pub fn image_dimensions(bytes: &[u8]) -> Dimensions {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()
        .and_then(|reader| reader.into_dimensions().ok())
        .map(|(width, height)| Dimensions { width, height })
        .unwrap_or_default()
}
