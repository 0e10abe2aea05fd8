//! PNG decode/encode seam.
//!
//! The pipeline treats the codec as a black box: decode a file into a
//! contiguous 8-bit RGBA buffer (always forced to 4 channels, whatever the
//! source format stores), encode an RGBA buffer back to a PNG file.
//! Everything else in the crate works on the raw buffers.

use std::path::Path;

use bytes::Bytes;
use image::{ImageFormat, ImageReader, RgbaImage};

use crate::error::CodecError;

/// A decoded RGBA image: tightly packed pixels plus dimensions.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub pixels: Bytes,
    pub width: i32,
    pub height: i32,
}

/// Decode the image at `path` into an RGBA8 buffer.
///
/// Source images with fewer channels are expanded to 4; 16-bit sources are
/// reduced to 8-bit.
pub fn decode_rgba(path: &Path) -> Result<DecodedImage, CodecError> {
    let reader = ImageReader::open(path).map_err(|e| CodecError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let img = reader.decode().map_err(|e| CodecError::Decode {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    Ok(DecodedImage {
        pixels: Bytes::from(rgba.into_raw()),
        width: width as i32,
        height: height as i32,
    })
}

/// Encode a tightly packed RGBA8 buffer as a PNG file at `path`.
pub fn encode_rgba(path: &Path, pixels: &[u8], width: u32, height: u32) -> Result<(), CodecError> {
    let img = RgbaImage::from_raw(width, height, pixels.to_vec()).ok_or(CodecError::BufferSize {
        width,
        height,
        len: pixels.len(),
    })?;

    img.save_with_format(path, ImageFormat::Png)
        .map_err(|e| CodecError::Encode {
            path: path.display().to_string(),
            message: e.to_string(),
        })
}
