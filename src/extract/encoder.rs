//! Tile and mask encoders.
//!
//! # Design Decisions
//!
//! - **Tiles are JPEG**: RGB pixels, alpha already stripped, encoded at a
//!   fixed quality (100 by default) so dataset tiles carry no extra loss.
//!
//! - **Per-class masks are PNG**: single channel, 0 or 255, lossless.
//!
//! - **Mask stacks are NumPy**: `.npy` version 1.0, dtype `|u1`, shape
//!   `(classes, height, width)` in C order, values 0 or 1, loadable with
//!   `numpy.load` without any extra dependency.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder, RgbImage};

use crate::error::ExtractError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 100;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";

/// Header (magic through the trailing newline) is padded to this alignment.
const NPY_ALIGNMENT: usize = 64;

// =============================================================================
// Encoder
// =============================================================================

/// Encodes extracted tiles and their masks.
#[derive(Debug, Clone)]
pub struct TileEncoder {
    quality: u8,
}

impl Default for TileEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl TileEncoder {
    /// Create an encoder; quality is clamped to 1-100.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: clamp_quality(quality),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode tile pixels as JPEG.
    pub fn encode_tile(&self, tile: &RgbImage) -> Result<Bytes, ExtractError> {
        let mut output = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut output, self.quality);

        encoder
            .encode_image(tile)
            .map_err(|e| ExtractError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    /// Encode a binary mask as a single-channel PNG.
    pub fn encode_mask(&self, mask: &GrayImage) -> Result<Bytes, ExtractError> {
        let mut output = Vec::new();
        let (width, height) = mask.dimensions();

        PngEncoder::new(&mut output)
            .write_image(mask.as_raw(), width, height, ExtendedColorType::L8)
            .map_err(|e| ExtractError::Encode {
                message: e.to_string(),
            })?;

        Ok(Bytes::from(output))
    }

    /// Encode per-class masks as one `(classes, height, width)` `.npy` array.
    ///
    /// Non-zero mask pixels become 1. Every mask must share the same size.
    pub fn encode_mask_stack(&self, masks: &[GrayImage]) -> Result<Bytes, ExtractError> {
        let Some(first) = masks.first() else {
            return Err(ExtractError::Encode {
                message: "mask stack needs at least one class".to_string(),
            });
        };

        let (width, height) = first.dimensions();
        if let Some(odd) = masks.iter().find(|m| m.dimensions() != (width, height)) {
            let (w, h) = odd.dimensions();
            return Err(ExtractError::Encode {
                message: format!("mask stack size mismatch: {w}x{h} vs {width}x{height}"),
            });
        }

        let header = npy_header(&[masks.len(), height as usize, width as usize]);
        let mut output = Vec::with_capacity(header.len() + masks.len() * first.as_raw().len());
        output.extend_from_slice(&header);
        for mask in masks {
            output.extend(mask.as_raw().iter().map(|&v| u8::from(v > 0)));
        }

        Ok(Bytes::from(output))
    }
}

fn npy_header(shape: &[usize]) -> Vec<u8> {
    let dims = shape
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let shape = if shape.len() == 1 {
        format!("({dims},)")
    } else {
        format!("({dims})")
    };
    let mut dict = format!(
        "{{'descr': '|u1', 'fortran_order': False, 'shape': {shape}, }}"
    );

    // magic (6) + version (2) + header length (2) + dict + '\n'
    let unpadded = NPY_MAGIC.len() + 4 + dict.len() + 1;
    let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    dict.push_str(&" ".repeat(padding));
    dict.push('\n');

    let mut header = Vec::with_capacity(NPY_MAGIC.len() + 4 + dict.len());
    header.extend_from_slice(NPY_MAGIC);
    header.extend_from_slice(&[1, 0]);
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

// =============================================================================
// Utility Functions
// =============================================================================

/// Returns `true` if quality is in the valid range (1-100).
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}

// =============================================================================
// Tests
// =============================================================================
