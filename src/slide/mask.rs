//! Annotation mask sources.
//!
//! Overlap fractions are precomputed into the metrics store; the pixel-level
//! masks written next to extracted tiles come from a [`MaskSource`].

use std::collections::BTreeMap;
use std::path::Path;

use image::{GrayImage, Luma};

use crate::error::SlideError;
use crate::grid::TileRect;

/// Per-class binary masks for tile rectangles.
pub trait MaskSource: Send + Sync {
    /// Mask of `class_name` over `rect`, sized `rect.width` x `rect.height`.
    ///
    /// Non-zero pixels mark the class. Returns `Ok(None)` when the class has
    /// no annotation at this tile.
    fn class_mask(
        &self,
        rect: &TileRect,
        class_name: &str,
    ) -> Result<Option<GrayImage>, SlideError>;
}

/// A source with no annotations at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAnnotations;

impl MaskSource for NoAnnotations {
    fn class_mask(
        &self,
        _rect: &TileRect,
        _class_name: &str,
    ) -> Result<Option<GrayImage>, SlideError> {
        Ok(None)
    }
}

/// All-zero mask for a tile.
pub fn blank_mask(rect: &TileRect) -> GrayImage {
    GrayImage::new(rect.width, rect.height)
}

// =============================================================================
// Raster Masks
// =============================================================================

/// Label rasters aligned with level 0, one per class.
#[derive(Debug, Clone, Default)]
pub struct RasterMaskSource {
    rasters: BTreeMap<String, GrayImage>,
}

impl RasterMaskSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, class_name: impl Into<String>, raster: GrayImage) -> Self {
        self.rasters.insert(class_name.into(), raster);
        self
    }

    /// Load one raster per `(class, path)` pair.
    pub fn open<P: AsRef<Path>>(entries: &[(String, P)]) -> Result<Self, SlideError> {
        let mut source = Self::new();
        for (class_name, path) in entries {
            let path = path.as_ref();
            let raster = image::open(path)
                .map_err(|e| SlideError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
                .into_luma8();
            source.rasters.insert(class_name.clone(), raster);
        }
        Ok(source)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.rasters.keys().map(String::as_str)
    }
}

impl MaskSource for RasterMaskSource {
    fn class_mask(
        &self,
        rect: &TileRect,
        class_name: &str,
    ) -> Result<Option<GrayImage>, SlideError> {
        let Some(raster) = self.rasters.get(class_name) else {
            return Ok(None);
        };

        let (raster_width, raster_height) = raster.dimensions();
        let mut mask = blank_mask(rect);
        let mut any = false;

        // Pixels past the raster edge stay unlabelled.
        for (px, py, out) in mask.enumerate_pixels_mut() {
            let sx = rect.x + u64::from(px);
            let sy = rect.y + u64::from(py);
            if sx >= u64::from(raster_width) || sy >= u64::from(raster_height) {
                continue;
            }
            if raster.get_pixel(sx as u32, sy as u32)[0] > 0 {
                *out = Luma([255]);
                any = true;
            }
        }

        Ok(any.then_some(mask))
    }
}
