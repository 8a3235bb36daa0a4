//! Raster images as single-level slides.

use std::path::Path;

use image::{imageops, DynamicImage, RgbaImage};

use crate::error::SlideError;

use super::reader::RegionReader;

/// A slide backed by a decoded raster image held in memory.
///
/// Exposes one pyramid level with downsample 1.0. Suited to thumbnails,
/// exported regions and tests; real pyramid formats belong to a dedicated
/// decoder behind [`RegionReader`].
#[derive(Debug, Clone)]
pub struct ImageSlide {
    id: String,
    pixels: RgbaImage,
}

impl ImageSlide {
    pub fn new(id: impl Into<String>, image: DynamicImage) -> Self {
        Self {
            id: id.into(),
            pixels: image.into_rgba8(),
        }
    }

    /// Open an image file; the slide id is the file stem.
    pub fn open(path: &Path) -> Result<Self, SlideError> {
        let image = image::open(path).map_err(|e| SlideError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "slide".to_string());

        Ok(Self::new(id, image))
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

impl RegionReader for ImageSlide {
    fn slide_id(&self) -> &str {
        &self.id
    }

    fn level_count(&self) -> usize {
        1
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        (level == 0).then(|| self.pixels.dimensions())
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        (level == 0).then_some(1.0)
    }

    fn read_region(
        &self,
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, SlideError> {
        if level != 0 {
            return Err(SlideError::InvalidLevel {
                level,
                max_levels: 1,
            });
        }

        let (level_width, level_height) = self.pixels.dimensions();
        let out_of_bounds = x + u64::from(width) > u64::from(level_width)
            || y + u64::from(height) > u64::from(level_height);
        if out_of_bounds {
            return Err(SlideError::OutOfBounds {
                x,
                y,
                width,
                height,
                level_width,
                level_height,
            });
        }

        let region = imageops::crop_imm(&self.pixels, x as u32, y as u32, width, height);
        Ok(region.to_image())
    }
}
