//! RegionReader trait for format-agnostic pixel access.
//!
//! The engine never decodes slide formats itself. Anything that can report
//! its pyramid geometry and return an RGBA pixel buffer for a rectangle can
//! drive tile extraction:
//! - [`super::ImageSlide`] for ordinary raster images (single level)
//! - adapters over real pyramid decoders, supplied by the caller
//!
//! Buffers come back with their alpha channel intact; the extraction pipeline
//! strips it before encoding and accumulating statistics.

use image::RgbaImage;

use crate::error::SlideError;
use crate::grid::TileRect;

// =============================================================================
// Level Information
// =============================================================================

/// Geometry of a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 2.0, etc.
    pub downsample: f64,
}

// =============================================================================
// RegionReader Trait
// =============================================================================

/// Read access to a slide's pixels and pyramid metadata.
///
/// Implementations must be safe to share across threads: an inference loop
/// may fetch regions from several workers at once.
pub trait RegionReader: Send + Sync {
    /// Identifier used in output paths and filenames.
    fn slide_id(&self) -> &str;

    /// Number of pyramid levels. Level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// Dimensions of a level as `(width, height)`, or `None` if out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Downsample factor of a level, or `None` if out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Read a region.
    ///
    /// `x` and `y` are level-0 coordinates; `width` and `height` are in
    /// pixels of `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if the level does not exist, the region extends past
    /// the level bounds, or the pixels cannot be decoded.
    fn read_region(
        &self,
        level: usize,
        x: u64,
        y: u64,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, SlideError>;

    /// Complete information about a level.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let downsample = self.level_downsample(level)?;
        Some(LevelInfo {
            width,
            height,
            downsample,
        })
    }

    /// Read the pixels of one tile.
    fn read_tile(&self, level: usize, rect: &TileRect) -> Result<RgbaImage, SlideError> {
        self.read_region(level, rect.x, rect.y, rect.width, rect.height)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    struct TwoLevels;

    impl RegionReader for TwoLevels {
        fn slide_id(&self) -> &str {
            "two-levels"
        }

        fn level_count(&self) -> usize {
            2
        }

        fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
            [(800, 600), (400, 300)].get(level).copied()
        }

        fn level_downsample(&self, level: usize) -> Option<f64> {
            [1.0, 2.0].get(level).copied()
        }

        fn read_region(
            &self,
            level: usize,
            _x: u64,
            _y: u64,
            width: u32,
            height: u32,
        ) -> Result<RgbaImage, SlideError> {
            if level >= self.level_count() {
                return Err(SlideError::InvalidLevel {
                    level,
                    max_levels: self.level_count(),
                });
            }
            let pixel = Rgba([level as u8, 0, 0, 255]);
            Ok(RgbaImage::from_pixel(width, height, pixel))
        }
    }

    #[test]
    fn test_level_info_default() {
        let slide = TwoLevels;
        assert_eq!(
            slide.level_info(1),
            Some(LevelInfo {
                width: 400,
                height: 300,
                downsample: 2.0,
            })
        );
        assert_eq!(slide.level_info(2), None);
    }

    #[test]
    fn test_read_tile_uses_rect() {
        let slide = TwoLevels;
        let tile = slide.read_tile(1, &TileRect::new(0, 0, 16, 8)).unwrap();
        assert_eq!(tile.dimensions(), (16, 8));
        assert_eq!(tile.get_pixel(0, 0), &Rgba([1, 0, 0, 255]));
    }
}
