//! Test utilities for integration tests.
//!
//! This module provides a mock slide that counts region reads, builders for
//! annotated metrics stores, and helpers for inspecting output directories.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{Rgba, RgbaImage};

use wsi_tiler::error::SlideError;
use wsi_tiler::grid::{TileAddress, TileGrid};
use wsi_tiler::slide::RegionReader;
use wsi_tiler::store::{TileMetricsStore, FOREGROUND_LEVEL, TISSUE_LEVEL};

/// Uniform pixel value of [`UniformSlide`].
pub const SLIDE_PIXEL: [u8; 3] = [51, 102, 153];

/// Tile edge length used by the store builders.
pub const TILE_SIZE: u32 = 100;

// =============================================================================
// Mock Slide with Read Tracking
// =============================================================================

/// A single-level slide of one uniform color that counts region reads.
pub struct UniformSlide {
    id: String,
    width: u32,
    height: u32,
    reads: AtomicUsize,
}

impl UniformSlide {
    pub fn new(id: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            id: id.into(),
            width,
            height,
            reads: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl RegionReader for UniformSlide {
    fn slide_id(&self) -> &str {
        &self.id
    }

    fn level_count(&self) -> usize {
        1
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        (level == 0).then_some((self.width, self.height))
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
        if x + u64::from(width) > u64::from(self.width)
            || y + u64::from(height) > u64::from(self.height)
        {
            return Err(SlideError::OutOfBounds {
                x,
                y,
                width,
                height,
                level_width: self.width,
                level_height: self.height,
            });
        }

        self.reads.fetch_add(1, Ordering::SeqCst);
        let [r, g, b] = SLIDE_PIXEL;
        Ok(RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])))
    }
}

/// The 400x400 slide matching [`tissue_store`].
pub fn slide() -> UniformSlide {
    UniformSlide::new("slide1", 4 * TILE_SIZE, 4 * TILE_SIZE)
}

// =============================================================================
// Store Builders
// =============================================================================

/// A 4x4 grid where every tile has tissue 0.9 and foreground 40.
pub fn tissue_store() -> TileMetricsStore {
    let grid = TileGrid::new(4 * TILE_SIZE, 4 * TILE_SIZE, TILE_SIZE).unwrap();
    let mut store = TileMetricsStore::from_grid(grid);
    let addresses: Vec<_> = store.addresses().collect();
    for address in addresses {
        store.set_field(address, TISSUE_LEVEL, 0.9).unwrap();
        store.set_field(address, FOREGROUND_LEVEL, 40.0).unwrap();
    }
    store
}

/// [`tissue_store`] with the given `(col, row, class, fraction)` overlaps.
pub fn annotated_store(overlaps: &[(u32, u32, &str, f64)]) -> TileMetricsStore {
    let mut store = tissue_store();
    for &(col, row, class_name, fraction) in overlaps {
        store
            .set_overlap(TileAddress::new(col, row), class_name, fraction)
            .unwrap();
    }
    store
}

/// Two tiles well inside tumor, one barely touching it.
pub fn tumor_store() -> TileMetricsStore {
    annotated_store(&[
        (0, 0, "tumor", 0.8),
        (1, 0, "tumor", 0.9),
        (2, 0, "tumor", 0.2),
    ])
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Sorted file names directly inside `dir`.
pub fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Whether `dir` exists and holds nothing.
pub fn is_empty_dir(dir: &Path) -> bool {
    dir.is_dir() && std::fs::read_dir(dir).unwrap().next().is_none()
}

/// Check for JPEG magic bytes.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < 4 {
        return false;
    }
    data.starts_with(&[0xFF, 0xD8]) && data.ends_with(&[0xFF, 0xD9])
}
