//! Tile grid index.
//!
//! Maps the geometry of one pyramid level onto a deterministic set of tile
//! addresses. Addresses enumerate in row-major order (every column of row 0,
//! then row 1, ...), and that order is the iteration order used everywhere
//! else in the crate: the metrics store, the suitability filter and the
//! random samplers all see tiles in this sequence.
//!
//! # Coordinates
//!
//! - A [`TileAddress`] is a `(col, row)` position in the grid.
//! - A [`TileRect`] is the pixel rectangle of that tile. The origin `(x, y)`
//!   is expressed at full resolution (level 0); `width` and `height` are the
//!   tile extent at the grid's level, reduced for partial edge tiles.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::slide::LevelInfo;

// =============================================================================
// Tile Address
// =============================================================================

/// Grid coordinate of a tile.
///
/// Addresses order row-major: `(col, row)` compares by `row` first, then `col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileAddress {
    /// Column index (0-indexed from left)
    pub col: u32,

    /// Row index (0-indexed from top)
    pub row: u32,
}

impl TileAddress {
    pub const fn new(col: u32, row: u32) -> Self {
        Self { col, row }
    }
}

impl Ord for TileAddress {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.row, self.col).cmp(&(other.row, other.col))
    }
}

impl PartialOrd for TileAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TileAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.col, self.row)
    }
}

impl From<(u32, u32)> for TileAddress {
    fn from((col, row): (u32, u32)) -> Self {
        Self::new(col, row)
    }
}

// =============================================================================
// Tile Rectangle
// =============================================================================

/// Pixel geometry of a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRect {
    /// Left edge at full resolution
    pub x: u64,

    /// Top edge at full resolution
    pub y: u64,

    /// Width in pixels at the grid level
    pub width: u32,

    /// Height in pixels at the grid level
    pub height: u32,
}

impl TileRect {
    pub const fn new(x: u64, y: u64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Multiply every coordinate by `factor`.
    ///
    /// Used to align stored geometry with a higher-resolution level.
    pub fn scaled(&self, factor: u32) -> Self {
        Self {
            x: self.x * u64::from(factor),
            y: self.y * u64::from(factor),
            width: self.width.saturating_mul(factor),
            height: self.height.saturating_mul(factor),
        }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

// =============================================================================
// Tile Grid
// =============================================================================

/// Grid of fixed-size tiles over one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    level: usize,
    level_width: u32,
    level_height: u32,
    tile_size: u32,
    downsample: f64,
    include_partial: bool,
}

impl TileGrid {
    /// Create a grid over a level-0 image of the given size.
    ///
    /// Partial edge tiles are included.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `tile_size` is zero.
    pub fn new(width: u32, height: u32, tile_size: u32) -> Result<Self, ExtractError> {
        Self::for_level(
            0,
            &LevelInfo {
                width,
                height,
                downsample: 1.0,
            },
            tile_size,
        )
    }

    /// Create a grid over a specific pyramid level.
    pub fn for_level(
        level: usize,
        info: &LevelInfo,
        tile_size: u32,
    ) -> Result<Self, ExtractError> {
        if tile_size == 0 {
            return Err(ExtractError::invalid("tileSize", "must be greater than 0"));
        }
        if !(info.downsample.is_finite() && info.downsample >= 1.0) {
            return Err(ExtractError::invalid(
                "downsample",
                format!("must be a finite value >= 1, got {}", info.downsample),
            ));
        }

        Ok(Self {
            level,
            level_width: info.width,
            level_height: info.height,
            tile_size,
            downsample: info.downsample,
            include_partial: true,
        })
    }

    /// Drop partial edge tiles from the grid.
    pub fn without_partial_tiles(mut self) -> Self {
        self.include_partial = false;
        self
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn downsample(&self) -> f64 {
        self.downsample
    }

    /// Level size as `(width, height)`.
    pub fn level_dimensions(&self) -> (u32, u32) {
        (self.level_width, self.level_height)
    }

    pub fn includes_partial_tiles(&self) -> bool {
        self.include_partial
    }

    /// Number of tile columns.
    pub fn columns(&self) -> u32 {
        self.span(self.level_width)
    }

    /// Number of tile rows.
    pub fn rows(&self) -> u32 {
        self.span(self.level_height)
    }

    fn span(&self, extent: u32) -> u32 {
        if self.include_partial {
            extent.div_ceil(self.tile_size)
        } else {
            extent / self.tile_size
        }
    }

    /// Total number of tiles.
    pub fn len(&self) -> usize {
        self.columns() as usize * self.rows() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: TileAddress) -> bool {
        address.col < self.columns() && address.row < self.rows()
    }

    /// All addresses in row-major order.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        let cols = self.columns();
        (0..self.rows()).flat_map(move |row| {
            (0..cols).map(move |col| TileAddress::new(col, row))
        })
    }

    /// Pixel rectangle of a tile, or `None` if the address is outside the grid.
    pub fn rect(&self, address: TileAddress) -> Option<TileRect> {
        if !self.contains(address) {
            return None;
        }

        let px = address.col * self.tile_size;
        let py = address.row * self.tile_size;
        let width = self.tile_size.min(self.level_width - px);
        let height = self.tile_size.min(self.level_height - py);

        Some(TileRect {
            x: (f64::from(px) * self.downsample).round() as u64,
            y: (f64::from(py) * self.downsample).round() as u64,
            width,
            height,
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
