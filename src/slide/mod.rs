//! Slide abstraction layer.
//!
//! The engine reads pixels and annotation masks through two traits so the
//! actual slide decoder and annotation rasterizer stay outside the crate:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        TileExtractor / SuitableTiles    │
//! └──────────┬───────────────────┬──────────┘
//!            │                   │
//!            ▼                   ▼
//! ┌────────────────────┐ ┌────────────────────┐
//! │  RegionReader      │ │  MaskSource        │
//! │  (pixels, pyramid) │ │  (class masks)     │
//! └─────────┬──────────┘ └─────────┬──────────┘
//!           │                      │
//!           ▼                      ▼
//! ┌────────────────────┐ ┌────────────────────┐
//! │  ImageSlide        │ │  RasterMaskSource  │
//! │  (raster file)     │ │  NoAnnotations     │
//! └────────────────────┘ └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use wsi_tiler::slide::{ImageSlide, RegionReader};
//!
//! let slide = ImageSlide::open(Path::new("region.png"))?;
//! let info = slide.level_info(0).unwrap();
//! let pixels = slide.read_region(0, 0, 0, 256, 256)?;
//! ```

mod mask;
mod raster;
mod reader;

pub use mask::{blank_mask, MaskSource, NoAnnotations, RasterMaskSource};
pub use raster::ImageSlide;
pub use reader::{LevelInfo, RegionReader};
