//! # WSI Tiler
//!
//! Tile selection and extraction for Whole Slide Images (WSI).
//!
//! Given a slide and a tile metrics store (one record per grid tile, carrying
//! quality metrics and annotation-overlap fractions), this library decides
//! which tiles are worth keeping, samples them per class or across classes,
//! and writes the chosen tiles, their masks and running channel statistics.
//!
//! ## Features
//!
//! - **Suitability filtering**: tissue probability, foreground level, Otsu,
//!   triangle and tissue-mask predicates
//! - **Four extraction modes**: per-class, multi-class with mask stacks,
//!   unannotated, and tissue-random fan-out across several targets
//! - **Reproducible sampling**: seeded, without replacement
//! - **Deterministic naming**: filenames encode position, size and the active
//!   quality metrics
//! - **Inference feed**: lazy, restartable batches of suitable tiles with
//!   predictions written back to the store
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`grid`] - Tile addresses, rectangles and the grid over one pyramid level
//! - [`store`] - The per-tile metrics store and its JSON persistence
//! - [`filter`] - Suitability thresholds and the suitable-address filter
//! - [`select`] - Candidate pools and sampling
//! - [`slide`] - Pixel and annotation-mask sources
//! - [`extract`] - Naming, encoding, statistics and the extraction driver
//! - [`inference`] - Suitable tiles for a model loop
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//! use wsi_tiler::{
//!     ExtractionRequest, FileTileSink, ImageSlide, PerClassMode, SuitabilityThresholds,
//!     TileExtractor, TileMetricsStore,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let slide = ImageSlide::open(Path::new("slide.png"))?;
//! let store = TileMetricsStore::load(Path::new("slide.tiles.json"))?;
//!
//! let request = ExtractionRequest::per_class("/data/out", PerClassMode::default())
//!     .with_thresholds(SuitabilityThresholds::none().with_tissue_level(0.9))
//!     .with_seed(42);
//!
//! let report = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink)?;
//! println!("{} tiles written", report.tiles_written);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod filter;
pub mod grid;
pub mod inference;
pub mod select;
pub mod slide;
pub mod store;

// Re-export commonly used types
pub use config::{Cli, Command};
pub use error::{ExtractError, SlideError, Warnings};
pub use extract::{
    ExtractionMode, ExtractionReport, ExtractionRequest, ExtractionSummary, FileTileSink,
    MemoryTileSink, MultiClassMode, OtherClasses, OutputTarget, PerClassMode, TileEncoder,
    TileExtractor, TileSink, TileStatistics, TissueRandomMode, UnannotatedMode,
};
pub use filter::{suitable_addresses, ForegroundThreshold, SuitabilityThresholds};
pub use grid::{TileAddress, TileGrid, TileRect};
pub use inference::{record_predictions, InferenceTile, SuitableTiles};
pub use select::{Budget, PerClass, SamplingRng};
pub use slide::{ImageSlide, LevelInfo, MaskSource, RasterMaskSource, RegionReader};
pub use store::{FieldValue, TileMetricsStore, TileRecord};
