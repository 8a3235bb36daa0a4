//! Extraction pipeline.
//!
//! Turns selected addresses into files on disk and folds channel statistics
//! over the pixels written.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           ExtractionRequest             │
//! └────────────────────┬────────────────────┘
//!                      │ validate, filter, sample
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TileExtractor               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileNamer   │  │  TileEncoder    │  │
//! │  │ OutputLayout │  │  (jpg/png/npy)  │  │
//! │  └──────────────┘  └─────────────────┘  │
//! │  ┌──────────────────────────────────┐   │
//! │  │        RunningStatistics         │   │
//! │  └──────────────────────────────────┘   │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │   TileSink (FileTileSink / Memory)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileExtractor`]: drives the per-class, multi-class, unannotated and
//!   tissue-random modes
//! - [`ExtractionRequest`]: validated per-call configuration
//! - [`TileNamer`] / [`OutputLayout`]: deterministic filenames and directories
//! - [`TileEncoder`]: JPEG tiles, PNG masks, NumPy mask stacks
//! - [`RunningStatistics`]: streaming per-channel sums

mod encoder;
mod extractor;
mod naming;
mod request;
mod sink;
mod stats;

pub use encoder::{
    clamp_quality, is_valid_quality, TileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use extractor::TileExtractor;
pub use naming::{OutputLayout, TileNamer, MASK_STACK_SUFFIX, MASK_SUFFIX, TILE_EXTENSION};
pub use request::{
    ExtractionMode, ExtractionRequest, MultiClassMode, OtherClasses, OutputTarget, PerClassMode,
    TissueRandomMode, UnannotatedMode, DEFAULT_OVERLAP_THRESHOLD, DEFAULT_TILE_BUDGET,
    UNANNOTATED_CLASS,
};
pub use sink::{FileTileSink, MemoryTileSink, TileSink};
pub use stats::{ExtractionReport, ExtractionSummary, RunningStatistics, TileStatistics};
