//! Command-line configuration for wsi-tiler.
//!
//! Every extraction subcommand shares two groups of arguments:
//! - [`SlideArgs`]: the slide image, its metrics store and run options
//! - [`ThresholdArgs`]: the suitability predicates
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_tiler::config::{Cli, Command};
//!
//! let cli = Cli::parse();
//! if let Command::Annotated(config) = cli.into_command() {
//!     config.validate()?;
//!     let request = config.to_request();
//! }
//! ```
//!
//! # Environment Variables
//!
//! Shared options can be set via environment variables with the `WSI_TILER_` prefix:
//!
//! - `WSI_TILER_SLIDE` - Slide image file
//! - `WSI_TILER_METRICS` - Tile metrics store (JSON)
//! - `WSI_TILER_SLIDE_NAME` - Name used in output paths (default: slide file stem)
//! - `WSI_TILER_SEED` - Sampling seed
//! - `WSI_TILER_OUTPUT_DIR` - Output directory
//! - `WSI_TILER_TISSUE_LEVEL` - Minimum tissue probability
//! - `WSI_TILER_FOREGROUND_LEVEL` - Maximum foreground level, `otsu` or `triangle`

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};

use crate::extract::{
    is_valid_quality, ExtractionRequest, MultiClassMode, OtherClasses, OutputTarget,
    PerClassMode, TissueRandomMode, UnannotatedMode, DEFAULT_JPEG_QUALITY,
    DEFAULT_OVERLAP_THRESHOLD, DEFAULT_TILE_BUDGET, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
    UNANNOTATED_CLASS,
};
use crate::filter::{ForegroundThreshold, SuitabilityThresholds};
use crate::select::{Budget, PerClass};

// =============================================================================
// Default Values
// =============================================================================

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 224;

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = ".";

// =============================================================================
// CLI Structure
// =============================================================================

/// wsi-tiler - Tile selection and extraction for Whole Slide Images.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-tiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Build the tile grid of a slide and write an empty metrics store.
    Grid(GridConfig),

    /// Extract tiles per annotation class.
    Annotated(AnnotatedConfig),

    /// Extract tiles with multi-class mask stacks for segmentation.
    Segmentation(SegmentationConfig),

    /// Extract tiles that touch no annotation.
    Unannotated(UnannotatedConfig),

    /// Extract random suitable tiles into one or more target directories.
    Random(RandomConfig),

    /// Count the candidate tiles of one class without writing anything.
    Count(CountConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Slide, metrics store and run options.
#[derive(Args, Debug, Clone)]
pub struct SlideArgs {
    /// Slide image file.
    #[arg(long, env = "WSI_TILER_SLIDE")]
    pub slide: PathBuf,

    /// Tile metrics store written by `grid` and enriched by quality and
    /// annotation tools.
    #[arg(long, env = "WSI_TILER_METRICS")]
    pub metrics: PathBuf,

    /// Name used in output paths and filenames (default: slide file stem).
    #[arg(long, env = "WSI_TILER_SLIDE_NAME")]
    pub slide_name: Option<String>,

    /// Seed for reproducible sampling.
    #[arg(long, env = "WSI_TILER_SEED")]
    pub seed: Option<u64>,

    /// Skip the channel statistics fold.
    #[arg(long, default_value_t = false)]
    pub no_stats: bool,

    /// JPEG quality of written tiles (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "WSI_TILER_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl SlideArgs {
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.jpeg_quality) {
            return Err(format!(
                "jpeg_quality must be between {} and {}, got {}",
                MIN_JPEG_QUALITY, MAX_JPEG_QUALITY, self.jpeg_quality
            ));
        }
        Ok(())
    }

    fn apply(&self, mut request: ExtractionRequest) -> ExtractionRequest {
        if let Some(name) = &self.slide_name {
            request = request.with_slide_name(name.clone());
        }
        if let Some(seed) = self.seed {
            request = request.with_seed(seed);
        }
        if self.no_stats {
            request = request.without_stats();
        }
        request
    }
}

/// Suitability predicates.
#[derive(Args, Debug, Clone, Default)]
pub struct ThresholdArgs {
    /// Minimum tissue probability, greater than 0 and at most 1.
    #[arg(long, env = "WSI_TILER_TISSUE_LEVEL")]
    pub tissue_level: Option<f64>,

    /// Maximum foreground level (0-100), or `otsu` / `triangle`.
    #[arg(long, env = "WSI_TILER_FOREGROUND_LEVEL")]
    pub foreground_level: Option<ForegroundThreshold>,

    /// Require tiles to pass Otsu's method.
    #[arg(long, default_value_t = false)]
    pub otsu: bool,

    /// Require tiles to pass the triangle algorithm.
    #[arg(long, default_value_t = false)]
    pub triangle: bool,

    /// Require tiles to lie inside the tissue mask.
    #[arg(long, default_value_t = false)]
    pub mask_level: bool,
}

impl ThresholdArgs {
    pub fn thresholds(&self) -> SuitabilityThresholds {
        let mut thresholds = SuitabilityThresholds::none();
        if let Some(t) = self.tissue_level {
            thresholds = thresholds.with_tissue_level(t);
        }
        if let Some(f) = self.foreground_level {
            thresholds = thresholds.with_foreground_level(f);
        }
        if self.otsu {
            thresholds = thresholds.with_otsu();
        }
        if self.triangle {
            thresholds = thresholds.with_triangle();
        }
        if self.mask_level {
            thresholds = thresholds.with_mask();
        }
        thresholds
    }
}

/// Annotation mask rasters, one per class.
#[derive(Args, Debug, Clone, Default)]
pub struct MaskArgs {
    /// Write masks next to the tiles.
    #[arg(long, default_value_t = false)]
    pub extract_masks: bool,

    /// Label raster of a class, aligned with the slide (`CLASS=PATH`, repeatable).
    #[arg(long = "mask", value_parser = parse_key_value::<PathBuf>)]
    pub masks: Vec<(String, PathBuf)>,
}

impl MaskArgs {
    fn validate(&self) -> Result<(), String> {
        check_unique("--mask", self.masks.iter().map(|(k, _)| k))
    }
}

// =============================================================================
// Grid Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct GridConfig {
    /// Slide image file.
    #[arg(long, env = "WSI_TILER_SLIDE")]
    pub slide: PathBuf,

    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// Pyramid level to tile.
    #[arg(long, default_value_t = 0)]
    pub level: usize,

    /// Leave out partial tiles along the right and bottom edges.
    #[arg(long, default_value_t = false)]
    pub drop_partial: bool,

    /// Where to write the metrics store.
    #[arg(short, long, env = "WSI_TILER_METRICS")]
    pub output: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl GridConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.tile_size == 0 {
            return Err("tile_size must be greater than 0".to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Annotated Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct AnnotatedConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    #[command(flatten)]
    pub masks: MaskArgs,

    /// Output directory; tiles land in `tiles/{slide}/{class}`.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_TILER_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Classes to extract (default: every annotated class).
    #[arg(long = "class", value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Minimum overlap fraction for every class.
    #[arg(long, default_value_t = DEFAULT_OVERLAP_THRESHOLD)]
    pub overlap_threshold: f64,

    /// Per-class overlap threshold (`CLASS=FRACTION`, repeatable); every
    /// class to extract must be given one.
    #[arg(long = "class-threshold", value_parser = parse_key_value::<f64>)]
    pub class_thresholds: Vec<(String, f64)>,

    /// Tiles to extract per class: a positive number or `all`.
    #[arg(long, default_value = "all")]
    pub num_tiles: Budget,

    /// Per-class budget (`CLASS=N|all`, repeatable); every class to extract
    /// must be given one.
    #[arg(long = "class-num-tiles", value_parser = parse_key_value::<Budget>)]
    pub class_budgets: Vec<(String, Budget)>,

    /// Empty class directories to create next to the extracted ones.
    #[arg(long = "other-class", value_delimiter = ',')]
    pub other_classes: Vec<String>,

    /// Turn requested classes missing from the annotations into empty
    /// directories instead of failing.
    #[arg(long, default_value_t = false, conflicts_with = "other_classes")]
    pub discern_other_classes: bool,

    /// Write a blank mask where a class has no mask at a tile.
    #[arg(long, default_value_t = false)]
    pub accept_tiles_without_class: bool,
}

impl AnnotatedConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;
        check_unique("--class", &self.classes)?;
        check_unique(
            "--class-threshold",
            self.class_thresholds.iter().map(|(k, _)| k),
        )?;
        check_unique(
            "--class-num-tiles",
            self.class_budgets.iter().map(|(k, _)| k),
        )?;
        self.masks.validate()
    }

    pub fn to_request(&self) -> ExtractionRequest {
        let thresholds = per_class(self.overlap_threshold, &self.class_thresholds);
        let mut mode = PerClassMode::default()
            .with_overlap_thresholds(thresholds)
            .with_budgets(per_class(self.num_tiles, &self.class_budgets));

        if !self.classes.is_empty() {
            mode = mode.with_classes(self.classes.iter().cloned());
        }
        if self.discern_other_classes {
            mode = mode.with_other_classes(OtherClasses::DiscernFromClassesToExtract);
        } else if !self.other_classes.is_empty() {
            mode = mode.with_other_classes(OtherClasses::Named(self.other_classes.clone()));
        }
        if self.accept_tiles_without_class {
            mode = mode.accepting_tiles_without_class();
        }

        let request = ExtractionRequest::per_class(&self.output_dir, mode)
            .with_thresholds(self.thresholds.thresholds());
        let request = if self.masks.extract_masks {
            request.with_masks()
        } else {
            request
        };
        self.slide.apply(request)
    }
}

// =============================================================================
// Segmentation Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct SegmentationConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    #[command(flatten)]
    pub masks: MaskArgs,

    /// Output directory; tiles land in `tiles/{slide}`.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_TILER_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Classes to combine, in mask-stack order (default: every annotated class).
    #[arg(long = "class", value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Minimum summed overlap fraction across the classes.
    #[arg(long, default_value_t = DEFAULT_OVERLAP_THRESHOLD)]
    pub overlap_threshold: f64,

    /// Tiles to extract: a positive number or `all`.
    #[arg(long, default_value_t = Budget::Count(DEFAULT_TILE_BUDGET))]
    pub num_tiles: Budget,
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;
        check_unique("--class", &self.classes)?;
        self.masks.validate()
    }

    pub fn to_request(&self) -> ExtractionRequest {
        let mut mode = MultiClassMode::default()
            .with_overlap_threshold(self.overlap_threshold)
            .with_budget(self.num_tiles);
        if !self.classes.is_empty() {
            mode = mode.with_classes(self.classes.iter().cloned());
        }

        let request = ExtractionRequest::multi_class(&self.output_dir, mode)
            .with_thresholds(self.thresholds.thresholds());
        let request = if self.masks.extract_masks {
            request.with_masks()
        } else {
            request
        };
        self.slide.apply(request)
    }
}

// =============================================================================
// Unannotated Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct UnannotatedConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Output directory; tiles land in `tiles/{slide}/{class}`.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_TILER_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Class name used for the output directory and filenames.
    #[arg(long, default_value = UNANNOTATED_CLASS)]
    pub class_name: String,

    /// Tiles to extract: a positive number or `all`.
    #[arg(long, default_value_t = Budget::Count(DEFAULT_TILE_BUDGET))]
    pub num_tiles: Budget,

    /// Empty class directories to create next to the extracted one.
    #[arg(long = "other-class", value_delimiter = ',')]
    pub other_classes: Vec<String>,

    /// Write blank masks next to the tiles.
    #[arg(long, default_value_t = false)]
    pub extract_masks: bool,
}

impl UnannotatedConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;
        check_unique("--other-class", &self.other_classes)?;
        if self.other_classes.contains(&self.class_name) {
            return Err(format!(
                "--other-class must not repeat the class name '{}'",
                self.class_name
            ));
        }
        Ok(())
    }

    pub fn to_request(&self) -> ExtractionRequest {
        let mode = UnannotatedMode::default()
            .with_class_name(self.class_name.clone())
            .with_budget(self.num_tiles)
            .with_other_classes(self.other_classes.iter().cloned());

        let request = ExtractionRequest::unannotated(&self.output_dir, mode)
            .with_thresholds(self.thresholds.thresholds());
        let request = if self.extract_masks {
            request.with_masks()
        } else {
            request
        };
        self.slide.apply(request)
    }
}

// =============================================================================
// Random Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct RandomConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Directory the targets are resolved against.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR, env = "WSI_TILER_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Target directory and its tile count (`DIR=N`, repeatable). Targets
    /// are filled in order from one shared pool.
    #[arg(long = "target", required = true, value_parser = parse_target)]
    pub targets: Vec<(PathBuf, usize)>,

    /// Class name used for the output directory and filenames.
    #[arg(long, default_value = UNANNOTATED_CLASS)]
    pub class_name: String,
}

impl RandomConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.slide.validate()?;
        if self.targets.is_empty() {
            return Err("at least one --target is required".to_string());
        }
        let dirs = self.targets.iter().map(|(dir, _)| dir.to_string_lossy());
        check_unique("--target", dirs)
    }

    pub fn to_request(&self) -> ExtractionRequest {
        let targets = self
            .targets
            .iter()
            .map(|(dir, n)| OutputTarget::new(dir, *n))
            .collect();
        let mode = TissueRandomMode::new(targets).with_class_name(self.class_name.clone());

        let request = ExtractionRequest::tissue_random(&self.output_dir, mode)
            .with_thresholds(self.thresholds.thresholds());
        self.slide.apply(request)
    }
}

// =============================================================================
// Count Command
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct CountConfig {
    #[command(flatten)]
    pub slide: SlideArgs,

    #[command(flatten)]
    pub thresholds: ThresholdArgs,

    /// Class whose candidate tiles to count.
    pub class_name: String,

    /// Classes considered (default: every annotated class).
    #[arg(long = "class", value_delimiter = ',')]
    pub classes: Vec<String>,

    /// Minimum overlap fraction for every class.
    #[arg(long, default_value_t = DEFAULT_OVERLAP_THRESHOLD)]
    pub overlap_threshold: f64,

    /// Per-class overlap threshold (`CLASS=FRACTION`, repeatable).
    #[arg(long = "class-threshold", value_parser = parse_key_value::<f64>)]
    pub class_thresholds: Vec<(String, f64)>,
}

impl CountConfig {
    pub fn validate(&self) -> Result<(), String> {
        check_unique("--class", &self.classes)?;
        check_unique(
            "--class-threshold",
            self.class_thresholds.iter().map(|(k, _)| k),
        )
    }

    pub fn to_request(&self) -> ExtractionRequest {
        let thresholds = per_class(self.overlap_threshold, &self.class_thresholds);
        let mut mode = PerClassMode::default().with_overlap_thresholds(thresholds);
        if !self.classes.is_empty() {
            mode = mode.with_classes(self.classes.iter().cloned());
        }

        let request = ExtractionRequest::per_class(DEFAULT_OUTPUT_DIR, mode)
            .with_thresholds(self.thresholds.thresholds());
        self.slide.apply(request)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Uniform value unless explicit per-class values were given.
fn per_class<T: Copy>(uniform: T, explicit: &[(String, T)]) -> PerClass<T> {
    if explicit.is_empty() {
        PerClass::uniform(uniform)
    } else {
        PerClass::explicit(explicit.iter().cloned())
    }
}

fn check_unique<S: AsRef<str>>(
    flag: &str,
    values: impl IntoIterator<Item = S>,
) -> Result<(), String> {
    let mut seen = BTreeSet::new();
    for value in values {
        let value = value.as_ref();
        if !seen.insert(value.to_string()) {
            return Err(format!("{flag} given more than once for '{value}'"));
        }
    }
    Ok(())
}

/// Parse `KEY=VALUE`.
fn parse_key_value<T>(s: &str) -> Result<(String, T), String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("missing key in '{s}'"));
    }
    let value = value
        .parse::<T>()
        .map_err(|e| format!("invalid value for {key}: {e}"))?;
    Ok((key.to_string(), value))
}

/// Parse `DIR=N` with a positive `N`.
fn parse_target(s: &str) -> Result<(PathBuf, usize), String> {
    let (dir, n) = parse_key_value::<usize>(s)?;
    if n == 0 {
        return Err(format!("tile count for {dir} must be greater than 0"));
    }
    Ok((PathBuf::from(dir), n))
}

// =============================================================================
// Tests
// =============================================================================
