//! Output filenames and directory layout.
//!
//! A tile filename carries its slide, class, level-0 origin and height, then
//! one suffix per active quality threshold:
//!
//! ```text
//! {slide}_{class}_{x}x_{y}y_{height}tilesize[_{value}{metric}]*.jpg
//! ```
//!
//! Suffixes come from a fixed table so the order never depends on which
//! thresholds happen to be enabled.

use std::path::{Path, PathBuf};

use crate::filter::SuitabilityThresholds;
use crate::store::{TileRecord, FOREGROUND_LEVEL, OTSU_LEVEL, TISSUE_LEVEL, TRIANGLE_LEVEL};

pub const TILE_EXTENSION: &str = "jpg";
pub const MASK_SUFFIX: &str = "_mask.png";
pub const MASK_STACK_SUFFIX: &str = "_mask.npy";

// =============================================================================
// Metric Suffixes
// =============================================================================

struct MetricSuffix {
    field: &'static str,
    scale: f64,
    active: fn(&SuitabilityThresholds) -> bool,
}

fn tissue_active(t: &SuitabilityThresholds) -> bool {
    t.tissue_level.is_some()
}

fn foreground_active(t: &SuitabilityThresholds) -> bool {
    t.foreground_level.is_enabled()
}

fn otsu_active(t: &SuitabilityThresholds) -> bool {
    t.otsu_level
}

fn triangle_active(t: &SuitabilityThresholds) -> bool {
    t.triangle_level
}

const METRIC_SUFFIXES: [MetricSuffix; 4] = [
    MetricSuffix {
        field: TISSUE_LEVEL,
        scale: 1000.0,
        active: tissue_active,
    },
    MetricSuffix {
        field: FOREGROUND_LEVEL,
        scale: 1.0,
        active: foreground_active,
    },
    MetricSuffix {
        field: OTSU_LEVEL,
        scale: 1000.0,
        active: otsu_active,
    },
    MetricSuffix {
        field: TRIANGLE_LEVEL,
        scale: 1000.0,
        active: triangle_active,
    },
];

// =============================================================================
// Tile Namer
// =============================================================================

/// Builds filenames for one slide and (optionally) one class.
#[derive(Debug, Clone)]
pub struct TileNamer {
    slide: String,
    class_name: Option<String>,
    thresholds: SuitabilityThresholds,
}

impl TileNamer {
    /// Namer without a class segment, as used for mask stacks.
    pub fn new(slide: impl Into<String>, thresholds: SuitabilityThresholds) -> Self {
        Self {
            slide: slide.into(),
            class_name: None,
            thresholds,
        }
    }

    pub fn for_class(&self, class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            ..self.clone()
        }
    }

    /// Filename without extension.
    ///
    /// An active metric the record does not carry contributes no suffix.
    pub fn stem(&self, record: &TileRecord) -> String {
        let mut stem = self.slide.clone();
        if let Some(class_name) = &self.class_name {
            stem.push('_');
            stem.push_str(class_name);
        }
        stem.push_str(&format!(
            "_{}x_{}y_{}tilesize",
            record.x, record.y, record.height
        ));

        for suffix in METRIC_SUFFIXES
            .iter()
            .filter(|s| (s.active)(&self.thresholds))
        {
            if let Some(value) = record.metric(suffix.field) {
                stem.push_str(&format!(
                    "_{}{}",
                    (value * suffix.scale).round() as i64,
                    suffix.field
                ));
            }
        }

        stem
    }

    pub fn tile_file(&self, record: &TileRecord) -> String {
        format!("{}.{}", self.stem(record), TILE_EXTENSION)
    }

    pub fn mask_file(&self, record: &TileRecord) -> String {
        format!("{}{}", self.stem(record), MASK_SUFFIX)
    }

    pub fn mask_stack_file(&self, record: &TileRecord) -> String {
        format!("{}{}", self.stem(record), MASK_STACK_SUFFIX)
    }
}

// =============================================================================
// Output Layout
// =============================================================================

/// Tile and mask directories for one output pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub tiles: PathBuf,
    pub masks: Option<PathBuf>,
}

impl OutputLayout {
    /// `{out}/tiles/{slide}/{class}` and `{out}/masks/{slide}/{class}`.
    pub fn per_class(output_dir: &Path, slide: &str, class_name: &str, masks: bool) -> Self {
        Self {
            tiles: output_dir.join("tiles").join(slide).join(class_name),
            masks: masks.then(|| output_dir.join("masks").join(slide).join(class_name)),
        }
    }

    /// `{out}/tiles/{slide}` and `{out}/masks/{slide}`.
    pub fn flat(output_dir: &Path, slide: &str, masks: bool) -> Self {
        Self {
            tiles: output_dir.join("tiles").join(slide),
            masks: masks.then(|| output_dir.join("masks").join(slide)),
        }
    }

    /// `{target}/{class}/{slide}`, tiles only.
    pub fn target(target_dir: &Path, class_name: &str, slide: &str) -> Self {
        Self {
            tiles: target_dir.join(class_name).join(slide),
            masks: None,
        }
    }

    pub fn dirs(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.tiles.as_path()).chain(self.masks.as_deref())
    }
}

// =============================================================================
// Tests
// =============================================================================
