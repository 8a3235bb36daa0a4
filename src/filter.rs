//! Suitability filter.
//!
//! A tile is suitable when every enabled quality predicate passes:
//!
//! | Threshold | Predicate |
//! |---|---|
//! | `tissue_level` | `tissueLevel >= t` |
//! | `foreground_level = Max(t)` | `foregroundLevel <= t` (darker means more tissue) |
//! | `foreground_level = Otsu` | `otsuLevel` passes |
//! | `foreground_level = Triangle` | `triangleLevel` passes |
//! | `otsu_level` | `otsuLevel` passes |
//! | `triangle_level` | `triangleLevel` passes |
//! | `mask_level` | `maskLevel` passes |
//!
//! Disabled predicates impose no constraint. The ordered sequence returned
//! by [`suitable_addresses`] is the basis for every selection downstream.

use std::fmt;
use std::str::FromStr;

use crate::error::ExtractError;
use crate::grid::TileAddress;
use crate::store::{
    TileMetricsStore, TileRecord, FOREGROUND_LEVEL, MASK_LEVEL, OTSU_LEVEL, TISSUE_LEVEL,
    TRIANGLE_LEVEL,
};

/// Upper bound of the foreground scale.
pub const MAX_FOREGROUND_LEVEL: f64 = 100.0;

// =============================================================================
// Foreground Threshold
// =============================================================================

/// Foreground criterion: a numeric ceiling or a histogram-method flag.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ForegroundThreshold {
    #[default]
    Disabled,
    /// Keep tiles with `foregroundLevel <= value` (0-100)
    Max(f64),
    /// Keep tiles passing Otsu's method
    Otsu,
    /// Keep tiles passing the triangle algorithm
    Triangle,
}

impl ForegroundThreshold {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, ForegroundThreshold::Disabled)
    }
}

impl FromStr for ForegroundThreshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "otsu" => Ok(ForegroundThreshold::Otsu),
            "triangle" => Ok(ForegroundThreshold::Triangle),
            other => other
                .parse::<f64>()
                .map(ForegroundThreshold::Max)
                .map_err(|_| {
                    format!("expected a number between 0 and 100, 'otsu' or 'triangle', got '{s}'")
                }),
        }
    }
}

impl fmt::Display for ForegroundThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForegroundThreshold::Disabled => write!(f, "disabled"),
            ForegroundThreshold::Max(v) => write!(f, "{v}"),
            ForegroundThreshold::Otsu => write!(f, "otsu"),
            ForegroundThreshold::Triangle => write!(f, "triangle"),
        }
    }
}

// =============================================================================
// Suitability Thresholds
// =============================================================================

/// The set of quality predicates a tile must pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SuitabilityThresholds {
    /// Minimum tissue probability in (0, 1]
    pub tissue_level: Option<f64>,

    /// Foreground criterion
    pub foreground_level: ForegroundThreshold,

    /// Require the Otsu flag
    pub otsu_level: bool,

    /// Require the triangle flag
    pub triangle_level: bool,

    /// Require the tissue-mask flag
    pub mask_level: bool,
}

impl SuitabilityThresholds {
    /// No predicates: every tile is suitable.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_tissue_level(mut self, threshold: f64) -> Self {
        self.tissue_level = Some(threshold);
        self
    }

    pub fn with_foreground_level(mut self, threshold: ForegroundThreshold) -> Self {
        self.foreground_level = threshold;
        self
    }

    pub fn with_otsu(mut self) -> Self {
        self.otsu_level = true;
        self
    }

    pub fn with_triangle(mut self) -> Self {
        self.triangle_level = true;
        self
    }

    pub fn with_mask(mut self) -> Self {
        self.mask_level = true;
        self
    }

    /// Whether any predicate is enabled.
    pub fn is_active(&self) -> bool {
        self.tissue_level.is_some()
            || self.foreground_level.is_enabled()
            || self.otsu_level
            || self.triangle_level
            || self.mask_level
    }

    /// Check every threshold against its declared range.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if let Some(t) = self.tissue_level {
            if !(t > 0.0 && t <= 1.0) {
                return Err(ExtractError::invalid(
                    "tissueLevelThreshold",
                    format!("must be a number greater than 0 and at most 1, got {t}"),
                ));
            }
        }

        if let ForegroundThreshold::Max(t) = self.foreground_level {
            if !(0.0..=MAX_FOREGROUND_LEVEL).contains(&t) {
                return Err(ExtractError::invalid(
                    "foregroundLevelThreshold",
                    format!("must be between 0 and 100, got {t}"),
                ));
            }
        }

        Ok(())
    }

    /// Record fields the enabled predicates read, in a fixed order.
    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.tissue_level.is_some() {
            fields.push(TISSUE_LEVEL);
        }
        match self.foreground_level {
            ForegroundThreshold::Disabled => {}
            ForegroundThreshold::Max(_) => fields.push(FOREGROUND_LEVEL),
            ForegroundThreshold::Otsu => fields.push(OTSU_LEVEL),
            ForegroundThreshold::Triangle => fields.push(TRIANGLE_LEVEL),
        }
        if self.otsu_level {
            fields.push(OTSU_LEVEL);
        }
        if self.triangle_level {
            fields.push(TRIANGLE_LEVEL);
        }
        if self.mask_level {
            fields.push(MASK_LEVEL);
        }
        fields.dedup();
        fields
    }
}

// =============================================================================
// Predicates
// =============================================================================

fn flag_passes(record: &TileRecord, name: &str) -> bool {
    record.field(name).is_some_and(|v| v.passes())
}

/// Evaluate a record against the thresholds.
///
/// A record missing a field that an enabled predicate reads fails that
/// predicate.
pub fn is_suitable(record: &TileRecord, thresholds: &SuitabilityThresholds) -> bool {
    if let Some(t) = thresholds.tissue_level {
        if !record.metric(TISSUE_LEVEL).is_some_and(|v| v >= t) {
            return false;
        }
    }

    let foreground_ok = match thresholds.foreground_level {
        ForegroundThreshold::Disabled => true,
        ForegroundThreshold::Max(t) => record.metric(FOREGROUND_LEVEL).is_some_and(|v| v <= t),
        ForegroundThreshold::Otsu => flag_passes(record, OTSU_LEVEL),
        ForegroundThreshold::Triangle => flag_passes(record, TRIANGLE_LEVEL),
    };
    if !foreground_ok {
        return false;
    }

    if thresholds.otsu_level && !flag_passes(record, OTSU_LEVEL) {
        return false;
    }
    if thresholds.triangle_level && !flag_passes(record, TRIANGLE_LEVEL) {
        return false;
    }
    if thresholds.mask_level && !flag_passes(record, MASK_LEVEL) {
        return false;
    }

    true
}

/// Suitable addresses in grid order.
///
/// # Errors
///
/// - `InvalidConfig` if a threshold is out of range (checked first)
/// - `Precondition` if the store is empty or lacks a field an enabled
///   predicate needs
pub fn suitable_addresses(
    store: &TileMetricsStore,
    thresholds: &SuitabilityThresholds,
) -> Result<Vec<TileAddress>, ExtractError> {
    thresholds.validate()?;
    check_metrics_present(store, thresholds)?;

    Ok(store
        .iter()
        .filter(|(_, record)| is_suitable(record, thresholds))
        .map(|(address, _)| address)
        .collect())
}

/// Fail if the grid or the metrics the thresholds read are missing.
pub fn check_metrics_present(
    store: &TileMetricsStore,
    thresholds: &SuitabilityThresholds,
) -> Result<(), ExtractError> {
    if store.is_empty() {
        return Err(ExtractError::Precondition(
            "tile grid has not been populated for this slide".to_string(),
        ));
    }

    for field in thresholds.required_fields() {
        if !store.has_field(field) {
            return Err(ExtractError::Precondition(format!(
                "{field} has not been computed for this slide"
            )));
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
