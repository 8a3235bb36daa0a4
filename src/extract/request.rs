//! Extraction requests.
//!
//! A request is built once per call, validated before any sampling or I/O,
//! and consumed by [`super::TileExtractor`].

use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::error::ExtractError;
use crate::filter::SuitabilityThresholds;
use crate::select::{Budget, PerClass};

/// Default class name for tiles outside every annotation.
pub const UNANNOTATED_CLASS: &str = "unannotated";

/// Default overlap fraction a tile needs to join a class pool.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;

/// Default budget of the multi-class and unannotated modes.
pub const DEFAULT_TILE_BUDGET: usize = 100;

// =============================================================================
// Modes
// =============================================================================

/// Extra, empty class directories provisioned next to the extracted ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OtherClasses {
    #[default]
    None,
    /// These names
    Named(Vec<String>),
    /// Requested classes absent from the slide's annotations; they become
    /// empty directories instead of failing validation
    DiscernFromClassesToExtract,
}

/// One pool per annotation class.
#[derive(Debug, Clone, PartialEq)]
pub struct PerClassMode {
    /// Classes to extract; `None` takes every annotated class
    pub classes: Option<Vec<String>>,
    pub overlap_thresholds: PerClass<f64>,
    pub budgets: PerClass<Budget>,
    pub other_classes: OtherClasses,
    /// Write a blank mask where the mask source has none for the class
    pub accept_tiles_without_class: bool,
}

impl Default for PerClassMode {
    fn default() -> Self {
        Self {
            classes: None,
            overlap_thresholds: PerClass::uniform(DEFAULT_OVERLAP_THRESHOLD),
            budgets: PerClass::uniform(Budget::All),
            other_classes: OtherClasses::None,
            accept_tiles_without_class: false,
        }
    }
}

impl PerClassMode {
    pub fn with_classes<S: Into<String>>(mut self, classes: impl IntoIterator<Item = S>) -> Self {
        self.classes = Some(classes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_overlap_thresholds(mut self, thresholds: PerClass<f64>) -> Self {
        self.overlap_thresholds = thresholds;
        self
    }

    pub fn with_budgets(mut self, budgets: PerClass<Budget>) -> Self {
        self.budgets = budgets;
        self
    }

    pub fn with_other_classes(mut self, other_classes: OtherClasses) -> Self {
        self.other_classes = other_classes;
        self
    }

    pub fn accepting_tiles_without_class(mut self) -> Self {
        self.accept_tiles_without_class = true;
        self
    }

    /// Split the requested classes into those to extract and those that only
    /// get an empty directory.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when a requested class has no annotations on the slide
    /// and is not discerned into an empty directory.
    pub fn resolve_classes(
        &self,
        annotated: &BTreeSet<String>,
    ) -> Result<(Vec<String>, Vec<String>), ExtractError> {
        let Some(requested) = &self.classes else {
            return Ok((annotated.iter().cloned().collect(), Vec::new()));
        };

        let discern = self.other_classes == OtherClasses::DiscernFromClassesToExtract;
        let mut extract = Vec::new();
        let mut extra = Vec::new();

        for class_name in requested {
            if annotated.contains(class_name) {
                extract.push(class_name.clone());
            } else if discern {
                extra.push(class_name.clone());
            } else {
                return Err(ExtractError::invalid(
                    "classesToExtract",
                    format!("{class_name} not found in tile metrics store"),
                ));
            }
        }

        Ok((extract, extra))
    }
}

/// One combined pool; masks are written as per-class stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiClassMode {
    /// Classes to combine, in mask-stack order; `None` takes every annotated class
    pub classes: Option<Vec<String>>,
    pub overlap_threshold: f64,
    pub budget: Budget,
}

impl Default for MultiClassMode {
    fn default() -> Self {
        Self {
            classes: None,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            budget: Budget::Count(DEFAULT_TILE_BUDGET),
        }
    }
}

impl MultiClassMode {
    pub fn with_classes<S: Into<String>>(mut self, classes: impl IntoIterator<Item = S>) -> Self {
        self.classes = Some(classes.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_overlap_threshold(mut self, threshold: f64) -> Self {
        self.overlap_threshold = threshold;
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Classes to combine, checked against the slide's annotations.
    pub fn resolve_classes(
        &self,
        annotated: &BTreeSet<String>,
    ) -> Result<Vec<String>, ExtractError> {
        let Some(requested) = &self.classes else {
            return Ok(annotated.iter().cloned().collect());
        };

        if let Some(missing) = requested.iter().find(|c| !annotated.contains(*c)) {
            return Err(ExtractError::invalid(
                "classesToExtract",
                format!("{missing} not found in tile metrics store"),
            ));
        }
        Ok(requested.clone())
    }
}

/// Tiles that touch no annotation at all.
#[derive(Debug, Clone, PartialEq)]
pub struct UnannotatedMode {
    pub class_name: String,
    pub budget: Budget,
    pub other_classes: Vec<String>,
}

impl Default for UnannotatedMode {
    fn default() -> Self {
        Self {
            class_name: UNANNOTATED_CLASS.to_string(),
            budget: Budget::Count(DEFAULT_TILE_BUDGET),
            other_classes: Vec::new(),
        }
    }
}

impl UnannotatedMode {
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_other_classes<S: Into<String>>(
        mut self,
        classes: impl IntoIterator<Item = S>,
    ) -> Self {
        self.other_classes = classes.into_iter().map(Into::into).collect();
        self
    }
}

/// One fan-out destination of the tissue-random mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    /// Resolved against the request's output directory
    pub dir: PathBuf,
    pub budget: usize,
}

impl OutputTarget {
    pub fn new(dir: impl Into<PathBuf>, budget: usize) -> Self {
        Self {
            dir: dir.into(),
            budget,
        }
    }
}

/// Suitable tiles drawn at random regardless of annotation, dealt across
/// several targets from one shared pool.
#[derive(Debug, Clone, PartialEq)]
pub struct TissueRandomMode {
    pub class_name: String,
    pub targets: Vec<OutputTarget>,
}

impl TissueRandomMode {
    pub fn new(targets: Vec<OutputTarget>) -> Self {
        Self {
            class_name: UNANNOTATED_CLASS.to_string(),
            targets,
        }
    }

    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }
}

/// What to select and how to lay it out.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionMode {
    PerClass(PerClassMode),
    MultiClass(MultiClassMode),
    Unannotated(UnannotatedMode),
    TissueRandom(TissueRandomMode),
}

impl ExtractionMode {
    pub fn name(&self) -> &'static str {
        match self {
            ExtractionMode::PerClass(_) => "per-class",
            ExtractionMode::MultiClass(_) => "multi-class",
            ExtractionMode::Unannotated(_) => "unannotated",
            ExtractionMode::TissueRandom(_) => "tissue-random",
        }
    }
}

// =============================================================================
// Request
// =============================================================================

/// Configuration of one extraction call.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRequest {
    pub output_dir: PathBuf,

    /// Name used in paths and filenames; defaults to the slide id
    pub slide_name: Option<String>,

    pub thresholds: SuitabilityThresholds,
    pub extract_masks: bool,

    /// Fold channel statistics over every written tile
    pub return_stats: bool,

    /// Seed for reproducible sampling
    pub seed: Option<u64>,

    pub mode: ExtractionMode,
}

impl ExtractionRequest {
    pub fn new(output_dir: impl Into<PathBuf>, mode: ExtractionMode) -> Self {
        Self {
            output_dir: output_dir.into(),
            slide_name: None,
            thresholds: SuitabilityThresholds::none(),
            extract_masks: false,
            return_stats: true,
            seed: None,
            mode,
        }
    }

    pub fn per_class(output_dir: impl Into<PathBuf>, mode: PerClassMode) -> Self {
        Self::new(output_dir, ExtractionMode::PerClass(mode))
    }

    pub fn multi_class(output_dir: impl Into<PathBuf>, mode: MultiClassMode) -> Self {
        Self::new(output_dir, ExtractionMode::MultiClass(mode))
    }

    pub fn unannotated(output_dir: impl Into<PathBuf>, mode: UnannotatedMode) -> Self {
        Self::new(output_dir, ExtractionMode::Unannotated(mode))
    }

    pub fn tissue_random(output_dir: impl Into<PathBuf>, mode: TissueRandomMode) -> Self {
        Self::new(output_dir, ExtractionMode::TissueRandom(mode))
    }

    pub fn with_slide_name(mut self, slide_name: impl Into<String>) -> Self {
        self.slide_name = Some(slide_name.into());
        self
    }

    pub fn with_thresholds(mut self, thresholds: SuitabilityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_masks(mut self) -> Self {
        self.extract_masks = true;
        self
    }

    pub fn without_stats(mut self) -> Self {
        self.return_stats = false;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Check everything that does not depend on the slide.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if let Some(name) = &self.slide_name {
            check_path_segment("slideName", name)?;
        }
        self.thresholds.validate()?;

        match &self.mode {
            ExtractionMode::PerClass(mode) => {
                if let Some(classes) = &mode.classes {
                    check_class_list(classes)?;
                }
                for t in mode.overlap_thresholds.values() {
                    check_overlap_threshold(t)?;
                }
                for budget in mode.budgets.values() {
                    budget.validate("numTilesToExtractPerClass")?;
                }
                if let OtherClasses::Named(names) = &mode.other_classes {
                    for name in names {
                        check_path_segment("otherClassNames", name)?;
                    }
                }
            }
            ExtractionMode::MultiClass(mode) => {
                if let Some(classes) = &mode.classes {
                    check_class_list(classes)?;
                }
                check_overlap_threshold(mode.overlap_threshold)?;
                mode.budget.validate("numTilesToExtract")?;
            }
            ExtractionMode::Unannotated(mode) => {
                check_path_segment("unannotatedClassName", &mode.class_name)?;
                mode.budget.validate("numTilesToExtract")?;
                for name in &mode.other_classes {
                    check_path_segment("otherClassNames", name)?;
                }
            }
            ExtractionMode::TissueRandom(mode) => {
                if self.extract_masks {
                    return Err(ExtractError::invalid(
                        "extractTissueMasks",
                        "masks are not written in tissue-random mode",
                    ));
                }
                check_path_segment("className", &mode.class_name)?;
                if mode.targets.is_empty() {
                    return Err(ExtractError::invalid(
                        "outputDir",
                        "at least one target is required",
                    ));
                }
                if mode.targets.iter().map(|t| t.budget).sum::<usize>() == 0 {
                    return Err(ExtractError::invalid(
                        "numTilesToExtract",
                        "target budgets must add up to more than 0",
                    ));
                }
            }
        }

        Ok(())
    }
}

fn check_overlap_threshold(t: f64) -> Result<(), ExtractError> {
    if t > 0.0 && t <= 1.0 {
        Ok(())
    } else {
        Err(ExtractError::invalid(
            "tileAnnotationOverlapThreshold",
            format!("must be greater than 0 and at most 1, got {t}"),
        ))
    }
}

fn check_class_list(classes: &[String]) -> Result<(), ExtractError> {
    if classes.is_empty() {
        return Err(ExtractError::invalid(
            "classesToExtract",
            "must name at least one class",
        ));
    }

    let mut seen = BTreeSet::new();
    for class_name in classes {
        check_path_segment("classesToExtract", class_name)?;
        if !seen.insert(class_name.as_str()) {
            return Err(ExtractError::invalid(
                "classesToExtract",
                format!("{class_name} is listed more than once"),
            ));
        }
    }
    Ok(())
}

/// Names end up as directory and file name segments.
fn check_path_segment(field: &str, value: &str) -> Result<(), ExtractError> {
    if value.is_empty() {
        return Err(ExtractError::invalid(field, "must not be empty"));
    }
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(ExtractError::invalid(
            field,
            format!("'{value}' cannot be used as a path segment"),
        ));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
