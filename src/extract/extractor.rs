//! The extraction pipeline.
//!
//! Every call runs in two phases. Planning validates the request, filters
//! the store, resolves classes and samples every pool; all configuration
//! and precondition errors surface here, before anything is written.
//! Writing then provisions the directories of non-empty pools and streams
//! each selected tile through decode, encode, write and the statistics fold.

use std::path::Path;

use image::{DynamicImage, GrayImage, RgbImage};
use tracing::{debug, info, warn};

use crate::error::{ExtractError, SlideError, Warnings};
use crate::filter::suitable_addresses;
use crate::grid::TileAddress;
use crate::select::{
    class_candidates, select_multi_class, select_per_class, select_unannotated,
    split_across_targets, SamplingRng,
};
use crate::slide::{blank_mask, MaskSource, NoAnnotations, RegionReader};
use crate::store::TileMetricsStore;

use super::encoder::TileEncoder;
use super::naming::{OutputLayout, TileNamer};
use super::request::{ExtractionMode, ExtractionRequest, OtherClasses};
use super::sink::TileSink;
use super::stats::{ExtractionReport, ExtractionSummary, RunningStatistics, TileStatistics};

// =============================================================================
// Plan
// =============================================================================

enum MaskPlan {
    /// The class's own mask; a missing one is an error unless accepted
    Class {
        class_name: String,
        accept_missing: bool,
    },
    /// All-zero mask
    Blank,
    /// One mask per class, stacked in this order
    Stack(Vec<String>),
}

struct PoolPlan {
    label: String,
    layout: OutputLayout,
    namer: TileNamer,
    candidates: usize,
    addresses: Vec<TileAddress>,
    masks: MaskPlan,
}

struct Plan {
    pools: Vec<PoolPlan>,
    /// Empty directories provisioned alongside non-empty pools
    extra_dirs: Vec<OutputLayout>,
    class_order: Option<Vec<String>>,
}

// =============================================================================
// Extractor
// =============================================================================

/// Selects and writes tiles of one slide.
///
/// # Example
///
/// ```ignore
/// use wsi_tiler::extract::{ExtractionRequest, FileTileSink, PerClassMode, TileExtractor};
///
/// let request = ExtractionRequest::per_class("/data/out", PerClassMode::default()).with_seed(7);
/// let report = TileExtractor::new(&slide, &store)
///     .with_masks(&masks)
///     .extract(&request, &mut FileTileSink)?;
/// ```
pub struct TileExtractor<'a, R: RegionReader + ?Sized> {
    slide: &'a R,
    store: &'a TileMetricsStore,
    masks: &'a dyn MaskSource,
    encoder: TileEncoder,
}

impl<'a, R: RegionReader + ?Sized> TileExtractor<'a, R> {
    /// Extractor without an annotation mask source.
    pub fn new(slide: &'a R, store: &'a TileMetricsStore) -> Self {
        Self {
            slide,
            store,
            masks: &NoAnnotations,
            encoder: TileEncoder::default(),
        }
    }

    pub fn with_masks(mut self, masks: &'a dyn MaskSource) -> Self {
        self.masks = masks;
        self
    }

    pub fn with_encoder(mut self, encoder: TileEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Run one extraction call.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` / `Precondition` before any I/O
    /// - `Path` when a target directory cannot be created
    /// - `Slide`, `Encode` or `Io` when a tile fails mid-run; tiles already
    ///   written stay on disk
    pub fn extract(
        &self,
        request: &ExtractionRequest,
        sink: &mut dyn TileSink,
    ) -> Result<ExtractionReport, ExtractError> {
        let slide_name = self.slide_name(request);
        let mut warnings = Warnings::new();

        let plan = self.plan(request, &slide_name, &mut warnings)?;

        let any_tiles = plan.pools.iter().any(|p| !p.addresses.is_empty());
        if any_tiles {
            let non_empty = plan.pools.iter().filter(|p| !p.addresses.is_empty());
            for layout in non_empty.map(|p| &p.layout).chain(&plan.extra_dirs) {
                for dir in layout.dirs() {
                    sink.create_dir(dir)?;
                }
            }
        }

        let level = self.store.grid().level();
        let mut stats = RunningStatistics::new();
        let mut written = 0;

        for pool in &plan.pools {
            if pool.addresses.is_empty() {
                continue;
            }
            info!(
                "Extracting {} of {} {} tiles",
                pool.addresses.len(),
                pool.candidates,
                pool.label
            );

            for &address in &pool.addresses {
                let pixels = self.write_tile(pool, address, level, sink)?;
                if request.return_stats {
                    stats.accumulate(&pixels);
                }
                written += 1;
            }
        }

        if written == 0 {
            warnings.push(format!("0 tiles extracted from {slide_name}"));
        } else {
            info!("Extracted {} tiles from {}", written, slide_name);
        }

        let summary = if request.return_stats {
            ExtractionSummary::Statistics(TileStatistics::from_running(
                slide_name,
                &stats,
                plan.class_order,
            ))
        } else {
            ExtractionSummary::Completed {
                class_order: plan.class_order,
            }
        };

        Ok(ExtractionReport {
            summary,
            tiles_written: written,
            warnings: warnings.into_vec(),
        })
    }

    /// Size of one class's candidate pool, without writing anything.
    ///
    /// Only meaningful for per-class requests. A class that is not among the
    /// resolved extraction classes yields `None` and a warning.
    pub fn count_class_candidates(
        &self,
        request: &ExtractionRequest,
        class_name: &str,
    ) -> Result<Option<usize>, ExtractError> {
        request.validate()?;
        let ExtractionMode::PerClass(mode) = &request.mode else {
            return Err(ExtractError::invalid(
                "returnOnlyNumTilesFromThisClass",
                format!("not available in {} mode", request.mode.name()),
            ));
        };
        self.require_annotations()?;

        let suitable = suitable_addresses(self.store, &request.thresholds)?;
        let (classes, _) = mode.resolve_classes(self.store.annotation_classes())?;
        let thresholds = mode
            .overlap_thresholds
            .resolve(&classes, "tileAnnotationOverlapThreshold")?;

        let Some(&threshold) = thresholds.get(class_name) else {
            warn!(
                "{} is not among the classes to extract; no count available",
                class_name
            );
            return Ok(None);
        };

        let candidates = class_candidates(self.store, &suitable, class_name, threshold)?;
        Ok(Some(candidates.len()))
    }

    fn slide_name(&self, request: &ExtractionRequest) -> String {
        request
            .slide_name
            .clone()
            .unwrap_or_else(|| self.slide.slide_id().to_string())
    }

    fn require_annotations(&self) -> Result<(), ExtractError> {
        if self.store.has_annotations() {
            Ok(())
        } else {
            Err(ExtractError::Precondition(
                "annotations must be added before extracting annotated tiles".to_string(),
            ))
        }
    }

    // =========================================================================
    // Planning
    // =========================================================================

    fn plan(
        &self,
        request: &ExtractionRequest,
        slide_name: &str,
        warnings: &mut Warnings,
    ) -> Result<Plan, ExtractError> {
        request.validate()?;
        if matches!(
            request.mode,
            ExtractionMode::PerClass(_) | ExtractionMode::MultiClass(_)
        ) {
            self.require_annotations()?;
        }

        let suitable = suitable_addresses(self.store, &request.thresholds)?;
        debug!(
            "{} of {} tiles suitable for {} extraction",
            suitable.len(),
            self.store.len(),
            request.mode.name()
        );

        let mut rng = SamplingRng::new(request.seed);
        let out = request.output_dir.as_path();
        let masks = request.extract_masks;
        let namer = TileNamer::new(slide_name, request.thresholds);

        match &request.mode {
            ExtractionMode::PerClass(mode) => {
                let (classes, discerned) = mode.resolve_classes(self.store.annotation_classes())?;
                info!(
                    "Found {} class(es) to extract in annotations: {:?}",
                    classes.len(),
                    classes
                );
                let thresholds = mode
                    .overlap_thresholds
                    .resolve(&classes, "tileAnnotationOverlapThreshold")?;
                let budgets = mode.budgets.resolve(&classes, "numTilesToExtractPerClass")?;

                let pools = select_per_class(
                    self.store,
                    &suitable,
                    &classes,
                    &thresholds,
                    &budgets,
                    &mut rng,
                    warnings,
                )?
                .into_iter()
                .map(|pool| PoolPlan {
                    layout: OutputLayout::per_class(out, slide_name, &pool.class_name, masks),
                    namer: namer.for_class(&pool.class_name),
                    candidates: pool.candidates.len(),
                    addresses: pool.selected,
                    masks: MaskPlan::Class {
                        class_name: pool.class_name.clone(),
                        accept_missing: mode.accept_tiles_without_class,
                    },
                    label: pool.class_name,
                })
                .collect();

                let extra = match &mode.other_classes {
                    OtherClasses::None => Vec::new(),
                    OtherClasses::Named(names) => names.clone(),
                    OtherClasses::DiscernFromClassesToExtract => discerned,
                };

                Ok(Plan {
                    pools,
                    extra_dirs: other_class_dirs(out, slide_name, &extra, masks),
                    class_order: None,
                })
            }

            ExtractionMode::MultiClass(mode) => {
                let classes = mode.resolve_classes(self.store.annotation_classes())?;
                let selection = select_multi_class(
                    self.store,
                    &suitable,
                    &classes,
                    mode.overlap_threshold,
                    mode.budget,
                    &mut rng,
                    warnings,
                )?;

                Ok(Plan {
                    pools: vec![PoolPlan {
                        label: "annotated".to_string(),
                        layout: OutputLayout::flat(out, slide_name, masks),
                        namer,
                        candidates: selection.candidates.len(),
                        addresses: selection.selected,
                        masks: MaskPlan::Stack(classes.clone()),
                    }],
                    extra_dirs: Vec::new(),
                    class_order: Some(classes),
                })
            }

            ExtractionMode::Unannotated(mode) => {
                let selection = select_unannotated(
                    self.store,
                    &suitable,
                    mode.budget,
                    &mode.class_name,
                    &mut rng,
                    warnings,
                )?;

                Ok(Plan {
                    pools: vec![PoolPlan {
                        label: mode.class_name.clone(),
                        layout: OutputLayout::per_class(out, slide_name, &mode.class_name, masks),
                        namer: namer.for_class(&mode.class_name),
                        candidates: selection.candidates.len(),
                        addresses: selection.selected,
                        masks: MaskPlan::Blank,
                    }],
                    extra_dirs: other_class_dirs(out, slide_name, &mode.other_classes, masks),
                    class_order: None,
                })
            }

            ExtractionMode::TissueRandom(mode) => {
                let budgets: Vec<usize> = mode.targets.iter().map(|t| t.budget).collect();
                let parts = split_across_targets(&suitable, &budgets, &mut rng, warnings);

                let pools = mode
                    .targets
                    .iter()
                    .zip(parts)
                    .map(|(target, addresses)| PoolPlan {
                        label: format!("{} tissue ({})", mode.class_name, target.dir.display()),
                        layout: OutputLayout::target(
                            &out.join(&target.dir),
                            &mode.class_name,
                            slide_name,
                        ),
                        namer: namer.for_class(&mode.class_name),
                        candidates: suitable.len(),
                        addresses,
                        masks: MaskPlan::Blank,
                    })
                    .collect();

                Ok(Plan {
                    pools,
                    extra_dirs: Vec::new(),
                    class_order: None,
                })
            }
        }
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Write one tile (and its mask) and hand back the RGB pixels.
    fn write_tile(
        &self,
        pool: &PoolPlan,
        address: TileAddress,
        level: usize,
        sink: &mut dyn TileSink,
    ) -> Result<RgbImage, ExtractError> {
        let record = self.store.get(address)?;
        let rect = record.rect();

        let pixels = DynamicImage::ImageRgba8(self.slide.read_tile(level, &rect)?).into_rgb8();
        let tile = self.encoder.encode_tile(&pixels)?;
        sink.write_file(&pool.layout.tiles.join(pool.namer.tile_file(record)), &tile)?;

        let Some(mask_dir) = &pool.layout.masks else {
            return Ok(pixels);
        };

        match &pool.masks {
            MaskPlan::Class {
                class_name,
                accept_missing,
            } => {
                let mask = match self.masks.class_mask(&rect, class_name)? {
                    Some(mask) => mask,
                    None if *accept_missing => blank_mask(&rect),
                    None => {
                        return Err(SlideError::MissingMask {
                            class_name: class_name.clone(),
                            x: rect.x,
                            y: rect.y,
                        }
                        .into())
                    }
                };
                let data = self.encoder.encode_mask(&mask)?;
                sink.write_file(&mask_dir.join(pool.namer.mask_file(record)), &data)?;
            }
            MaskPlan::Blank => {
                let data = self.encoder.encode_mask(&blank_mask(&rect))?;
                sink.write_file(&mask_dir.join(pool.namer.mask_file(record)), &data)?;
            }
            MaskPlan::Stack(classes) => {
                let stack = classes
                    .iter()
                    .map(|class_name| {
                        Ok(self
                            .masks
                            .class_mask(&rect, class_name)?
                            .unwrap_or_else(|| blank_mask(&rect)))
                    })
                    .collect::<Result<Vec<GrayImage>, SlideError>>()?;
                let data = self.encoder.encode_mask_stack(&stack)?;
                sink.write_file(&mask_dir.join(pool.namer.mask_stack_file(record)), &data)?;
            }
        }

        Ok(pixels)
    }
}

fn other_class_dirs(
    out: &Path,
    slide_name: &str,
    names: &[String],
    masks: bool,
) -> Vec<OutputLayout> {
    names
        .iter()
        .map(|name| OutputLayout::per_class(out, slide_name, name, masks))
        .collect()
}

// =============================================================================
// Tests
// =============================================================================
