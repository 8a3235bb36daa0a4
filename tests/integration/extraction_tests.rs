//! End-to-end extraction tests against the filesystem.
//!
//! Tests verify:
//! - Directory layout and filenames of every extraction mode
//! - Budgets, shortfalls and seeded reproducibility
//! - Masks and mask stacks written next to tiles
//! - Channel statistics and the zero-tile outcome

use std::collections::HashSet;
use std::path::Path;

use image::{GrayImage, Luma};
use tempfile::TempDir;

use wsi_tiler::extract::{
    ExtractionRequest, ExtractionSummary, FileTileSink, MultiClassMode, OtherClasses,
    OutputTarget, PerClassMode, TissueRandomMode, UnannotatedMode,
};
use wsi_tiler::filter::{ForegroundThreshold, SuitabilityThresholds};
use wsi_tiler::select::{Budget, PerClass};
use wsi_tiler::slide::RasterMaskSource;
use wsi_tiler::{ExtractError, TileExtractor};

use super::test_utils::{
    annotated_store, file_names, is_empty_dir, is_valid_jpeg, slide, tissue_store, tumor_store,
    SLIDE_PIXEL, TILE_SIZE,
};

fn tissue_thresholds() -> SuitabilityThresholds {
    SuitabilityThresholds::none().with_tissue_level(0.5)
}

fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() <= 1e-6 * expected.abs().max(1.0),
        "expected {expected}, got {actual}"
    );
}

// =============================================================================
// Per-Class Mode
// =============================================================================

#[test]
fn test_per_class_writes_class_directory() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default())
        .with_thresholds(tissue_thresholds())
        .with_seed(1);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 2);
    assert!(report.warnings.is_empty());
    assert_eq!(slide.read_count(), 2);

    let tumor_dir = out.path().join("tiles/slide1/tumor");
    assert_eq!(
        file_names(&tumor_dir),
        vec![
            "slide1_tumor_0x_0y_100tilesize_900tissueLevel.jpg",
            "slide1_tumor_100x_0y_100tilesize_900tissueLevel.jpg",
        ]
    );

    let tile = tumor_dir.join("slide1_tumor_0x_0y_100tilesize_900tissueLevel.jpg");
    let data = std::fs::read(tile).unwrap();
    assert!(is_valid_jpeg(&data));
    let decoded = image::load_from_memory(&data).unwrap();
    assert_eq!(decoded.width(), TILE_SIZE);
    assert_eq!(decoded.height(), TILE_SIZE);

    // No masks requested
    assert!(!out.path().join("masks").exists());
}

#[test]
fn test_per_class_statistics_over_uniform_pixels() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default());
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    let stats = report.summary.statistics().unwrap();
    let pixels = 2 * TILE_SIZE as u64 * TILE_SIZE as u64;
    assert_eq!(stats.slide, "slide1");
    assert_eq!(stats.num_tiles, 2);
    assert_eq!(stats.num_pixels, pixels);
    assert!(stats.class_order_in_mask_stack.is_none());

    for (channel, &value) in SLIDE_PIXEL.iter().enumerate() {
        let v = f64::from(value) / 255.0;
        assert_close(stats.channel_sums[channel], v * pixels as f64);
        assert_close(stats.channel_squared_sums[channel], v * v * pixels as f64);
        assert_close(stats.channel_sums[channel] / stats.num_pixels as f64, v);
    }
}

#[test]
fn test_per_class_shortfall_takes_whole_pool() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default().with_budgets(PerClass::uniform(Budget::Count(5)));
    let request = ExtractionRequest::per_class(out.path(), mode);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 2);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("requested 5"));
}

#[test]
fn test_per_class_lower_threshold_admits_more_tiles() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default()
        .with_overlap_thresholds(PerClass::explicit([("tumor", 0.2)]));
    let request = ExtractionRequest::per_class(out.path(), mode);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 3);
}

#[test]
fn test_per_class_writes_masks() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    // Tumor covers the left half of tile (0, 0) and all of tile (1, 0)
    let raster = GrayImage::from_fn(4 * TILE_SIZE, 4 * TILE_SIZE, |x, y| {
        if (50..200).contains(&x) && y < TILE_SIZE {
            Luma([1])
        } else {
            Luma([0])
        }
    });
    let masks = RasterMaskSource::new().with_class("tumor", raster);

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default()).with_masks();
    TileExtractor::new(&slide, &store)
        .with_masks(&masks)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    let mask_dir = out.path().join("masks/slide1/tumor");
    assert_eq!(
        file_names(&mask_dir),
        vec![
            "slide1_tumor_0x_0y_100tilesize_mask.png",
            "slide1_tumor_100x_0y_100tilesize_mask.png",
        ]
    );

    let mask = image::open(mask_dir.join("slide1_tumor_0x_0y_100tilesize_mask.png"))
        .unwrap()
        .into_luma8();
    assert_eq!(mask.dimensions(), (TILE_SIZE, TILE_SIZE));
    assert_eq!(mask.get_pixel(10, 10)[0], 0);
    assert_eq!(mask.get_pixel(60, 10)[0], 255);
}

#[test]
fn test_per_class_other_class_directories() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default()
        .with_other_classes(OtherClasses::Named(vec!["necrosis".to_string()]));
    let request = ExtractionRequest::per_class(out.path(), mode);
    TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(file_names(&out.path().join("tiles/slide1/tumor")).len(), 2);
    assert!(is_empty_dir(&out.path().join("tiles/slide1/necrosis")));
}

#[test]
fn test_per_class_discerned_classes_become_empty_directories() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default()
        .with_classes(["tumor", "stroma"])
        .with_other_classes(OtherClasses::DiscernFromClassesToExtract);
    let request = ExtractionRequest::per_class(out.path(), mode);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 2);
    assert!(is_empty_dir(&out.path().join("tiles/slide1/stroma")));
}

#[test]
fn test_per_class_without_annotations_fails_before_io() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tissue_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default());
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);

    assert!(matches!(result, Err(ExtractError::Precondition(_))));
    assert!(!out.path().join("tiles").exists());
    assert_eq!(slide.read_count(), 0);
}

#[test]
fn test_unknown_class_fails_before_io() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default().with_classes(["stroma"]);
    let request = ExtractionRequest::per_class(out.path(), mode);
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);

    assert!(matches!(result, Err(ExtractError::InvalidConfig { .. })));
    assert!(!out.path().join("tiles").exists());
}

#[test]
fn test_repeated_class_fails_before_io() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = PerClassMode::default().with_classes(["tumor", "tumor"]);
    let request = ExtractionRequest::per_class(out.path(), mode);
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);
    assert!(matches!(result, Err(ExtractError::InvalidConfig { .. })));

    let mode = MultiClassMode::default()
        .with_classes(["tumor", "tumor"])
        .with_overlap_threshold(1.0);
    let request = ExtractionRequest::multi_class(out.path(), mode);
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);
    assert!(matches!(result, Err(ExtractError::InvalidConfig { .. })));

    assert!(!out.path().join("tiles").exists());
    assert_eq!(slide.read_count(), 0);
}

#[test]
fn test_missing_quality_metric_is_precondition_error() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default())
        .with_thresholds(SuitabilityThresholds::none().with_otsu());
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);

    assert!(matches!(result, Err(ExtractError::Precondition(_))));
}

// =============================================================================
// Zero Tiles
// =============================================================================

#[test]
fn test_nothing_suitable_writes_nothing() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default())
        .with_thresholds(SuitabilityThresholds::none().with_tissue_level(0.95));
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 0);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.contains("0 tiles extracted from slide1")));

    let stats = report.summary.statistics().unwrap();
    assert_eq!(stats.num_tiles, 0);
    assert_eq!(stats.num_pixels, 0);
    assert_eq!(stats.channel_sums, [0.0; 3]);

    assert!(file_names(out.path()).is_empty());
}

#[test]
fn test_without_stats_reports_completion() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let request =
        ExtractionRequest::per_class(out.path(), PerClassMode::default()).without_stats();
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 2);
    assert_eq!(
        report.summary,
        ExtractionSummary::Completed { class_order: None }
    );
}

// =============================================================================
// Multi-Class Mode
// =============================================================================

fn mixed_store() -> wsi_tiler::TileMetricsStore {
    annotated_store(&[
        (0, 0, "tumor", 0.3),
        (0, 0, "stroma", 0.3),
        (1, 1, "stroma", 0.9),
        (2, 2, "tumor", 0.1),
    ])
}

#[test]
fn test_multi_class_combines_overlaps() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = mixed_store();

    let mode = MultiClassMode::default()
        .with_classes(["tumor", "stroma"])
        .with_budget(Budget::All);
    let request = ExtractionRequest::multi_class(out.path(), mode).with_masks();
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 2);
    assert_eq!(
        report.summary.class_order(),
        Some(&["tumor".to_string(), "stroma".to_string()][..])
    );

    let tiles = file_names(&out.path().join("tiles/slide1"));
    assert_eq!(
        tiles,
        vec![
            "slide1_0x_0y_100tilesize.jpg",
            "slide1_100x_100y_100tilesize.jpg",
        ]
    );

    let stacks = file_names(&out.path().join("masks/slide1"));
    assert_eq!(
        stacks,
        vec![
            "slide1_0x_0y_100tilesize_mask.npy",
            "slide1_100x_100y_100tilesize_mask.npy",
        ]
    );
    let stack = std::fs::read(out.path().join("masks/slide1").join(&stacks[0])).unwrap();
    assert!(stack.starts_with(b"\x93NUMPY"));
    assert_eq!(stack.len(), 128 + 2 * (TILE_SIZE * TILE_SIZE) as usize);
}

#[test]
fn test_multi_class_higher_threshold_excludes_split_tile() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = mixed_store();

    let mode = MultiClassMode::default()
        .with_overlap_threshold(0.7)
        .with_budget(Budget::All);
    let request = ExtractionRequest::multi_class(out.path(), mode);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 1);
    assert_eq!(
        file_names(&out.path().join("tiles/slide1")),
        vec!["slide1_100x_100y_100tilesize.jpg"]
    );
    // Default class order follows the annotations
    assert_eq!(
        report.summary.class_order(),
        Some(&["stroma".to_string(), "tumor".to_string()][..])
    );
}

// =============================================================================
// Unannotated Mode
// =============================================================================

#[test]
fn test_unannotated_without_any_annotations() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tissue_store();

    let mode = UnannotatedMode::default().with_budget(Budget::Count(4));
    let request = ExtractionRequest::unannotated(out.path(), mode)
        .with_thresholds(tissue_thresholds())
        .with_seed(3)
        .with_masks();
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 4);
    let tiles = file_names(&out.path().join("tiles/slide1/unannotated"));
    assert_eq!(tiles.len(), 4);

    let masks = file_names(&out.path().join("masks/slide1/unannotated"));
    assert_eq!(masks.len(), 4);
    let mask = image::open(out.path().join("masks/slide1/unannotated").join(&masks[0]))
        .unwrap()
        .into_luma8();
    assert!(mask.pixels().all(|p| p[0] == 0));
}

#[test]
fn test_unannotated_skips_touched_tiles() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = UnannotatedMode::default().with_budget(Budget::All);
    let request = ExtractionRequest::unannotated(out.path(), mode);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    // Three of sixteen tiles carry a tumor overlap
    assert_eq!(report.tiles_written, 13);
    let names = file_names(&out.path().join("tiles/slide1/unannotated"));
    assert!(!names.iter().any(|n| n.contains("_0x_0y_")));
    assert!(!names.iter().any(|n| n.contains("_200x_0y_")));
}

// =============================================================================
// Tissue-Random Mode
// =============================================================================

#[test]
fn test_tissue_random_fans_out_across_targets() {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tumor_store();

    let mode = TissueRandomMode::new(vec![
        OutputTarget::new("train", 3),
        OutputTarget::new("val", 2),
    ]);
    let request = ExtractionRequest::tissue_random(out.path(), mode)
        .with_thresholds(
            SuitabilityThresholds::none()
                .with_tissue_level(0.5)
                .with_foreground_level(ForegroundThreshold::Max(50.0)),
        )
        .with_seed(11);
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    assert_eq!(report.tiles_written, 5);

    let train = file_names(&out.path().join("train/unannotated/slide1"));
    let val = file_names(&out.path().join("val/unannotated/slide1"));
    assert_eq!(train.len(), 3);
    assert_eq!(val.len(), 2);

    let all: HashSet<_> = train.iter().chain(&val).collect();
    assert_eq!(all.len(), 5);
    assert!(all
        .iter()
        .all(|n| n.ends_with("_900tissueLevel_40foregroundLevel.jpg")));
}

// =============================================================================
// Reproducibility
// =============================================================================

fn sampled_names(seed: u64) -> Vec<String> {
    let out = TempDir::new().unwrap();
    let slide = slide();
    let store = tissue_store();

    let mode = UnannotatedMode::default().with_budget(Budget::Count(5));
    let request = ExtractionRequest::unannotated(out.path(), mode).with_seed(seed);
    TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();

    file_names(&out.path().join("tiles/slide1/unannotated"))
}

#[test]
fn test_seed_reproduces_selection() {
    let first = sampled_names(42);
    let second = sampled_names(42);
    assert_eq!(first.len(), 5);
    assert_eq!(first, second);
}

#[test]
fn test_output_dir_may_already_exist() {
    let out = TempDir::new().unwrap();
    std::fs::create_dir_all(out.path().join("tiles/slide1/tumor")).unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(out.path(), PerClassMode::default());
    let report = TileExtractor::new(&slide, &store)
        .extract(&request, &mut FileTileSink)
        .unwrap();
    assert_eq!(report.tiles_written, 2);
}

#[test]
fn test_uncreatable_output_dir_is_path_error() {
    let out = TempDir::new().unwrap();
    let blocker = out.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let slide = slide();
    let store = tumor_store();

    let request = ExtractionRequest::per_class(Path::new(&blocker), PerClassMode::default());
    let result = TileExtractor::new(&slide, &store).extract(&request, &mut FileTileSink);
    assert!(matches!(result, Err(ExtractError::Path { .. })));
}
