//! Metrics store persistence and selection integration tests.
//!
//! Tests verify:
//! - A store written to disk reloads with metrics and overlaps intact
//! - Suitability filtering on a reloaded store
//! - Candidate counting without writing tiles

use tempfile::TempDir;

use wsi_tiler::extract::{ExtractionRequest, PerClassMode, UnannotatedMode};
use wsi_tiler::filter::{suitable_addresses, ForegroundThreshold, SuitabilityThresholds};
use wsi_tiler::grid::TileAddress;
use wsi_tiler::select::{sample_pool, Budget, PerClass, SamplingRng};
use wsi_tiler::store::{FieldValue, TileMetricsStore, FOREGROUND_LEVEL, OTSU_LEVEL, TISSUE_LEVEL};
use wsi_tiler::{ExtractError, TileExtractor, Warnings};

use super::test_utils::{slide, tissue_store, tumor_store, TILE_SIZE};

// =============================================================================
// Store Persistence
// =============================================================================

#[test]
fn test_store_round_trips_through_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("slide1.tiles.json");

    let mut store = tumor_store();
    store
        .set_field(TileAddress::new(3, 3), OTSU_LEVEL, true)
        .unwrap();
    store.save(&path).unwrap();

    let loaded = TileMetricsStore::load(&path).unwrap();
    assert_eq!(loaded.len(), 16);
    assert_eq!(loaded.grid(), store.grid());
    assert_eq!(
        loaded.annotation_classes().iter().collect::<Vec<_>>(),
        vec!["tumor"]
    );

    let record = loaded.get(TileAddress::new(1, 0)).unwrap();
    assert_eq!(record.x, u64::from(TILE_SIZE));
    assert_eq!(record.y, 0);
    assert_eq!(record.overlap("tumor"), 0.9);
    assert_eq!(record.metric(TISSUE_LEVEL), Some(0.9));
    assert_eq!(record.metric(FOREGROUND_LEVEL), Some(40.0));

    assert_eq!(
        loaded.get(TileAddress::new(3, 3)).unwrap().field(OTSU_LEVEL),
        Some(&FieldValue::Bool(true))
    );
}

#[test]
fn test_load_rejects_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = TileMetricsStore::load(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(ExtractError::Io { .. })));
}

#[test]
fn test_load_rejects_malformed_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, b"{\"grid\": 12}").unwrap();

    let result = TileMetricsStore::load(&path);
    assert!(matches!(result, Err(ExtractError::Store { .. })));
}

#[test]
fn test_rescaled_store_reads_at_full_resolution() {
    let mut store = tumor_store();
    store.rescale(2).unwrap();

    let record = store.get(TileAddress::new(1, 1)).unwrap();
    assert_eq!((record.x, record.y), (200, 200));
    assert_eq!((record.width, record.height), (200, 200));
    // Metrics and overlaps travel with the tile
    assert_eq!(record.metric(TISSUE_LEVEL), Some(0.9));
}

// =============================================================================
// Suitability
// =============================================================================

#[test]
fn test_suitable_addresses_after_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");

    let mut store = tissue_store();
    for col in 0..4 {
        store
            .set_field(TileAddress::new(col, 2), FOREGROUND_LEVEL, 95.0)
            .unwrap();
    }
    store.save(&path).unwrap();
    let store = TileMetricsStore::load(&path).unwrap();

    let thresholds = SuitabilityThresholds::none()
        .with_tissue_level(0.8)
        .with_foreground_level(ForegroundThreshold::Max(88.0));
    let suitable = suitable_addresses(&store, &thresholds).unwrap();

    assert_eq!(suitable.len(), 12);
    assert!(suitable.iter().all(|a| a.row != 2));
    // Grid order
    assert!(suitable.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_otsu_foreground_requires_flag() {
    let store = tissue_store();
    let thresholds =
        SuitabilityThresholds::none().with_foreground_level(ForegroundThreshold::Otsu);

    let result = suitable_addresses(&store, &thresholds);
    assert!(matches!(result, Err(ExtractError::Precondition(_))));
}

// =============================================================================
// Sampling
// =============================================================================

#[test]
fn test_sampling_never_repeats() {
    let store = tissue_store();
    let pool: Vec<_> = store.addresses().collect();
    let mut rng = SamplingRng::seeded(5);
    let mut warnings = Warnings::new();

    let sample = sample_pool(&pool, Budget::Count(10), &mut rng, "tissue", &mut warnings);
    let mut unique = sample.clone();
    unique.sort();
    unique.dedup();

    assert_eq!(sample.len(), 10);
    assert_eq!(unique.len(), 10);
    assert!(warnings.is_empty());
}

// =============================================================================
// Candidate Counts
// =============================================================================

#[test]
fn test_count_candidates_writes_nothing() {
    let slide = slide();
    let store = tumor_store();
    let extractor = TileExtractor::new(&slide, &store);

    let request = ExtractionRequest::per_class("/out", PerClassMode::default());
    assert_eq!(
        extractor.count_class_candidates(&request, "tumor").unwrap(),
        Some(2)
    );

    let mode = PerClassMode::default().with_overlap_thresholds(PerClass::uniform(0.1));
    let request = ExtractionRequest::per_class("/out", mode);
    assert_eq!(
        extractor.count_class_candidates(&request, "tumor").unwrap(),
        Some(3)
    );
    assert_eq!(
        extractor.count_class_candidates(&request, "stroma").unwrap(),
        None
    );
    assert_eq!(slide.read_count(), 0);
}

#[test]
fn test_count_candidates_only_in_per_class_mode() {
    let slide = slide();
    let store = tumor_store();
    let extractor = TileExtractor::new(&slide, &store);

    let request = ExtractionRequest::unannotated("/out", UnannotatedMode::default());
    assert!(matches!(
        extractor.count_class_candidates(&request, "tumor"),
        Err(ExtractError::InvalidConfig { .. })
    ));
}
