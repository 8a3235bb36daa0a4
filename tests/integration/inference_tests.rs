//! Inference feed integration tests.
//!
//! Tests verify:
//! - Suitable tiles are decoded lazily and in grid order
//! - Batches restart from the first tile on every pass
//! - Predictions written back survive a store round trip

use tempfile::TempDir;

use wsi_tiler::filter::SuitabilityThresholds;
use wsi_tiler::grid::TileAddress;
use wsi_tiler::inference::{record_predictions, SuitableTiles};
use wsi_tiler::store::{FieldValue, TileMetricsStore, TISSUE_LEVEL};

use super::test_utils::{slide, tissue_store, SLIDE_PIXEL, TILE_SIZE};

fn half_tissue_store() -> TileMetricsStore {
    let mut store = tissue_store();
    for col in 0..4 {
        store
            .set_field(TileAddress::new(col, 3), TISSUE_LEVEL, 0.1)
            .unwrap();
    }
    store
}

#[test]
fn test_tiles_decoded_on_demand() {
    let slide = slide();
    let store = half_tissue_store();
    let thresholds = SuitabilityThresholds::none().with_tissue_level(0.5);

    let tiles = SuitableTiles::new(&slide, &store, &thresholds).unwrap();
    assert_eq!(tiles.len(), 12);
    assert_eq!(slide.read_count(), 0);

    let tile = tiles.tile(5).unwrap().unwrap();
    assert_eq!(tile.address, TileAddress::new(1, 1));
    assert_eq!(tile.pixels.dimensions(), (TILE_SIZE, TILE_SIZE));
    assert_eq!(tile.pixels.get_pixel(0, 0).0, SLIDE_PIXEL);
    assert_eq!(slide.read_count(), 1);
}

#[test]
fn test_batches_restart_each_pass() {
    let slide = slide();
    let store = half_tissue_store();
    let thresholds = SuitabilityThresholds::none().with_tissue_level(0.5);
    let tiles = SuitableTiles::new(&slide, &store, &thresholds).unwrap();

    for _ in 0..2 {
        let batches: Vec<_> = tiles
            .batches(5)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        let sizes: Vec<_> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5, 2]);
        assert_eq!(batches[0][0].address, TileAddress::new(0, 0));
    }
    assert_eq!(slide.read_count(), 24);
}

#[test]
fn test_predictions_persist_with_store() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");
    let slide = slide();
    let mut store = half_tissue_store();

    let predictions: Vec<(TileAddress, Vec<f64>)> = {
        let thresholds = SuitabilityThresholds::none().with_tissue_level(0.5);
        let tiles = SuitableTiles::new(&slide, &store, &thresholds).unwrap();
        tiles
            .iter()
            .map(|tile| {
                let tile = tile.unwrap();
                let red = f64::from(tile.pixels.get_pixel(0, 0)[0]) / 255.0;
                (tile.address, vec![red, 1.0 - red])
            })
            .collect()
    };

    let count = record_predictions(&mut store, "classifier", predictions).unwrap();
    assert_eq!(count, 12);

    store.save(&path).unwrap();
    let loaded = TileMetricsStore::load(&path).unwrap();

    let record = loaded.get(TileAddress::new(2, 2)).unwrap();
    assert_eq!(
        record.field("classifier"),
        Some(&FieldValue::Vector(vec![0.2, 1.0 - 0.2]))
    );
    assert!(!loaded
        .get(TileAddress::new(2, 3))
        .unwrap()
        .has_field("classifier"));
}
