//! Feeding suitable tiles to a model and storing what it predicts.
//!
//! [`SuitableTiles`] is a finite, restartable, lazily decoded view over the
//! suitable-address pool: nothing is read until a tile or batch is pulled,
//! and every call to [`SuitableTiles::iter`] or [`SuitableTiles::batches`]
//! starts over from the first address. Predictions go back into the metrics
//! store through [`record_predictions`].
//!
//! The view only reads the slide and the store, so a model loop may share it
//! across worker threads and fetch tiles by index.

use image::{DynamicImage, RgbImage};
use tracing::info;

use crate::error::ExtractError;
use crate::filter::{suitable_addresses, SuitabilityThresholds};
use crate::grid::TileAddress;
use crate::slide::RegionReader;
use crate::store::{FieldValue, TileMetricsStore};

/// One decoded tile, alpha stripped.
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceTile {
    pub address: TileAddress,
    pub pixels: RgbImage,
}

/// Suitable tiles of one slide, decoded on demand.
pub struct SuitableTiles<'a, R: RegionReader + ?Sized> {
    slide: &'a R,
    store: &'a TileMetricsStore,
    addresses: Vec<TileAddress>,
}

impl<'a, R: RegionReader + ?Sized> SuitableTiles<'a, R> {
    /// Filter the store and fix the address order for every later pass.
    pub fn new(
        slide: &'a R,
        store: &'a TileMetricsStore,
        thresholds: &SuitabilityThresholds,
    ) -> Result<Self, ExtractError> {
        let addresses = suitable_addresses(store, thresholds)?;
        info!("Processing {} of {} tiles", addresses.len(), store.len());

        Ok(Self {
            slide,
            store,
            addresses,
        })
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn addresses(&self) -> &[TileAddress] {
        &self.addresses
    }

    /// Decode the tile at `index` in suitable order.
    pub fn tile(&self, index: usize) -> Option<Result<InferenceTile, ExtractError>> {
        self.addresses.get(index).map(|&address| self.load(address))
    }

    /// Every suitable tile in grid order.
    pub fn iter(&self) -> impl Iterator<Item = Result<InferenceTile, ExtractError>> + '_ {
        self.addresses.iter().map(move |&address| self.load(address))
    }

    /// Consecutive batches of at most `batch_size` tiles; the last may be short.
    pub fn batches(
        &self,
        batch_size: usize,
    ) -> Result<impl Iterator<Item = Result<Vec<InferenceTile>, ExtractError>> + '_, ExtractError>
    {
        if batch_size == 0 {
            return Err(ExtractError::invalid("batchSize", "must be greater than 0"));
        }

        Ok(self
            .addresses
            .chunks(batch_size)
            .map(move |chunk| {
                chunk.iter().map(|&address| self.load(address)).collect()
            }))
    }

    fn load(&self, address: TileAddress) -> Result<InferenceTile, ExtractError> {
        let rect = self.store.get(address)?.rect();
        let pixels = self.slide.read_tile(self.store.grid().level(), &rect)?;

        Ok(InferenceTile {
            address,
            pixels: DynamicImage::ImageRgba8(pixels).into_rgb8(),
        })
    }
}

/// Store one prediction vector per address under `key`.
///
/// Returns the number of tiles tagged. Stops at the first address missing
/// from the store.
pub fn record_predictions<I>(
    store: &mut TileMetricsStore,
    key: &str,
    predictions: I,
) -> Result<usize, ExtractError>
where
    I: IntoIterator<Item = (TileAddress, Vec<f64>)>,
{
    if key.is_empty() {
        return Err(ExtractError::invalid("predictionKey", "must not be empty"));
    }

    let mut count = 0;
    for (address, prediction) in predictions {
        store.set_field(address, key, FieldValue::Vector(prediction))?;
        count += 1;
    }

    info!("Recorded {} predictions under {}", count, key);
    Ok(count)
}
