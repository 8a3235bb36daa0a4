//! Streaming channel statistics and the extraction report.

use image::RgbImage;
use serde::Serialize;

/// Per-channel sums over every extracted pixel, normalized to [0, 1].
///
/// Folded one tile at a time; memory use does not grow with the number of
/// tiles.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStatistics {
    channel_sums: [f64; 3],
    channel_squared_sums: [f64; 3],
    tile_count: usize,
    pixel_count: u64,
}

impl RunningStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one tile's pixels.
    pub fn accumulate(&mut self, tile: &RgbImage) {
        for pixel in tile.pixels() {
            for (channel, &value) in pixel.0.iter().enumerate() {
                let v = f64::from(value) / 255.0;
                self.channel_sums[channel] += v;
                self.channel_squared_sums[channel] += v * v;
            }
        }
        self.tile_count += 1;
        self.pixel_count += u64::from(tile.width()) * u64::from(tile.height());
    }

    pub fn channel_sums(&self) -> [f64; 3] {
        self.channel_sums
    }

    pub fn channel_squared_sums(&self) -> [f64; 3] {
        self.channel_squared_sums
    }

    pub fn tile_count(&self) -> usize {
        self.tile_count
    }

    pub fn pixel_count(&self) -> u64 {
        self.pixel_count
    }

    /// Mean of each channel over all pixels, or `None` before any pixel.
    pub fn channel_means(&self) -> Option<[f64; 3]> {
        if self.pixel_count == 0 {
            return None;
        }
        let n = self.pixel_count as f64;
        Some(self.channel_sums.map(|s| s / n))
    }

    /// Population standard deviation of each channel.
    pub fn channel_stds(&self) -> Option<[f64; 3]> {
        let means = self.channel_means()?;
        let n = self.pixel_count as f64;
        let mut stds = [0.0; 3];
        for c in 0..3 {
            let variance = self.channel_squared_sums[c] / n - means[c] * means[c];
            stds[c] = variance.max(0.0).sqrt();
        }
        Some(stds)
    }
}

// =============================================================================
// Report
// =============================================================================

/// Aggregate returned when statistics were requested.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileStatistics {
    pub slide: String,
    pub channel_sums: [f64; 3],
    pub channel_squared_sums: [f64; 3],
    pub num_tiles: usize,
    pub num_pixels: u64,

    /// Class order of mask stacks, in multi-class mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_order_in_mask_stack: Option<Vec<String>>,
}

impl TileStatistics {
    pub fn from_running(
        slide: impl Into<String>,
        stats: &RunningStatistics,
        class_order: Option<Vec<String>>,
    ) -> Self {
        Self {
            slide: slide.into(),
            channel_sums: stats.channel_sums(),
            channel_squared_sums: stats.channel_squared_sums(),
            num_tiles: stats.tile_count(),
            num_pixels: stats.pixel_count(),
            class_order_in_mask_stack: class_order,
        }
    }
}

/// Terminal result of an extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ExtractionSummary {
    Statistics(TileStatistics),
    /// Statistics were not requested
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        class_order: Option<Vec<String>>,
    },
}

impl ExtractionSummary {
    pub fn statistics(&self) -> Option<&TileStatistics> {
        match self {
            ExtractionSummary::Statistics(stats) => Some(stats),
            ExtractionSummary::Completed { .. } => None,
        }
    }

    pub fn class_order(&self) -> Option<&[String]> {
        match self {
            ExtractionSummary::Statistics(stats) => stats.class_order_in_mask_stack.as_deref(),
            ExtractionSummary::Completed { class_order } => class_order.as_deref(),
        }
    }
}

/// Summary plus the warnings raised on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionReport {
    pub summary: ExtractionSummary,
    pub tiles_written: usize,
    pub warnings: Vec<String>,
}
