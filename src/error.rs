use thiserror::Error;
use tracing::warn;

use crate::grid::TileAddress;

/// Errors raised by the slide-side collaborators (region decoder, mask source).
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// Requested region lies outside the level extent
    #[error(
        "Region out of bounds: {width}x{height} at ({x}, {y}) exceeds level size {level_width}x{level_height}"
    )]
    OutOfBounds {
        x: u64,
        y: u64,
        width: u32,
        height: u32,
        level_width: u32,
        level_height: u32,
    },

    /// Pyramid level does not exist
    #[error("Invalid level: {level} (slide has {max_levels} levels)")]
    InvalidLevel { level: usize, max_levels: usize },

    /// Pixel data could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Annotation mask for a class is absent at a tile where it was required
    #[error("No {class_name} mask available for tile at ({x}, {y})")]
    MissingMask { class_name: String, x: u64, y: u64 },

    /// Underlying file could not be read
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },
}

/// Errors raised by the selection and extraction engine.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    /// A required prior step (grid, quality metrics, annotations) has not been done
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Malformed thresholds, budgets or class names
    #[error("Invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Target directory cannot be created or written
    #[error("{path} is not a valid path: {message}")]
    Path { path: String, message: String },

    /// Address is missing from the metrics store
    #[error("Tile {0} not found in metrics store")]
    NotFound(TileAddress),

    /// Decoder or mask source failure
    #[error("Slide error: {0}")]
    Slide(#[from] SlideError),

    /// Tile or mask could not be encoded
    #[error("Encode error: {message}")]
    Encode { message: String },

    /// Encoded output could not be written
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Metrics store could not be (de)serialized
    #[error("Metrics store error: {message}")]
    Store { message: String },
}

impl ExtractError {
    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        ExtractError::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Warnings
// =============================================================================

/// Non-fatal conditions raised during a single call.
///
/// Shortfalls, empty pools and similar degraded outcomes are logged through
/// `tracing` and kept here so batch drivers can inspect them afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record a warning.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.0.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}
