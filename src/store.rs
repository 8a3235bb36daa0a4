//! Tile metrics store.
//!
//! Holds one [`TileRecord`] per grid address: the tile geometry, the quality
//! metrics computed for it (`tissueLevel`, `foregroundLevel`, ...), the
//! per-class annotation overlap fractions, and anything attached later such
//! as model predictions.
//!
//! Annotation classes are tracked explicitly. Every call to
//! [`TileMetricsStore::set_overlap`] registers its class, so consumers ask
//! [`TileMetricsStore::annotation_classes`] instead of scanning field names.
//!
//! # Persistence
//!
//! The store serializes to JSON in grid order:
//!
//! ```text
//! {
//!   "grid": { "level": 0, "level_width": 400, ... },
//!   "annotation_classes": ["tumor"],
//!   "tiles": [
//!     { "address": { "col": 0, "row": 0 },
//!       "record": { "x": 0, "y": 0, "width": 100, "height": 100,
//!                   "overlaps": { "tumor": 0.6 }, "tissueLevel": 0.98 } },
//!     ...
//!   ]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ExtractError;
use crate::grid::{TileAddress, TileGrid, TileRect};

/// Probability in [0, 1] that a tile contains tissue.
pub const TISSUE_LEVEL: &str = "tissueLevel";

/// Mean brightness in [0, 100]; 0 is black, 100 is white.
pub const FOREGROUND_LEVEL: &str = "foregroundLevel";

/// Pass flag from Otsu's histogram threshold.
pub const OTSU_LEVEL: &str = "otsuLevel";

/// Pass flag from the triangle histogram threshold.
pub const TRIANGLE_LEVEL: &str = "triangleLevel";

/// Pass flag from an externally supplied tissue mask.
pub const MASK_LEVEL: &str = "maskLevel";

const GEOMETRY_FIELDS: [&str; 5] = ["x", "y", "width", "height", "overlaps"];

// =============================================================================
// Field Value
// =============================================================================

/// A single tile property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector(Vec<f64>),
    Text(String),
}

impl FieldValue {
    /// Numeric view of the value; booleans map to 0/1.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            FieldValue::Vector(_) | FieldValue::Text(_) => None,
        }
    }

    /// Whether a pass/fail flag is set.
    ///
    /// Numbers pass when non-zero, collections when non-empty.
    pub fn passes(&self) -> bool {
        match self {
            FieldValue::Bool(b) => *b,
            FieldValue::Int(i) => *i != 0,
            FieldValue::Float(f) => *f != 0.0 && !f.is_nan(),
            FieldValue::Vector(v) => !v.is_empty(),
            FieldValue::Text(s) => !s.is_empty(),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(value: Vec<f64>) -> Self {
        FieldValue::Vector(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

// =============================================================================
// Tile Record
// =============================================================================

/// Properties of a single tile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileRecord {
    /// Left edge at full resolution
    pub x: u64,

    /// Top edge at full resolution
    pub y: u64,

    /// Tile width in pixels
    pub width: u32,

    /// Tile height in pixels
    pub height: u32,

    /// Fraction of the tile covered by each annotation class
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    overlaps: BTreeMap<String, f64>,

    /// Quality metrics and other scalar properties
    #[serde(default, flatten)]
    fields: BTreeMap<String, FieldValue>,
}

impl TileRecord {
    pub fn new(rect: TileRect) -> Self {
        Self {
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            overlaps: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn rect(&self) -> TileRect {
        TileRect::new(self.x, self.y, self.width, self.height)
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Numeric value of a field, if present and numeric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(FieldValue::as_f64)
    }

    /// Overlap fraction for a class; tiles the class never touches report 0.
    pub fn overlap(&self, class_name: &str) -> f64 {
        self.overlaps.get(class_name).copied().unwrap_or(0.0)
    }

    /// All recorded `(class, fraction)` pairs in class-name order.
    pub fn overlaps(&self) -> impl Iterator<Item = (&str, f64)> {
        self.overlaps.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// Tile Metrics Store
// =============================================================================

/// Mapping from tile address to tile record for one slide.
///
/// The address space is fixed by the grid the store was built from; fields
/// can be added and overwritten but tiles are never removed.
#[derive(Debug, Clone, PartialEq)]
pub struct TileMetricsStore {
    grid: TileGrid,
    tiles: BTreeMap<TileAddress, TileRecord>,
    annotation_classes: BTreeSet<String>,
}

impl TileMetricsStore {
    /// Create a store with one geometry-only record per grid tile.
    pub fn from_grid(grid: TileGrid) -> Self {
        let tiles = grid
            .addresses()
            .filter_map(|address| {
                grid.rect(address)
                    .map(|rect| (address, TileRecord::new(rect)))
            })
            .collect();

        Self {
            grid,
            tiles,
            annotation_classes: BTreeSet::new(),
        }
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Look up a tile record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the address is not in the store.
    pub fn get(&self, address: TileAddress) -> Result<&TileRecord, ExtractError> {
        self.tiles.get(&address).ok_or(ExtractError::NotFound(address))
    }

    /// Insert or overwrite a single field, leaving the others untouched.
    ///
    /// Geometry is owned by the grid and cannot be set this way; use
    /// [`rescale`](Self::rescale). Overlaps go through
    /// [`set_overlap`](Self::set_overlap).
    pub fn set_field(
        &mut self,
        address: TileAddress,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
    ) -> Result<(), ExtractError> {
        let name = name.into();
        if GEOMETRY_FIELDS.contains(&name.as_str()) {
            return Err(ExtractError::invalid(
                name,
                "reserved field cannot be set directly",
            ));
        }

        let record = self
            .tiles
            .get_mut(&address)
            .ok_or(ExtractError::NotFound(address))?;
        record.fields.insert(name, value.into());
        Ok(())
    }

    /// Record the fraction of a tile covered by a class's annotations.
    pub fn set_overlap(
        &mut self,
        address: TileAddress,
        class_name: &str,
        fraction: f64,
    ) -> Result<(), ExtractError> {
        if class_name.is_empty() {
            return Err(ExtractError::invalid("className", "must not be empty"));
        }
        if !(0.0..=1.0).contains(&fraction) {
            return Err(ExtractError::invalid(
                format!("{class_name} overlap"),
                format!("must be within [0, 1], got {fraction}"),
            ));
        }

        let record = self
            .tiles
            .get_mut(&address)
            .ok_or(ExtractError::NotFound(address))?;
        record.overlaps.insert(class_name.to_string(), fraction);
        self.annotation_classes.insert(class_name.to_string());
        Ok(())
    }

    /// Whether the store carries a field.
    ///
    /// Quality fields are populated uniformly, so the first record in grid
    /// order speaks for all of them.
    pub fn has_field(&self, name: &str) -> bool {
        self.tiles
            .values()
            .next()
            .is_some_and(|record| record.has_field(name))
    }

    /// Classes with overlap fractions recorded anywhere on the slide.
    pub fn annotation_classes(&self) -> &BTreeSet<String> {
        &self.annotation_classes
    }

    pub fn has_annotations(&self) -> bool {
        !self.annotation_classes.is_empty()
    }

    /// Addresses in grid order.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        self.tiles.keys().copied()
    }

    /// `(address, record)` pairs in grid order.
    pub fn iter(&self) -> impl Iterator<Item = (TileAddress, &TileRecord)> {
        self.tiles.iter().map(|(a, r)| (*a, r))
    }

    /// Multiply every record's geometry by `factor`.
    ///
    /// Aligns coordinates computed at a low-resolution level with a
    /// higher-resolution one. The address space is unchanged.
    pub fn rescale(&mut self, factor: u32) -> Result<(), ExtractError> {
        if factor == 0 {
            return Err(ExtractError::invalid(
                "upsampleFactor",
                "must be greater than 0",
            ));
        }

        for record in self.tiles.values_mut() {
            let rect = record.rect().scaled(factor);
            record.x = rect.x;
            record.y = rect.y;
            record.width = rect.width;
            record.height = rect.height;
        }
        Ok(())
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), ExtractError> {
        let file = StoreFile {
            grid: self.grid,
            annotation_classes: self.annotation_classes.iter().cloned().collect(),
            tiles: self
                .tiles
                .iter()
                .map(|(address, record)| StoreEntry {
                    address: *address,
                    record: record.clone(),
                })
                .collect(),
        };

        serde_json::to_writer(writer, &file).map_err(|e| ExtractError::Store {
            message: e.to_string(),
        })
    }

    /// Load a store, rejecting addresses that fall outside its grid.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ExtractError> {
        let file: StoreFile = serde_json::from_reader(reader).map_err(|e| ExtractError::Store {
            message: e.to_string(),
        })?;

        let mut annotation_classes: BTreeSet<String> =
            file.annotation_classes.into_iter().collect();
        let mut tiles = BTreeMap::new();

        for entry in file.tiles {
            if !file.grid.contains(entry.address) {
                return Err(ExtractError::Store {
                    message: format!(
                        "tile {} lies outside the {}x{} grid",
                        entry.address,
                        file.grid.columns(),
                        file.grid.rows()
                    ),
                });
            }
            annotation_classes.extend(entry.record.overlaps.keys().cloned());
            tiles.insert(entry.address, entry.record);
        }

        Ok(Self {
            grid: file.grid,
            tiles,
            annotation_classes,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ExtractError> {
        let file = File::create(path).map_err(|e| ExtractError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut writer = BufWriter::new(file);
        self.to_writer(&mut writer)?;
        writer.flush().map_err(|e| ExtractError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ExtractError> {
        let file = File::open(path).map_err(|e| ExtractError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_reader(BufReader::new(file))
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    grid: TileGrid,
    #[serde(default)]
    annotation_classes: Vec<String>,
    tiles: Vec<StoreEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoreEntry {
    address: TileAddress,
    record: TileRecord,
}

// =============================================================================
// Tests
// =============================================================================
