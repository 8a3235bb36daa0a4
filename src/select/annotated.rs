//! Annotation-driven selection.
//!
//! Per-class mode builds one independent pool per class: an address joins a
//! class pool when its overlap with that class reaches the class threshold,
//! so a tile may sit in several pools at once. Multi-class mode builds a
//! single pool from the summed overlap across the target classes.

use std::collections::BTreeMap;

use crate::error::{ExtractError, Warnings};
use crate::grid::TileAddress;
use crate::store::TileMetricsStore;

use super::sampling::{sample_pool, Budget, SamplingRng};

/// Candidates and the sampled subset for one pool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selection {
    /// Every qualifying address, in grid order
    pub candidates: Vec<TileAddress>,

    /// Addresses chosen for extraction
    pub selected: Vec<TileAddress>,
}

/// Selection for one annotation class.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassPool {
    pub class_name: String,
    pub candidates: Vec<TileAddress>,
    pub selected: Vec<TileAddress>,
}

/// Suitable addresses whose overlap with `class_name` is at least `threshold`.
pub fn class_candidates(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
    class_name: &str,
    threshold: f64,
) -> Result<Vec<TileAddress>, ExtractError> {
    let mut candidates = Vec::new();
    for &address in suitable {
        if store.get(address)?.overlap(class_name) >= threshold {
            candidates.push(address);
        }
    }
    Ok(candidates)
}

/// Build and sample one pool per class, in the order of `classes`.
///
/// `thresholds` and `budgets` must hold an entry for every class; the
/// request layer resolves them beforehand.
pub fn select_per_class(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
    classes: &[String],
    thresholds: &BTreeMap<String, f64>,
    budgets: &BTreeMap<String, Budget>,
    rng: &mut SamplingRng,
    warnings: &mut Warnings,
) -> Result<Vec<ClassPool>, ExtractError> {
    let mut pools = Vec::with_capacity(classes.len());

    for class_name in classes {
        let threshold = *thresholds.get(class_name).ok_or_else(|| {
            ExtractError::invalid(
                "tileAnnotationOverlapThreshold",
                format!("no value for {class_name}"),
            )
        })?;
        let budget = *budgets.get(class_name).ok_or_else(|| {
            ExtractError::invalid(
                "numTilesToExtractPerClass",
                format!("no value for {class_name}"),
            )
        })?;

        let candidates = class_candidates(store, suitable, class_name, threshold)?;
        let selected = sample_pool(&candidates, budget, rng, class_name, warnings);

        pools.push(ClassPool {
            class_name: class_name.clone(),
            candidates,
            selected,
        });
    }

    Ok(pools)
}

/// Suitable addresses whose overlaps summed over `classes` reach `threshold`.
///
/// Classes double-count toward qualification: two classes at 0.3 each
/// qualify a tile at threshold 0.5.
pub fn combined_candidates(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
    classes: &[String],
    threshold: f64,
) -> Result<Vec<TileAddress>, ExtractError> {
    let mut candidates = Vec::new();
    for &address in suitable {
        let record = store.get(address)?;
        let total: f64 = classes.iter().map(|c| record.overlap(c)).sum();
        if total >= threshold {
            candidates.push(address);
        }
    }
    Ok(candidates)
}

/// Build and sample the single combined pool of multi-class mode.
pub fn select_multi_class(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
    classes: &[String],
    threshold: f64,
    budget: Budget,
    rng: &mut SamplingRng,
    warnings: &mut Warnings,
) -> Result<Selection, ExtractError> {
    let candidates = combined_candidates(store, suitable, classes, threshold)?;
    let selected = sample_pool(&candidates, budget, rng, "annotated", warnings);
    Ok(Selection {
        candidates,
        selected,
    })
}
