//! Selection outside any annotation.

use crate::error::{ExtractError, Warnings};
use crate::grid::TileAddress;
use crate::store::TileMetricsStore;

use super::annotated::Selection;
use super::sampling::{sample_pool, Budget, SamplingRng};

/// Suitable addresses whose overlap with every annotation class is zero.
///
/// With no annotation classes recorded, every suitable address qualifies.
pub fn unannotated_candidates(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
) -> Result<Vec<TileAddress>, ExtractError> {
    let mut candidates = Vec::new();
    for &address in suitable {
        let record = store.get(address)?;
        if record.overlaps().all(|(_, overlap)| overlap <= 0.0) {
            candidates.push(address);
        }
    }
    Ok(candidates)
}

/// Sample the unannotated pool.
pub fn select_unannotated(
    store: &TileMetricsStore,
    suitable: &[TileAddress],
    budget: Budget,
    label: &str,
    rng: &mut SamplingRng,
    warnings: &mut Warnings,
) -> Result<Selection, ExtractError> {
    let candidates = unannotated_candidates(store, suitable)?;
    let selected = sample_pool(&candidates, budget, rng, label, warnings);
    Ok(Selection {
        candidates,
        selected,
    })
}

/// Draw `sum(budgets)` addresses once and deal them out to each target in turn.
///
/// Targets never share an address. When the pool falls short the earlier
/// targets are filled first and later ones get what remains.
pub fn split_across_targets(
    pool: &[TileAddress],
    budgets: &[usize],
    rng: &mut SamplingRng,
    warnings: &mut Warnings,
) -> Vec<Vec<TileAddress>> {
    let total: usize = budgets.iter().sum();
    let sampled = if total == 0 {
        Vec::new()
    } else {
        sample_pool(pool, Budget::Count(total), rng, "tissue", warnings)
    };

    let mut rest = sampled.as_slice();
    budgets
        .iter()
        .map(|&budget| {
            let take = budget.min(rest.len());
            let (head, tail) = rest.split_at(take);
            rest = tail;
            head.to_vec()
        })
        .collect()
}
