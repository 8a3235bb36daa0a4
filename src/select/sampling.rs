//! Bounded, reproducible sampling from candidate pools.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::error::{ExtractError, Warnings};
use crate::grid::TileAddress;

/// Pools larger than this under an `All` budget trigger an over-extraction warning.
pub const LARGE_POOL_WARNING: usize = 500;

// =============================================================================
// Budget
// =============================================================================

/// How many tiles to take from a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Budget {
    /// Take the whole pool
    #[default]
    All,
    /// Take at most this many, chosen at random
    Count(usize),
}

impl Budget {
    /// Reject a zero count.
    pub fn validate(&self, field: &str) -> Result<(), ExtractError> {
        match self {
            Budget::Count(0) => Err(ExtractError::invalid(
                field,
                "must be a positive integer or 'all'",
            )),
            _ => Ok(()),
        }
    }
}

impl FromStr for Budget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Ok(Budget::All);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(Budget::Count(n)),
            _ => Err(format!("expected a positive integer or 'all', got '{s}'")),
        }
    }
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Budget::All => write!(f, "all"),
            Budget::Count(n) => write!(f, "{n}"),
        }
    }
}

// =============================================================================
// Per-Class Values
// =============================================================================

/// A setting given once for every class, or explicitly per class.
#[derive(Debug, Clone, PartialEq)]
pub enum PerClass<T> {
    Uniform(T),
    Explicit(BTreeMap<String, T>),
}

impl<T: Copy> PerClass<T> {
    pub fn uniform(value: T) -> Self {
        PerClass::Uniform(value)
    }

    pub fn explicit<K: Into<String>>(entries: impl IntoIterator<Item = (K, T)>) -> Self {
        PerClass::Explicit(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Every value, for range checks.
    pub fn values(&self) -> Vec<T> {
        match self {
            PerClass::Uniform(v) => vec![*v],
            PerClass::Explicit(map) => map.values().copied().collect(),
        }
    }

    /// Expand to one value per class.
    ///
    /// An explicit mapping must name exactly the given classes: a key that
    /// is not a class, or a class without a key, is `InvalidConfig`.
    pub fn resolve(
        &self,
        classes: &[String],
        field: &str,
    ) -> Result<BTreeMap<String, T>, ExtractError> {
        match self {
            PerClass::Uniform(v) => Ok(classes.iter().map(|c| (c.clone(), *v)).collect()),
            PerClass::Explicit(map) => {
                if let Some(key) = map.keys().find(|k| !classes.contains(k)) {
                    return Err(ExtractError::invalid(
                        field,
                        format!("class {key} is not among the classes to extract"),
                    ));
                }
                if let Some(class) = classes.iter().find(|c| !map.contains_key(*c)) {
                    return Err(ExtractError::invalid(
                        field,
                        format!("no value given for class {class}"),
                    ));
                }
                Ok(map.clone())
            }
        }
    }
}

// =============================================================================
// Random Source
// =============================================================================

/// Call-scoped random source.
///
/// Each extraction call builds its own; with a seed, the same pool and
/// budget always yield the same sample.
#[derive(Debug, Clone)]
pub struct SamplingRng(StdRng);

impl SamplingRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    fn indices(&mut self, length: usize, amount: usize) -> Vec<usize> {
        index::sample(&mut self.0, length, amount).into_vec()
    }
}

// =============================================================================
// Sampling
// =============================================================================

/// Draw up to `budget` addresses from `pool` without replacement.
///
/// - `All` returns the whole pool, warning past [`LARGE_POOL_WARNING`].
/// - A count larger than the pool returns the whole pool with a shortfall warning.
/// - Otherwise exactly `count` distinct addresses are drawn.
///
/// An empty pool is a warning, never an error.
pub fn sample_pool(
    pool: &[TileAddress],
    budget: Budget,
    rng: &mut SamplingRng,
    label: &str,
    warnings: &mut Warnings,
) -> Vec<TileAddress> {
    if pool.is_empty() {
        warnings.push(format!("0 suitable {label} tiles found"));
        return Vec::new();
    }

    match budget {
        Budget::All => {
            if pool.len() > LARGE_POOL_WARNING {
                warnings.push(format!("{} suitable {label} tiles found", pool.len()));
            }
            pool.to_vec()
        }
        Budget::Count(count) if count > pool.len() => {
            warnings.push(format!(
                "{} suitable {label} tiles found but requested {count} tiles to extract; extracting all suitable tiles",
                pool.len()
            ));
            pool.to_vec()
        }
        Budget::Count(count) => rng
            .indices(pool.len(), count)
            .into_iter()
            .map(|i| pool[i])
            .collect(),
    }
}

// =============================================================================
// Tests
// =============================================================================
