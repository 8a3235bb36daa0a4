//! Candidate pools and sampling.
//!
//! Selection starts from the suitable addresses produced by
//! [`crate::filter`] and narrows them per mode:
//!
//! ```text
//!              suitable addresses
//!                      │
//!      ┌───────────────┼────────────────┐
//!      ▼               ▼                ▼
//!  per class       combined         unannotated
//!  overlap ≥ t     Σ overlap ≥ t    all overlaps = 0
//!      │               │                │
//!      ▼               ▼                ▼
//!  sample_pool     sample_pool      sample_pool / split_across_targets
//! ```
//!
//! Sampling never repeats an address within a pool. Pools of different
//! classes are independent, so the same tile may be extracted once per class.

mod annotated;
mod sampling;
mod unannotated;

pub use annotated::{
    class_candidates, combined_candidates, select_multi_class, select_per_class, ClassPool,
    Selection,
};
pub use sampling::{sample_pool, Budget, PerClass, SamplingRng, LARGE_POOL_WARNING};
pub use unannotated::{select_unannotated, split_across_targets, unannotated_candidates};
