//! Interval windows: double cells holding sorted `[left, right]` endpoint pairs.

use ephemgate_membrane::ShimError;
use serde::{Deserialize, Serialize};

use crate::cell::CellBlock;

/// One closed interval of a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub left: f64,
    pub right: f64,
}

impl Interval {
    #[must_use]
    pub const fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }
}

impl From<(f64, f64)> for Interval {
    fn from((left, right): (f64, f64)) -> Self {
        Self { left, right }
    }
}

/// Endpoint capacity for a window of `max_intervals` intervals.
pub fn endpoint_capacity(max_intervals: i32, ctx: &str) -> Result<usize, ShimError> {
    if max_intervals < 0 {
        return Err(ShimError::invalid(ctx, "maxIntervals must be >= 0"));
    }
    if max_intervals > i32::MAX / 2 {
        return Err(ShimError::invalid(ctx, "maxIntervals too large"));
    }
    usize::try_from(max_intervals)
        .ok()
        .and_then(|n| n.checked_mul(2))
        .ok_or_else(|| ShimError::invalid(ctx, "maxIntervals too large"))
}

/// Bring a freshly allocated window into its pre-validation state.
///
/// Only the declared size is stamped. Cardinality stays zero and the `init` flag
/// stays clear so the toolkit resynchronizes its control area on first use.
pub fn prime_capacity(window: &mut CellBlock) {
    let size = i32::try_from(window.capacity()).unwrap_or(i32::MAX);
    let header = window.header_mut();
    header.set_size(size);
    header.set_card(0);
    header.set_init(false);
}
