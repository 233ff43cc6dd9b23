//! Sorted table of live control-block addresses.
//!
//! Every container handed to a caller has its control-block address recorded here
//! exactly once, and removed exactly once when it is freed. Membership is a binary
//! search over an ascending, duplicate-free `Vec<usize>`.
//!
//! Not thread-safe: the owner must serialize access (the ABI layer holds one global
//! lock for the duration of every call).

use tracing::{debug, warn};

use crate::error::ShimError;

/// Smallest backing capacity kept after a shrink, and the first growth step.
pub const SHRINK_FLOOR: usize = 16;

#[derive(Debug, Default)]
pub struct HandleRegistry {
    items: Vec<usize>,
}

impl HandleRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current backing capacity in slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    /// Registered addresses in ascending order.
    #[must_use]
    pub fn as_slice(&self) -> &[usize] {
        &self.items
    }

    /// Insert `addr` at its sorted position. Re-adding a present address is a no-op.
    ///
    /// Fails only when growing the backing storage fails; the registry is unchanged
    /// in that case and the caller must not hand out a handle for `addr`.
    pub fn add(&mut self, addr: usize, ctx: &str) -> Result<(), ShimError> {
        if addr == 0 {
            return Err(ShimError::invalid(ctx, "registry address must be non-zero"));
        }
        let idx = match self.items.binary_search(&addr) {
            Ok(_) => return Ok(()),
            Err(idx) => idx,
        };
        if self.items.len() == self.items.capacity() {
            let additional = self.items.capacity().max(SHRINK_FLOOR);
            self.items
                .try_reserve_exact(additional)
                .map_err(|_| ShimError::alloc(ctx, "failed to grow handle registry"))?;
            debug!(capacity = self.items.capacity(), "handle registry grew");
        }
        self.items.insert(idx, addr);
        Ok(())
    }

    /// Remove `addr`, closing the gap. Returns whether it was present.
    pub fn remove(&mut self, addr: usize) -> bool {
        if addr == 0 {
            return false;
        }
        let Ok(idx) = self.items.binary_search(&addr) else {
            return false;
        };
        self.items.remove(idx);
        self.maybe_shrink();
        true
    }

    #[must_use]
    pub fn contains(&self, addr: usize) -> bool {
        addr != 0 && self.items.binary_search(&addr).is_ok()
    }

    // Best effort: a failed shrink keeps the oversized (still correct) buffer.
    fn maybe_shrink(&mut self) {
        let cap = self.items.capacity();
        if cap == 0 {
            return;
        }
        if self.items.is_empty() {
            self.items = Vec::new();
            return;
        }
        if cap <= SHRINK_FLOOR || self.items.len() * 4 >= cap {
            return;
        }

        let next_cap = (cap / 2).max(SHRINK_FLOOR).max(self.items.len());
        let mut next = Vec::new();
        if next.try_reserve_exact(next_cap).is_err() {
            warn!(capacity = cap, "handle registry shrink failed; keeping buffer");
            return;
        }
        next.extend_from_slice(&self.items);
        self.items = next;
    }
}
