//! Generational handle table with registry-backed capability checks.
//!
//! A handle packs `(generation, slot)` into a `u64`:
//!
//! ```text
//!  63        53 52            32 31               0
//! +------------+----------------+------------------+
//! |   zero     |   generation   |   slot index + 1 |
//! +------------+----------------+------------------+
//! ```
//!
//! The slot part is never zero, so neither is a handle, and every handle fits in
//! an IEEE double without rounding. Freeing a slot bumps its generation, so a
//! stale handle can never resolve to whatever later reuses the slot (or the
//! control-block address). A slot whose generation space is exhausted is retired
//! for good.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ShimError;
use crate::registry::HandleRegistry;

/// Bits used for the generation counter.
pub const GENERATION_BITS: u32 = 21;

/// Largest generation a slot may carry.
pub const MAX_GENERATION: u32 = (1 << GENERATION_BITS) - 1;

/// Largest valid raw handle value (`2^53 - 1`).
pub const MAX_HANDLE: u64 = (1 << 53) - 1;

const SLOT_MASK: u64 = 0xFFFF_FFFF;

/// Opaque, non-zero container handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(NonZeroU64);

impl Handle {
    fn pack(slot: u32, generation: u32) -> Self {
        debug_assert!(slot < u32::MAX);
        debug_assert!((1..=MAX_GENERATION).contains(&generation));
        let raw = (u64::from(generation) << 32) | (u64::from(slot) + 1);
        // The low word is `slot + 1`, which is never zero.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Decode a caller-supplied value. `None` for anything no table could issue.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        if raw > MAX_HANDLE || raw & SLOT_MASK == 0 || raw >> 32 == 0 {
            return None;
        }
        NonZeroU64::new(raw).map(Self)
    }

    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0.get()
    }

    #[must_use]
    pub const fn slot(self) -> u32 {
        ((self.0.get() & SLOT_MASK) - 1) as u32
    }

    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0.get() >> 32) as u32
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleKind {
    Cell,
    Window,
}

impl HandleKind {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Cell => "cell",
            Self::Window => "window",
        }
    }
}

#[derive(Debug)]
struct Live<T> {
    kind: HandleKind,
    addr: usize,
    value: T,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    live: Option<Live<T>>,
}

/// Handle table plus the address registry that backs every lookup.
///
/// A handle resolves only if its slot is occupied at the same generation, the kind
/// matches, and the slot's address is still registered.
#[derive(Debug)]
pub struct HandleSpace<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    registry: HandleRegistry,
}

impl<T> HandleSpace<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            registry: HandleRegistry::new(),
        }
    }

    /// Number of live handles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    #[must_use]
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    fn vacant_slot(&mut self, ctx: &str) -> Result<u32, ShimError> {
        if let Some(&idx) = self.free.last() {
            return Ok(idx);
        }
        let idx = u32::try_from(self.slots.len())
            .ok()
            .filter(|&idx| idx < u32::MAX)
            .ok_or_else(|| ShimError::alloc(ctx, "exhausted handle space"))?;
        self.slots
            .try_reserve(1)
            .map_err(|_| ShimError::alloc(ctx, "failed to grow handle table"))?;
        self.free
            .try_reserve(1)
            .map_err(|_| ShimError::alloc(ctx, "failed to grow handle table"))?;
        self.slots.push(Slot {
            generation: 1,
            live: None,
        });
        self.free.push(idx);
        Ok(idx)
    }

    /// Register `value` living at control-block address `addr`.
    ///
    /// On failure the value is handed back untouched so the caller can tear it down;
    /// neither the table nor the registry is modified.
    pub fn register(
        &mut self,
        kind: HandleKind,
        addr: usize,
        value: T,
        ctx: &str,
    ) -> Result<Handle, (ShimError, T)> {
        if self.registry.contains(addr) {
            return Err((
                ShimError::invalid(ctx, "control block already registered"),
                value,
            ));
        }
        let idx = match self.vacant_slot(ctx) {
            Ok(idx) => idx,
            Err(err) => return Err((err, value)),
        };
        if let Err(err) = self.registry.add(addr, ctx) {
            return Err((err, value));
        }
        self.free.pop();
        let slot = &mut self.slots[idx as usize];
        slot.live = Some(Live { kind, addr, value });
        let handle = Handle::pack(idx, slot.generation);
        debug!(%handle, kind = kind.label(), live = self.registry.len(), "handle registered");
        Ok(handle)
    }

    fn locate(&self, raw: u64, kind: HandleKind, ctx: &str) -> Result<usize, ShimError> {
        if raw == 0 {
            return Err(ShimError::NullHandle {
                ctx: ctx.to_owned(),
                kind: kind.label(),
            });
        }
        let unknown = || ShimError::UnknownHandle {
            ctx: ctx.to_owned(),
            kind: kind.label(),
            handle: raw,
        };
        let handle = Handle::from_raw(raw).ok_or_else(unknown)?;
        let idx = handle.slot() as usize;
        let slot = self.slots.get(idx).ok_or_else(unknown)?;
        if slot.generation != handle.generation() {
            return Err(unknown());
        }
        let live = slot.live.as_ref().ok_or_else(unknown)?;
        if !self.registry.contains(live.addr) {
            return Err(unknown());
        }
        if live.kind != kind {
            return Err(ShimError::WrongKind {
                ctx: ctx.to_owned(),
                expected: kind.label(),
                actual: live.kind.label(),
                handle: raw,
            });
        }
        Ok(idx)
    }

    /// The only sanctioned way to turn a raw handle back into its object.
    pub fn resolve(&self, raw: u64, kind: HandleKind, ctx: &str) -> Result<&T, ShimError> {
        let idx = self.locate(raw, kind, ctx)?;
        self.slots[idx]
            .live
            .as_ref()
            .map(|live| &live.value)
            .ok_or_else(|| ShimError::UnknownHandle {
                ctx: ctx.to_owned(),
                kind: kind.label(),
                handle: raw,
            })
    }

    pub fn resolve_mut(
        &mut self,
        raw: u64,
        kind: HandleKind,
        ctx: &str,
    ) -> Result<&mut T, ShimError> {
        let idx = self.locate(raw, kind, ctx)?;
        self.slots[idx]
            .live
            .as_mut()
            .map(|live| &mut live.value)
            .ok_or_else(|| ShimError::UnknownHandle {
                ctx: ctx.to_owned(),
                kind: kind.label(),
                handle: raw,
            })
    }

    /// Retire a handle and hand back its object for teardown.
    ///
    /// The registry entry is removed before the caller gets a chance to release
    /// anything, so a failed release can never be retried into a double free.
    pub fn retire(&mut self, raw: u64, kind: HandleKind, ctx: &str) -> Result<T, ShimError> {
        let idx = self.locate(raw, kind, ctx)?;
        let slot = &mut self.slots[idx];
        let Some(live) = slot.live.take() else {
            return Err(ShimError::UnknownHandle {
                ctx: ctx.to_owned(),
                kind: kind.label(),
                handle: raw,
            });
        };
        if !self.registry.remove(live.addr) {
            warn!(handle = raw, "retired handle was missing from registry");
        }
        self.vacate(idx);
        debug!(handle = raw, live = self.registry.len(), "handle retired");
        Ok(live.value)
    }

    /// Bump a just-emptied slot's generation and make it reusable, or retire it
    /// for good once the generation range is spent.
    fn vacate(&mut self, idx: usize) {
        let slot = &mut self.slots[idx];
        if slot.generation >= MAX_GENERATION {
            debug!(slot = idx, "slot generation exhausted; retiring slot");
            return;
        }
        slot.generation += 1;
        // Reserved in vacant_slot when this slot was first created or reused;
        // fall back to leaking the slot if the push cannot allocate.
        if self.free.try_reserve(1).is_ok() {
            self.free.push(idx as u32);
        }
    }

    /// Retire every live handle, returning the objects in slot order.
    ///
    /// Generations advance exactly as in [`HandleSpace::retire`], so no drained
    /// handle is ever issued again.
    pub fn drain(&mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.registry.len());
        for idx in 0..self.slots.len() {
            let Some(live) = self.slots[idx].live.take() else {
                continue;
            };
            self.registry.remove(live.addr);
            self.vacate(idx);
            out.push(live.value);
        }
        out
    }
}

impl<T> Default for HandleSpace<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packing_round_trips_slot_and_generation() {
        let h = Handle::pack(7, 3);
        assert_eq!(h.slot(), 7);
        assert_eq!(h.generation(), 3);
        assert_eq!(Handle::from_raw(h.as_raw()), Some(h));
        assert!(h.as_raw() <= MAX_HANDLE);

        let top = Handle::pack(u32::MAX - 1, MAX_GENERATION);
        assert_eq!(top.as_raw(), MAX_HANDLE);
    }

    #[test]
    fn from_raw_rejects_values_no_table_issues() {
        assert_eq!(Handle::from_raw(0), None);
        assert_eq!(Handle::from_raw(MAX_HANDLE + 1), None);
        // Zero slot word.
        assert_eq!(Handle::from_raw(1 << 32), None);
        // Zero generation.
        assert_eq!(Handle::from_raw(5), None);
    }

    #[test]
    fn register_resolve_retire() {
        let mut space = HandleSpace::new();
        let h = space
            .register(HandleKind::Cell, 0x1000, "a", "test")
            .expect("register");
        assert_eq!(space.resolve(h.as_raw(), HandleKind::Cell, "test"), Ok(&"a"));
        assert!(space.registry().contains(0x1000));

        assert_eq!(space.retire(h.as_raw(), HandleKind::Cell, "test"), Ok("a"));
        assert!(!space.registry().contains(0x1000));
        assert!(space.is_empty());
    }

    #[test]
    fn null_handle_is_reported_as_null() {
        let space: HandleSpace<()> = HandleSpace::new();
        let err = space.resolve(0, HandleKind::Window, "window_card()").unwrap_err();
        assert_eq!(err.to_string(), "window_card(): window handle must be non-null");
    }

    #[test]
    fn stale_handle_does_not_resolve_after_slot_reuse_at_same_address() {
        let mut space = HandleSpace::new();
        let old = space
            .register(HandleKind::Cell, 0x2000, 1_u32, "test")
            .expect("register");
        space.retire(old.as_raw(), HandleKind::Cell, "test").expect("retire");

        // Same slot and same address come back, but at a new generation.
        let new = space
            .register(HandleKind::Cell, 0x2000, 2_u32, "test")
            .expect("register");
        assert_eq!(new.slot(), old.slot());
        assert_ne!(new, old);

        let err = space.resolve(old.as_raw(), HandleKind::Cell, "get()").unwrap_err();
        assert!(matches!(err, ShimError::UnknownHandle { .. }), "got {err:?}");
        assert_eq!(space.resolve(new.as_raw(), HandleKind::Cell, "get()"), Ok(&2));
    }

    #[test]
    fn retire_twice_is_a_validation_error() {
        let mut space = HandleSpace::new();
        let h = space
            .register(HandleKind::Window, 0x3000, (), "test")
            .expect("register");
        space.retire(h.as_raw(), HandleKind::Window, "free_window()").expect("first");
        let err = space
            .retire(h.as_raw(), HandleKind::Window, "free_window()")
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("free_window(): unknown/expired window handle ({})", h.as_raw())
        );
    }

    #[test]
    fn wrong_kind_is_rejected_without_retiring() {
        let mut space = HandleSpace::new();
        let h = space
            .register(HandleKind::Window, 0x4000, (), "test")
            .expect("register");
        let err = space.retire(h.as_raw(), HandleKind::Cell, "free_cell()").unwrap_err();
        assert!(matches!(
            err,
            ShimError::WrongKind {
                expected: "cell",
                actual: "window",
                ..
            }
        ));
        assert!(space.resolve(h.as_raw(), HandleKind::Window, "test").is_ok());
    }

    #[test]
    fn live_address_cannot_be_registered_twice() {
        let mut space = HandleSpace::new();
        let a = space
            .register(HandleKind::Cell, 0x5000, 'a', "test")
            .expect("register");
        let (err, back) = space
            .register(HandleKind::Cell, 0x5000, 'b', "test")
            .unwrap_err();
        assert_eq!(back, 'b');
        assert!(matches!(err, ShimError::InvalidArgument { .. }));
        assert_eq!(space.len(), 1);
        assert_eq!(space.resolve(a.as_raw(), HandleKind::Cell, "test"), Ok(&'a'));
    }

    #[test]
    fn exhausted_generation_retires_slot() {
        let mut space = HandleSpace::new();
        let h = space
            .register(HandleKind::Cell, 0x6000, (), "test")
            .expect("register");
        space.slots[h.slot() as usize].generation = MAX_GENERATION;
        let h = Handle::pack(h.slot(), MAX_GENERATION);
        space.retire(h.as_raw(), HandleKind::Cell, "test").expect("retire");

        let next = space
            .register(HandleKind::Cell, 0x6000, (), "test")
            .expect("register");
        assert_ne!(next.slot(), h.slot(), "exhausted slot must not be reused");
    }

    #[test]
    fn drain_empties_table_and_registry() {
        let mut space = HandleSpace::new();
        for i in 1..=5_usize {
            space
                .register(HandleKind::Cell, i * 0x100, i, "test")
                .expect("register");
        }
        let drained = space.drain();
        assert_eq!(drained, vec![1, 2, 3, 4, 5]);
        assert!(space.is_empty());
        assert!(space.registry().is_empty());
    }

    #[test]
    fn drained_handles_never_resolve_again() {
        let mut space = HandleSpace::new();
        let old = space
            .register(HandleKind::Cell, 0x7000, 1_u32, "test")
            .expect("register");
        assert_eq!(space.drain(), vec![1]);

        let new = space
            .register(HandleKind::Cell, 0x7000, 2_u32, "test")
            .expect("register");
        assert_ne!(old, new);
        assert_eq!(new.slot(), old.slot(), "drained slot is reused");
        assert!(matches!(
            space.resolve(old.as_raw(), HandleKind::Cell, "test"),
            Err(ShimError::UnknownHandle { .. })
        ));
        assert_eq!(space.resolve(new.as_raw(), HandleKind::Cell, "test"), Ok(&2));
    }

    #[test]
    fn drain_retires_exhausted_slots() {
        let mut space = HandleSpace::new();
        let h = space
            .register(HandleKind::Cell, 0x8000, (), "test")
            .expect("register");
        space.slots[h.slot() as usize].generation = MAX_GENERATION;
        space.drain();
        let next = space
            .register(HandleKind::Cell, 0x8000, (), "test")
            .expect("register");
        assert_ne!(next.slot(), h.slot());
    }
}
