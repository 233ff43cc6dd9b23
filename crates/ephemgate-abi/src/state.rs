//! The process-wide shim instance behind every entry point.

use ephemgate_core::{CellShim, DefaultToolkit};
use ephemgate_membrane::{ShimConfig, ShimError};
use parking_lot::Mutex;
use tracing::debug;

static SHIM: Mutex<Option<CellShim<DefaultToolkit>>> = Mutex::new(None);

/// Run `f` against the shared shim, creating it on first use.
///
/// The lock is held for the whole call, so toolkit state is never observed
/// mid-operation by another caller.
pub(crate) fn with_shim<R>(f: impl FnOnce(&mut CellShim<DefaultToolkit>) -> R) -> R {
    let mut guard = SHIM.lock();
    let shim = guard.get_or_insert_with(|| {
        let config = ShimConfig::from_env();
        debug!(?config, "initializing shim");
        CellShim::new(DefaultToolkit::new(), config)
    });
    f(shim)
}

/// Like [`with_shim`], but argument checks made inside `f` that fail also
/// clear toolkit error state before the lock is released.
pub(crate) fn with_shim_checked<R>(
    f: impl FnOnce(&mut CellShim<DefaultToolkit>) -> Result<R, ShimError>,
) -> Result<R, ShimError> {
    with_shim(|s| s.run(f))
}
