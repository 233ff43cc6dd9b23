//! Error introspection.
//!
//! The last-error fields hold the most recent toolkit failure and are cleared by
//! any validation failure. Reading them never touches toolkit state.

use std::ffi::{c_char, c_int};

use ephemgate_membrane::LastErrorStore;
use ephemgate_membrane::error::write_bounded;

use crate::macros::abi_fn;
use crate::state::with_shim;

/// # Safety
///
/// `out` is null or valid for writing `out_max_bytes` bytes.
unsafe fn copy_field(out: *mut c_char, out_max_bytes: usize, field: fn(&LastErrorStore) -> &str) -> usize {
    if out.is_null() || out_max_bytes == 0 {
        return 0;
    }
    let buf = unsafe { std::slice::from_raw_parts_mut(out.cast::<u8>(), out_max_bytes) };
    with_shim(|s| write_bounded(buf, field(s.last_error())))
}

abi_fn! {
    /// Copy the short message of the last toolkit failure. Returns bytes written.
    fn ephemgate_get_last_error_short(out: *mut c_char, out_max_bytes: usize) -> usize {
        copy_field(out, out_max_bytes, LastErrorStore::short)
    }
}

abi_fn! {
    fn ephemgate_get_last_error_long(out: *mut c_char, out_max_bytes: usize) -> usize {
        copy_field(out, out_max_bytes, LastErrorStore::long)
    }
}

abi_fn! {
    fn ephemgate_get_last_error_trace(out: *mut c_char, out_max_bytes: usize) -> usize {
        copy_field(out, out_max_bytes, LastErrorStore::trace)
    }
}

abi_fn! {
    fn ephemgate_clear_last_error_buffers() {
        with_shim(|s| s.clear_last_error_buffers());
    }
}

abi_fn! {
    /// 1 while the toolkit failure flag is raised, else 0.
    fn ephemgate_failed() -> c_int {
        c_int::from(with_shim(|s| s.failed()))
    }
}

abi_fn! {
    /// Reset toolkit error state and the last-error fields.
    fn ephemgate_reset() {
        with_shim(|s| s.reset());
    }
}

abi_fn! {
    /// Number of live cells and windows.
    fn ephemgate_live_handle_count() -> usize {
        with_shim(|s| s.live_handles())
    }
}
