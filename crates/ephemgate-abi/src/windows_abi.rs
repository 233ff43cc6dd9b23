//! Interval windows.

use std::ffi::{c_char, c_int};

use crate::macros::abi_fn;
use crate::state::with_shim_checked;
use crate::util::{finish, out_arg, slice_arg};

abi_fn! {
    /// Create an empty window with room for `max_intervals` intervals.
    fn ephemgate_new_window(
        max_intervals: c_int,
        out_handle: *mut u64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_handle, "out_handle", "new_window()")?;
            *out = s.new_window(max_intervals)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_free_window(handle: u64, err: *mut c_char, err_max_bytes: usize) -> c_int {
        finish(with_shim_checked(|s| s.free_window(handle)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_window_insert(
        handle: u64,
        left: f64,
        right: f64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.window_insert(handle, left, right)), err, err_max_bytes)
    }
}

abi_fn! {
    /// Number of intervals in the window.
    fn ephemgate_window_card(
        handle: u64,
        out_card: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_card, "out_card", "window_card()")?;
            *out = s.window_card(handle)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_window_fetch(
        handle: u64,
        index: c_int,
        out_left: *mut f64,
        out_right: *mut f64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let left = out_arg(out_left, "out_left", "window_fetch()")?;
            let right = out_arg(out_right, "out_right", "window_fetch()")?;
            let iv = s.window_fetch(handle, index)?;
            *left = iv.left;
            *right = iv.right;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Append `len` raw endpoints ahead of `ephemgate_validate_window`.
    fn ephemgate_window_append_endpoints(
        handle: u64,
        endpoints: *const f64,
        len: usize,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let values = slice_arg(endpoints, len, "endpoints", "append_endpoints()")?;
            s.append_endpoints(handle, values)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_validate_window(
        handle: u64,
        size: c_int,
        n: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.validate_window(handle, size, n)), err, err_max_bytes)
    }
}
