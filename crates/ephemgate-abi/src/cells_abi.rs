//! Cell lifecycle, mutation and element access.
//!
//! Every entry point returns [`EPHEMGATE_OK`](crate::util::EPHEMGATE_OK) or a
//! nonzero status and writes a NUL-terminated message into `err` on failure.
//! Output slots are only written on success.

use std::ffi::{c_char, c_int};

use ephemgate_membrane::error::write_bounded;

use crate::macros::abi_fn;
use crate::state::with_shim_checked;
use crate::util::{finish, out_arg, out_buf, str_arg};

abi_fn! {
    /// Create an empty integer set of capacity `size`.
    fn ephemgate_new_int_cell(
        size: c_int,
        out_handle: *mut u64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_handle, "out_handle", "new_int_cell()")?;
            *out = s.new_int_cell(size)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Create an empty double set of capacity `size`.
    fn ephemgate_new_double_cell(
        size: c_int,
        out_handle: *mut u64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_handle, "out_handle", "new_double_cell()")?;
            *out = s.new_double_cell(size)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Create an empty string set of capacity `size` with `length`-byte elements.
    fn ephemgate_new_char_cell(
        size: c_int,
        length: c_int,
        out_handle: *mut u64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_handle, "out_handle", "new_char_cell()")?;
            *out = s.new_char_cell(size, length)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Free a cell. The handle is invalid afterwards even if this fails.
    fn ephemgate_free_cell(handle: u64, err: *mut c_char, err_max_bytes: usize) -> c_int {
        finish(with_shim_checked(|s| s.free_cell(handle)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_card(
        handle: u64,
        out_card: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_card, "out_card", "card()")?;
            *out = s.card(handle)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_size(
        handle: u64,
        out_size: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_size, "out_size", "size()")?;
            *out = s.size(handle)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Element width of a string set, including the terminator.
    fn ephemgate_char_cell_length(
        handle: u64,
        out_length: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_length, "out_length", "char_cell_length()")?;
            *out = s.char_cell_length(handle)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_set_capacity(
        handle: u64,
        size: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.set_capacity(handle, size)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_set_cardinality(
        handle: u64,
        card: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.set_cardinality(handle, card)), err, err_max_bytes)
    }
}

abi_fn! {
    /// Sort and deduplicate the first `n` appended elements into a set.
    fn ephemgate_validate_cell(
        handle: u64,
        size: c_int,
        n: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.validate_cell(handle, size, n)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_insert_int(
        handle: u64,
        item: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.insert_int(handle, item)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_insert_double(
        handle: u64,
        item: f64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.insert_double(handle, item)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_insert_string(
        handle: u64,
        item: *const c_char,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let item = str_arg(item, "item", "insert_string()")?;
            s.insert_string(handle, item)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_append_int(
        handle: u64,
        item: c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.append_int(handle, item)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_append_double(
        handle: u64,
        item: f64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        finish(with_shim_checked(|s| s.append_double(handle, item)), err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_append_string(
        handle: u64,
        item: *const c_char,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let item = str_arg(item, "item", "append_string()")?;
            s.append_string(handle, item)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_get_int(
        handle: u64,
        index: c_int,
        out_value: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_value, "out_value", "get_int()")?;
            *out = s.get_int(handle, index)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_get_double(
        handle: u64,
        index: c_int,
        out_value: *mut f64,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_value, "out_value", "get_double()")?;
            *out = s.get_double(handle, index)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Copy element `index` into `out`, truncated to `out_max_bytes - 1` bytes.
    fn ephemgate_get_string(
        handle: u64,
        index: c_int,
        out: *mut c_char,
        out_max_bytes: usize,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let buf = out_buf(out, out_max_bytes, "out", "get_string()")?;
            let value = s.get_string(handle, index)?;
            write_bounded(buf, &value);
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}
