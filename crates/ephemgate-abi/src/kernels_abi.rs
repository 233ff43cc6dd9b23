//! Kernel pool management.

use std::ffi::{c_char, c_int};

use ephemgate_membrane::{ShimError, StringArrayArg};

use crate::macros::abi_fn;
use crate::state::with_shim_checked;
use crate::util::{finish, out_arg, slice_arg, str_arg};

abi_fn! {
    fn ephemgate_load_kernel(path: *const c_char, err: *mut c_char, err_max_bytes: usize) -> c_int {
        let result = with_shim_checked(|s| {
            let path = str_arg(path, "path", "load_kernel()")?;
            s.load_kernel(path)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    /// Load `count` kernels in order, stopping at the first failure.
    fn ephemgate_load_kernels(
        paths: *const *const c_char,
        count: usize,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        const CTX: &str = "load_kernels()";
        let result = with_shim_checked(|s| {
            let max = s.config().max_string_array_len;
            if count > max {
                return Err(ShimError::TooLong {
                    name: "paths".to_owned(),
                    len: count,
                    max,
                });
            }
            let ptrs = slice_arg(paths, count, "paths", CTX)?;
            let items = ptrs
                .iter()
                .map(|&p| str_arg(p, "paths[i]", CTX))
                .collect::<Result<Vec<_>, _>>()?;
            let arg = StringArrayArg::collect(items, count, "paths", max)?;
            s.load_kernels(&arg)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_unload_kernel(path: *const c_char, err: *mut c_char, err_max_bytes: usize) -> c_int {
        let result = with_shim_checked(|s| {
            let path = str_arg(path, "path", "unload_kernel()")?;
            s.unload_kernel(path)
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_clear_kernels(err: *mut c_char, err_max_bytes: usize) -> c_int {
        finish(with_shim_checked(|s| s.clear_kernels()), err, err_max_bytes)
    }
}

abi_fn! {
    /// Count loaded kernels of `kind` (`"ALL"`, `"SPK"`, ...).
    fn ephemgate_kernel_count(
        kind: *const c_char,
        out_count: *mut c_int,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        let result = with_shim_checked(|s| {
            let out = out_arg(out_count, "out_count", "kernel_count()")?;
            let kind = str_arg(kind, "kind", "kernel_count()")?;
            *out = s.kernel_count(kind)?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}
