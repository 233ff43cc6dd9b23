//! DLA descriptor transfer.
//!
//! Descriptors are moved between the positional eight-integer encoding and the
//! `#[repr(C)]` record. Field values are never interpreted.

use std::ffi::{c_char, c_int};

use ephemgate_core::DlaDescriptor;
use ephemgate_core::dla::DLA_DESCRIPTOR_LEN;
use ephemgate_membrane::ShimError;

use crate::macros::abi_fn;
use crate::state::with_shim_checked;
use crate::util::{finish, out_arg, slice_arg};

abi_fn! {
    fn ephemgate_dla_descriptor_from_ints(
        ints: *const c_int,
        len: usize,
        out_descr: *mut DlaDescriptor,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        const CTX: &str = "dla_descriptor_from_ints()";
        let result = with_shim_checked(|_| {
            let out = out_arg(out_descr, "out_descr", CTX)?;
            let ints = slice_arg(ints, len, "ints", CTX)?;
            *out = DlaDescriptor::from_slice(ints, "ints")?;
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}

abi_fn! {
    fn ephemgate_dla_descriptor_to_ints(
        descr: *const DlaDescriptor,
        out_ints: *mut c_int,
        out_len: usize,
        err: *mut c_char,
        err_max_bytes: usize,
    ) -> c_int {
        const CTX: &str = "dla_descriptor_to_ints()";
        let result = with_shim_checked(|_| {
            let descr = descr
                .as_ref()
                .ok_or_else(|| ShimError::invalid(CTX, "descr must be non-null"))?;
            if out_len != DLA_DESCRIPTOR_LEN {
                return Err(ShimError::invalid(
                    CTX,
                    format!("out_ints must have length {DLA_DESCRIPTOR_LEN}"),
                ));
            }
            let out = out_arg(out_ints.cast::<[c_int; DLA_DESCRIPTOR_LEN]>(), "out_ints", CTX)?;
            *out = descr.to_ints();
            Ok(())
        });
        finish(result, err, err_max_bytes)
    }
}
