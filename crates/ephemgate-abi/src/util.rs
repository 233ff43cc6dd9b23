//! Shared internal utilities for ABI adapters.

use std::ffi::{CStr, c_char, c_int};

use ephemgate_membrane::error::write_bounded;
use ephemgate_membrane::{ErrorClass, ShimError};
use tracing::debug;

pub const EPHEMGATE_OK: c_int = 0;
pub const EPHEMGATE_ERR_VALIDATION: c_int = 1;
pub const EPHEMGATE_ERR_TOOLKIT: c_int = 2;
pub const EPHEMGATE_ERR_ALLOC: c_int = 3;

#[must_use]
pub fn status_code(err: &ShimError) -> c_int {
    match err.class() {
        ErrorClass::Validation => EPHEMGATE_ERR_VALIDATION,
        ErrorClass::Toolkit => EPHEMGATE_ERR_TOOLKIT,
        ErrorClass::Allocation => EPHEMGATE_ERR_ALLOC,
    }
}

/// Borrow a caller string argument as UTF-8.
///
/// # Safety
///
/// `ptr` is null or points at a NUL-terminated string that outlives `'a`.
pub unsafe fn str_arg<'a>(ptr: *const c_char, name: &str, ctx: &str) -> Result<&'a str, ShimError> {
    if ptr.is_null() {
        return Err(ShimError::invalid(ctx, format!("{name} must be a string")));
    }
    // SAFETY: non-null and NUL-terminated per the contract above.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| ShimError::invalid(ctx, format!("{name} must be valid UTF-8")))
}

/// Borrow `len` elements of a caller array. A zero-length array may be null.
///
/// # Safety
///
/// `ptr` is null or valid for reading `len` elements for `'a`.
pub unsafe fn slice_arg<'a, T>(
    ptr: *const T,
    len: usize,
    name: &str,
    ctx: &str,
) -> Result<&'a [T], ShimError> {
    if len == 0 {
        return Ok(&[]);
    }
    if ptr.is_null() {
        return Err(ShimError::invalid(ctx, format!("{name} must be non-null")));
    }
    Ok(unsafe { std::slice::from_raw_parts(ptr, len) })
}

/// Borrow a caller output slot.
///
/// # Safety
///
/// `ptr` is null or valid for writing one `T` for `'a`.
pub unsafe fn out_arg<'a, T>(ptr: *mut T, name: &str, ctx: &str) -> Result<&'a mut T, ShimError> {
    unsafe { ptr.as_mut() }.ok_or_else(|| ShimError::invalid(ctx, format!("{name} must be non-null")))
}

/// Borrow a caller byte buffer of `max_bytes`.
///
/// # Safety
///
/// `ptr` is null or valid for writing `max_bytes` bytes for `'a`.
pub unsafe fn out_buf<'a>(
    ptr: *mut c_char,
    max_bytes: usize,
    name: &str,
    ctx: &str,
) -> Result<&'a mut [u8], ShimError> {
    if ptr.is_null() || max_bytes == 0 {
        return Err(ShimError::invalid(
            ctx,
            format!("{name} must be a non-null buffer of at least 1 byte"),
        ));
    }
    Ok(unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), max_bytes) })
}

/// # Safety
///
/// `err` is null or valid for writing `err_max_bytes` bytes.
unsafe fn err_buf<'a>(err: *mut c_char, err_max_bytes: usize) -> Option<&'a mut [u8]> {
    if err.is_null() || err_max_bytes == 0 {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts_mut(err.cast::<u8>(), err_max_bytes) })
}

/// Collapse an operation result into a status code and the caller's error buffer.
///
/// The buffer is emptied on success.
///
/// # Safety
///
/// `err` is null or valid for writing `err_max_bytes` bytes.
pub unsafe fn finish(result: Result<(), ShimError>, err: *mut c_char, err_max_bytes: usize) -> c_int {
    let buf = unsafe { err_buf(err, err_max_bytes) };
    match result {
        Ok(()) => {
            if let Some(buf) = buf {
                buf[0] = 0;
            }
            EPHEMGATE_OK
        }
        Err(e) => {
            let message = e.to_string();
            if let Some(buf) = buf {
                write_bounded(buf, &message);
            }
            let status = status_code(&e);
            debug!(status, error = %message, "abi call failed");
            status
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_arg_rejects_null_and_invalid_utf8() {
        assert!(unsafe { str_arg(std::ptr::null(), "path", "t") }.is_err());
        let bad = [0xFF_u8, 0xFE, 0];
        assert!(unsafe { str_arg(bad.as_ptr().cast(), "path", "t") }.is_err());
        assert_eq!(unsafe { str_arg(c"naif0012.tls".as_ptr(), "path", "t") }, Ok("naif0012.tls"));
    }

    #[test]
    fn status_codes_follow_error_class() {
        assert_eq!(status_code(&ShimError::invalid("t", "x")), EPHEMGATE_ERR_VALIDATION);
        assert_eq!(status_code(&ShimError::alloc("t", "x")), EPHEMGATE_ERR_ALLOC);
    }

    #[test]
    fn finish_writes_bounded_message() {
        let mut buf = [0x55_u8; 8];
        let status = unsafe {
            finish(
                Err(ShimError::invalid("ctx()", "a long message")),
                buf.as_mut_ptr().cast(),
                buf.len(),
            )
        };
        assert_eq!(status, EPHEMGATE_ERR_VALIDATION);
        assert_eq!(&buf, b"ctx(): \0");

        let status = unsafe { finish(Ok(()), buf.as_mut_ptr().cast(), buf.len()) };
        assert_eq!(status, EPHEMGATE_OK);
        assert_eq!(buf[0], 0);
    }
}
