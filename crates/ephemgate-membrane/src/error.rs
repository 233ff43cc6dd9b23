//! Error taxonomy shared by every layer of the shim.
//!
//! Validation, toolkit and allocation failures all collapse into [`ShimError`]; the
//! ABI layer turns any of them into a status code plus a bounded, NUL-terminated
//! message via [`write_bounded`].

use thiserror::Error;

/// Coarse class of a [`ShimError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Rejected by this layer before reaching the toolkit.
    Validation,
    /// Signaled by the wrapped toolkit.
    Toolkit,
    /// The host allocator refused a request.
    Allocation,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShimError {
    #[error("{ctx}: {kind} handle must be non-null")]
    NullHandle { ctx: String, kind: &'static str },

    #[error("{ctx}: unknown/expired {kind} handle ({handle})")]
    UnknownHandle {
        ctx: String,
        kind: &'static str,
        handle: u64,
    },

    #[error("{ctx}: expected {expected} handle, got {actual} handle ({handle})")]
    WrongKind {
        ctx: String,
        expected: &'static str,
        actual: &'static str,
        handle: u64,
    },

    #[error("{ctx}: cell has wrong data type (expected {expected}, got {actual})")]
    TypeMismatch {
        ctx: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("{ctx}: index out of range (index {index}, cardinality {len})")]
    IndexOutOfRange { ctx: String, index: i64, len: i64 },

    #[error("{ctx}: {message}")]
    InvalidArgument { ctx: String, message: String },

    #[error("{name} is too long (length {len}; max {max})")]
    TooLong { name: String, len: usize, max: usize },

    #[error("{ctx}: {what}")]
    Alloc { ctx: String, what: &'static str },

    /// Failure signaled by the toolkit; `message` is the composed short/long/trace text.
    #[error("{message}")]
    Toolkit {
        op: String,
        short: String,
        long: String,
        trace: String,
        message: String,
    },

    /// The handle was retired but its memory could not be released.
    #[error("{ctx}: {message}")]
    Release { ctx: String, message: String },
}

impl ShimError {
    /// Shorthand for an [`ShimError::InvalidArgument`].
    pub fn invalid(ctx: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            ctx: ctx.into(),
            message: message.into(),
        }
    }

    /// Shorthand for an [`ShimError::Alloc`].
    pub fn alloc(ctx: impl Into<String>, what: &'static str) -> Self {
        Self::Alloc {
            ctx: ctx.into(),
            what,
        }
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Toolkit { .. } => ErrorClass::Toolkit,
            Self::Alloc { .. } => ErrorClass::Allocation,
            _ => ErrorClass::Validation,
        }
    }

    #[must_use]
    pub fn is_toolkit(&self) -> bool {
        matches!(self, Self::Toolkit { .. })
    }
}

/// Largest prefix of `s` that fits in `max_bytes` without splitting a UTF-8 sequence.
#[must_use]
pub fn truncate_to_boundary(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Copy `msg` into `dst`, truncating to `dst.len() - 1` bytes and NUL-terminating.
///
/// Returns the number of payload bytes written (excluding the NUL). An empty `dst`
/// is left untouched.
pub fn write_bounded(dst: &mut [u8], msg: &str) -> usize {
    let Some(max_payload) = dst.len().checked_sub(1) else {
        return 0;
    };
    let payload = truncate_to_boundary(msg, max_payload).as_bytes();
    dst[..payload.len()].copy_from_slice(payload);
    dst[payload.len()] = 0;
    payload.len()
}
