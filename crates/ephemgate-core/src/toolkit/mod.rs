//! The wrapped-toolkit seam.
//!
//! [`Toolkit`] mirrors the toolkit's own primitives one-to-one, including its
//! error model: primitives never return errors, they raise a process-wide failure
//! flag that must be inspected with [`Toolkit::failed`] and cleared with
//! [`Toolkit::reset`]. [`ToolkitSession`] is the only code allowed to do that.

pub mod reference;

#[cfg(feature = "native-toolkit")]
#[allow(unsafe_code)]
pub mod native;

use std::ffi::CStr;

use ephemgate_membrane::last_error::compose_message;
use ephemgate_membrane::{ErrorDetail, LastErrorStore, ShimError};
use tracing::trace;

use crate::cell::CellBlock;

pub use reference::ReferenceToolkit;

#[cfg(feature = "native-toolkit")]
pub use native::NativeToolkit;

/// Toolkit used by the ABI layer.
#[cfg(feature = "native-toolkit")]
pub type DefaultToolkit = NativeToolkit;

/// Toolkit used by the ABI layer.
#[cfg(not(feature = "native-toolkit"))]
pub type DefaultToolkit = ReferenceToolkit;

/// Which part of the toolkit's error report to retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Short,
    Long,
    Trace,
}

/// Black-box cell, window and kernel-pool primitives.
pub trait Toolkit {
    /// Switch to "return on error, print nothing" mode. Called once per session.
    fn init_error_handling(&mut self);
    fn failed(&self) -> bool;
    fn message(&self, kind: MessageKind) -> String;
    fn reset(&mut self);

    fn ssize(&mut self, size: i32, cell: &mut CellBlock);
    fn scard(&mut self, card: i32, cell: &mut CellBlock);
    fn card(&mut self, cell: &mut CellBlock) -> i32;
    fn size(&mut self, cell: &mut CellBlock) -> i32;
    fn valid(&mut self, size: i32, n: i32, cell: &mut CellBlock);

    fn insrti(&mut self, item: i32, cell: &mut CellBlock);
    fn insrtd(&mut self, item: f64, cell: &mut CellBlock);
    fn insrtc(&mut self, item: &CStr, cell: &mut CellBlock);
    fn appndi(&mut self, item: i32, cell: &mut CellBlock);
    fn appndd(&mut self, item: f64, cell: &mut CellBlock);
    fn appndc(&mut self, item: &CStr, cell: &mut CellBlock);

    fn wninsd(&mut self, left: f64, right: f64, window: &mut CellBlock);
    fn wncard(&mut self, window: &mut CellBlock) -> i32;
    fn wnfetd(&mut self, window: &mut CellBlock, n: i32) -> (f64, f64);
    fn wnvald(&mut self, size: i32, n: i32, window: &mut CellBlock);

    fn furnsh(&mut self, path: &CStr);
    fn unload(&mut self, path: &CStr);
    fn kclear(&mut self);
    fn ktotal(&mut self, kind: &CStr) -> i32;
}

/// Exclusive owner of a toolkit and its captured error state.
///
/// Every toolkit call goes through [`ToolkitSession::invoke`], which checks the
/// failure flag afterwards and, if raised, captures the messages and resets the
/// toolkit before returning. [`ToolkitSession::clear`] is the only other way to
/// touch the toolkit's error state.
#[derive(Debug)]
pub struct ToolkitSession<T> {
    toolkit: T,
    last: LastErrorStore,
    detail: ErrorDetail,
}

impl<T: Toolkit> ToolkitSession<T> {
    pub fn new(mut toolkit: T, detail: ErrorDetail) -> Self {
        toolkit.init_error_handling();
        Self {
            toolkit,
            last: LastErrorStore::new(),
            detail,
        }
    }

    /// Run one toolkit call, then check-and-capture.
    pub fn invoke<R>(&mut self, op: &str, f: impl FnOnce(&mut T) -> R) -> Result<R, ShimError> {
        let out = f(&mut self.toolkit);
        if !self.toolkit.failed() {
            return Ok(out);
        }

        let short = self.toolkit.message(MessageKind::Short);
        let long = self.toolkit.message(MessageKind::Long);
        let trace_text = self.toolkit.message(MessageKind::Trace);
        self.last.record(&short, &long, &trace_text);
        self.toolkit.reset();

        let message = compose_message(
            self.last.short(),
            self.last.long(),
            self.last.trace(),
            self.detail,
        );
        trace!(op, short = self.last.short(), "toolkit failure captured");
        Err(ShimError::Toolkit {
            op: op.to_owned(),
            short: self.last.short().to_owned(),
            long: self.last.long().to_owned(),
            trace: self.last.trace().to_owned(),
            message,
        })
    }

    /// Reset the toolkit and drop any captured error fields.
    pub fn clear(&mut self) {
        self.toolkit.reset();
        self.last.clear();
    }

    /// Drop captured error fields without touching toolkit state.
    pub fn clear_last_error(&mut self) {
        self.last.clear();
    }

    #[must_use]
    pub fn last_error(&self) -> &LastErrorStore {
        &self.last
    }

    /// Toolkit failure flag as of now.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.toolkit.failed()
    }

    #[must_use]
    pub fn detail(&self) -> ErrorDetail {
        self.detail
    }

    #[must_use]
    pub fn toolkit(&self) -> &T {
        &self.toolkit
    }
}
