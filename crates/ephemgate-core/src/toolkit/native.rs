//! Binding to the native toolkit library.
//!
//! [`CellHeader`] is laid out to match the toolkit's cell descriptor, so a
//! [`CellBlock`]'s control block is passed straight through.

use std::ffi::{CStr, c_char, c_int};

use ephemgate_membrane::boundary::fixed_width_to_string;
use ephemgate_membrane::config::TOOLKIT_MESSAGE_BYTES;

use super::{MessageKind, Toolkit};
use crate::cell::{CellBlock, CellHeader};

type SpiceInt = c_int;
type SpiceBoolean = c_int;

#[link(name = "cspice")]
unsafe extern "C" {
    fn erract_c(op: *const c_char, lenout: SpiceInt, action: *mut c_char);
    fn errprt_c(op: *const c_char, lenout: SpiceInt, list: *mut c_char);
    fn failed_c() -> SpiceBoolean;
    fn reset_c();
    fn getmsg_c(option: *const c_char, lenout: SpiceInt, msg: *mut c_char);
    fn qcktrc_c(lenout: SpiceInt, trace: *mut c_char);

    fn ssize_c(size: SpiceInt, cell: *mut CellHeader);
    fn scard_c(card: SpiceInt, cell: *mut CellHeader);
    fn card_c(cell: *mut CellHeader) -> SpiceInt;
    fn size_c(cell: *mut CellHeader) -> SpiceInt;
    fn valid_c(size: SpiceInt, n: SpiceInt, cell: *mut CellHeader);

    fn insrti_c(item: SpiceInt, cell: *mut CellHeader);
    fn insrtd_c(item: f64, cell: *mut CellHeader);
    fn insrtc_c(item: *const c_char, cell: *mut CellHeader);
    fn appndi_c(item: SpiceInt, cell: *mut CellHeader);
    fn appndd_c(item: f64, cell: *mut CellHeader);
    fn appndc_c(item: *const c_char, cell: *mut CellHeader);

    fn wninsd_c(left: f64, right: f64, window: *mut CellHeader);
    fn wncard_c(window: *mut CellHeader) -> SpiceInt;
    fn wnfetd_c(window: *mut CellHeader, n: SpiceInt, left: *mut f64, right: *mut f64);
    fn wnvald_c(size: SpiceInt, n: SpiceInt, window: *mut CellHeader);

    fn furnsh_c(path: *const c_char);
    fn unload_c(path: *const c_char);
    fn kclear_c();
    fn ktotal_c(kind: *const c_char, count: *mut SpiceInt);
}

/// The process-wide native toolkit. All calls must be serialized by the caller.
#[derive(Debug, Default)]
pub struct NativeToolkit;

impl NativeToolkit {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn read_message(fill: impl FnOnce(SpiceInt, *mut c_char)) -> String {
    let mut buf = [0_u8; TOOLKIT_MESSAGE_BYTES];
    fill(TOOLKIT_MESSAGE_BYTES as SpiceInt, buf.as_mut_ptr().cast());
    fixed_width_to_string(&buf, buf.len())
}

impl Toolkit for NativeToolkit {
    fn init_error_handling(&mut self) {
        let mut action = *b"RETURN\0";
        let mut list = *b"NONE\0";
        // SAFETY: "SET" mode only reads the in/out buffers.
        unsafe {
            erract_c(c"SET".as_ptr(), 0, action.as_mut_ptr().cast());
            errprt_c(c"SET".as_ptr(), 0, list.as_mut_ptr().cast());
        }
    }

    fn failed(&self) -> bool {
        // SAFETY: no arguments.
        unsafe { failed_c() != 0 }
    }

    fn message(&self, kind: MessageKind) -> String {
        match kind {
            // SAFETY: `buf` holds `len` writable bytes.
            MessageKind::Short => read_message(|len, buf| unsafe { getmsg_c(c"SHORT".as_ptr(), len, buf) }),
            MessageKind::Long => read_message(|len, buf| unsafe { getmsg_c(c"LONG".as_ptr(), len, buf) }),
            MessageKind::Trace => read_message(|len, buf| unsafe { qcktrc_c(len, buf) }),
        }
    }

    fn reset(&mut self) {
        // SAFETY: no arguments.
        unsafe { reset_c() }
    }

    // SAFETY (cell primitives below): `as_raw_cell` points at a live control block
    // whose `base`/`data` describe a buffer of the declared capacity.

    fn ssize(&mut self, size: i32, cell: &mut CellBlock) {
        unsafe { ssize_c(size, cell.as_raw_cell()) }
    }

    fn scard(&mut self, card: i32, cell: &mut CellBlock) {
        unsafe { scard_c(card, cell.as_raw_cell()) }
    }

    fn card(&mut self, cell: &mut CellBlock) -> i32 {
        unsafe { card_c(cell.as_raw_cell()) }
    }

    fn size(&mut self, cell: &mut CellBlock) -> i32 {
        unsafe { size_c(cell.as_raw_cell()) }
    }

    fn valid(&mut self, size: i32, n: i32, cell: &mut CellBlock) {
        unsafe { valid_c(size, n, cell.as_raw_cell()) }
    }

    fn insrti(&mut self, item: i32, cell: &mut CellBlock) {
        unsafe { insrti_c(item, cell.as_raw_cell()) }
    }

    fn insrtd(&mut self, item: f64, cell: &mut CellBlock) {
        unsafe { insrtd_c(item, cell.as_raw_cell()) }
    }

    fn insrtc(&mut self, item: &CStr, cell: &mut CellBlock) {
        unsafe { insrtc_c(item.as_ptr(), cell.as_raw_cell()) }
    }

    fn appndi(&mut self, item: i32, cell: &mut CellBlock) {
        unsafe { appndi_c(item, cell.as_raw_cell()) }
    }

    fn appndd(&mut self, item: f64, cell: &mut CellBlock) {
        unsafe { appndd_c(item, cell.as_raw_cell()) }
    }

    fn appndc(&mut self, item: &CStr, cell: &mut CellBlock) {
        unsafe { appndc_c(item.as_ptr(), cell.as_raw_cell()) }
    }

    fn wninsd(&mut self, left: f64, right: f64, window: &mut CellBlock) {
        unsafe { wninsd_c(left, right, window.as_raw_cell()) }
    }

    fn wncard(&mut self, window: &mut CellBlock) -> i32 {
        unsafe { wncard_c(window.as_raw_cell()) }
    }

    fn wnfetd(&mut self, window: &mut CellBlock, n: i32) -> (f64, f64) {
        let (mut left, mut right) = (0.0, 0.0);
        unsafe { wnfetd_c(window.as_raw_cell(), n, &mut left, &mut right) };
        (left, right)
    }

    fn wnvald(&mut self, size: i32, n: i32, window: &mut CellBlock) {
        unsafe { wnvald_c(size, n, window.as_raw_cell()) }
    }

    // SAFETY (kernel primitives below): arguments are NUL-terminated and outlive the call.

    fn furnsh(&mut self, path: &CStr) {
        unsafe { furnsh_c(path.as_ptr()) }
    }

    fn unload(&mut self, path: &CStr) {
        unsafe { unload_c(path.as_ptr()) }
    }

    fn kclear(&mut self) {
        unsafe { kclear_c() }
    }

    fn ktotal(&mut self, kind: &CStr) -> i32 {
        let mut count: SpiceInt = 0;
        unsafe { ktotal_c(kind.as_ptr(), &mut count) };
        count
    }
}
