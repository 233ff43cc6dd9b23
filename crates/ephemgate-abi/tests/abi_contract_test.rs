//! Contract tests for the exported C entry points.

use std::ffi::{CStr, CString, c_char, c_int};
use std::ptr;
use std::sync::{Mutex, MutexGuard};

use ephemgate_abi::cells_abi::*;
use ephemgate_abi::dla_abi::{ephemgate_dla_descriptor_from_ints, ephemgate_dla_descriptor_to_ints};
use ephemgate_abi::errors_abi::*;
use ephemgate_abi::kernels_abi::*;
use ephemgate_abi::util::{EPHEMGATE_ERR_TOOLKIT, EPHEMGATE_ERR_VALIDATION, EPHEMGATE_OK};
use ephemgate_abi::windows_abi::*;
use ephemgate_core::DlaDescriptor;

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn lock() -> MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

struct ErrBuf([c_char; 256]);

impl ErrBuf {
    fn new() -> Self {
        Self([0x7F; 256])
    }

    fn ptr(&mut self) -> *mut c_char {
        self.0.as_mut_ptr()
    }

    fn text(&self) -> String {
        // SAFETY: every entry point NUL-terminates the buffer it writes.
        unsafe { CStr::from_ptr(self.0.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

const ERR_LEN: usize = 256;

fn new_int_cell(size: c_int) -> u64 {
    let mut err = ErrBuf::new();
    let mut h = 0_u64;
    let rc = unsafe { ephemgate_new_int_cell(size, &mut h, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_OK, "{}", err.text());
    h
}

fn last_short() -> String {
    let mut buf = [0 as c_char; 128];
    unsafe { ephemgate_get_last_error_short(buf.as_mut_ptr(), buf.len()) };
    unsafe { CStr::from_ptr(buf.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

#[test]
fn int_set_insert_and_read_back() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(5);

    for v in [3, 1, 2] {
        assert_eq!(unsafe { ephemgate_insert_int(h, v, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    }
    let mut card = -1;
    assert_eq!(unsafe { ephemgate_card(h, &mut card, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(card, 3);
    assert_eq!(err.text(), "", "success empties the error buffer");

    for (i, want) in [1, 2, 3].into_iter().enumerate() {
        let mut got = 0;
        let rc = unsafe { ephemgate_get_int(h, i as c_int, &mut got, err.ptr(), ERR_LEN) };
        assert_eq!(rc, EPHEMGATE_OK);
        assert_eq!(got, want);
    }

    let mut untouched = 99;
    let rc = unsafe { ephemgate_get_int(h, 3, &mut untouched, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert!(err.text().contains("index out of range"), "{}", err.text());
    assert_eq!(untouched, 99, "outputs are only written on success");

    assert_eq!(unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
}

#[test]
fn second_free_is_a_validation_error() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(1);
    let before = unsafe { ephemgate_live_handle_count() };
    assert_eq!(unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) }, EPHEMGATE_ERR_VALIDATION);
    assert!(err.text().contains("unknown/expired"), "{}", err.text());
    assert_eq!(unsafe { ephemgate_live_handle_count() }, before - 1);
}

#[test]
fn null_output_slot_creates_nothing() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let before = unsafe { ephemgate_live_handle_count() };
    let rc = unsafe { ephemgate_new_double_cell(4, ptr::null_mut(), err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(err.text(), "new_double_cell(): out_handle must be non-null");
    assert_eq!(unsafe { ephemgate_live_handle_count() }, before);

    let mut h = 0;
    let rc = unsafe { ephemgate_new_char_cell(2, 0, &mut h, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(h, 0);
}

#[test]
fn double_read_of_int_set_is_rejected() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(2);
    unsafe { ephemgate_insert_int(h, 5, err.ptr(), ERR_LEN) };
    let mut v = 0.0;
    let rc = unsafe { ephemgate_get_double(h, 0, &mut v, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(
        err.text(),
        "get_double(): cell has wrong data type (expected double, got int)"
    );
    unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) };
}

#[test]
fn window_intervals_round_trip() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let mut w = 0;
    assert_eq!(unsafe { ephemgate_new_window(2, &mut w, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(unsafe { ephemgate_window_insert(w, 10.0, 20.0, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(unsafe { ephemgate_window_insert(w, 30.0, 40.0, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);

    let mut n = 0;
    assert_eq!(unsafe { ephemgate_window_card(w, &mut n, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(n, 2);

    let (mut l, mut r) = (0.0, 0.0);
    assert_eq!(unsafe { ephemgate_window_fetch(w, 1, &mut l, &mut r, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!((l, r), (30.0, 40.0));
    assert_eq!(
        unsafe { ephemgate_window_fetch(w, 2, &mut l, &mut r, err.ptr(), ERR_LEN) },
        EPHEMGATE_ERR_VALIDATION
    );

    let mut card = 0;
    let rc = unsafe { ephemgate_card(w, &mut card, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION, "window handles are not cell handles");
    assert_eq!(unsafe { ephemgate_free_window(w, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
}

#[test]
fn bulk_endpoints_validate_into_window() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let mut w = 0;
    unsafe { ephemgate_new_window(2, &mut w, err.ptr(), ERR_LEN) };
    let endpoints = [5.0, 7.0, 1.0, 2.0];
    let rc = unsafe {
        ephemgate_window_append_endpoints(w, endpoints.as_ptr(), endpoints.len(), err.ptr(), ERR_LEN)
    };
    assert_eq!(rc, EPHEMGATE_OK, "{}", err.text());
    assert_eq!(unsafe { ephemgate_validate_window(w, 4, 4, err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    let (mut l, mut r) = (0.0, 0.0);
    unsafe { ephemgate_window_fetch(w, 0, &mut l, &mut r, err.ptr(), ERR_LEN) };
    assert_eq!((l, r), (1.0, 2.0));
    unsafe { ephemgate_free_window(w, err.ptr(), ERR_LEN) };
}

#[test]
fn toolkit_failure_is_captured_then_cleared_by_validation() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(0);

    let rc = unsafe { ephemgate_insert_int(h, 1, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_TOOLKIT);
    assert!(err.text().starts_with("SPICE(SETEXCESS)"), "{}", err.text());
    assert_eq!(last_short(), "SPICE(SETEXCESS)");
    assert_eq!(unsafe { ephemgate_failed() }, 0);

    let mut card = 0;
    let rc = unsafe { ephemgate_card(0, &mut card, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(last_short(), "");

    unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) };
}

#[test]
fn null_pointer_arguments_clear_captured_toolkit_error() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(0);

    unsafe { ephemgate_insert_int(h, 1, err.ptr(), ERR_LEN) };
    assert_eq!(last_short(), "SPICE(SETEXCESS)");
    let rc = unsafe { ephemgate_card(h, ptr::null_mut(), err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(err.text(), "card(): out_card must be non-null");
    assert_eq!(last_short(), "");

    unsafe { ephemgate_insert_int(h, 1, err.ptr(), ERR_LEN) };
    assert_eq!(last_short(), "SPICE(SETEXCESS)");
    let rc = unsafe { ephemgate_load_kernel(ptr::null(), err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(last_short(), "");

    unsafe { ephemgate_insert_int(h, 1, err.ptr(), ERR_LEN) };
    let mut descr = DlaDescriptor::default();
    let rc = unsafe { ephemgate_dla_descriptor_from_ints(ptr::null(), 8, &mut descr, err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(last_short(), "");
    assert_eq!(unsafe { ephemgate_failed() }, 0);

    unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) };
}

#[test]
fn clear_last_error_buffers_empties_fields() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let h = new_int_cell(0);
    unsafe { ephemgate_append_int(h, 1, err.ptr(), ERR_LEN) };
    assert_eq!(last_short(), "SPICE(CELLTOOSMALL)");
    unsafe { ephemgate_clear_last_error_buffers() };
    assert_eq!(last_short(), "");
    unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) };
}

#[test]
fn error_message_is_truncated_and_terminated() {
    let _g = lock();
    let mut small = [0x7F as c_char; 8];
    let rc = unsafe { ephemgate_free_cell(0, small.as_mut_ptr(), small.len()) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(small[7], 0);
    let text = unsafe { CStr::from_ptr(small.as_ptr()) };
    assert_eq!(text.to_bytes(), b"free_ce");

    // A null error buffer is tolerated.
    let rc = unsafe { ephemgate_free_cell(0, ptr::null_mut(), 0) };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
}

#[test]
fn string_elements_copy_into_bounded_buffer() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let mut h = 0;
    unsafe { ephemgate_new_char_cell(2, 16, &mut h, err.ptr(), ERR_LEN) };
    let item = CString::new("JUPITER BARYCENTER").expect("cstring");
    assert_eq!(unsafe { ephemgate_insert_string(h, item.as_ptr(), err.ptr(), ERR_LEN) }, EPHEMGATE_OK);

    let mut out = [0 as c_char; 32];
    let rc = unsafe { ephemgate_get_string(h, 0, out.as_mut_ptr(), out.len(), err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_OK);
    let got = unsafe { CStr::from_ptr(out.as_ptr()) }.to_string_lossy().into_owned();
    assert_eq!(got, "JUPITER BARYCEN", "stored width is 15 characters plus terminator");

    let mut tiny = [0 as c_char; 4];
    unsafe { ephemgate_get_string(h, 0, tiny.as_mut_ptr(), tiny.len(), err.ptr(), ERR_LEN) };
    assert_eq!(unsafe { CStr::from_ptr(tiny.as_ptr()) }.to_bytes(), b"JUP");

    let mut width = 0;
    unsafe { ephemgate_char_cell_length(h, &mut width, err.ptr(), ERR_LEN) };
    assert_eq!(width, 16);
    unsafe { ephemgate_free_cell(h, err.ptr(), ERR_LEN) };
}

#[test]
fn dla_descriptor_transfers_positionally() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let ints: [c_int; 8] = [-1, 2, 10, 4, 20, 6, 30, 8];
    let mut descr = DlaDescriptor::default();
    let rc = unsafe {
        ephemgate_dla_descriptor_from_ints(ints.as_ptr(), ints.len(), &mut descr, err.ptr(), ERR_LEN)
    };
    assert_eq!(rc, EPHEMGATE_OK);
    assert_eq!(descr.backward, -1);
    assert_eq!(descr.double_base, 20);

    let mut back = [0 as c_int; 8];
    let rc = unsafe {
        ephemgate_dla_descriptor_to_ints(&descr, back.as_mut_ptr(), back.len(), err.ptr(), ERR_LEN)
    };
    assert_eq!(rc, EPHEMGATE_OK);
    assert_eq!(back, ints);

    let rc = unsafe {
        ephemgate_dla_descriptor_from_ints(ints.as_ptr(), 7, &mut descr, err.ptr(), ERR_LEN)
    };
    assert_eq!(rc, EPHEMGATE_ERR_VALIDATION);
    assert_eq!(err.text(), "ints: must have length 8");
}

#[test]
fn kernel_paths_are_checked_for_emptiness_only() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let empty = CString::new("").expect("cstring");
    assert_eq!(
        unsafe { ephemgate_load_kernel(empty.as_ptr(), err.ptr(), ERR_LEN) },
        EPHEMGATE_ERR_VALIDATION
    );
    assert_eq!(
        unsafe { ephemgate_load_kernel(ptr::null(), err.ptr(), ERR_LEN) },
        EPHEMGATE_ERR_VALIDATION
    );

    let missing = CString::new("/nonexistent/ephemgate/de440.bsp").expect("cstring");
    assert_eq!(
        unsafe { ephemgate_load_kernel(missing.as_ptr(), err.ptr(), ERR_LEN) },
        EPHEMGATE_ERR_TOOLKIT
    );
    assert_eq!(last_short(), "SPICE(NOSUCHFILE)");
}

#[test]
fn load_kernels_counts_by_kind() {
    let _g = lock();
    let mut err = ErrBuf::new();
    let dir = std::env::temp_dir().join(format!("ephemgate-abi-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("mkdir");
    let spk = dir.join("test.bsp");
    let lsk = dir.join("test.tls");
    std::fs::write(&spk, b"DAF/SPK").expect("write");
    std::fs::write(&lsk, b"\\begindata").expect("write");

    assert_eq!(unsafe { ephemgate_clear_kernels(err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    let paths = [spk.clone(), lsk.clone()].map(|p| CString::new(p.to_string_lossy().into_owned()).expect("cstring"));
    let ptrs: Vec<*const c_char> = paths.iter().map(|p| p.as_ptr()).collect();
    let rc = unsafe { ephemgate_load_kernels(ptrs.as_ptr(), ptrs.len(), err.ptr(), ERR_LEN) };
    assert_eq!(rc, EPHEMGATE_OK, "{}", err.text());

    let count_of = |kind: &str| {
        let kind = CString::new(kind).expect("cstring");
        let mut n = -1;
        let mut err = ErrBuf::new();
        let rc = unsafe { ephemgate_kernel_count(kind.as_ptr(), &mut n, err.ptr(), ERR_LEN) };
        assert_eq!(rc, EPHEMGATE_OK, "{}", err.text());
        n
    };
    assert_eq!(count_of("ALL"), 2);
    assert_eq!(count_of("SPK"), 1);

    assert_eq!(unsafe { ephemgate_unload_kernel(paths[0].as_ptr(), err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(count_of("ALL"), 1);
    assert_eq!(unsafe { ephemgate_clear_kernels(err.ptr(), ERR_LEN) }, EPHEMGATE_OK);
    assert_eq!(count_of("ALL"), 0);

    let _ = std::fs::remove_dir_all(&dir);
}
