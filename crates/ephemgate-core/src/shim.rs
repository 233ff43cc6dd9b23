//! Validated container operations.
//!
//! [`CellShim`] owns every live cell and window, the handle space that names them,
//! and the toolkit session. Each public operation validates its handle and
//! arguments first, then calls the toolkit through the session. A validation
//! failure clears the toolkit error state so no stale toolkit message can be
//! attached to it.

use std::ffi::CString;

use ephemgate_membrane::boundary::{StringArrayArg, fixed_width_to_string, require_finite, require_non_empty_path};
use ephemgate_membrane::{HandleKind, HandleSpace, LastErrorStore, ShimConfig, ShimError};
use tracing::{debug, warn};

use crate::cell::{CellBlock, DataType};
use crate::toolkit::{Toolkit, ToolkitSession};
use crate::window::{self, Interval};

pub struct CellShim<T: Toolkit> {
    handles: HandleSpace<CellBlock>,
    session: ToolkitSession<T>,
    config: ShimConfig,
}

fn non_negative(value: i32, what: &str, ctx: &str) -> Result<usize, ShimError> {
    usize::try_from(value).map_err(|_| ShimError::invalid(ctx, format!("{what} must be >= 0")))
}

fn c_string(value: &str, what: &str, ctx: &str) -> Result<CString, ShimError> {
    CString::new(value).map_err(|_| ShimError::invalid(ctx, format!("{what} must not contain NUL bytes")))
}

fn require_type(block: &CellBlock, expected: DataType, ctx: &str) -> Result<(), ShimError> {
    match block.header().dtype() {
        Some(actual) if actual == expected && block.dtype() == expected => Ok(()),
        actual => Err(ShimError::TypeMismatch {
            ctx: ctx.to_owned(),
            expected: expected.label(),
            actual: actual.map_or("unknown", DataType::label),
        }),
    }
}

fn check_index(index: i32, card: i32, capacity: usize, ctx: &str) -> Result<usize, ShimError> {
    let out_of_range = || ShimError::IndexOutOfRange {
        ctx: ctx.to_owned(),
        index: i64::from(index),
        len: i64::from(card),
    };
    let idx = usize::try_from(index).map_err(|_| out_of_range())?;
    if index >= card || idx >= capacity {
        return Err(out_of_range());
    }
    Ok(idx)
}

impl<T: Toolkit> CellShim<T> {
    pub fn new(toolkit: T, config: ShimConfig) -> Self {
        Self {
            handles: HandleSpace::new(),
            session: ToolkitSession::new(toolkit, config.error_detail),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// Number of live cells and windows.
    #[must_use]
    pub fn live_handles(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn session(&self) -> &ToolkitSession<T> {
        &self.session
    }

    /// Run `f`, clearing toolkit error state if it fails for any reason other
    /// than a captured toolkit error.
    pub fn run<R>(&mut self, f: impl FnOnce(&mut Self) -> Result<R, ShimError>) -> Result<R, ShimError> {
        let out = f(self);
        if let Err(err) = &out {
            if !err.is_toolkit() {
                self.session.clear();
            }
        }
        out
    }

    // ---- Lifecycle -------------------------------------------------------

    fn create(
        &mut self,
        kind: HandleKind,
        mut block: CellBlock,
        size: i32,
        prime: bool,
        ctx: &str,
    ) -> Result<u64, ShimError> {
        if prime {
            self.session.invoke("ssize", |tk| tk.ssize(size, &mut block))?;
            self.session.invoke("scard", |tk| tk.scard(0, &mut block))?;
        } else {
            window::prime_capacity(&mut block);
        }
        let addr = block.addr();
        let handle = self
            .handles
            .register(kind, addr, block, ctx)
            .map_err(|(err, block)| {
                drop(block);
                err
            })?;
        debug!(%handle, kind = kind.label(), size, "container created");
        Ok(handle.as_raw())
    }

    fn new_numeric(&mut self, dtype: DataType, size: i32, ctx: &str) -> Result<u64, ShimError> {
        self.run(|s| {
            let capacity = non_negative(size, "size", ctx)?;
            let block = CellBlock::allocate(dtype, capacity, 0, ctx)?;
            s.create(HandleKind::Cell, block, size, true, ctx)
        })
    }

    pub fn new_int_cell(&mut self, size: i32) -> Result<u64, ShimError> {
        self.new_numeric(DataType::Int, size, "new_int_cell()")
    }

    pub fn new_double_cell(&mut self, size: i32) -> Result<u64, ShimError> {
        self.new_numeric(DataType::Double, size, "new_double_cell()")
    }

    /// A set of strings, each stored in `length` bytes including its terminator.
    pub fn new_char_cell(&mut self, size: i32, length: i32) -> Result<u64, ShimError> {
        const CTX: &str = "new_char_cell()";
        self.run(|s| {
            let capacity = non_negative(size, "size", CTX)?;
            if length <= 0 {
                return Err(ShimError::invalid(CTX, "length must be > 0"));
            }
            let width = non_negative(length, "length", CTX)?;
            let block = CellBlock::allocate(DataType::Char, capacity, width, CTX)?;
            s.create(HandleKind::Cell, block, size, true, CTX)
        })
    }

    /// A window with room for `max_intervals` intervals.
    pub fn new_window(&mut self, max_intervals: i32) -> Result<u64, ShimError> {
        const CTX: &str = "new_window()";
        self.run(|s| {
            let endpoints = window::endpoint_capacity(max_intervals, CTX)?;
            let block = CellBlock::allocate(DataType::Double, endpoints, 0, CTX)?;
            let size = i32::try_from(endpoints)
                .map_err(|_| ShimError::invalid(CTX, "maxIntervals too large"))?;
            s.create(HandleKind::Window, block, size, false, CTX)
        })
    }

    fn free(&mut self, raw: u64, kind: HandleKind, ctx: &str) -> Result<(), ShimError> {
        self.run(|s| {
            let block = s.handles.retire(raw, kind, ctx)?;
            block.release(ctx)?;
            debug!(handle = raw, kind = kind.label(), "container freed");
            Ok(())
        })
    }

    /// Retire and release a cell. The handle is dead even if release fails.
    pub fn free_cell(&mut self, handle: u64) -> Result<(), ShimError> {
        self.free(handle, HandleKind::Cell, "free_cell()")
    }

    pub fn free_window(&mut self, handle: u64) -> Result<(), ShimError> {
        self.free(handle, HandleKind::Window, "free_window()")
    }

    // ---- Introspection ---------------------------------------------------

    pub fn card(&mut self, handle: u64) -> Result<i32, ShimError> {
        const CTX: &str = "card()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            s.session.invoke("card", |tk| tk.card(block))
        })
    }

    pub fn size(&mut self, handle: u64) -> Result<i32, ShimError> {
        const CTX: &str = "size()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            s.session.invoke("size", |tk| tk.size(block))
        })
    }

    /// String element width of a char cell.
    pub fn char_cell_length(&mut self, handle: u64) -> Result<i32, ShimError> {
        const CTX: &str = "char_cell_length()";
        self.run(|s| {
            let block = s.handles.resolve(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Char, CTX)?;
            let length = block.header().length();
            if length <= 0 {
                return Err(ShimError::invalid(CTX, "invalid cell length"));
            }
            Ok(length)
        })
    }

    // ---- Mutation --------------------------------------------------------

    /// Declare a new size. Bounded by the capacity the cell was allocated with.
    pub fn set_capacity(&mut self, handle: u64, size: i32) -> Result<(), ShimError> {
        const CTX: &str = "set_capacity()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            let requested = non_negative(size, "size", CTX)?;
            if requested > block.capacity() {
                return Err(ShimError::invalid(
                    CTX,
                    format!(
                        "size {size} exceeds allocated capacity {}",
                        block.capacity()
                    ),
                ));
            }
            s.session.invoke("ssize", |tk| tk.ssize(size, block))
        })
    }

    pub fn set_cardinality(&mut self, handle: u64, card: i32) -> Result<(), ShimError> {
        const CTX: &str = "set_cardinality()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            s.session.invoke("scard", |tk| tk.scard(card, block))
        })
    }

    /// Turn the first `n` bulk-loaded elements into a set of declared `size`.
    pub fn validate_cell(&mut self, handle: u64, size: i32, n: i32) -> Result<(), ShimError> {
        const CTX: &str = "validate_cell()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            s.session.invoke("valid", |tk| tk.valid(size, n, block))
        })
    }

    pub fn insert_int(&mut self, handle: u64, item: i32) -> Result<(), ShimError> {
        const CTX: &str = "insert_int()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Int, CTX)?;
            s.session.invoke("insrti", |tk| tk.insrti(item, block))
        })
    }

    pub fn insert_double(&mut self, handle: u64, item: f64) -> Result<(), ShimError> {
        const CTX: &str = "insert_double()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Double, CTX)?;
            let item = require_finite(item, CTX)?;
            s.session.invoke("insrtd", |tk| tk.insrtd(item, block))
        })
    }

    pub fn insert_string(&mut self, handle: u64, item: &str) -> Result<(), ShimError> {
        const CTX: &str = "insert_string()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Char, CTX)?;
            let item = c_string(item, "item", CTX)?;
            s.session.invoke("insrtc", |tk| tk.insrtc(&item, block))
        })
    }

    pub fn append_int(&mut self, handle: u64, item: i32) -> Result<(), ShimError> {
        const CTX: &str = "append_int()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Int, CTX)?;
            s.session.invoke("appndi", |tk| tk.appndi(item, block))
        })
    }

    pub fn append_double(&mut self, handle: u64, item: f64) -> Result<(), ShimError> {
        const CTX: &str = "append_double()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Double, CTX)?;
            let item = require_finite(item, CTX)?;
            s.session.invoke("appndd", |tk| tk.appndd(item, block))
        })
    }

    pub fn append_string(&mut self, handle: u64, item: &str) -> Result<(), ShimError> {
        const CTX: &str = "append_string()";
        self.run(|s| {
            let block = s.handles.resolve_mut(handle, HandleKind::Cell, CTX)?;
            require_type(block, DataType::Char, CTX)?;
            let item = c_string(item, "item", CTX)?;
            s.session.invoke("appndc", |tk| tk.appndc(&item, block))
        })
    }

    // ---- Element access --------------------------------------------------

    fn checked_element(
        &mut self,
        handle: u64,
        dtype: DataType,
        index: i32,
        ctx: &str,
    ) -> Result<usize, ShimError> {
        let block = self.handles.resolve_mut(handle, HandleKind::Cell, ctx)?;
        require_type(block, dtype, ctx)?;
        let card = self.session.invoke("card", |tk| tk.card(block))?;
        check_index(index, card, block.capacity(), ctx)
    }

    pub fn get_int(&mut self, handle: u64, index: i32) -> Result<i32, ShimError> {
        const CTX: &str = "get_int()";
        self.run(|s| {
            let idx = s.checked_element(handle, DataType::Int, index, CTX)?;
            let block = s.handles.resolve(handle, HandleKind::Cell, CTX)?;
            block
                .ints()
                .and_then(|data| data.get(idx).copied())
                .ok_or_else(|| ShimError::invalid(CTX, "element storage unavailable"))
        })
    }

    pub fn get_double(&mut self, handle: u64, index: i32) -> Result<f64, ShimError> {
        const CTX: &str = "get_double()";
        self.run(|s| {
            let idx = s.checked_element(handle, DataType::Double, index, CTX)?;
            let block = s.handles.resolve(handle, HandleKind::Cell, CTX)?;
            block
                .doubles()
                .and_then(|data| data.get(idx).copied())
                .ok_or_else(|| ShimError::invalid(CTX, "element storage unavailable"))
        })
    }

    /// String element, decoded from its fixed-width slot.
    pub fn get_string(&mut self, handle: u64, index: i32) -> Result<String, ShimError> {
        const CTX: &str = "get_string()";
        self.run(|s| {
            let idx = s.checked_element(handle, DataType::Char, index, CTX)?;
            let block = s.handles.resolve(handle, HandleKind::Cell, CTX)?;
            block
                .char_element(idx)
                .map(|raw| fixed_width_to_string(raw, block.elem_width()))
                .ok_or_else(|| ShimError::invalid(CTX, "element storage unavailable"))
        })
    }

    // ---- Windows ---------------------------------------------------------

    fn window_mut<'a>(
        handles: &'a mut HandleSpace<CellBlock>,
        handle: u64,
        ctx: &str,
    ) -> Result<&'a mut CellBlock, ShimError> {
        let block = handles.resolve_mut(handle, HandleKind::Window, ctx)?;
        require_type(block, DataType::Double, ctx)?;
        // Window routines resynchronize the control area from the header.
        block.header_mut().set_init(false);
        Ok(block)
    }

    /// Insert `[left, right]`, merging with any overlapping interval.
    pub fn window_insert(&mut self, handle: u64, left: f64, right: f64) -> Result<(), ShimError> {
        const CTX: &str = "window_insert()";
        self.run(|s| {
            let block = Self::window_mut(&mut s.handles, handle, CTX)?;
            let left = require_finite(left, CTX)?;
            let right = require_finite(right, CTX)?;
            s.session.invoke("wninsd", |tk| tk.wninsd(left, right, block))
        })
    }

    /// Number of intervals.
    pub fn window_card(&mut self, handle: u64) -> Result<i32, ShimError> {
        const CTX: &str = "window_card()";
        self.run(|s| {
            let block = Self::window_mut(&mut s.handles, handle, CTX)?;
            s.session.invoke("wncard", |tk| tk.wncard(block))
        })
    }

    pub fn window_fetch(&mut self, handle: u64, index: i32) -> Result<Interval, ShimError> {
        const CTX: &str = "window_fetch()";
        self.run(|s| {
            let block = Self::window_mut(&mut s.handles, handle, CTX)?;
            let count = s.session.invoke("wncard", |tk| tk.wncard(block))?;
            check_index(index, count, block.capacity() / 2, CTX)?;
            let (left, right) = s.session.invoke("wnfetd", |tk| tk.wnfetd(block, index))?;
            Ok(Interval::new(left, right))
        })
    }

    /// Bulk-load raw endpoints ahead of [`CellShim::validate_window`].
    ///
    /// Every endpoint is checked before any is appended.
    pub fn append_endpoints(&mut self, handle: u64, endpoints: &[f64]) -> Result<(), ShimError> {
        const CTX: &str = "append_endpoints()";
        self.run(|s| {
            let block = Self::window_mut(&mut s.handles, handle, CTX)?;
            for &v in endpoints {
                require_finite(v, CTX)?;
            }
            for &v in endpoints {
                s.session.invoke("appndd", |tk| tk.appndd(v, block))?;
            }
            Ok(())
        })
    }

    /// Turn the first `n` loaded endpoints into a window of declared `size`.
    pub fn validate_window(&mut self, handle: u64, size: i32, n: i32) -> Result<(), ShimError> {
        const CTX: &str = "validate_window()";
        self.run(|s| {
            let block = Self::window_mut(&mut s.handles, handle, CTX)?;
            s.session.invoke("wnvald", |tk| tk.wnvald(size, n, block))
        })
    }

    // ---- Kernels ---------------------------------------------------------

    pub fn load_kernel(&mut self, path: &str) -> Result<(), ShimError> {
        const CTX: &str = "load_kernel()";
        self.run(|s| {
            let path = c_string(require_non_empty_path(path, CTX)?, "path", CTX)?;
            s.session.invoke("furnsh", |tk| tk.furnsh(&path))
        })
    }

    /// Load each path in order, stopping at the first failure.
    pub fn load_kernels(&mut self, paths: &StringArrayArg) -> Result<(), ShimError> {
        const CTX: &str = "load_kernels()";
        self.run(|s| {
            if paths.len() > s.config.max_string_array_len {
                return Err(ShimError::TooLong {
                    name: "paths".to_owned(),
                    len: paths.len(),
                    max: s.config.max_string_array_len,
                });
            }
            for path in paths.values() {
                if path.is_empty() {
                    return Err(ShimError::invalid(CTX, "path must be a non-empty string"));
                }
            }
            for path in paths.values() {
                s.session.invoke("furnsh", |tk| tk.furnsh(path))?;
            }
            Ok(())
        })
    }

    pub fn unload_kernel(&mut self, path: &str) -> Result<(), ShimError> {
        const CTX: &str = "unload_kernel()";
        self.run(|s| {
            let path = c_string(require_non_empty_path(path, CTX)?, "path", CTX)?;
            s.session.invoke("unload", |tk| tk.unload(&path))
        })
    }

    pub fn clear_kernels(&mut self) -> Result<(), ShimError> {
        self.run(|s| s.session.invoke("kclear", |tk| tk.kclear()))
    }

    /// Loaded kernels of `kind` (`"ALL"`, `"SPK"`, `"TEXT"`, ...).
    pub fn kernel_count(&mut self, kind: &str) -> Result<i32, ShimError> {
        const CTX: &str = "kernel_count()";
        self.run(|s| {
            if kind.trim().is_empty() {
                return Err(ShimError::invalid(CTX, "kind must be a non-empty string"));
            }
            let kind = c_string(kind, "kind", CTX)?;
            s.session.invoke("ktotal", |tk| tk.ktotal(&kind))
        })
    }

    // ---- Error state -----------------------------------------------------

    /// Toolkit failure flag; validation errors never raise it.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.session.failed()
    }

    /// Reset toolkit error state and the captured error fields.
    pub fn reset(&mut self) {
        self.session.clear();
    }

    #[must_use]
    pub fn last_error(&self) -> &LastErrorStore {
        self.session.last_error()
    }

    pub fn clear_last_error_buffers(&mut self) {
        self.session.clear_last_error();
    }
}

impl<T: Toolkit> Drop for CellShim<T> {
    fn drop(&mut self) {
        for block in self.handles.drain() {
            if let Err(err) = block.release("CellShim::drop") {
                warn!(%err, "leaked container during shutdown");
            }
        }
    }
}
