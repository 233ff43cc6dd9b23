//! Typed cell allocation.
//!
//! A cell is a toolkit-visible control block ([`CellHeader`]) plus a separately
//! allocated, zeroed backing buffer of `(CTRL_SIZE + capacity)` elements. The
//! header's `data` pointer aims past the control area. [`CellBlock`] owns both
//! allocations and keeps its own record of where they live, so element views and
//! deallocation never trust pointers the toolkit could have rewritten.

use std::alloc::{self, Layout};
use std::ffi::c_void;
use std::ptr::NonNull;

use ephemgate_membrane::ShimError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Elements reserved at the front of every backing buffer for toolkit bookkeeping.
pub const CTRL_SIZE: usize = 6;

const BUFFER_ALIGN: usize = 8;

/// Element type tag, numbered as the toolkit numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(i32)]
pub enum DataType {
    Char = 0,
    Double = 1,
    Int = 2,
}

impl DataType {
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Char),
            1 => Some(Self::Double),
            2 => Some(Self::Int),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Char => "char",
            Self::Double => "double",
            Self::Int => "int",
        }
    }
}

/// Toolkit cell descriptor.
#[repr(C)]
#[derive(Debug)]
pub struct CellHeader {
    dtype: i32,
    length: i32,
    size: i32,
    card: i32,
    is_set: i32,
    adjust: i32,
    init: i32,
    base: *mut c_void,
    data: *mut c_void,
}

impl CellHeader {
    /// Stamped type tag; `None` if the tag was overwritten with garbage.
    #[must_use]
    pub fn dtype(&self) -> Option<DataType> {
        DataType::from_raw(self.dtype)
    }

    /// String element width in bytes (0 for numeric cells).
    #[must_use]
    pub fn length(&self) -> i32 {
        self.length
    }

    #[must_use]
    pub fn size(&self) -> i32 {
        self.size
    }

    #[must_use]
    pub fn card(&self) -> i32 {
        self.card
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.is_set != 0
    }

    #[must_use]
    pub fn is_init(&self) -> bool {
        self.init != 0
    }

    pub fn set_size(&mut self, size: i32) {
        self.size = size;
    }

    pub fn set_card(&mut self, card: i32) {
        self.card = card;
    }

    pub fn set_is_set(&mut self, is_set: bool) {
        self.is_set = i32::from(is_set);
    }

    pub fn set_init(&mut self, init: bool) {
        self.init = i32::from(init);
    }

    #[cfg(test)]
    pub(crate) fn set_raw_dtype(&mut self, raw: i32) {
        self.dtype = raw;
    }

    #[cfg(test)]
    pub(crate) fn set_base(&mut self, base: *mut c_void) {
        self.base = base;
    }
}

/// Owner of one cell's control block and backing buffer.
#[derive(Debug)]
pub struct CellBlock {
    header: NonNull<CellHeader>,
    base: NonNull<u8>,
    layout: Layout,
    dtype: DataType,
    capacity: usize,
    elem_bytes: usize,
}

// SAFETY: CellBlock exclusively owns both allocations; nothing else holds the
// pointers except the toolkit for the duration of a call made through `&mut self`.
unsafe impl Send for CellBlock {}

impl CellBlock {
    /// Allocate a zeroed cell of `capacity` elements.
    ///
    /// `length` is the string element width and must be positive for
    /// [`DataType::Char`]; it is ignored otherwise.
    pub fn allocate(
        dtype: DataType,
        capacity: usize,
        length: usize,
        ctx: &str,
    ) -> Result<Self, ShimError> {
        let elem_bytes = match dtype {
            DataType::Int => size_of::<i32>(),
            DataType::Double => size_of::<f64>(),
            DataType::Char => {
                if length == 0 {
                    return Err(ShimError::invalid(ctx, "length must be > 0"));
                }
                length
            }
        };
        let header_length = match dtype {
            DataType::Char => i32::try_from(length)
                .map_err(|_| ShimError::invalid(ctx, "length out of range"))?,
            _ => 0,
        };

        let total = CTRL_SIZE
            .checked_add(capacity)
            .and_then(|n| n.checked_mul(elem_bytes))
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or_else(|| ShimError::invalid(ctx, "size too large"))?;
        let layout = Layout::from_size_align(total, BUFFER_ALIGN)
            .map_err(|_| ShimError::invalid(ctx, "size too large"))?;

        // SAFETY: `total` is at least CTRL_SIZE * elem_bytes > 0.
        let base = NonNull::new(unsafe { alloc::alloc_zeroed(layout) })
            .ok_or_else(|| ShimError::alloc(ctx, "allocation of cell buffer failed"))?;

        let header_layout = Layout::new::<CellHeader>();
        // SAFETY: CellHeader is not zero-sized.
        let Some(header) = NonNull::new(unsafe { alloc::alloc(header_layout) }.cast::<CellHeader>())
        else {
            // SAFETY: `base` was allocated above with `layout`.
            unsafe { alloc::dealloc(base.as_ptr(), layout) };
            return Err(ShimError::alloc(ctx, "allocation of cell control block failed"));
        };

        // SAFETY: the data region starts inside the `total`-byte allocation.
        let data = unsafe { base.as_ptr().add(CTRL_SIZE * elem_bytes) };
        // SAFETY: `header` is a fresh, properly aligned allocation for one CellHeader.
        unsafe {
            header.as_ptr().write(CellHeader {
                dtype: dtype as i32,
                length: header_length,
                size: 0,
                card: 0,
                is_set: 1,
                adjust: 0,
                init: 0,
                base: base.as_ptr().cast(),
                data: data.cast(),
            });
        }

        Ok(Self {
            header,
            base,
            layout,
            dtype,
            capacity,
            elem_bytes,
        })
    }

    /// Control-block address; what the registry records.
    #[must_use]
    pub fn addr(&self) -> usize {
        self.header.as_ptr() as usize
    }

    /// Type the buffer was allocated for.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Allocated element capacity (the largest size the toolkit may be told).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// String element width; 0 for numeric cells.
    #[must_use]
    pub fn elem_width(&self) -> usize {
        match self.dtype {
            DataType::Char => self.elem_bytes,
            _ => 0,
        }
    }

    #[must_use]
    pub fn header(&self) -> &CellHeader {
        // SAFETY: the header allocation lives as long as self.
        unsafe { self.header.as_ref() }
    }

    pub fn header_mut(&mut self) -> &mut CellHeader {
        // SAFETY: as above, and `&mut self` guarantees exclusivity.
        unsafe { self.header.as_mut() }
    }

    /// Pointer handed to the native toolkit.
    pub fn as_raw_cell(&mut self) -> *mut CellHeader {
        self.header.as_ptr()
    }

    fn data_ptr(&self) -> *mut u8 {
        // SAFETY: stays within the allocation (see `allocate`).
        unsafe { self.base.as_ptr().add(CTRL_SIZE * self.elem_bytes) }
    }

    fn data_bytes(&self) -> usize {
        self.capacity * self.elem_bytes
    }

    /// Integer elements, or `None` if this is not an int cell.
    #[must_use]
    pub fn ints(&self) -> Option<&[i32]> {
        (self.dtype == DataType::Int).then(|| {
            // SAFETY: int cells hold `capacity` zero-initialized, 8-aligned i32s past the
            // control area.
            unsafe { std::slice::from_raw_parts(self.data_ptr().cast::<i32>(), self.capacity) }
        })
    }

    pub fn ints_mut(&mut self) -> Option<&mut [i32]> {
        (self.dtype == DataType::Int).then(|| {
            // SAFETY: as in `ints`, with exclusivity from `&mut self`.
            unsafe { std::slice::from_raw_parts_mut(self.data_ptr().cast::<i32>(), self.capacity) }
        })
    }

    #[must_use]
    pub fn doubles(&self) -> Option<&[f64]> {
        (self.dtype == DataType::Double).then(|| {
            // SAFETY: double cells hold `capacity` zero-initialized f64s past the
            // control area; the buffer is 8-aligned.
            unsafe { std::slice::from_raw_parts(self.data_ptr().cast::<f64>(), self.capacity) }
        })
    }

    pub fn doubles_mut(&mut self) -> Option<&mut [f64]> {
        (self.dtype == DataType::Double).then(|| {
            // SAFETY: as in `doubles`, with exclusivity from `&mut self`.
            unsafe { std::slice::from_raw_parts_mut(self.data_ptr().cast::<f64>(), self.capacity) }
        })
    }

    /// Raw string storage: `capacity` elements of `elem_width()` bytes each.
    #[must_use]
    pub fn chars(&self) -> Option<&[u8]> {
        (self.dtype == DataType::Char).then(|| {
            // SAFETY: char cells hold `capacity * length` zeroed bytes past the control area.
            unsafe { std::slice::from_raw_parts(self.data_ptr(), self.data_bytes()) }
        })
    }

    pub fn chars_mut(&mut self) -> Option<&mut [u8]> {
        (self.dtype == DataType::Char).then(|| {
            // SAFETY: as in `chars`, with exclusivity from `&mut self`.
            unsafe { std::slice::from_raw_parts_mut(self.data_ptr(), self.data_bytes()) }
        })
    }

    /// One string element's raw bytes.
    #[must_use]
    pub fn char_element(&self, index: usize) -> Option<&[u8]> {
        let width = self.elem_width();
        let start = index.checked_mul(width)?;
        self.chars()?.get(start..start.checked_add(width)?)
    }

    fn pointers_intact(&self) -> bool {
        let header = self.header();
        header.base == self.base.as_ptr().cast::<c_void>()
            && header.data == self.data_ptr().cast::<c_void>()
    }

    /// Release both allocations.
    ///
    /// If the control block no longer points at the buffer this block allocated,
    /// the memory is leaked rather than freed and a release error is returned.
    pub fn release(self, ctx: &str) -> Result<(), ShimError> {
        if !self.pointers_intact() {
            warn!(
                addr = self.addr(),
                "control block pointers changed; leaking cell memory"
            );
            std::mem::forget(self);
            return Err(ShimError::Release {
                ctx: ctx.to_owned(),
                message: "cell control block was corrupted; memory not released".to_owned(),
            });
        }
        drop(self);
        Ok(())
    }
}

impl Drop for CellBlock {
    fn drop(&mut self) {
        // SAFETY: both pointers were allocated in `allocate` with these layouts and
        // are released exactly once, here.
        unsafe {
            alloc::dealloc(self.base.as_ptr(), self.layout);
            alloc::dealloc(self.header.as_ptr().cast(), Layout::new::<CellHeader>());
        }
    }
}
