//! In-process toolkit with the native failure model.
//!
//! Implements the cell, window and kernel-list primitives directly over
//! [`CellBlock`] storage. Failures are sticky: once a primitive signals, every
//! later primitive is a no-op until [`Toolkit::reset`].

use std::cmp::Ordering;
use std::ffi::CStr;
use std::path::Path;

use ephemgate_membrane::boundary::fixed_width_to_string;

use super::{MessageKind, Toolkit};
use crate::cell::{CellBlock, DataType};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    short: String,
    long: String,
    trace: String,
}

#[derive(Debug, Default)]
pub struct ReferenceToolkit {
    failure: Option<Failure>,
    kernels: Vec<String>,
    initialized: bool,
}

impl ReferenceToolkit {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a failure as if a primitive had signaled it. The first failure wins.
    pub fn raise(&mut self, short: &str, long: impl Into<String>, routine: &str) {
        if self.failure.is_none() {
            self.failure = Some(Failure {
                short: short.to_owned(),
                long: long.into(),
                trace: routine.to_owned(),
            });
        }
    }

    /// Loaded kernels, oldest first.
    #[must_use]
    pub fn kernels(&self) -> &[String] {
        &self.kernels
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn halted(&self) -> bool {
        self.failure.is_some()
    }

    fn expect_type(&mut self, cell: &CellBlock, expected: DataType, routine: &str) -> bool {
        let actual = cell.header().dtype();
        if actual == Some(expected) && cell.dtype() == expected {
            return true;
        }
        let actual = actual.map_or("unknown", DataType::label);
        self.raise(
            "SPICE(TYPEMISMATCH)",
            format!("Data type of cell is {actual}; expected {}.", expected.label()),
            routine,
        );
        false
    }

    /// Declared size, clamped to what the buffer can actually hold.
    fn declared_size(cell: &CellBlock) -> usize {
        usize::try_from(cell.header().size())
            .unwrap_or(0)
            .min(cell.capacity())
    }

    fn current_card(cell: &CellBlock) -> usize {
        usize::try_from(cell.header().card())
            .unwrap_or(0)
            .min(Self::declared_size(cell))
    }

    fn checked_size(&mut self, size: i32, cell: &CellBlock, routine: &str) -> Option<usize> {
        if size < 0 {
            self.raise(
                "SPICE(INVALIDSIZE)",
                format!("Size must be non-negative; the requested size was {size}."),
                routine,
            );
            return None;
        }
        let size = usize::try_from(size).ok()?;
        if size > cell.capacity() {
            self.raise(
                "SPICE(INVALIDSIZE)",
                format!(
                    "Requested size {size} exceeds the allocated capacity {}.",
                    cell.capacity()
                ),
                routine,
            );
            return None;
        }
        Some(size)
    }

    fn checked_card(&mut self, card: i32, size: usize, routine: &str) -> Option<usize> {
        match usize::try_from(card) {
            Ok(n) if n <= size => Some(n),
            _ => {
                self.raise(
                    "SPICE(INVALIDCARDINALITY)",
                    format!(
                        "Attempt to set cardinality of cell to {card}. Valid range is 0 to {size}."
                    ),
                    routine,
                );
                None
            }
        }
    }

    fn set_card(cell: &mut CellBlock, card: usize) {
        cell.header_mut().set_card(i32::try_from(card).unwrap_or(i32::MAX));
    }

    fn read_strings(cell: &CellBlock, count: usize) -> Vec<String> {
        let width = cell.elem_width();
        (0..count)
            .filter_map(|i| cell.char_element(i))
            .map(|raw| fixed_width_to_string(raw, width))
            .collect()
    }

    fn write_strings(cell: &mut CellBlock, items: &[String]) {
        let width = cell.elem_width();
        let Some(chars) = cell.chars_mut() else {
            return;
        };
        for (slot, item) in chars.chunks_exact_mut(width).zip(items) {
            slot.fill(0);
            let bytes = item.as_bytes();
            let n = bytes.len().min(width.saturating_sub(1));
            slot[..n].copy_from_slice(&bytes[..n]);
        }
    }

    fn normalize_item(item: &CStr, width: usize) -> String {
        let bytes = item.to_bytes();
        let n = bytes.len().min(width.saturating_sub(1));
        fixed_width_to_string(&bytes[..n], n)
    }

    fn read_intervals(window: &CellBlock, card: usize) -> Vec<(f64, f64)> {
        window
            .doubles()
            .map(|d| d[..card].chunks_exact(2).map(|p| (p[0], p[1])).collect())
            .unwrap_or_default()
    }

    fn write_intervals(window: &mut CellBlock, intervals: &[(f64, f64)]) {
        if let Some(data) = window.doubles_mut() {
            for (slot, &(left, right)) in data.chunks_exact_mut(2).zip(intervals) {
                slot[0] = left;
                slot[1] = right;
            }
        }
        Self::set_card(window, intervals.len() * 2);
    }

    fn insert_sorted<T: Copy>(
        &mut self,
        data: &mut [T],
        card: usize,
        size: usize,
        item: T,
        cmp: impl Fn(&T, &T) -> Ordering,
        routine: &str,
    ) -> Option<usize> {
        let pos = match data[..card].binary_search_by(|probe| cmp(probe, &item)) {
            Ok(_) => return Some(card),
            Err(pos) => pos,
        };
        if card >= size {
            self.raise(
                "SPICE(SETEXCESS)",
                format!(
                    "An element could not be inserted into the set due to lack of space; set size is {size}."
                ),
                routine,
            );
            return None;
        }
        data.copy_within(pos..card, pos + 1);
        data[pos] = item;
        Some(card + 1)
    }

    fn append_check(&mut self, cell: &CellBlock, routine: &str) -> Option<usize> {
        let size = Self::declared_size(cell);
        let card = Self::current_card(cell);
        if card >= size {
            self.raise(
                "SPICE(CELLTOOSMALL)",
                format!("Cannot append an element to the cell; cell size is {size}."),
                routine,
            );
            return None;
        }
        Some(card)
    }
}

fn classify_kernel(path: &str) -> &'static str {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "bsp" => "SPK",
        "bc" => "CK",
        "bpc" => "PCK",
        "bds" => "DSK",
        "bes" | "bep" | "bdb" => "EK",
        "tm" | "mk" => "META",
        _ => "TEXT",
    }
}

impl Toolkit for ReferenceToolkit {
    fn init_error_handling(&mut self) {
        self.initialized = true;
    }

    fn failed(&self) -> bool {
        self.failure.is_some()
    }

    fn message(&self, kind: MessageKind) -> String {
        let Some(f) = &self.failure else {
            return String::new();
        };
        match kind {
            MessageKind::Short => f.short.clone(),
            MessageKind::Long => f.long.clone(),
            MessageKind::Trace => f.trace.clone(),
        }
    }

    fn reset(&mut self) {
        self.failure = None;
    }

    fn ssize(&mut self, size: i32, cell: &mut CellBlock) {
        if self.halted() {
            return;
        }
        let Some(size) = self.checked_size(size, cell, "ssize_c") else {
            return;
        };
        let header = cell.header_mut();
        header.set_size(i32::try_from(size).unwrap_or(i32::MAX));
        header.set_card(0);
        header.set_init(true);
    }

    fn scard(&mut self, card: i32, cell: &mut CellBlock) {
        if self.halted() {
            return;
        }
        let size = Self::declared_size(cell);
        if let Some(card) = self.checked_card(card, size, "scard_c") {
            Self::set_card(cell, card);
        }
    }

    fn card(&mut self, cell: &mut CellBlock) -> i32 {
        if self.halted() {
            return 0;
        }
        cell.header().card()
    }

    fn size(&mut self, cell: &mut CellBlock) -> i32 {
        if self.halted() {
            return 0;
        }
        cell.header().size()
    }

    fn valid(&mut self, size: i32, n: i32, cell: &mut CellBlock) {
        if self.halted() {
            return;
        }
        let Some(size) = self.checked_size(size, cell, "valid_c") else {
            return;
        };
        let Some(n) = self.checked_card(n, size, "valid_c") else {
            return;
        };

        let unique = match cell.dtype() {
            DataType::Int => cell.ints_mut().map_or(0, |data| {
                let items = &mut data[..n];
                items.sort_unstable();
                dedup_prefix(items, |a, b| a == b)
            }),
            DataType::Double => cell.doubles_mut().map_or(0, |data| {
                let items = &mut data[..n];
                items.sort_unstable_by(f64::total_cmp);
                dedup_prefix(items, |a, b| a == b)
            }),
            DataType::Char => {
                let mut items = Self::read_strings(cell, n);
                items.sort_unstable();
                items.dedup();
                Self::write_strings(cell, &items);
                items.len()
            }
        };

        let header = cell.header_mut();
        header.set_size(i32::try_from(size).unwrap_or(i32::MAX));
        header.set_is_set(true);
        header.set_init(true);
        Self::set_card(cell, unique);
    }

    fn insrti(&mut self, item: i32, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Int, "insrti_c") {
            return;
        }
        let (size, card) = (Self::declared_size(cell), Self::current_card(cell));
        let Some(data) = cell.ints_mut() else {
            return;
        };
        if let Some(card) = self.insert_sorted(data, card, size, item, i32::cmp, "insrti_c") {
            Self::set_card(cell, card);
        }
    }

    fn insrtd(&mut self, item: f64, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Double, "insrtd_c") {
            return;
        }
        let (size, card) = (Self::declared_size(cell), Self::current_card(cell));
        let Some(data) = cell.doubles_mut() else {
            return;
        };
        if let Some(card) = self.insert_sorted(data, card, size, item, f64::total_cmp, "insrtd_c") {
            Self::set_card(cell, card);
        }
    }

    fn insrtc(&mut self, item: &CStr, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Char, "insrtc_c") {
            return;
        }
        let (size, card) = (Self::declared_size(cell), Self::current_card(cell));
        let mut items = Self::read_strings(cell, card);
        let item = Self::normalize_item(item, cell.elem_width());
        if let Some(card) = self.insert_sorted_strings(&mut items, size, item) {
            Self::write_strings(cell, &items);
            Self::set_card(cell, card);
        }
    }

    fn appndi(&mut self, item: i32, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Int, "appndi_c") {
            return;
        }
        let Some(card) = self.append_check(cell, "appndi_c") else {
            return;
        };
        if let Some(data) = cell.ints_mut() {
            data[card] = item;
        }
        cell.header_mut().set_is_set(false);
        Self::set_card(cell, card + 1);
    }

    fn appndd(&mut self, item: f64, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Double, "appndd_c") {
            return;
        }
        let Some(card) = self.append_check(cell, "appndd_c") else {
            return;
        };
        if let Some(data) = cell.doubles_mut() {
            data[card] = item;
        }
        cell.header_mut().set_is_set(false);
        Self::set_card(cell, card + 1);
    }

    fn appndc(&mut self, item: &CStr, cell: &mut CellBlock) {
        if self.halted() || !self.expect_type(cell, DataType::Char, "appndc_c") {
            return;
        }
        let Some(card) = self.append_check(cell, "appndc_c") else {
            return;
        };
        let mut items = Self::read_strings(cell, card);
        items.push(Self::normalize_item(item, cell.elem_width()));
        Self::write_strings(cell, &items);
        cell.header_mut().set_is_set(false);
        Self::set_card(cell, card + 1);
    }

    fn wninsd(&mut self, left: f64, right: f64, window: &mut CellBlock) {
        if self.halted() || !self.expect_type(window, DataType::Double, "wninsd_c") {
            return;
        }
        if left > right {
            self.raise(
                "SPICE(BADENDPOINTS)",
                format!("Left endpoint {left} exceeds right endpoint {right}."),
                "wninsd_c",
            );
            return;
        }
        let size = Self::declared_size(window);
        let card = Self::current_card(window);
        if card % 2 != 0 {
            self.raise(
                "SPICE(UNMATCHENDPTS)",
                format!("Window cardinality {card} is odd; endpoints must come in pairs."),
                "wninsd_c",
            );
            return;
        }

        let mut merged = (left, right);
        let mut out = Vec::with_capacity(card / 2 + 1);
        for iv in Self::read_intervals(window, card) {
            if iv.1 < merged.0 || iv.0 > merged.1 {
                out.push(iv);
            } else {
                merged = (merged.0.min(iv.0), merged.1.max(iv.1));
            }
        }
        let pos = out.partition_point(|iv| iv.0 < merged.0);
        out.insert(pos, merged);

        if out.len() * 2 > size {
            self.raise(
                "SPICE(WINDOWEXCESS)",
                format!(
                    "Insertion would require {} endpoints; window size is {size}.",
                    out.len() * 2
                ),
                "wninsd_c",
            );
            return;
        }
        Self::write_intervals(window, &out);
    }

    fn wncard(&mut self, window: &mut CellBlock) -> i32 {
        if self.halted() || !self.expect_type(window, DataType::Double, "wncard_c") {
            return 0;
        }
        let card = window.header().card();
        if card % 2 != 0 {
            self.raise(
                "SPICE(UNMATCHENDPTS)",
                format!("Window cardinality {card} is odd; endpoints must come in pairs."),
                "wncard_c",
            );
            return 0;
        }
        card / 2
    }

    fn wnfetd(&mut self, window: &mut CellBlock, n: i32) -> (f64, f64) {
        if self.halted() || !self.expect_type(window, DataType::Double, "wnfetd_c") {
            return (0.0, 0.0);
        }
        let card = Self::current_card(window);
        let count = card / 2;
        match usize::try_from(n) {
            Ok(idx) if idx < count => window
                .doubles()
                .map_or((0.0, 0.0), |d| (d[2 * idx], d[2 * idx + 1])),
            _ => {
                self.raise(
                    "SPICE(NOINTERVAL)",
                    format!("Window contains {count} intervals; interval {n} was requested."),
                    "wnfetd_c",
                );
                (0.0, 0.0)
            }
        }
    }

    fn wnvald(&mut self, size: i32, n: i32, window: &mut CellBlock) {
        if self.halted() || !self.expect_type(window, DataType::Double, "wnvald_c") {
            return;
        }
        let Some(size) = self.checked_size(size, window, "wnvald_c") else {
            return;
        };
        let Some(n) = self.checked_card(n, size, "wnvald_c") else {
            return;
        };
        if n % 2 != 0 {
            self.raise(
                "SPICE(UNMATCHENDPTS)",
                format!("Window cardinality {n} is odd; endpoints must come in pairs."),
                "wnvald_c",
            );
            return;
        }

        let mut intervals = Self::read_intervals(window, n);
        if let Some(&(l, r)) = intervals.iter().find(|iv| iv.0 > iv.1) {
            self.raise(
                "SPICE(BADENDPOINTS)",
                format!("Left endpoint {l} exceeds right endpoint {r}."),
                "wnvald_c",
            );
            return;
        }
        intervals.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());
        for iv in intervals {
            match merged.last_mut() {
                Some(last) if iv.0 <= last.1 => last.1 = last.1.max(iv.1),
                _ => merged.push(iv),
            }
        }

        let header = window.header_mut();
        header.set_size(i32::try_from(size).unwrap_or(i32::MAX));
        header.set_is_set(true);
        header.set_init(true);
        Self::write_intervals(window, &merged);
    }

    fn furnsh(&mut self, path: &CStr) {
        if self.halted() {
            return;
        }
        let path = path.to_string_lossy();
        let path = path.trim();
        if path.is_empty() {
            self.raise("SPICE(EMPTYSTRING)", "The input filename is blank.", "furnsh_c");
            return;
        }
        if !Path::new(path).exists() {
            self.raise(
                "SPICE(NOSUCHFILE)",
                format!("The file '{path}' does not exist."),
                "furnsh_c",
            );
            return;
        }
        // Reloading moves the kernel to the end of the load order.
        self.kernels.retain(|k| k != path);
        self.kernels.push(path.to_owned());
    }

    fn unload(&mut self, path: &CStr) {
        if self.halted() {
            return;
        }
        let path = path.to_string_lossy();
        let path = path.trim();
        if path.is_empty() {
            self.raise("SPICE(EMPTYSTRING)", "The input filename is blank.", "unload_c");
            return;
        }
        self.kernels.retain(|k| k != path);
    }

    fn kclear(&mut self) {
        if self.halted() {
            return;
        }
        self.kernels.clear();
    }

    fn ktotal(&mut self, kind: &CStr) -> i32 {
        if self.halted() {
            return 0;
        }
        let kinds = kind.to_string_lossy().to_ascii_uppercase();
        let wanted: Vec<&str> = kinds.split_whitespace().collect();
        let count = if wanted.contains(&"ALL") {
            self.kernels.len()
        } else {
            self.kernels
                .iter()
                .filter(|k| wanted.contains(&classify_kernel(k)))
                .count()
        };
        i32::try_from(count).unwrap_or(i32::MAX)
    }
}

impl ReferenceToolkit {
    fn insert_sorted_strings(
        &mut self,
        items: &mut Vec<String>,
        size: usize,
        item: String,
    ) -> Option<usize> {
        let pos = match items.binary_search(&item) {
            Ok(_) => return Some(items.len()),
            Err(pos) => pos,
        };
        if items.len() >= size {
            self.raise(
                "SPICE(SETEXCESS)",
                format!(
                    "An element could not be inserted into the set due to lack of space; set size is {size}."
                ),
                "insrtc_c",
            );
            return None;
        }
        items.insert(pos, item);
        Some(items.len())
    }
}

/// Collapse equal neighbors to the front of a sorted slice; returns the unique count.
fn dedup_prefix<T: Copy>(items: &mut [T], eq: impl Fn(&T, &T) -> bool) -> usize {
    if items.is_empty() {
        return 0;
    }
    let mut write = 1;
    for read in 1..items.len() {
        if !eq(&items[read], &items[write - 1]) {
            items[write] = items[read];
            write += 1;
        }
    }
    write
}
