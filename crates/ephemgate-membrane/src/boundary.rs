//! Conversion of raw host values into validated native arguments.
//!
//! Nothing caller-supplied reaches the toolkit without passing through one of these
//! readers. Each either returns a fully validated value or an error naming the
//! argument; none of them leave partially written output behind.

use std::collections::BTreeMap;
use std::ffi::{CString, c_char};

use serde::{Deserialize, Serialize};

use crate::error::ShimError;
use crate::handle::MAX_HANDLE;

/// Managed-host value as seen by the boundary readers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<HostValue>),
    Object(BTreeMap<String, HostValue>),
}

impl HostValue {
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }
}

impl From<serde_json::Value> for HostValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Reject NaN and the infinities.
pub fn require_finite(value: f64, name: &str) -> Result<f64, ShimError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ShimError::invalid(name, "must be a finite number"))
    }
}

/// Copy exactly `N` finite doubles out of a native slice.
pub fn numbers_from_slice<const N: usize>(values: &[f64], name: &str) -> Result<[f64; N], ShimError> {
    if values.len() != N {
        return Err(ShimError::invalid(name, format!("must have length {N}")));
    }
    let mut out = [0.0_f64; N];
    for (dst, &v) in out.iter_mut().zip(values) {
        if !v.is_finite() {
            return Err(ShimError::invalid(name, "must contain only finite numbers"));
        }
        *dst = v;
    }
    Ok(out)
}

/// Read an array of exactly `N` finite numbers.
pub fn read_numbers<const N: usize>(value: &HostValue, name: &str) -> Result<[f64; N], ShimError> {
    let HostValue::Array(items) = value else {
        return Err(ShimError::invalid(name, "must be an array"));
    };
    if items.len() != N {
        return Err(ShimError::invalid(name, format!("must have length {N}")));
    }
    let mut out = [0.0_f64; N];
    for (dst, item) in out.iter_mut().zip(items) {
        let HostValue::Number(v) = item else {
            return Err(ShimError::invalid(name, "must contain only numbers"));
        };
        if !v.is_finite() {
            return Err(ShimError::invalid(name, "must contain only finite numbers"));
        }
        *dst = *v;
    }
    Ok(out)
}

pub fn read_vec3(value: &HostValue, name: &str) -> Result<[f64; 3], ShimError> {
    read_numbers::<3>(value, name)
}

/// Row-major 3x3 matrix from a flat array of nine numbers.
pub fn read_mat33_row_major(value: &HostValue, name: &str) -> Result<[[f64; 3]; 3], ShimError> {
    let flat = read_numbers::<9>(value, name)?;
    Ok([
        [flat[0], flat[1], flat[2]],
        [flat[3], flat[4], flat[5]],
        [flat[6], flat[7], flat[8]],
    ])
}

/// Integral, finite number within `[lo, hi]`.
pub fn read_bounded_int(value: &HostValue, name: &str, lo: i64, hi: i64) -> Result<i64, ShimError> {
    let HostValue::Number(v) = value else {
        return Err(ShimError::invalid(
            name,
            format!("must be a number (got {})", value.type_name()),
        ));
    };
    let v = *v;
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(ShimError::invalid(name, "must be an integer"));
    }
    // Both bounds are exactly representable for every range this layer uses.
    #[allow(clippy::cast_precision_loss)]
    let (lo_f, hi_f) = (lo as f64, hi as f64);
    if v < lo_f || v > hi_f {
        return Err(ShimError::invalid(
            name,
            format!("must be in range [{lo}, {hi}] (got {v})"),
        ));
    }
    #[allow(clippy::cast_possible_truncation)]
    let n = v as i64;
    Ok(n)
}

pub fn read_i32(value: &HostValue, name: &str) -> Result<i32, ShimError> {
    let v = read_bounded_int(value, name, i64::from(i32::MIN), i64::from(i32::MAX))?;
    i32::try_from(v).map_err(|_| ShimError::invalid(name, "must fit in a 32-bit integer"))
}

/// Raw handle value: an integer in `[1, 2^53 - 1]`.
pub fn read_handle_arg(value: &HostValue, name: &str) -> Result<u64, ShimError> {
    #[allow(clippy::cast_possible_wrap)]
    let v = read_bounded_int(value, name, 1, MAX_HANDLE as i64)?;
    u64::try_from(v).map_err(|_| ShimError::invalid(name, "must be a positive integer"))
}

pub fn read_string(value: &HostValue, name: &str) -> Result<String, ShimError> {
    match value {
        HostValue::String(s) => Ok(s.clone()),
        other => Err(ShimError::invalid(
            name,
            format!("must be a string (got {})", other.type_name()),
        )),
    }
}

/// Paths handed to the toolkit are only checked for emptiness.
pub fn require_non_empty_path<'a>(path: &'a str, ctx: &str) -> Result<&'a str, ShimError> {
    if path.is_empty() {
        return Err(ShimError::invalid(ctx, "path must be a non-empty string"));
    }
    Ok(path)
}

/// A list of strings materialized as NUL-terminated buffers, plus a pointer table
/// into them that stays valid for as long as this value lives.
#[derive(Debug, Default)]
pub struct StringArrayArg {
    values: Vec<CString>,
    ptrs: Vec<*const c_char>,
}

impl StringArrayArg {
    /// Build from `len` items, refusing more than `max` entries or embedded NULs.
    pub fn collect<I, S>(items: I, len: usize, name: &str, max: usize) -> Result<Self, ShimError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if len > max {
            return Err(ShimError::TooLong {
                name: name.to_owned(),
                len,
                max,
            });
        }

        let mut values = Vec::new();
        values
            .try_reserve_exact(len)
            .map_err(|_| ShimError::alloc(name, "failed to allocate string array"))?;
        for item in items.into_iter().take(len) {
            let s = CString::new(item.as_ref())
                .map_err(|_| ShimError::invalid(name, "must not contain NUL bytes"))?;
            values.push(s);
        }
        if values.len() != len {
            return Err(ShimError::invalid(
                name,
                format!("expected {len} strings, got {}", values.len()),
            ));
        }

        // Pointers are taken only after every string is in place.
        let ptrs = values.iter().map(|s| s.as_ptr()).collect();
        Ok(Self { values, ptrs })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[CString] {
        &self.values
    }

    #[must_use]
    pub fn ptrs(&self) -> &[*const c_char] {
        &self.ptrs
    }

    /// Iterate the entries as UTF-8 text.
    pub fn iter_str(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|s| s.to_str().ok())
    }
}

/// Read a host array of strings.
pub fn read_string_array(value: &HostValue, name: &str, max: usize) -> Result<StringArrayArg, ShimError> {
    let HostValue::Array(items) = value else {
        return Err(ShimError::invalid(name, "must be an array"));
    };
    if items.len() > max {
        return Err(ShimError::TooLong {
            name: name.to_owned(),
            len: items.len(),
            max,
        });
    }
    let mut strings = Vec::new();
    strings
        .try_reserve_exact(items.len())
        .map_err(|_| ShimError::alloc(name, "failed to allocate string array"))?;
    for item in items {
        let HostValue::String(s) = item else {
            return Err(ShimError::invalid(name, "must contain only strings"));
        };
        strings.push(s.as_str());
    }
    StringArrayArg::collect(strings.iter(), strings.len(), name, max)
}

/// Decode a fixed-width, NUL- or space-padded output buffer.
///
/// Reads at most `width` bytes, stops at the first NUL and trims trailing ASCII
/// whitespace. Invalid UTF-8 is replaced rather than rejected.
#[must_use]
pub fn fixed_width_to_string(buf: &[u8], width: usize) -> String {
    let window = &buf[..width.min(buf.len())];
    let end = window.iter().position(|&b| b == 0).unwrap_or(window.len());
    String::from_utf8_lossy(window[..end].trim_ascii_end()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(s: &str) -> HostValue {
        HostValue::from(serde_json::from_str::<serde_json::Value>(s).expect("valid json"))
    }

    #[test]
    fn vec3_accepts_exact_finite_array() {
        assert_eq!(read_vec3(&json("[1, 2.5, -3]"), "pos"), Ok([1.0, 2.5, -3.0]));
    }

    #[test]
    fn vec3_rejects_wrong_shape() {
        let err = read_vec3(&json("[1, 2]"), "pos").unwrap_err();
        assert_eq!(err.to_string(), "pos: must have length 3");
        let err = read_vec3(&json("{\"x\": 1}"), "pos").unwrap_err();
        assert_eq!(err.to_string(), "pos: must be an array");
        let err = read_vec3(&json("[1, \"2\", 3]"), "pos").unwrap_err();
        assert_eq!(err.to_string(), "pos: must contain only numbers");
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let v = HostValue::Array(vec![
            HostValue::Number(1.0),
            HostValue::Number(f64::NAN),
            HostValue::Number(3.0),
        ]);
        assert!(read_vec3(&v, "pos").is_err());
        assert!(numbers_from_slice::<2>(&[1.0, f64::INFINITY], "pair").is_err());
        assert!(require_finite(f64::NEG_INFINITY, "x").is_err());
        assert_eq!(require_finite(0.5, "x"), Ok(0.5));
    }

    #[test]
    fn mat33_is_row_major() {
        let m = read_mat33_row_major(&json("[1,2,3,4,5,6,7,8,9]"), "m").expect("mat");
        assert_eq!(m[0], [1.0, 2.0, 3.0]);
        assert_eq!(m[1][0], 4.0);
        assert_eq!(m[2][2], 9.0);
    }

    #[test]
    fn bounded_int_checks_integrality_and_range() {
        assert_eq!(read_i32(&json("42"), "n"), Ok(42));
        assert!(read_i32(&json("1.5"), "n").is_err());
        assert!(read_i32(&json("4294967296"), "n").is_err());
        assert!(read_i32(&json("\"1\""), "n").is_err());
        assert_eq!(read_bounded_int(&json("0"), "n", 0, 10), Ok(0));
        assert!(read_bounded_int(&json("11"), "n", 0, 10).is_err());
    }

    #[test]
    fn handle_arg_range() {
        assert!(read_handle_arg(&json("0"), "h").is_err());
        assert_eq!(read_handle_arg(&json("4294967297"), "h"), Ok(4_294_967_297));
        assert_eq!(read_handle_arg(&json("9007199254740991"), "h"), Ok(MAX_HANDLE));
        assert!(read_handle_arg(&HostValue::Number(9_007_199_254_740_992.0), "h").is_err());
        assert!(read_handle_arg(&HostValue::Number(-1.0), "h").is_err());
    }

    #[test]
    fn string_array_reads_and_exposes_stable_pointers() {
        let arg = read_string_array(&json("[\"a.bsp\", \"b.tls\"]"), "paths", 10).expect("read");
        assert_eq!(arg.len(), 2);
        assert_eq!(arg.ptrs().len(), 2);
        for (ptr, value) in arg.ptrs().iter().zip(arg.values()) {
            assert_eq!(*ptr, value.as_ptr());
        }
        assert_eq!(arg.iter_str().collect::<Vec<_>>(), vec!["a.bsp", "b.tls"]);
    }

    #[test]
    fn string_array_rejects_non_strings_and_oversize() {
        let err = read_string_array(&json("[\"a\", 1]"), "paths", 10).unwrap_err();
        assert_eq!(err.to_string(), "paths: must contain only strings");

        let err = read_string_array(&json("[\"a\", \"b\", \"c\"]"), "paths", 2).unwrap_err();
        assert_eq!(err.to_string(), "paths is too long (length 3; max 2)");

        let err = StringArrayArg::collect(["ok", "bad\0"], 2, "paths", 10).unwrap_err();
        assert_eq!(err.to_string(), "paths: must not contain NUL bytes");
    }

    #[test]
    fn empty_string_array_is_fine() {
        let arg = read_string_array(&json("[]"), "paths", 10).expect("read");
        assert!(arg.is_empty());
        assert!(arg.ptrs().is_empty());
    }

    #[test]
    fn fixed_width_stops_at_nul_and_trims_padding() {
        assert_eq!(fixed_width_to_string(b"EARTH   \0junk", 13), "EARTH");
        assert_eq!(fixed_width_to_string(b"MOON    ", 8), "MOON");
        assert_eq!(fixed_width_to_string(b"  SUN\t\n", 7), "  SUN");
        assert_eq!(fixed_width_to_string(b"JUPITER", 3), "JUP");
        assert_eq!(fixed_width_to_string(b"", 0), "");
        assert_eq!(fixed_width_to_string(b"\0ABC", 4), "");
    }

    #[test]
    fn host_value_deserializes_untagged() {
        let v: HostValue = serde_json::from_str("[null, true, 1.5, \"s\", {\"k\": []}]").expect("parse");
        let HostValue::Array(items) = v else {
            panic!("expected array");
        };
        assert_eq!(items[0], HostValue::Null);
        assert_eq!(items[1], HostValue::Bool(true));
        assert_eq!(items[2], HostValue::Number(1.5));
        assert_eq!(items[3].type_name(), "string");
        assert_eq!(items[4].type_name(), "object");
    }

    #[test]
    fn empty_path_is_rejected() {
        assert!(require_non_empty_path("", "furnsh()").is_err());
        assert_eq!(require_non_empty_path("a.bsp", "furnsh()"), Ok("a.bsp"));
    }
}
