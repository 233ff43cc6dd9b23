//! Runtime configuration.
//!
//! The amount of toolkit diagnostic text folded into error messages is set via the
//! `EPHEMGATE_ERROR_DETAIL` environment variable:
//! - `short`: only the toolkit's short message (e.g. `SPICE(NOSUCHFILE)`).
//! - `standard` (default): short message, newline, long message.
//! - `full`: standard plus a `Trace:` block carrying the toolkit traceback.
//!
//! The string-array reader cap is set via `EPHEMGATE_MAX_STRING_ARRAY_LEN`.

use serde::{Deserialize, Serialize};

/// Capacity of caller-supplied error buffers used by the host glue.
pub const ERR_MAX_BYTES: usize = 2048;

/// Capacity of caller-supplied string output buffers used by the host glue.
pub const OUT_MAX_BYTES: usize = 2048;

/// Capacity (including NUL) of each captured toolkit message field.
pub const TOOLKIT_MESSAGE_BYTES: usize = 1841;

/// Default hard cap on string-array arguments.
pub const DEFAULT_MAX_STRING_ARRAY_LEN: usize = 1_000_000;

/// How much toolkit diagnostic text is composed into an error message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorDetail {
    /// Short message only.
    Short,
    /// Short and long message separated by a newline.
    #[default]
    Standard,
    /// Short, long and the toolkit traceback.
    Full,
}

impl ErrorDetail {
    /// Parse from string (case-insensitive). Unknown values fall back to `Standard`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "short" | "brief" | "terse" => Self::Short,
            "full" | "trace" | "verbose" => Self::Full,
            _ => Self::Standard,
        }
    }

    /// Returns true if the long message is composed into errors.
    #[must_use]
    pub const fn includes_long(self) -> bool {
        !matches!(self, Self::Short)
    }

    /// Returns true if the traceback is composed into errors.
    #[must_use]
    pub const fn includes_trace(self) -> bool {
        matches!(self, Self::Full)
    }
}

fn parse_error_detail(raw: Option<&str>) -> ErrorDetail {
    raw.map(ErrorDetail::from_str_loose).unwrap_or_default()
}

fn parse_max_string_array_len(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(0) | Err(_) => DEFAULT_MAX_STRING_ARRAY_LEN,
        Ok(n) => n,
    }
}

/// Per-shim configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShimConfig {
    pub error_detail: ErrorDetail,
    pub max_string_array_len: usize,
}

impl ShimConfig {
    /// Configuration derived from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let max_string_array_len = std::env::var("EPHEMGATE_MAX_STRING_ARRAY_LEN")
            .map(|v| parse_max_string_array_len(&v))
            .unwrap_or(DEFAULT_MAX_STRING_ARRAY_LEN);
        let error_detail = std::env::var("EPHEMGATE_ERROR_DETAIL").ok();
        Self {
            error_detail: parse_error_detail(error_detail.as_deref()),
            max_string_array_len,
        }
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            error_detail: ErrorDetail::Standard,
            max_string_array_len: DEFAULT_MAX_STRING_ARRAY_LEN,
        }
    }
}
