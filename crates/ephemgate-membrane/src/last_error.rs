//! Last captured toolkit error, kept separately from the formatted message so hosts
//! can read the structured fields back without parsing.

use crate::config::{ErrorDetail, TOOLKIT_MESSAGE_BYTES};
use crate::error::truncate_to_boundary;

const FIELD_MAX_PAYLOAD: usize = TOOLKIT_MESSAGE_BYTES - 1;

const TRACE_HEADER: &str = "\n\nTrace:\n";

/// Short, long and traceback text of the most recent toolkit failure.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LastErrorStore {
    short: String,
    long: String,
    trace: String,
}

impl LastErrorStore {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            short: String::new(),
            long: String::new(),
            trace: String::new(),
        }
    }

    /// Overwrite all three fields, each bounded to the toolkit message size.
    pub fn record(&mut self, short: &str, long: &str, trace: &str) {
        store_bounded(&mut self.short, short);
        store_bounded(&mut self.long, long);
        store_bounded(&mut self.trace, trace);
    }

    pub fn clear(&mut self) {
        self.short.clear();
        self.long.clear();
        self.trace.clear();
    }

    #[must_use]
    pub fn short(&self) -> &str {
        &self.short
    }

    #[must_use]
    pub fn long(&self) -> &str {
        &self.long
    }

    #[must_use]
    pub fn trace(&self) -> &str {
        &self.trace
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.short.is_empty() && self.long.is_empty() && self.trace.is_empty()
    }
}

fn store_bounded(dst: &mut String, src: &str) {
    dst.clear();
    dst.push_str(truncate_to_boundary(src, FIELD_MAX_PAYLOAD));
}

/// Compose the caller-visible toolkit failure message.
///
/// The short message stays on the first line; the long message follows after a
/// newline when present, and the traceback is appended under a `Trace:` header only
/// at [`ErrorDetail::Full`].
#[must_use]
pub fn compose_message(short: &str, long: &str, trace: &str, detail: ErrorDetail) -> String {
    let mut out = String::with_capacity(short.len() + long.len() + trace.len() + 16);
    out.push_str(short);
    if detail.includes_long() && !long.is_empty() {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(long);
    }
    if detail.includes_trace() && !trace.is_empty() {
        out.push_str(TRACE_HEADER);
        out.push_str(trace);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_clear() {
        let mut store = LastErrorStore::new();
        assert!(store.is_empty());
        store.record("SPICE(NOSUCHFILE)", "The file 'x.bsp' does not exist.", "furnsh_c");
        assert_eq!(store.short(), "SPICE(NOSUCHFILE)");
        assert_eq!(store.long(), "The file 'x.bsp' does not exist.");
        assert_eq!(store.trace(), "furnsh_c");

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn record_replaces_every_field() {
        let mut store = LastErrorStore::new();
        store.record("A", "long a", "trace a");
        store.record("B", "", "");
        assert_eq!(store.short(), "B");
        assert_eq!(store.long(), "");
        assert_eq!(store.trace(), "");
    }

    #[test]
    fn fields_are_bounded() {
        let mut store = LastErrorStore::new();
        let huge = "x".repeat(TOOLKIT_MESSAGE_BYTES * 2);
        store.record(&huge, &huge, &huge);
        assert_eq!(store.short().len(), TOOLKIT_MESSAGE_BYTES - 1);
        assert_eq!(store.long().len(), TOOLKIT_MESSAGE_BYTES - 1);
        assert_eq!(store.trace().len(), TOOLKIT_MESSAGE_BYTES - 1);
    }

    #[test]
    fn compose_standard_joins_short_and_long() {
        let msg = compose_message("SPICE(SETEXCESS)", "set is full", "insrti_c", ErrorDetail::Standard);
        assert_eq!(msg, "SPICE(SETEXCESS)\nset is full");
    }

    #[test]
    fn compose_short_drops_long_and_trace() {
        let msg = compose_message("SPICE(SETEXCESS)", "set is full", "insrti_c", ErrorDetail::Short);
        assert_eq!(msg, "SPICE(SETEXCESS)");
    }

    #[test]
    fn compose_full_appends_trace_block() {
        let msg = compose_message("SPICE(SETEXCESS)", "set is full", "insrti_c", ErrorDetail::Full);
        assert_eq!(msg, "SPICE(SETEXCESS)\nset is full\n\nTrace:\ninsrti_c");

        let no_trace = compose_message("SPICE(SETEXCESS)", "set is full", "", ErrorDetail::Full);
        assert_eq!(no_trace, "SPICE(SETEXCESS)\nset is full");
    }

    #[test]
    fn compose_skips_separator_without_long() {
        assert_eq!(
            compose_message("SPICE(BUG)", "", "", ErrorDetail::Standard),
            "SPICE(BUG)"
        );
    }
}
