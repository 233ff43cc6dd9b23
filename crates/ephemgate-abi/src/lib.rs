// All extern "C" ABI exports accept raw pointers from C callers; arguments are
// validated at runtime, so per-function safety docs would be redundant boilerplate.
#![allow(clippy::missing_safety_doc)]
//! # ephemgate-abi
//!
//! `extern "C"` boundary for ephemgate. Produces `libephemgate.so`.
//!
//! # Architecture
//!
//! ```text
//! host glue -> ABI entry (this crate) -> global lock -> CellShim -> toolkit
//! ```
//!
//! Every fallible entry point takes a trailing `(err, err_max_bytes)` pair and
//! returns a status code: 0 on success, otherwise one of the `EPHEMGATE_ERR_*`
//! constants in [`util`]. On failure `err` receives a NUL-terminated message
//! truncated to `err_max_bytes - 1` bytes. Handles are `u64` values that fit in
//! 53 bits.

mod macros;
mod state;

pub mod cells_abi;
pub mod dla_abi;
pub mod errors_abi;
pub mod kernels_abi;
pub mod util;
pub mod windows_abi;
