//! Validation membrane for the ephemgate binding layer.
//!
//! Everything a managed host hands across the boundary passes through this crate
//! before it can reach native memory or the wrapped toolkit.
//!
//! # Architecture
//!
//! - **Registry** (`registry`): sorted table of live control-block addresses
//! - **Handles** (`handle`): generational `(slot, generation)` handles backed by the registry
//! - **Boundary readers** (`boundary`): host value model and argument validation
//! - **Errors** (`error`): shared error taxonomy and bounded message buffers
//! - **Last error** (`last_error`): structured fields of the latest toolkit failure
//! - **Configuration** (`config`): error detail level and reader caps

#![deny(unsafe_code)]

pub mod boundary;
pub mod config;
pub mod error;
pub mod handle;
pub mod last_error;
pub mod registry;

pub use boundary::{HostValue, StringArrayArg};
pub use config::{ErrorDetail, ShimConfig};
pub use error::{ErrorClass, ShimError};
pub use handle::{Handle, HandleKind, HandleSpace};
pub use last_error::LastErrorStore;
pub use registry::HandleRegistry;
