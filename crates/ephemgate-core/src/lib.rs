//! Typed cells and windows over the wrapped toolkit.
//!
//! [`CellBlock`] owns one toolkit-compatible cell. [`CellShim`] ties cells to the
//! membrane's handle space and routes every toolkit call through a
//! [`ToolkitSession`].

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod cell;
pub mod dla;
pub mod shim;
pub mod toolkit;
pub mod window;

pub use cell::{CellBlock, DataType};
pub use dla::DlaDescriptor;
pub use shim::CellShim;
pub use toolkit::{DefaultToolkit, ReferenceToolkit, Toolkit, ToolkitSession};
pub use window::Interval;
