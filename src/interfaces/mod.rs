//! Core protocol objects.
//!
//! - [`Display`] - `wl_display`, always object 1
//! - [`Callback`] - `wl_callback`, fires once
//! - [`Registry`] - `wl_registry`, announces globals and binds them
//!
//! Other interfaces plug in by implementing [`Proxy`](crate::object::Proxy)
//! the same way.

mod callback;
mod display;
mod registry;

pub use callback::Callback;
pub use display::{Display, DisplayError};
pub use registry::{Global, Registry};
