//! # wayland-wire
//!
//! Client-side transport for the Wayland wire protocol.
//!
//! This crate connects to a compositor over its Unix socket, tracks object
//! identities, encodes requests and decodes events in the binary wire
//! format, and routes every event to the object it targets.
//!
//! ## Architecture
//!
//! - **Writer task**: owns the write half; one `sendmsg` per request, with
//!   descriptors attached as `SCM_RIGHTS`
//! - **Dispatch engine**: owns the read half; reads one message at a time,
//!   decodes it against the target's event signature and delivers it
//! - **Object registry**: id allocation and id-to-object lookup behind one
//!   lock
//!
//! ## Example
//!
//! ```ignore
//! use wayland_wire::Connection;
//!
//! #[tokio::main]
//! async fn main() -> wayland_wire::Result<()> {
//!     let connection = Connection::connect().await?;
//!     let registry = connection.display().get_registry().await?;
//!     connection.roundtrip().await?;
//!
//!     for global in registry.globals() {
//!         println!("{} {} v{}", global.name, global.interface, global.version);
//!     }
//!     connection.close().await
//! }
//! ```

pub mod codec;
pub mod error;
pub mod interfaces;
pub mod object;
pub mod protocol;
pub mod shm;
pub mod transport;

mod connection;
mod dispatch;
mod writer;

pub use connection::{Connection, ConnectionBuilder, WeakConnection};
pub use dispatch::{DispatchMode, DispatchState};
pub use error::{ErrorKind, Result, WaylandError};
pub use writer::{OutboundFrame, DEFAULT_CHANNEL_CAPACITY};
