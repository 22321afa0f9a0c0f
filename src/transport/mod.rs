//! Transport module - locating and opening the compositor socket.
//!
//! Provides:
//! - [`EndpointConfig`] - runtime directory plus display name
//! - [`connect`] - open the Unix stream socket

mod socket;

pub use socket::{
    connect, runtime_dir_from_env, EndpointConfig, DEFAULT_DISPLAY, DISPLAY_ENV, RUNTIME_DIR_ENV,
};

pub(crate) use socket::env_lookup;
