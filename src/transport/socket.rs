//! Compositor endpoint resolution and socket connect.
//!
//! The socket lives at `$XDG_RUNTIME_DIR/$WAYLAND_DISPLAY`, with the display
//! name defaulting to `wayland-0`. An absolute display name is used as the
//! socket path directly, but the runtime directory must still be known.
//!
//! # Example
//!
//! ```ignore
//! use wayland_wire::transport::{connect, EndpointConfig};
//!
//! let endpoint = EndpointConfig::from_env();
//! let stream = connect(&endpoint.socket_path()?).await?;
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::net::UnixStream;

use crate::error::{Result, WaylandError};

/// Environment variable naming the per-user runtime directory.
pub const RUNTIME_DIR_ENV: &str = "XDG_RUNTIME_DIR";

/// Environment variable naming the compositor socket.
pub const DISPLAY_ENV: &str = "WAYLAND_DISPLAY";

/// Socket name used when none is configured.
pub const DEFAULT_DISPLAY: &str = "wayland-0";

/// Where to find the compositor socket.
///
/// Unset fields are filled from the environment by [`resolve_with`].
///
/// [`resolve_with`]: EndpointConfig::resolve_with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base directory holding the socket.
    pub runtime_dir: Option<PathBuf>,
    /// Socket name (or absolute path).
    pub display: Option<String>,
}

impl EndpointConfig {
    /// Configuration taken entirely from the process environment.
    pub fn from_env() -> Self {
        Self::default().resolve_with(env_lookup)
    }

    /// Fill unset fields from `lookup`. Explicit values win.
    pub fn resolve_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<OsString>,
    {
        if self.runtime_dir.is_none() {
            self.runtime_dir = lookup(RUNTIME_DIR_ENV)
                .filter(|dir| !dir.is_empty())
                .map(PathBuf::from);
        }
        if self.display.is_none() {
            self.display = lookup(DISPLAY_ENV)
                .filter(|name| !name.is_empty())
                .map(|name| name.to_string_lossy().into_owned());
        }
        self
    }

    /// Display name, or the default one.
    pub fn display_name(&self) -> &str {
        self.display.as_deref().unwrap_or(DEFAULT_DISPLAY)
    }

    /// Path of the compositor socket.
    ///
    /// # Errors
    ///
    /// `Config` if the runtime directory is unknown, whatever the display.
    pub fn socket_path(&self) -> Result<PathBuf> {
        let display = Path::new(self.display_name());
        let runtime_dir = self.runtime_dir.as_ref().ok_or_else(|| {
            WaylandError::Config(format!("{RUNTIME_DIR_ENV} is not set"))
        })?;
        // Joining an absolute display yields the display itself.
        Ok(runtime_dir.join(display))
    }
}

/// Read the runtime directory from the environment.
///
/// # Errors
///
/// `Config` if `XDG_RUNTIME_DIR` is unset or empty.
pub fn runtime_dir_from_env() -> Result<PathBuf> {
    EndpointConfig::from_env()
        .runtime_dir
        .ok_or_else(|| WaylandError::Config(format!("{RUNTIME_DIR_ENV} is not set")))
}

pub(crate) fn env_lookup(key: &str) -> Option<OsString> {
    std::env::var_os(key)
}

/// Open a stream socket to `path`.
///
/// # Errors
///
/// `Connection` if the socket cannot be opened.
pub async fn connect(path: &Path) -> Result<UnixStream> {
    let stream = UnixStream::connect(path).await.map_err(|e| {
        WaylandError::Connection(format!("failed to connect to {}: {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "socket connected");
    Ok(stream)
}
