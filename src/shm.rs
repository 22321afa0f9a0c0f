//! Anonymous shared-memory files for descriptor passing.
//!
//! The file is created unlinked inside the runtime directory, so it is never
//! visible to other processes except through the descriptor sent to the
//! compositor.

use std::fs::File;
use std::path::Path;

use crate::error::{Result, WaylandError};
use crate::transport::runtime_dir_from_env;

/// Create an anonymous file of `size` bytes in `XDG_RUNTIME_DIR`.
///
/// # Errors
///
/// - `Config` if `XDG_RUNTIME_DIR` is unset
/// - `Io` if the file cannot be created or sized
pub fn create_anonymous_file(size: u64) -> Result<File> {
    let dir = runtime_dir_from_env()?;
    create_anonymous_file_in(&dir, size)
}

/// Create an anonymous file of `size` bytes in `dir`.
pub fn create_anonymous_file_in(dir: &Path, size: u64) -> Result<File> {
    let file = tempfile::tempfile_in(dir).map_err(|e| {
        WaylandError::Io(std::io::Error::new(
            e.kind(),
            format!("creating shared memory file in {}: {e}", dir.display()),
        ))
    })?;
    file.set_len(size)?;
    tracing::trace!(size, dir = %dir.display(), "shared memory file created");
    Ok(file)
}
