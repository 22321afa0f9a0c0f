//! Error types for wayland-wire.

use thiserror::Error;

/// Broad category of a [`WaylandError`].
///
/// Callers use this to decide on recovery policy; the crate itself never
/// retries or reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required environment setting is missing. Never retried.
    Configuration,
    /// Socket open, read or write failure.
    Connection,
    /// Malformed frame, unknown opcode, bad argument or delivery failure.
    Protocol,
    /// Operation attempted on a closed connection.
    State,
}

/// Main error type for all wayland-wire operations.
#[derive(Debug, Error)]
pub enum WaylandError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or invalid configuration (e.g. `XDG_RUNTIME_DIR` unset).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The socket could not be opened or failed mid-operation.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Protocol error (invalid frame, malformed argument, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The target object has no event with this opcode.
    #[error("Unknown opcode {opcode} for {interface}@{id}")]
    UnknownOpcode {
        /// Interface name of the target object.
        interface: &'static str,
        /// Target object id.
        id: u32,
        /// Opcode received on the wire.
        opcode: u16,
    },

    /// A proxy rejected a decoded event.
    #[error("Event delivery failed: {0}")]
    Delivery(String),

    /// The client-side id range has been used up.
    #[error("Client object id space exhausted")]
    IdSpaceExhausted,

    /// Connection closed (explicitly or by a fatal fault).
    #[error("Connection closed")]
    ConnectionClosed,
}

impl WaylandError {
    /// Map this error onto its category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WaylandError::Config(_) => ErrorKind::Configuration,
            WaylandError::Io(_) | WaylandError::Connection(_) => ErrorKind::Connection,
            WaylandError::Protocol(_)
            | WaylandError::UnknownOpcode { .. }
            | WaylandError::Delivery(_)
            | WaylandError::IdSpaceExhausted => ErrorKind::Protocol,
            WaylandError::ConnectionClosed => ErrorKind::State,
        }
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        WaylandError::Protocol(msg.into())
    }
}

impl From<nix::errno::Errno> for WaylandError {
    fn from(errno: nix::errno::Errno) -> Self {
        WaylandError::Io(std::io::Error::from(errno))
    }
}

/// Result type alias using WaylandError.
pub type Result<T> = std::result::Result<T, WaylandError>;
