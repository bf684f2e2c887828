//! Error types for engine communication.

use std::io;
use thiserror::Error;

use crate::config::SettingsError;

/// Result type for engine operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors that can occur while talking to the engine process.
#[derive(Error, Debug)]
pub enum RpcError {
    /// Failed to spawn the engine process.
    #[error("failed to spawn engine process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to write to engine stdin.
    #[error("failed to write to engine: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to read from engine stdout.
    #[error("failed to read from engine: {0}")]
    ReadFailed(#[source] io::Error),

    /// Failed to serialize a request line.
    #[error("failed to serialize request: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// Failed to deserialize a response line.
    #[error("failed to deserialize response: {0}")]
    DeserializeFailed(#[source] serde_json::Error),

    /// The engine reported a failure in its readiness line.
    #[error("failed to boot: {0}")]
    BootFailed(String),

    /// The engine answered a request with `ok: false`.
    ///
    /// The display text is the engine's message, unaltered.
    #[error("{0}")]
    Remote(String),

    /// The engine closed its output stream.
    #[error("engine process exited unexpectedly")]
    EngineExited,

    /// A request was issued before the boot handshake completed.
    #[error("transport has not completed the boot handshake")]
    NotBooted,

    /// A thread panicked while holding the transport.
    #[error("transport lock poisoned")]
    TransportPoisoned,

    /// A single value was requested from an empty result.
    #[error("query returned no rows")]
    NoRows,

    /// The appender was already committed or invalidated by a failed call.
    #[error("appender already finalized")]
    AppenderFinalized,

    /// Configuration could not be resolved.
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl RpcError {
    /// Create a remote error from an engine message.
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    /// Check if this error was reported by the engine itself.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    /// Check if this error indicates the engine has gone away.
    pub fn is_engine_exited(&self) -> bool {
        matches!(self, Self::EngineExited | Self::ReadFailed(_) | Self::WriteFailed(_))
    }
}
