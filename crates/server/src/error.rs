//! Error types for the keyframe server.
//!
//! Nothing here is fatal to the process. Every variant is reported to the
//! immediate caller; the command layer turns `UnknownResource` into a
//! user-visible message via `Display`.

use keyframe_wire::{Version, WireError};
use thiserror::Error;

/// Errors raised by registry, preview and configuration operations.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A preview or lookup referenced an id that is not published.
    #[error("no camera path named '{0}'")]
    UnknownResource(String),

    /// Resource ids must be non-empty.
    #[error("camera path id must not be empty")]
    InvalidResourceId,

    /// `publish_if_version` found the stored version had moved.
    #[error("camera path '{id}' is at version {actual}, expected {expected}")]
    VersionConflict {
        id: String,
        expected: Version,
        actual: Version,
    },

    /// The version counter for an id cannot be incremented any further.
    #[error("camera path '{0}' has exhausted its version space")]
    VersionExhausted(String),

    /// Invalid or unreadable configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A client payload failed to decode.
    #[error(transparent)]
    Wire(#[from] WireError),
}

impl From<prost::DecodeError> for ServerError {
    fn from(e: prost::DecodeError) -> Self {
        Self::Wire(WireError::Decode(e))
    }
}

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
