//! Error types for the engine.

use fedpost_auth::{AuthError, UnauthorizedAction};
use fedpost_core::{CoreError, EventId, Identity, PostRef};
use fedpost_store::StoreError;
use thiserror::Error;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed identity, key or event.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error. The transaction was rolled back.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// The verified signers do not cover the required authors. Signature
    /// evidence was kept; the content change was not applied.
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedAction),

    /// Policy lookup failed.
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    /// Identity does not resolve and creation was not requested.
    #[error("unknown identity: {0}")]
    UnknownIdentity(Identity),

    /// Server is not registered and may not be created.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// Referenced post does not exist.
    #[error("unknown post: {0}")]
    UnknownPost(PostRef),

    /// No event with this id was ever recorded.
    #[error("unknown event: {0}")]
    UnknownEvent(EventId),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// The authorization failure, if this is one.
    pub fn as_unauthorized(&self) -> Option<&UnauthorizedAction> {
        match self {
            Self::Unauthorized(action) => Some(action),
            _ => None,
        }
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
