//! Error types for fedpost core.

use thiserror::Error;

/// Core errors: malformed identities, keys, and wire data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identity {0:?}: expected user@server")]
    InvalidIdentity(String),

    #[error("invalid post reference {0:?}: expected server/path")]
    InvalidPostRef(String),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed data: {0}")]
    Malformed(String),
}

/// Why a single attached signature could not be verified.
///
/// Verification failures never abort event processing. They are recorded
/// as unverified signatures and only matter through the quorum check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// The claimed identity does not resolve to a known user.
    #[error("unknown identity {0:?}")]
    UnknownIdentity(String),

    /// The signature blob is not a well-formed signature.
    #[error("malformed signature from {identity}: {reason}")]
    MalformedSignature { identity: String, reason: String },

    /// No known key of the identity validates the signature.
    #[error("no key of {identity} matches the signature (tried {tried})")]
    NoMatchingKey { identity: String, tried: usize },
}

impl VerificationFailure {
    /// The identity string the failed signature claimed.
    pub fn claimed(&self) -> &str {
        match self {
            Self::UnknownIdentity(identity)
            | Self::MalformedSignature { identity, .. }
            | Self::NoMatchingKey { identity, .. } => identity,
        }
    }
}
