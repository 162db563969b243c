//! Error types for the authorization module.

use std::collections::BTreeSet;
use std::fmt;

use fedpost_core::Identity;
use thiserror::Error;

/// Errors that can occur during authorization.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The verified signers do not cover the required authors.
    #[error(transparent)]
    Unauthorized(#[from] UnauthorizedAction),

    /// A policy name that does not match any provided policy.
    #[error("unknown authorship policy: {0:?}")]
    UnknownPolicy(String),
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// An event was rejected because a required author did not sign it.
///
/// Carries enough detail for a client to know which signatures are still
/// needed. Rendered as:
///
/// ```text
/// Missing authorization by isaac@aaa.
///   Note: Failed to verify isaac@aaa.
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct UnauthorizedAction {
    /// Identities whose signatures were required.
    pub required: BTreeSet<Identity>,
    /// Identities whose signatures verified.
    pub verified: BTreeSet<Identity>,
    /// Claimed identity strings whose signatures could not be verified.
    pub unverified: BTreeSet<String>,
}

impl UnauthorizedAction {
    /// Required identities without a verified signature.
    pub fn missing(&self) -> BTreeSet<Identity> {
        self.required.difference(&self.verified).cloned().collect()
    }
}

impl fmt::Display for UnauthorizedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<String> = self.missing().iter().map(Identity::to_string).collect();
        write!(f, "Missing authorization by {}.", missing.join(", "))?;
        if !self.unverified.is_empty() {
            let failed: Vec<&str> = self.unverified.iter().map(String::as_str).collect();
            write!(f, "\n  Note: Failed to verify {}.", failed.join(", "))?;
        }
        Ok(())
    }
}
