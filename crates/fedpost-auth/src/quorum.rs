//! Quorum computation.
//!
//! A quorum is met when the set of identities with a verified signature is
//! a superset of the required authors. It is a set test, not a count: any
//! number of signatures from one identity never stands in for another.

use std::collections::BTreeSet;

use fedpost_core::Identity;

use crate::error::UnauthorizedAction;

/// Signature outcomes for one event, tallied against the required authors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quorum {
    required: BTreeSet<Identity>,
    verified: BTreeSet<Identity>,
    unverified: BTreeSet<String>,
}

impl Quorum {
    pub fn new(required: BTreeSet<Identity>) -> Self {
        Self {
            required,
            ..Self::default()
        }
    }

    /// Record a signature that verified.
    pub fn record_verified(&mut self, identity: Identity) {
        self.verified.insert(identity);
    }

    /// Record a claimed identity whose signature did not verify.
    pub fn record_unverified(&mut self, claimed: impl Into<String>) {
        self.unverified.insert(claimed.into());
    }

    pub fn required(&self) -> &BTreeSet<Identity> {
        &self.required
    }

    pub fn verified(&self) -> &BTreeSet<Identity> {
        &self.verified
    }

    pub fn unverified(&self) -> &BTreeSet<String> {
        &self.unverified
    }

    /// Required identities that have not verified.
    pub fn missing(&self) -> BTreeSet<Identity> {
        self.required.difference(&self.verified).cloned().collect()
    }

    pub fn is_satisfied(&self) -> bool {
        self.verified.is_superset(&self.required)
    }

    /// Decide the event: `Ok` when satisfied, otherwise the full tally.
    pub fn decide(&self) -> Result<(), UnauthorizedAction> {
        if self.is_satisfied() {
            return Ok(());
        }
        Err(UnauthorizedAction {
            required: self.required.clone(),
            verified: self.verified.clone(),
            unverified: self.unverified.clone(),
        })
    }
}
