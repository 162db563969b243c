//! Signature verification against a key registry snapshot.
//!
//! Verification is pure: it reads keys through [`KeyLookup`] and never
//! writes. Any key of the claimed identity may match; the order keys are
//! tried in does not matter.

use std::collections::BTreeMap;
use std::convert::Infallible;

use tracing::debug;

use crate::crypto::SignatureBlob;
use crate::error::VerificationFailure;
use crate::identity::Identity;
use crate::model::KeyPair;

/// Read access to the keys bound to an identity.
pub trait KeyLookup {
    type Error;

    /// Keys of the identity, or `None` when the identity is unknown.
    fn keys_for(&self, identity: &Identity) -> Result<Option<Vec<KeyPair>>, Self::Error>;
}

impl KeyLookup for BTreeMap<Identity, Vec<KeyPair>> {
    type Error = Infallible;

    fn keys_for(&self, identity: &Identity) -> Result<Option<Vec<KeyPair>>, Infallible> {
        Ok(self.get(identity).cloned())
    }
}

/// Outcome of verifying one claimed signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Verified { identity: Identity, keypair: KeyPair },
    Failed(VerificationFailure),
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }
}

/// Verify one `(claimed identity, blob)` pair over `message`.
///
/// Only lookup errors are returned as `Err`. Every cryptographic or
/// identity problem is a [`Verdict::Failed`].
pub fn verify_claim<L: KeyLookup + ?Sized>(
    lookup: &L,
    message: &[u8],
    claimed: &str,
    blob: &SignatureBlob,
) -> Result<Verdict, L::Error> {
    let Ok(identity) = Identity::parse(claimed) else {
        return Ok(Verdict::Failed(VerificationFailure::UnknownIdentity(
            claimed.to_string(),
        )));
    };
    let Some(keys) = lookup.keys_for(&identity)? else {
        return Ok(Verdict::Failed(VerificationFailure::UnknownIdentity(
            claimed.to_string(),
        )));
    };
    Ok(verify_with_keys(&keys, message, identity, blob))
}

/// Try every key in turn; the first match wins.
pub fn verify_with_keys(
    keys: &[KeyPair],
    message: &[u8],
    identity: Identity,
    blob: &SignatureBlob,
) -> Verdict {
    if !blob.is_well_formed() {
        return Verdict::Failed(VerificationFailure::MalformedSignature {
            identity: identity.to_string(),
            reason: format!("expected 64 bytes, got {}", blob.as_bytes().len()),
        });
    }

    for key in keys {
        if key.public_key.verify(message, blob).is_ok() {
            debug!(%identity, keypair = %key.id, "signature verified");
            return Verdict::Verified {
                identity,
                keypair: key.clone(),
            };
        }
    }

    debug!(%identity, tried = keys.len(), "no key matched signature");
    Verdict::Failed(VerificationFailure::NoMatchingKey {
        identity: identity.to_string(),
        tried: keys.len(),
    })
}
