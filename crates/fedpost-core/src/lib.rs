//! # fedpost Core
//!
//! Pure primitives for fedpost: identities, keys, candidate content,
//! partial-update merging, and signature verification.
//!
//! This crate contains no I/O, no storage, no networking. It is pure computation
//! over signed change requests.
//!
//! ## Key Types
//!
//! - [`Identity`] - A `user@server` identity scoped to a federation peer
//! - [`Event`] - A signed request to change a post's content
//! - [`Diff`] - Partial update: `null` removes a key, anything else sets it
//! - [`Candidate`] - The prospective content that signatures cover
//! - [`KeyPair`] - A stored Ed25519 key bound to a user
//!
//! ## Canonicalization
//!
//! Candidates are encoded as compact JSON with recursively sorted keys.
//! See [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod event;
pub mod identity;
pub mod model;
pub mod post;
pub mod types;
pub mod verification;

pub use canonical::{
    canonical_candidate, canonical_json, sign_candidate, signed_message, Candidate,
    CANONICAL_VERSION, SIGN_DOMAIN,
};
pub use crypto::{Keypair, PublicKey, SignatureBlob};
pub use error::{CoreError, VerificationFailure};
pub use event::{Event, EventBuilder};
pub use identity::{Identity, PostRef};
pub use model::{
    EventRecord, KeyPair, Post, RelationKind, Server, SignatureRecord, UnverifiedSignatureRecord,
    User,
};
pub use post::{merge_diff, Diff, PostData};
pub use types::{EventId, KeyPairId, PostId, ServerId, UserId};
pub use verification::{verify_claim, verify_with_keys, KeyLookup, Verdict};

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
