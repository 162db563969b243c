//! Registry and content records as they are stored.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::crypto::{Keypair, PublicKey, SignatureBlob};
use crate::event::Event;
use crate::identity::Identity;
use crate::post::PostData;
use crate::types::{EventId, KeyPairId, PostId, ServerId, UserId};

/// A federation peer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub engine_name: Option<String>,
    pub engine_version: Option<String>,
    pub is_local: bool,
    pub created_at: i64,
}

/// A user, scoped to exactly one server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub server_id: ServerId,
    pub identity: Identity,
    pub created_at: i64,
}

/// A key bound to a user.
///
/// `secret` holds the Ed25519 seed only when the key was generated or
/// imported locally.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub id: KeyPairId,
    pub user_id: UserId,
    pub public_key: PublicKey,
    pub secret: Option<[u8; 32]>,
    pub created_at: i64,
}

impl KeyPair {
    /// A signer for this key, if the secret half is held locally.
    pub fn signer(&self) -> Option<Keypair> {
        self.secret.as_ref().map(Keypair::from_seed)
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("public_key", &self.public_key)
            .field("has_secret", &self.has_secret())
            .finish()
    }
}

/// A post keyed by (server, path).
///
/// `id` is `None` for a shell that has not been saved yet.
#[derive(Clone, Debug, PartialEq)]
pub struct Post {
    pub id: Option<PostId>,
    pub server_id: ServerId,
    pub server: String,
    pub path: String,
    pub data: PostData,
    pub created_at: i64,
    pub modified_at: i64,
}

impl Post {
    /// An unsaved, empty post.
    pub fn shell(server_id: ServerId, server: impl Into<String>, path: impl Into<String>) -> Self {
        let now = crate::now_millis();
        Self {
            id: None,
            server_id,
            server: server.into(),
            path: path.into(),
            data: PostData::new(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn is_saved(&self) -> bool {
        self.id.is_some()
    }
}

/// Proof that an event's candidate was signed by a known key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignatureRecord {
    pub event_id: EventId,
    pub keypair_id: KeyPairId,
    pub user_id: UserId,
    pub identity: Identity,
    pub data: SignatureBlob,
    /// Set only when the event committed a content change.
    pub post_id: Option<PostId>,
    pub created_at: i64,
}

/// A signature that could not be matched to any known key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnverifiedSignatureRecord {
    pub event_id: EventId,
    /// The claimed identity exactly as received.
    pub identity: String,
    pub data: SignatureBlob,
    pub post_id: Option<PostId>,
    pub created_at: i64,
}

/// A durably recorded event.
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    pub id: EventId,
    pub event: Event,
    pub received_at: i64,
}

/// Kinds of relation recorded on commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// user wrote post
    Wrote,
    /// post comments on post
    Comments,
}

impl RelationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wrote => "wrote",
            Self::Comments => "comments",
        }
    }
}
