//! Store traits: the abstract interface for fedpost persistence.
//!
//! The engine never talks to a backend directly. It hands a closure to
//! [`Store::atomic`], which runs it against a [`StoreTx`] inside one
//! transaction. Returning `Ok` commits every write the closure made;
//! returning `Err` rolls all of them back.

use async_trait::async_trait;
use fedpost_core::{
    Event, EventId, EventRecord, Identity, KeyPair, Post, PostId, PublicKey, RelationKind, Server,
    ServerId, SignatureRecord, UnverifiedSignatureRecord, User, UserId,
};

use crate::error::{Result, StoreError};

/// Result of inserting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Event was inserted.
    Inserted,
    /// Event already exists (idempotent, not an error).
    AlreadyExists,
}

/// The Store trait: async, transactional entry point.
///
/// For SQLite, the closure runs on `spawn_blocking` while holding the
/// connection, inside an `IMMEDIATE` transaction. Two transactions never
/// interleave, so concurrent events touching the same post are serialized.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Run `f` in a single transaction. Commit on `Ok`, roll back on `Err`.
    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static;
}

/// Operations available inside a transaction.
///
/// All methods are synchronous: a transaction is one uninterrupted unit
/// of work. Reads see the transaction's own pending writes.
pub trait StoreTx {
    // ─────────────────────────────────────────────────────────────────────────
    // Servers
    // ─────────────────────────────────────────────────────────────────────────

    fn server_by_name(&self, name: &str) -> Result<Option<Server>>;

    fn insert_server(&mut self, name: &str, now: i64) -> Result<Server>;

    /// The server flagged as the local instance, if any.
    fn local_server(&self) -> Result<Option<Server>>;

    /// Mark `id` as the only local server and record engine metadata on it.
    fn set_local_server(&mut self, id: ServerId, engine_name: &str, engine_version: &str)
        -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Users & keys
    // ─────────────────────────────────────────────────────────────────────────

    fn user_by_identity(&self, identity: &Identity) -> Result<Option<User>>;

    fn user(&self, id: UserId) -> Result<Option<User>>;

    fn insert_user(&mut self, server_id: ServerId, identity: &Identity, now: i64) -> Result<User>;

    /// All keys bound to a user, oldest first.
    fn keypairs_for_user(&self, user_id: UserId) -> Result<Vec<KeyPair>>;

    /// Bind a key to a user. Binding the same public key again returns the
    /// existing row, filling in the secret if it was missing.
    fn insert_keypair(
        &mut self,
        user_id: UserId,
        public_key: &PublicKey,
        secret: Option<&[u8; 32]>,
        now: i64,
    ) -> Result<KeyPair>;

    // ─────────────────────────────────────────────────────────────────────────
    // Posts
    // ─────────────────────────────────────────────────────────────────────────

    fn post_by_path(&self, server: &str, path: &str) -> Result<Option<Post>>;

    fn post(&self, id: PostId) -> Result<Option<Post>>;

    /// Insert an unsaved post and return its new id.
    fn insert_post(&mut self, post: &Post) -> Result<PostId>;

    /// Overwrite data and modification time of a saved post.
    fn update_post(&mut self, post: &Post) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Record an event. Re-inserting the same id is a no-op.
    fn insert_event(&mut self, id: &EventId, event: &Event, now: i64) -> Result<InsertResult>;

    fn event(&self, id: &EventId) -> Result<Option<EventRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Signatures
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or refresh the verified signature of `(event, user)`.
    ///
    /// An existing post link is never cleared by a later `None`.
    fn upsert_signature(&mut self, record: &SignatureRecord) -> Result<()>;

    /// Insert or refresh the unverified signature of `(event, identity)`.
    ///
    /// An existing post link is never cleared by a later `None`.
    fn upsert_unverified(&mut self, record: &UnverifiedSignatureRecord) -> Result<()>;

    /// Delete the unverified signature of `(event, identity)`. Returns the
    /// number of rows removed.
    fn delete_unverified(&mut self, event_id: &EventId, identity: &str) -> Result<usize>;

    fn signatures_for_event(&self, event_id: &EventId) -> Result<Vec<SignatureRecord>>;

    fn signatures_for_post(&self, post_id: PostId) -> Result<Vec<SignatureRecord>>;

    fn unverified_for_event(&self, event_id: &EventId) -> Result<Vec<UnverifiedSignatureRecord>>;

    fn unverified_for_post(&self, post_id: PostId) -> Result<Vec<UnverifiedSignatureRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Relations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record `user -kind-> post`. Insert-or-ignore.
    fn relate_user(&mut self, kind: RelationKind, user_id: UserId, post_id: PostId, now: i64)
        -> Result<()>;

    /// Record `from -kind-> to`. Insert-or-ignore.
    fn relate_post(&mut self, kind: RelationKind, from: PostId, to: PostId, now: i64)
        -> Result<()>;

    /// Users with a `kind` relation to the post, by user id.
    fn users_related(&self, kind: RelationKind, post_id: PostId) -> Result<Vec<User>>;

    /// Posts with a `kind` relation pointing at `target`, oldest first.
    fn posts_related(&self, kind: RelationKind, target: PostId) -> Result<Vec<Post>>;
}
