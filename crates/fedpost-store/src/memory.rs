//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use fedpost_core::{
    Event, EventId, EventRecord, Identity, KeyPair, KeyPairId, Post, PostId, PublicKey,
    RelationKind, Server, ServerId, SignatureRecord, UnverifiedSignatureRecord, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store, StoreTx};

/// In-memory store implementation.
///
/// A transaction works on a copy of the state; the copy replaces the
/// original only when the closure returns `Ok`.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Clone, Default)]
struct MemoryState {
    servers: BTreeMap<ServerId, Server>,
    users: BTreeMap<UserId, User>,
    keypairs: BTreeMap<KeyPairId, KeyPair>,
    posts: BTreeMap<PostId, Post>,
    events: HashMap<EventId, EventRecord>,
    signatures: BTreeMap<(EventId, UserId), SignatureRecord>,
    unverified: BTreeMap<(EventId, String), UnverifiedSignatureRecord>,
    user_relations: BTreeMap<(RelationKind, UserId, PostId), i64>,
    post_relations: BTreeMap<(RelationKind, PostId, PostId), i64>,
    last_server: i64,
    last_user: i64,
    last_keypair: i64,
    last_post: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn run<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let mut guard = self
            .state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {e}")))?;
        let mut working = guard.clone();
        let value = f(&mut MemoryTx {
            state: &mut working,
        })?;
        *guard = working;
        Ok(value)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        self.run(f)
    }
}

struct MemoryTx<'a> {
    state: &'a mut MemoryState,
}

impl MemoryTx<'_> {
    fn server_name(&self, id: ServerId) -> Result<String> {
        self.state
            .servers
            .get(&id)
            .map(|s| s.name.clone())
            .ok_or_else(|| StoreError::NotFound(format!("server {id}")))
    }
}

impl StoreTx for MemoryTx<'_> {
    fn server_by_name(&self, name: &str) -> Result<Option<Server>> {
        Ok(self.state.servers.values().find(|s| s.name == name).cloned())
    }

    fn insert_server(&mut self, name: &str, now: i64) -> Result<Server> {
        if self.server_by_name(name)?.is_some() {
            return Err(StoreError::InvalidData(format!(
                "server {name:?} already exists"
            )));
        }
        let server = Server {
            id: ServerId(next_id(&mut self.state.last_server)),
            name: name.to_string(),
            engine_name: None,
            engine_version: None,
            is_local: false,
            created_at: now,
        };
        self.state.servers.insert(server.id, server.clone());
        Ok(server)
    }

    fn local_server(&self) -> Result<Option<Server>> {
        Ok(self.state.servers.values().find(|s| s.is_local).cloned())
    }

    fn set_local_server(
        &mut self,
        id: ServerId,
        engine_name: &str,
        engine_version: &str,
    ) -> Result<()> {
        if !self.state.servers.contains_key(&id) {
            return Err(StoreError::NotFound(format!("server {id}")));
        }
        for server in self.state.servers.values_mut() {
            server.is_local = server.id == id;
            if server.id == id {
                server.engine_name = Some(engine_name.to_string());
                server.engine_version = Some(engine_version.to_string());
            }
        }
        Ok(())
    }

    fn user_by_identity(&self, identity: &Identity) -> Result<Option<User>> {
        Ok(self
            .state
            .users
            .values()
            .find(|u| &u.identity == identity)
            .cloned())
    }

    fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.users.get(&id).cloned())
    }

    fn insert_user(&mut self, server_id: ServerId, identity: &Identity, now: i64) -> Result<User> {
        let server = self.server_name(server_id)?;
        if server != identity.server() {
            return Err(StoreError::InvalidData(format!(
                "{identity} does not belong to server {server}"
            )));
        }
        if self.user_by_identity(identity)?.is_some() {
            return Err(StoreError::InvalidData(format!("{identity} already exists")));
        }
        let user = User {
            id: UserId(next_id(&mut self.state.last_user)),
            server_id,
            identity: identity.clone(),
            created_at: now,
        };
        self.state.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn keypairs_for_user(&self, user_id: UserId) -> Result<Vec<KeyPair>> {
        Ok(self
            .state
            .keypairs
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect())
    }

    fn insert_keypair(
        &mut self,
        user_id: UserId,
        public_key: &PublicKey,
        secret: Option<&[u8; 32]>,
        now: i64,
    ) -> Result<KeyPair> {
        if !self.state.users.contains_key(&user_id) {
            return Err(StoreError::NotFound(format!("user {user_id}")));
        }
        if let Some(existing) = self
            .state
            .keypairs
            .values_mut()
            .find(|k| k.user_id == user_id && &k.public_key == public_key)
        {
            if existing.secret.is_none() {
                existing.secret = secret.copied();
            }
            return Ok(existing.clone());
        }
        let keypair = KeyPair {
            id: KeyPairId(next_id(&mut self.state.last_keypair)),
            user_id,
            public_key: *public_key,
            secret: secret.copied(),
            created_at: now,
        };
        self.state.keypairs.insert(keypair.id, keypair.clone());
        Ok(keypair)
    }

    fn post_by_path(&self, server: &str, path: &str) -> Result<Option<Post>> {
        Ok(self
            .state
            .posts
            .values()
            .find(|p| p.server == server && p.path == path)
            .cloned())
    }

    fn post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self.state.posts.get(&id).cloned())
    }

    fn insert_post(&mut self, post: &Post) -> Result<PostId> {
        if post.is_saved() {
            return Err(StoreError::InvalidData(format!(
                "post {}{} is already saved",
                post.server, post.path
            )));
        }
        let server = self.server_name(post.server_id)?;
        if self.post_by_path(&server, &post.path)?.is_some() {
            return Err(StoreError::InvalidData(format!(
                "post {server}{} already exists",
                post.path
            )));
        }
        let id = PostId(next_id(&mut self.state.last_post));
        let mut stored = post.clone();
        stored.id = Some(id);
        stored.server = server;
        self.state.posts.insert(id, stored);
        Ok(id)
    }

    fn update_post(&mut self, post: &Post) -> Result<()> {
        let id = post
            .id
            .ok_or_else(|| StoreError::InvalidData("cannot update an unsaved post".into()))?;
        let stored = self
            .state
            .posts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("post {id}")))?;
        stored.data = post.data.clone();
        stored.modified_at = post.modified_at;
        Ok(())
    }

    fn insert_event(&mut self, id: &EventId, event: &Event, now: i64) -> Result<InsertResult> {
        if self.state.events.contains_key(id) {
            return Ok(InsertResult::AlreadyExists);
        }
        self.state.events.insert(
            *id,
            EventRecord {
                id: *id,
                event: event.clone(),
                received_at: now,
            },
        );
        Ok(InsertResult::Inserted)
    }

    fn event(&self, id: &EventId) -> Result<Option<EventRecord>> {
        Ok(self.state.events.get(id).cloned())
    }

    fn upsert_signature(&mut self, record: &SignatureRecord) -> Result<()> {
        let key = (record.event_id, record.user_id);
        let mut record = record.clone();
        if let Some(existing) = self.state.signatures.get(&key) {
            record.post_id = record.post_id.or(existing.post_id);
            record.created_at = existing.created_at;
        }
        self.state.signatures.insert(key, record);
        Ok(())
    }

    fn upsert_unverified(&mut self, record: &UnverifiedSignatureRecord) -> Result<()> {
        let key = (record.event_id, record.identity.clone());
        let mut record = record.clone();
        if let Some(existing) = self.state.unverified.get(&key) {
            record.post_id = record.post_id.or(existing.post_id);
            record.created_at = existing.created_at;
        }
        self.state.unverified.insert(key, record);
        Ok(())
    }

    fn delete_unverified(&mut self, event_id: &EventId, identity: &str) -> Result<usize> {
        Ok(self
            .state
            .unverified
            .remove(&(*event_id, identity.to_string()))
            .map_or(0, |_| 1))
    }

    fn signatures_for_event(&self, event_id: &EventId) -> Result<Vec<SignatureRecord>> {
        Ok(self
            .state
            .signatures
            .values()
            .filter(|s| &s.event_id == event_id)
            .cloned()
            .collect())
    }

    fn signatures_for_post(&self, post_id: PostId) -> Result<Vec<SignatureRecord>> {
        let mut rows: Vec<SignatureRecord> = self
            .state
            .signatures
            .values()
            .filter(|s| s.post_id == Some(post_id))
            .cloned()
            .collect();
        rows.sort_by_key(|s| (s.created_at, s.user_id));
        Ok(rows)
    }

    fn unverified_for_event(&self, event_id: &EventId) -> Result<Vec<UnverifiedSignatureRecord>> {
        Ok(self
            .state
            .unverified
            .values()
            .filter(|s| &s.event_id == event_id)
            .cloned()
            .collect())
    }

    fn unverified_for_post(&self, post_id: PostId) -> Result<Vec<UnverifiedSignatureRecord>> {
        let mut rows: Vec<UnverifiedSignatureRecord> = self
            .state
            .unverified
            .values()
            .filter(|s| s.post_id == Some(post_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.created_at, &a.identity).cmp(&(b.created_at, &b.identity)));
        Ok(rows)
    }

    fn relate_user(
        &mut self,
        kind: RelationKind,
        user_id: UserId,
        post_id: PostId,
        now: i64,
    ) -> Result<()> {
        self.state
            .user_relations
            .entry((kind, user_id, post_id))
            .or_insert(now);
        Ok(())
    }

    fn relate_post(
        &mut self,
        kind: RelationKind,
        from: PostId,
        to: PostId,
        now: i64,
    ) -> Result<()> {
        self.state
            .post_relations
            .entry((kind, from, to))
            .or_insert(now);
        Ok(())
    }

    fn users_related(&self, kind: RelationKind, post_id: PostId) -> Result<Vec<User>> {
        Ok(self
            .state
            .user_relations
            .keys()
            .filter(|(k, _, p)| *k == kind && *p == post_id)
            .filter_map(|(_, user_id, _)| self.state.users.get(user_id).cloned())
            .collect())
    }

    fn posts_related(&self, kind: RelationKind, target: PostId) -> Result<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .state
            .post_relations
            .keys()
            .filter(|(k, _, to)| *k == kind && *to == target)
            .filter_map(|(_, from, _)| self.state.posts.get(from).cloned())
            .collect();
        posts.sort_by_key(|p| (p.created_at, p.id));
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedpost_core::{EventBuilder, Keypair, SignatureBlob};

    fn identity(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_rollback_discards_every_write() {
        let store = MemoryStore::new();

        let failed: Result<()> = store
            .atomic(|tx| {
                let server = tx.insert_server("aaa", 1)?;
                tx.insert_user(server.id, &identity("abraham@aaa"), 1)?;
                Err(StoreError::InvalidData("abort".into()))
            })
            .await;
        assert!(failed.is_err());

        let (server, user) = store
            .atomic(|tx| {
                Ok::<_, StoreError>((
                    tx.server_by_name("aaa")?,
                    tx.user_by_identity(&identity("abraham@aaa"))?,
                ))
            })
            .await
            .unwrap();
        assert!(server.is_none());
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn test_user_must_match_server() {
        let store = MemoryStore::new();
        let result: Result<User> = store
            .atomic(|tx| {
                let server = tx.insert_server("aaa", 1)?;
                tx.insert_user(server.id, &identity("abraham@bbb"), 1)
            })
            .await;
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
    }

    #[tokio::test]
    async fn test_signature_rows_unique_per_event_and_user() {
        let store = MemoryStore::new();
        let kp = Keypair::from_seed(&[1; 32]);
        let pk = kp.public_key();
        let event = EventBuilder::new("aaa").path("/p").build();
        let event_id = event.id();

        let rows = store
            .atomic(move |tx| {
                let server = tx.insert_server("aaa", 1)?;
                let user = tx.insert_user(server.id, &identity("abraham@aaa"), 1)?;
                let key = tx.insert_keypair(user.id, &pk, None, 1)?;
                tx.insert_event(&event_id, &event, 1)?;
                let post_id = tx.insert_post(&Post::shell(server.id, "aaa", "/p"))?;

                let mut record = SignatureRecord {
                    event_id,
                    keypair_id: key.id,
                    user_id: user.id,
                    identity: user.identity.clone(),
                    data: SignatureBlob(vec![0; 64]),
                    post_id: None,
                    created_at: 1,
                };
                tx.upsert_signature(&record)?;
                record.post_id = Some(post_id);
                tx.upsert_signature(&record)?;
                record.post_id = None;
                tx.upsert_signature(&record)?;
                tx.signatures_for_post(post_id)
            })
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
    }
}
