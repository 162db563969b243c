//! The Engine: event authorization and commit.
//!
//! One call to [`Engine::process_event`] is one store transaction:
//!
//! 1. record the event (idempotent by content address)
//! 2. resolve the target post, or an unsaved shell for it
//! 3. merge the diff in memory to get the candidate content
//! 4. compute the required authors from the policy
//! 5. verify every attached signature against the candidate
//! 6. quorum: verified identities must be a superset of the required ones
//! 7. commit path: save the post, then relations, then signatures
//!    reject path: save only signature evidence, with no post link
//!
//! A rejection still commits the transaction, so signature evidence is never
//! lost. Any store error rolls everything back.

use std::collections::BTreeSet;
use std::sync::Arc;

use fedpost_auth::{AuthorshipPolicy, PolicyInput, Quorum, UnauthorizedAction};
use fedpost_core::{
    now_millis, signed_message, verify_claim, Event, EventId, EventRecord, Identity, KeyPair,
    Keypair, Post, PostId, PostRef, PublicKey, RelationKind, Server, SignatureBlob,
    SignatureRecord, UnverifiedSignatureRecord, User, Verdict,
};
use fedpost_store::{InsertResult, Store, StoreTx};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::content;
use crate::error::{EngineError, Result};
use crate::registry::{self, TxKeys};

/// A successfully authorized event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub event_id: EventId,
    /// The post that was created or updated. `None` for verification-only.
    pub post_id: Option<PostId>,
    /// Whether this call created the post.
    pub created: bool,
    pub verified: BTreeSet<Identity>,
    pub unverified: BTreeSet<String>,
}

/// What a transaction decided. Both variants commit their bookkeeping.
#[derive(Debug)]
enum Outcome {
    Committed(Committed),
    Rejected(UnauthorizedAction),
}

/// Per-call inputs moved into the transaction closure.
#[derive(Clone)]
struct ProcessContext {
    policy: Arc<dyn AuthorshipPolicy>,
    create_unknown_servers: bool,
}

/// The main Engine struct.
///
/// Provides:
/// - Event processing and revalidation
/// - Identity & key registry operations
/// - Read access to posts, authors, comments and signature evidence
pub struct Engine<S: Store> {
    store: Arc<S>,
    policy: Arc<dyn AuthorshipPolicy>,
    config: EngineConfig,
}

impl<S: Store> Engine<S> {
    /// Open an engine over `store`, registering the local server.
    pub async fn open(store: S, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let local = config.local_server.clone();
        let engine_name = config.engine_name.clone();
        let engine_version = config.engine_version.clone();
        let server = store
            .atomic(move |tx| {
                let server = registry::resolve_server(tx, &local, true, now_millis())?;
                tx.set_local_server(server.id, &engine_name, &engine_version)?;
                Ok::<_, EngineError>(server)
            })
            .await?;

        info!(
            local_server = %server.name,
            engine = %config.engine_name,
            version = %config.engine_version,
            policy = ?config.policy,
            "engine opened"
        );

        Ok(Self {
            store: Arc::new(store),
            policy: config.policy.build(),
            config,
        })
    }

    /// Replace the authorship policy.
    pub fn with_policy(mut self, policy: Arc<dyn AuthorshipPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn policy(&self) -> &dyn AuthorshipPolicy {
        self.policy.as_ref()
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The server row of the local instance.
    pub async fn local_server(&self) -> Result<Server> {
        let name = self.config.local_server.clone();
        self.store
            .atomic(move |tx| {
                tx.local_server()?
                    .ok_or(EngineError::UnknownServer(name))
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event Processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Authorize and apply an event.
    ///
    /// Returns [`EngineError::Unauthorized`] when the quorum is not met. In
    /// that case signature evidence has been stored and the post is
    /// unchanged.
    pub async fn process_event(&self, event: Event) -> Result<Committed> {
        let ctx = ProcessContext {
            policy: self.policy.clone(),
            create_unknown_servers: self.config.create_unknown_servers,
        };

        let outcome = self
            .store
            .atomic(move |tx| process(tx, &ctx, &event))
            .await?;

        match outcome {
            Outcome::Committed(committed) => Ok(committed),
            Outcome::Rejected(action) => Err(EngineError::Unauthorized(action)),
        }
    }

    /// Parse an event from its JSON wire form and process it.
    pub async fn process_json(&self, json: &str) -> Result<Committed> {
        self.process_event(Event::from_json(json)?).await
    }

    /// Process a previously recorded event again, e.g. after new keys were
    /// added for an identity whose signature did not verify.
    pub async fn reprocess(&self, id: &EventId) -> Result<Committed> {
        let record = self
            .event(id)
            .await?
            .ok_or(EngineError::UnknownEvent(*id))?;
        self.process_event(record.event).await
    }

    /// A recorded event.
    pub async fn event(&self, id: &EventId) -> Result<Option<EventRecord>> {
        let id = *id;
        Ok(self.store.atomic(move |tx| tx.event(&id)).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Registry Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolve or create a server.
    pub async fn register_server(&self, name: &str) -> Result<Server> {
        let name = name.to_string();
        self.store
            .atomic(move |tx| registry::resolve_server(tx, &name, true, now_millis()))
            .await
    }

    /// Resolve an identity to a user, creating it when `create` is set.
    pub async fn resolve_user(&self, identity: &Identity, create: bool) -> Result<User> {
        let identity = identity.clone();
        self.store
            .atomic(move |tx| registry::resolve_user(tx, &identity, create, now_millis()))
            .await
    }

    /// Bind a public key (and optionally its secret seed) to an identity,
    /// creating the user when needed.
    pub async fn add_keypair(
        &self,
        identity: &Identity,
        public_key: PublicKey,
        secret: Option<[u8; 32]>,
    ) -> Result<KeyPair> {
        if let Some(seed) = &secret {
            if Keypair::from_seed(seed).public_key() != public_key {
                return Err(EngineError::Core(fedpost_core::CoreError::InvalidPublicKey));
            }
        }
        let identity = identity.clone();
        let keypair = self
            .store
            .atomic(move |tx| {
                let now = now_millis();
                let user = registry::resolve_user(tx, &identity, true, now)?;
                Ok::<_, EngineError>(tx.insert_keypair(user.id, &public_key, secret.as_ref(), now)?)
            })
            .await?;
        debug!(keypair = %keypair.id, public_key = %keypair.public_key, "keypair bound");
        Ok(keypair)
    }

    /// Generate a new locally-held keypair for an identity.
    pub async fn generate_keypair(&self, identity: &Identity) -> Result<KeyPair> {
        let keypair = Keypair::generate();
        self.add_keypair(identity, keypair.public_key(), Some(keypair.seed()))
            .await
    }

    /// All keys bound to an identity.
    pub async fn keypairs(&self, identity: &Identity) -> Result<Vec<KeyPair>> {
        let identity = identity.clone();
        self.store
            .atomic(move |tx| {
                let user = registry::resolve_user(tx, &identity, false, now_millis())?;
                Ok(tx.keypairs_for_user(user.id)?)
            })
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Read Access
    // ─────────────────────────────────────────────────────────────────────────

    /// The post at (server, path), if it was ever committed.
    pub async fn post(&self, server: &str, path: &str) -> Result<Option<Post>> {
        let (server, path) = (server.to_string(), path.to_string());
        Ok(self
            .store
            .atomic(move |tx| tx.post_by_path(&server, &path))
            .await?)
    }

    /// Identities recorded as authors of a post.
    pub async fn post_authors(&self, server: &str, path: &str) -> Result<BTreeSet<Identity>> {
        self.with_post(server, path, |tx, id| content::authors(tx, id))
            .await
    }

    /// The comment tree under a post, as `(comment, depth)` pairs.
    pub async fn comments(&self, server: &str, path: &str) -> Result<Vec<(Post, usize)>> {
        self.with_post(server, path, |tx, id| content::comment_tree(tx, id))
            .await
    }

    pub async fn signatures_for_event(&self, id: &EventId) -> Result<Vec<SignatureRecord>> {
        let id = *id;
        Ok(self
            .store
            .atomic(move |tx| tx.signatures_for_event(&id))
            .await?)
    }

    pub async fn unverified_for_event(&self, id: &EventId) -> Result<Vec<UnverifiedSignatureRecord>> {
        let id = *id;
        Ok(self
            .store
            .atomic(move |tx| tx.unverified_for_event(&id))
            .await?)
    }

    pub async fn signatures_for_post(&self, server: &str, path: &str) -> Result<Vec<SignatureRecord>> {
        self.with_post(server, path, |tx, id| Ok(tx.signatures_for_post(id)?))
            .await
    }

    pub async fn unverified_for_post(
        &self,
        server: &str,
        path: &str,
    ) -> Result<Vec<UnverifiedSignatureRecord>> {
        self.with_post(server, path, |tx, id| Ok(tx.unverified_for_post(id)?))
            .await
    }

    async fn with_post<T, F>(&self, server: &str, path: &str, f: F) -> Result<T>
    where
        F: FnOnce(&dyn StoreTx, PostId) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let target = PostRef::new(server, path);
        self.store
            .atomic(move |tx| {
                let id = tx
                    .post_by_path(&target.server, &target.path)?
                    .and_then(|p| p.id)
                    .ok_or_else(|| EngineError::UnknownPost(target.clone()))?;
                f(&*tx, id)
            })
            .await
    }
}

/// The whole of one event's processing, inside a transaction.
fn process(tx: &mut dyn StoreTx, ctx: &ProcessContext, event: &Event) -> Result<Outcome> {
    let now = now_millis();
    let event_id = event.id();

    // Nothing is written for an event whose parent does not exist.
    let parent = match &event.parent {
        Some(parent) => Some(
            tx.post_by_path(&parent.server, &parent.path)?
                .and_then(|p| p.id)
                .ok_or_else(|| EngineError::UnknownPost(parent.clone()))?,
        ),
        None => None,
    };

    if tx.insert_event(&event_id, event, now)? == InsertResult::AlreadyExists {
        debug!(%event_id, "event seen before, revalidating");
    }

    let mut post = match &event.path {
        Some(path) => {
            let server =
                registry::resolve_server(tx, &event.server, ctx.create_unknown_servers, now)?;
            Some(content::resolve_or_create(&*tx, &server, path)?)
        }
        None => None,
    };

    let current = post.as_ref().map(|p| p.data.clone()).unwrap_or_default();
    let data = event.prospective_data(&current);
    let message = signed_message(&event.candidate(data.clone()));

    let existing_authors = match post.as_ref().and_then(|p| p.id) {
        Some(id) => content::authors(&*tx, id)?,
        None => BTreeSet::new(),
    };
    let required = ctx.policy.required_authors(&PolicyInput {
        event,
        existing_authors: &existing_authors,
        post_exists: post.as_ref().is_some_and(Post::is_saved),
    });

    let mut quorum = Quorum::new(required);
    let mut verified: Vec<(String, Identity, KeyPair, SignatureBlob)> = Vec::new();
    let mut unverified: Vec<(String, SignatureBlob)> = Vec::new();
    {
        let keys = TxKeys(&*tx);
        for (claimed, blob) in &event.signatures {
            match verify_claim(&keys, &message, claimed, blob)? {
                Verdict::Verified { identity, keypair } => {
                    quorum.record_verified(identity.clone());
                    verified.push((claimed.clone(), identity, keypair, blob.clone()));
                }
                Verdict::Failed(failure) => {
                    debug!(%event_id, identity = %claimed, %failure, "signature not verified");
                    quorum.record_unverified(claimed.clone());
                    unverified.push((claimed.clone(), blob.clone()));
                }
            }
        }
    }

    let decision = quorum.decide();

    // Commit path: the post must exist before anything links to it.
    let mut created = false;
    let post_id = match (&decision, post.as_mut()) {
        (Ok(()), Some(post)) => {
            created = !post.is_saved();
            let id = content::save(tx, post, data, now)?;
            for author in event.author_set() {
                let user = registry::resolve_user(tx, &author, true, now)?;
                tx.relate_user(RelationKind::Wrote, user.id, id, now)?;
            }
            if let Some(parent) = parent {
                tx.relate_post(RelationKind::Comments, id, parent, now)?;
            }
            Some(id)
        }
        _ => None,
    };

    record_signatures(tx, &event_id, post_id, verified, unverified, now)?;

    match decision {
        Ok(()) => {
            info!(
                %event_id,
                server = %event.server,
                path = event.path.as_deref().unwrap_or("-"),
                created,
                verified = quorum.verified().len(),
                unverified = quorum.unverified().len(),
                "event committed"
            );
            Ok(Outcome::Committed(Committed {
                event_id,
                post_id,
                created,
                verified: quorum.verified().clone(),
                unverified: quorum.unverified().clone(),
            }))
        }
        Err(action) => {
            warn!(
                %event_id,
                server = %event.server,
                path = event.path.as_deref().unwrap_or("-"),
                missing = ?action.missing(),
                "event rejected"
            );
            Ok(Outcome::Rejected(action))
        }
    }
}

/// Persist one row per attached signature.
///
/// A verified identity replaces any unverified row it had for this event.
/// An unverified blob is not recorded for an identity that already holds a
/// verified row for the event.
fn record_signatures(
    tx: &mut dyn StoreTx,
    event_id: &EventId,
    post_id: Option<PostId>,
    verified: Vec<(String, Identity, KeyPair, SignatureBlob)>,
    unverified: Vec<(String, SignatureBlob)>,
    now: i64,
) -> Result<()> {
    for (claimed, identity, keypair, blob) in verified {
        tx.upsert_signature(&SignatureRecord {
            event_id: *event_id,
            keypair_id: keypair.id,
            user_id: keypair.user_id,
            identity,
            data: blob,
            post_id,
            created_at: now,
        })?;
        if tx.delete_unverified(event_id, &claimed)? > 0 {
            debug!(%event_id, identity = %claimed, "unverified signature superseded");
        }
    }

    let already_verified: BTreeSet<String> = tx
        .signatures_for_event(event_id)?
        .into_iter()
        .map(|s| s.identity.to_string())
        .collect();

    for (claimed, blob) in unverified {
        if already_verified.contains(&claimed) {
            continue;
        }
        tx.upsert_unverified(&UnverifiedSignatureRecord {
            event_id: *event_id,
            identity: claimed,
            data: blob,
            post_id,
            created_at: now,
        })?;
    }
    Ok(())
}
