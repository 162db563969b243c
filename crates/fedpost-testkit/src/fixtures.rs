//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use fedpost::{Engine, EngineConfig, Event, EventBuilder, Identity, KeyPair, PolicyKind};
use fedpost_core::{Keypair, PostData, PublicKey, SignatureBlob};
use fedpost_store::MemoryStore;

/// An identity with a deterministic signing key.
#[derive(Clone)]
pub struct Signer {
    pub identity: Identity,
    pub keypair: Keypair,
}

impl Signer {
    /// `identity` is `user@server`; `seed` fills the 32-byte key seed.
    pub fn new(identity: &str, seed: u8) -> Self {
        Self::with_seed(identity, [seed; 32])
    }

    pub fn with_seed(identity: &str, seed: [u8; 32]) -> Self {
        Self {
            identity: Identity::parse(identity).expect("fixture identity must parse"),
            keypair: Keypair::from_seed(&seed),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// Claimed identity string as it appears in an event's signature map.
    pub fn claim(&self) -> String {
        self.identity.to_string()
    }
}

/// A test fixture around an engine over a fresh in-memory store.
pub struct TestFixture {
    pub engine: Engine<MemoryStore>,
}

impl TestFixture {
    /// Engine with default settings and the given local server.
    pub async fn new(local_server: &str) -> Self {
        Self::with_config(EngineConfig::new(local_server)).await
    }

    pub async fn with_policy(local_server: &str, policy: PolicyKind) -> Self {
        let mut config = EngineConfig::new(local_server);
        config.policy = policy;
        Self::with_config(config).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        let engine = Engine::open(MemoryStore::new(), config)
            .await
            .expect("engine over memory store must open");
        Self { engine }
    }

    /// Bind the signer's public key to its identity.
    pub async fn register(&self, signer: &Signer) -> KeyPair {
        self.engine
            .add_keypair(&signer.identity, signer.public_key(), None)
            .await
            .expect("keypair registration")
    }

    /// Current content of a post, empty if it does not exist.
    pub async fn current(&self, server: &str, path: &str) -> PostData {
        self.engine
            .post(server, path)
            .await
            .expect("post lookup")
            .map(|p| p.data)
            .unwrap_or_default()
    }

    /// Finish `builder`, signing its candidate with every signer against
    /// the post's current content.
    pub async fn signed(&self, builder: EventBuilder, signers: &[&Signer]) -> Event {
        let draft = builder.clone().build();
        let current = match &draft.path {
            Some(path) => self.current(&draft.server, path).await,
            None => PostData::new(),
        };
        signers
            .iter()
            .fold(builder, |b, s| b.sign(&s.identity, &s.keypair, &current))
            .build()
    }
}

/// Flip one bit of a signature so it no longer verifies.
pub fn corrupt(blob: &SignatureBlob) -> SignatureBlob {
    let mut bytes = blob.as_bytes().to_vec();
    if let Some(first) = bytes.first_mut() {
        *first ^= 0x01;
    }
    SignatureBlob::from_bytes(bytes)
}

/// Replace the signature claimed by `signer` with a corrupted copy.
pub fn corrupt_signature(mut event: Event, signer: &Signer) -> Event {
    if let Some(blob) = event.signatures.get(&signer.claim()).cloned() {
        event.signatures.insert(signer.claim(), corrupt(&blob));
    }
    event
}
