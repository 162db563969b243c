//! # fedpost
//!
//! Event authorization and commit for federated, signed posts.
//!
//! ## Overview
//!
//! A post lives on a server at a path and holds a JSON object. Changes to it
//! arrive as events: a diff plus signatures by the claimed authors over the
//! post's prospective content. The engine:
//!
//! - **Verifies** each signature against the keys registered for its identity
//! - **Authorizes** the change when the verified signers cover the required authors
//! - **Commits** content, authorship and comment relations in one transaction
//! - **Keeps evidence** of every signature, verified or not, even on rejection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fedpost::{Engine, EngineConfig, EventBuilder, Identity, PostData};
//! use fedpost::store::SqliteStore;
//!
//! async fn example() -> fedpost::Result<()> {
//!     let store = SqliteStore::open("fedpost.db")?;
//!     let engine = Engine::open(store, EngineConfig::new("aaa")).await?;
//!
//!     let abraham = Identity::parse("abraham@aaa")?;
//!     let key = engine.generate_keypair(&abraham).await?;
//!     let signer = key.signer().expect("generated locally");
//!
//!     let event = EventBuilder::new("aaa")
//!         .path("/post1")
//!         .author(abraham.clone())
//!         .set("title", "hello")
//!         .sign(&abraham, &signer, &PostData::new())
//!         .build();
//!
//!     let committed = engine.process_event(event).await?;
//!     println!("committed {}", committed.event_id);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `fedpost::core` - identities, events, canonical form, signatures
//! - `fedpost::store` - storage abstraction, SQLite and in-memory stores
//! - `fedpost::auth` - authorship policies and quorum evaluation

pub mod config;
pub mod engine;
pub mod error;

mod content;
mod registry;

pub use fedpost_auth as auth;
pub use fedpost_core as core;
pub use fedpost_store as store;

pub use config::EngineConfig;
pub use engine::{Committed, Engine};
pub use error::{EngineError, Result};

pub use fedpost_auth::{AuthorshipPolicy, PolicyKind, UnauthorizedAction};
pub use fedpost_core::{
    Diff, Event, EventBuilder, EventId, Identity, KeyPair, Keypair, Post, PostData, PostId,
    PostRef, PublicKey, SignatureBlob, SignatureRecord, UnverifiedSignatureRecord,
};
