//! # fedpost Testkit
//!
//! Testing utilities for fedpost.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: canonical candidate encodings every signer must reproduce
//! - **Generators**: proptest strategies for identities, content and diffs
//! - **Fixtures**: an in-memory engine plus deterministic signers
//!
//! ## Golden Vectors
//!
//! ```rust
//! use fedpost_testkit::vectors::{all_vectors, verify_all_vectors};
//!
//! assert!(!all_vectors().is_empty());
//! verify_all_vectors().unwrap();
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use fedpost_testkit::fixtures::{Signer, TestFixture};
//! use fedpost::EventBuilder;
//!
//! let fixture = TestFixture::new("aaa").await;
//! let abraham = Signer::new("abraham@aaa", 1);
//! fixture.register(&abraham).await;
//!
//! let builder = EventBuilder::new("aaa").path("/post1").author(abraham.identity.clone());
//! let event = fixture.signed(builder.set("body", "hi"), &[&abraham]).await;
//! fixture.engine.process_event(event).await.unwrap();
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{corrupt, corrupt_signature, Signer, TestFixture};
pub use generators::{diff, identity, post_data};
pub use vectors::{all_vectors, verify_all_vectors, GoldenVector};
