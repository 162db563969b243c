//! # fedpost Auth
//!
//! Decides whether an event's verified signers are enough to apply it.
//!
//! ## Overview
//!
//! Authorization is computed, never stored. An [`AuthorshipPolicy`] names the
//! identities that must sign; a [`Quorum`] tallies which of them did. The
//! decision is a superset test over identities.
//!
//! ## Usage
//!
//! ```rust
//! use fedpost_auth::{AuthorshipPolicy, DeclaredAuthors, PolicyInput, Quorum};
//! use fedpost_core::{EventBuilder, Identity};
//! use std::collections::BTreeSet;
//!
//! let abraham = Identity::parse("abraham@aaa").unwrap();
//! let event = EventBuilder::new("aaa").path("/p").author(abraham.clone()).build();
//! let existing = BTreeSet::new();
//! let input = PolicyInput { event: &event, existing_authors: &existing, post_exists: false };
//!
//! let mut quorum = Quorum::new(DeclaredAuthors.required_authors(&input));
//! quorum.record_unverified("abraham@aaa");
//! let err = quorum.decide().unwrap_err();
//! assert!(err.missing().contains(&abraham));
//! ```

pub mod error;
pub mod policy;
pub mod quorum;

pub use error::{AuthError, Result, UnauthorizedAction};
pub use policy::{
    AuthorshipPolicy, DeclaredAndExisting, DeclaredAuthors, ExistingAuthors, PolicyInput,
    PolicyKind,
};
pub use quorum::Quorum;
