//! # fedpost Store
//!
//! Storage abstraction for fedpost. Provides a transactional, trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The engine hands closures to [`Store::atomic`], which runs them against a
//! [`StoreTx`] inside one transaction. The primary implementation is
//! [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fedpost_store::{SqliteStore, Store, StoreError};
//!
//! async fn example() -> Result<(), StoreError> {
//!     let store = SqliteStore::open("fedpost.db")?;
//!
//!     let server = store
//!         .atomic(|tx| match tx.server_by_name("aaa")? {
//!             Some(server) => Ok(server),
//!             None => tx.insert_server("aaa", fedpost_core::now_millis()),
//!         })
//!         .await?;
//!     println!("server {} has id {}", server.name, server.id);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent event inserts**: inserting the same event twice returns `AlreadyExists`
//! - **Upserts never unlink**: signature rows keep their post link once set
//! - **Unique constraints**: servers by name, users by (server, name), posts by
//!   (server, path), signatures by (event, user), unverified by (event, identity)

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store, StoreTx};
