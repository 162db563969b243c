//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn
        .query_row(
            "SELECT MAX(version) FROM schema_migrations",
            [],
            |row| row.get::<_, Option<u32>>(0),
        )
        .optional()?
        .flatten()
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, fedpost_core::now_millis()],
            )?;
            info!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Federation peers; at most one row is the local instance
        CREATE TABLE servers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            engine_name TEXT,
            engine_version TEXT,
            is_local INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX idx_servers_local ON servers(is_local) WHERE is_local = 1;

        CREATE TABLE users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER NOT NULL REFERENCES servers(id),
            name TEXT NOT NULL,
            created_at INTEGER NOT NULL,

            UNIQUE(server_id, name)
        );

        CREATE TABLE keypairs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            public_key BLOB NOT NULL,         -- 32 bytes, Ed25519
            secret BLOB,                      -- 32-byte seed, only for local keys
            created_at INTEGER NOT NULL,

            UNIQUE(user_id, public_key)
        );

        CREATE TABLE posts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            server_id INTEGER NOT NULL REFERENCES servers(id),
            path TEXT NOT NULL,
            data TEXT NOT NULL CHECK (json_valid(data) AND json_type(data) = 'object'),
            created_at INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,

            UNIQUE(server_id, path)
        );

        -- Every event ever processed, for revalidation
        CREATE TABLE events (
            event_id BLOB PRIMARY KEY,        -- 32 bytes, Blake3 of canonical event
            server TEXT NOT NULL,
            path TEXT,                        -- NULL for verification-only events
            body TEXT NOT NULL,               -- JSON wire form
            received_from TEXT,
            received_at INTEGER NOT NULL
        );

        CREATE TABLE signatures (
            event_id BLOB NOT NULL REFERENCES events(event_id),
            keypair_id INTEGER NOT NULL REFERENCES keypairs(id),
            user_id INTEGER NOT NULL REFERENCES users(id),
            data BLOB NOT NULL,
            post_id INTEGER REFERENCES posts(id),  -- NULL unless the event committed
            created_at INTEGER NOT NULL,

            PRIMARY KEY (event_id, user_id)
        );

        CREATE TABLE unverified_signatures (
            event_id BLOB NOT NULL REFERENCES events(event_id),
            identity TEXT NOT NULL,           -- claimed identity, verbatim
            data BLOB NOT NULL,
            post_id INTEGER REFERENCES posts(id),
            created_at INTEGER NOT NULL,

            PRIMARY KEY (event_id, identity)
        );

        CREATE TABLE user_post_relations (
            kind TEXT NOT NULL,
            user_id INTEGER NOT NULL REFERENCES users(id),
            post_id INTEGER NOT NULL REFERENCES posts(id),
            created_at INTEGER NOT NULL,

            PRIMARY KEY (kind, user_id, post_id)
        );

        CREATE TABLE post_post_relations (
            kind TEXT NOT NULL,
            from_post INTEGER NOT NULL REFERENCES posts(id),
            to_post INTEGER NOT NULL REFERENCES posts(id),
            created_at INTEGER NOT NULL,

            PRIMARY KEY (kind, from_post, to_post)
        );

        CREATE INDEX idx_keypairs_user ON keypairs(user_id);
        CREATE INDEX idx_signatures_post ON signatures(post_id);
        CREATE INDEX idx_unverified_post ON unverified_signatures(post_id);
        CREATE INDEX idx_user_post_post ON user_post_relations(kind, post_id);
        CREATE INDEX idx_post_post_to ON post_post_relations(kind, to_post);
        "#,
    )?;

    Ok(())
}
