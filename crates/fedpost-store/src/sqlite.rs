//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for fedpost. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use fedpost_core::{
    Event, EventId, EventRecord, Identity, KeyPair, KeyPairId, Post, PostData, PostId,
    PublicKey, RelationKind, Server, ServerId, SignatureBlob, SignatureRecord,
    UnverifiedSignatureRecord, User, UserId,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store, StoreTx};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. Each `atomic` call holds the connection
/// for the whole transaction.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn atomic<T, E, F>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut dyn StoreTx) -> std::result::Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<StoreError> + Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || -> std::result::Result<T, E> {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("mutex poisoned: {e}")))?;
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(StoreError::from)?;

            let result = {
                let mut handle = SqliteTx { conn: &tx };
                f(&mut handle)
            };

            match result {
                Ok(value) => {
                    tx.commit().map_err(StoreError::from)?;
                    Ok(value)
                }
                Err(e) => {
                    // Dropping the transaction rolls it back.
                    drop(tx);
                    debug!("transaction rolled back");
                    Err(e)
                }
            }
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("spawn_blocking failed: {e}")))?
    }
}

/// A live transaction on the SQLite connection.
struct SqliteTx<'a> {
    conn: &'a Connection,
}

const SERVER_COLUMNS: &str = "id, name, engine_name, engine_version, is_local, created_at";

const USER_SELECT: &str = "SELECT u.id, u.server_id, u.name, s.name, u.created_at
     FROM users u JOIN servers s ON s.id = u.server_id";

const KEYPAIR_COLUMNS: &str = "id, user_id, public_key, secret, created_at";

const POST_SELECT: &str =
    "SELECT p.id, p.server_id, s.name, p.path, p.data, p.created_at, p.modified_at
     FROM posts p JOIN servers s ON s.id = p.server_id";

const SIGNATURE_SELECT: &str = "SELECT sig.event_id, sig.keypair_id, sig.user_id, u.name, s.name,
            sig.data, sig.post_id, sig.created_at
     FROM signatures sig
     JOIN users u ON u.id = sig.user_id
     JOIN servers s ON s.id = u.server_id";

const UNVERIFIED_COLUMNS: &str = "event_id, identity, data, post_id, created_at";

fn conversion<E>(idx: usize, ty: Type, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(e))
}

fn event_id_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<EventId> {
    let bytes: Vec<u8> = row.get(idx)?;
    EventId::try_from(bytes.as_slice()).map_err(|e| conversion(idx, Type::Blob, e))
}

fn identity_at(row: &Row<'_>, user_idx: usize, server_idx: usize) -> rusqlite::Result<Identity> {
    let user: String = row.get(user_idx)?;
    let server: String = row.get(server_idx)?;
    Identity::new(user, server).map_err(|e| conversion(user_idx, Type::Text, e))
}

fn row_to_server(row: &Row<'_>) -> rusqlite::Result<Server> {
    Ok(Server {
        id: ServerId(row.get(0)?),
        name: row.get(1)?,
        engine_name: row.get(2)?,
        engine_version: row.get(3)?,
        is_local: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: UserId(row.get(0)?),
        server_id: ServerId(row.get(1)?),
        identity: identity_at(row, 2, 3)?,
        created_at: row.get(4)?,
    })
}

fn row_to_keypair(row: &Row<'_>) -> rusqlite::Result<KeyPair> {
    let public_key: Vec<u8> = row.get(2)?;
    let secret: Option<Vec<u8>> = row.get(3)?;
    Ok(KeyPair {
        id: KeyPairId(row.get(0)?),
        user_id: UserId(row.get(1)?),
        public_key: PublicKey::try_from(public_key.as_slice())
            .map_err(|e| conversion(2, Type::Blob, e))?,
        secret: secret
            .map(|b| <[u8; 32]>::try_from(b.as_slice()))
            .transpose()
            .map_err(|e| conversion(3, Type::Blob, e))?,
        created_at: row.get(4)?,
    })
}

fn row_to_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    let data: String = row.get(4)?;
    Ok(Post {
        id: Some(PostId(row.get(0)?)),
        server_id: ServerId(row.get(1)?),
        server: row.get(2)?,
        path: row.get(3)?,
        data: serde_json::from_str::<PostData>(&data).map_err(|e| conversion(4, Type::Text, e))?,
        created_at: row.get(5)?,
        modified_at: row.get(6)?,
    })
}

fn row_to_signature(row: &Row<'_>) -> rusqlite::Result<SignatureRecord> {
    Ok(SignatureRecord {
        event_id: event_id_at(row, 0)?,
        keypair_id: KeyPairId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        identity: identity_at(row, 3, 4)?,
        data: SignatureBlob(row.get(5)?),
        post_id: row.get::<_, Option<i64>>(6)?.map(PostId),
        created_at: row.get(7)?,
    })
}

fn row_to_unverified(row: &Row<'_>) -> rusqlite::Result<UnverifiedSignatureRecord> {
    Ok(UnverifiedSignatureRecord {
        event_id: event_id_at(row, 0)?,
        identity: row.get(1)?,
        data: SignatureBlob(row.get(2)?),
        post_id: row.get::<_, Option<i64>>(3)?.map(PostId),
        created_at: row.get(4)?,
    })
}

impl SqliteTx<'_> {
    fn collect<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        map: fn(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl StoreTx for SqliteTx<'_> {
    fn server_by_name(&self, name: &str) -> Result<Option<Server>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE name = ?1"),
                params![name],
                row_to_server,
            )
            .optional()?)
    }

    fn insert_server(&mut self, name: &str, now: i64) -> Result<Server> {
        self.conn.execute(
            "INSERT INTO servers (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(Server {
            id: ServerId(self.conn.last_insert_rowid()),
            name: name.to_string(),
            engine_name: None,
            engine_version: None,
            is_local: false,
            created_at: now,
        })
    }

    fn local_server(&self) -> Result<Option<Server>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE is_local = 1"),
                [],
                row_to_server,
            )
            .optional()?)
    }

    fn set_local_server(
        &mut self,
        id: ServerId,
        engine_name: &str,
        engine_version: &str,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE servers SET is_local = 0 WHERE is_local = 1 AND id != ?1",
            params![id.0],
        )?;
        let changed = self.conn.execute(
            "UPDATE servers SET is_local = 1, engine_name = ?2, engine_version = ?3 WHERE id = ?1",
            params![id.0, engine_name, engine_version],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("server {id}")));
        }
        Ok(())
    }

    fn user_by_identity(&self, identity: &Identity) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("{USER_SELECT} WHERE s.name = ?1 AND u.name = ?2"),
                params![identity.server(), identity.user()],
                row_to_user,
            )
            .optional()?)
    }

    fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self
            .conn
            .query_row(
                &format!("{USER_SELECT} WHERE u.id = ?1"),
                params![id.0],
                row_to_user,
            )
            .optional()?)
    }

    fn insert_user(&mut self, server_id: ServerId, identity: &Identity, now: i64) -> Result<User> {
        self.conn.execute(
            "INSERT INTO users (server_id, name, created_at) VALUES (?1, ?2, ?3)",
            params![server_id.0, identity.user(), now],
        )?;
        Ok(User {
            id: UserId(self.conn.last_insert_rowid()),
            server_id,
            identity: identity.clone(),
            created_at: now,
        })
    }

    fn keypairs_for_user(&self, user_id: UserId) -> Result<Vec<KeyPair>> {
        self.collect(
            &format!("SELECT {KEYPAIR_COLUMNS} FROM keypairs WHERE user_id = ?1 ORDER BY id"),
            params![user_id.0],
            row_to_keypair,
        )
    }

    fn insert_keypair(
        &mut self,
        user_id: UserId,
        public_key: &PublicKey,
        secret: Option<&[u8; 32]>,
        now: i64,
    ) -> Result<KeyPair> {
        self.conn.execute(
            "INSERT INTO keypairs (user_id, public_key, secret, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id, public_key)
             DO UPDATE SET secret = COALESCE(keypairs.secret, excluded.secret)",
            params![
                user_id.0,
                public_key.as_bytes().as_slice(),
                secret.map(|s| s.as_slice()),
                now
            ],
        )?;
        Ok(self.conn.query_row(
            &format!(
                "SELECT {KEYPAIR_COLUMNS} FROM keypairs WHERE user_id = ?1 AND public_key = ?2"
            ),
            params![user_id.0, public_key.as_bytes().as_slice()],
            row_to_keypair,
        )?)
    }

    fn post_by_path(&self, server: &str, path: &str) -> Result<Option<Post>> {
        Ok(self
            .conn
            .query_row(
                &format!("{POST_SELECT} WHERE s.name = ?1 AND p.path = ?2"),
                params![server, path],
                row_to_post,
            )
            .optional()?)
    }

    fn post(&self, id: PostId) -> Result<Option<Post>> {
        Ok(self
            .conn
            .query_row(
                &format!("{POST_SELECT} WHERE p.id = ?1"),
                params![id.0],
                row_to_post,
            )
            .optional()?)
    }

    fn insert_post(&mut self, post: &Post) -> Result<PostId> {
        if post.is_saved() {
            return Err(StoreError::InvalidData(format!(
                "post {}{} is already saved",
                post.server, post.path
            )));
        }
        self.conn.execute(
            "INSERT INTO posts (server_id, path, data, created_at, modified_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                post.server_id.0,
                post.path,
                serde_json::to_string(&post.data)?,
                post.created_at,
                post.modified_at
            ],
        )?;
        Ok(PostId(self.conn.last_insert_rowid()))
    }

    fn update_post(&mut self, post: &Post) -> Result<()> {
        let id = post
            .id
            .ok_or_else(|| StoreError::InvalidData("cannot update an unsaved post".into()))?;
        let changed = self.conn.execute(
            "UPDATE posts SET data = ?2, modified_at = ?3 WHERE id = ?1",
            params![id.0, serde_json::to_string(&post.data)?, post.modified_at],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(format!("post {id}")));
        }
        Ok(())
    }

    fn insert_event(&mut self, id: &EventId, event: &Event, now: i64) -> Result<InsertResult> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO events (event_id, server, path, body, received_from, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id.as_bytes().as_slice(),
                event.server,
                event.path,
                serde_json::to_string(event)?,
                event.received_from,
                now
            ],
        )?;
        Ok(if inserted == 1 {
            InsertResult::Inserted
        } else {
            InsertResult::AlreadyExists
        })
    }

    fn event(&self, id: &EventId) -> Result<Option<EventRecord>> {
        let row: Option<(String, i64)> = self
            .conn
            .query_row(
                "SELECT body, received_at FROM events WHERE event_id = ?1",
                params![id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        row.map(|(body, received_at)| {
            Ok(EventRecord {
                id: *id,
                event: serde_json::from_str(&body)?,
                received_at,
            })
        })
        .transpose()
    }

    fn upsert_signature(&mut self, record: &SignatureRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO signatures (event_id, keypair_id, user_id, data, post_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(event_id, user_id) DO UPDATE SET
                keypair_id = excluded.keypair_id,
                data = excluded.data,
                post_id = COALESCE(excluded.post_id, signatures.post_id)",
            params![
                record.event_id.as_bytes().as_slice(),
                record.keypair_id.0,
                record.user_id.0,
                record.data.as_bytes(),
                record.post_id.map(|p| p.0),
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn upsert_unverified(&mut self, record: &UnverifiedSignatureRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO unverified_signatures (event_id, identity, data, post_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(event_id, identity) DO UPDATE SET
                data = excluded.data,
                post_id = COALESCE(excluded.post_id, unverified_signatures.post_id)",
            params![
                record.event_id.as_bytes().as_slice(),
                record.identity,
                record.data.as_bytes(),
                record.post_id.map(|p| p.0),
                record.created_at
            ],
        )?;
        Ok(())
    }

    fn delete_unverified(&mut self, event_id: &EventId, identity: &str) -> Result<usize> {
        Ok(self.conn.execute(
            "DELETE FROM unverified_signatures WHERE event_id = ?1 AND identity = ?2",
            params![event_id.as_bytes().as_slice(), identity],
        )?)
    }

    fn signatures_for_event(&self, event_id: &EventId) -> Result<Vec<SignatureRecord>> {
        self.collect(
            &format!("{SIGNATURE_SELECT} WHERE sig.event_id = ?1 ORDER BY sig.user_id"),
            params![event_id.as_bytes().as_slice()],
            row_to_signature,
        )
    }

    fn signatures_for_post(&self, post_id: PostId) -> Result<Vec<SignatureRecord>> {
        self.collect(
            &format!(
                "{SIGNATURE_SELECT} WHERE sig.post_id = ?1 ORDER BY sig.created_at, sig.user_id"
            ),
            params![post_id.0],
            row_to_signature,
        )
    }

    fn unverified_for_event(&self, event_id: &EventId) -> Result<Vec<UnverifiedSignatureRecord>> {
        self.collect(
            &format!(
                "SELECT {UNVERIFIED_COLUMNS} FROM unverified_signatures
                 WHERE event_id = ?1 ORDER BY identity"
            ),
            params![event_id.as_bytes().as_slice()],
            row_to_unverified,
        )
    }

    fn unverified_for_post(&self, post_id: PostId) -> Result<Vec<UnverifiedSignatureRecord>> {
        self.collect(
            &format!(
                "SELECT {UNVERIFIED_COLUMNS} FROM unverified_signatures
                 WHERE post_id = ?1 ORDER BY created_at, identity"
            ),
            params![post_id.0],
            row_to_unverified,
        )
    }

    fn relate_user(
        &mut self,
        kind: RelationKind,
        user_id: UserId,
        post_id: PostId,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO user_post_relations (kind, user_id, post_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), user_id.0, post_id.0, now],
        )?;
        Ok(())
    }

    fn relate_post(
        &mut self,
        kind: RelationKind,
        from: PostId,
        to: PostId,
        now: i64,
    ) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO post_post_relations (kind, from_post, to_post, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![kind.as_str(), from.0, to.0, now],
        )?;
        Ok(())
    }

    fn users_related(&self, kind: RelationKind, post_id: PostId) -> Result<Vec<User>> {
        self.collect(
            &format!(
                "{USER_SELECT} JOIN user_post_relations r ON r.user_id = u.id
                 WHERE r.kind = ?1 AND r.post_id = ?2 ORDER BY u.id"
            ),
            params![kind.as_str(), post_id.0],
            row_to_user,
        )
    }

    fn posts_related(&self, kind: RelationKind, target: PostId) -> Result<Vec<Post>> {
        self.collect(
            &format!(
                "{POST_SELECT} JOIN post_post_relations r ON r.from_post = p.id
                 WHERE r.kind = ?1 AND r.to_post = ?2 ORDER BY p.created_at, p.id"
            ),
            params![kind.as_str(), target.0],
            row_to_post,
        )
    }
}
