//! Identity & key registry lookups inside a transaction.

use fedpost_core::{Identity, KeyLookup, KeyPair, Server, User};
use fedpost_store::{StoreError, StoreTx};

use crate::error::{EngineError, Result};

/// Look up a server by name, creating it when allowed.
pub(crate) fn resolve_server(
    tx: &mut dyn StoreTx,
    name: &str,
    create: bool,
    now: i64,
) -> Result<Server> {
    if let Some(server) = tx.server_by_name(name)? {
        return Ok(server);
    }
    if !create {
        return Err(EngineError::UnknownServer(name.to_string()));
    }
    Ok(tx.insert_server(name, now)?)
}

/// Resolve `user@server` to a user. With `create`, a missing user (and its
/// server) is created; otherwise it is [`EngineError::UnknownIdentity`].
pub(crate) fn resolve_user(
    tx: &mut dyn StoreTx,
    identity: &Identity,
    create: bool,
    now: i64,
) -> Result<User> {
    if let Some(user) = tx.user_by_identity(identity)? {
        return Ok(user);
    }
    if !create {
        return Err(EngineError::UnknownIdentity(identity.clone()));
    }
    let server = resolve_server(tx, identity.server(), true, now)?;
    Ok(tx.insert_user(server.id, identity, now)?)
}

/// Key lookup over the transaction's view of the registry.
pub(crate) struct TxKeys<'a>(pub &'a dyn StoreTx);

impl KeyLookup for TxKeys<'_> {
    type Error = StoreError;

    fn keys_for(&self, identity: &Identity) -> std::result::Result<Option<Vec<KeyPair>>, StoreError> {
        match self.0.user_by_identity(identity)? {
            Some(user) => self.0.keypairs_for_user(user.id).map(Some),
            None => Ok(None),
        }
    }
}
