//! Engine configuration.

use fedpost_auth::PolicyKind;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Settings passed explicitly to [`Engine::open`](crate::Engine::open).
///
/// Every field has a default, so a JSON document only needs the fields it
/// overrides:
///
/// ```json
/// { "local_server": "aaa", "policy": "existing" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name of the local instance. Registered as the single local server.
    pub local_server: String,
    /// Engine metadata recorded on the local server row.
    pub engine_name: String,
    pub engine_version: String,
    /// Create the target server of an event when it is not registered yet.
    pub create_unknown_servers: bool,
    /// Which identities must sign an event.
    pub policy: PolicyKind,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            local_server: "localhost".to_string(),
            engine_name: "fedpost".to_string(),
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            create_unknown_servers: true,
            policy: PolicyKind::default(),
        }
    }
}

impl EngineConfig {
    /// Defaults with the given local server name.
    pub fn new(local_server: impl Into<String>) -> Self {
        Self {
            local_server: local_server.into(),
            ..Self::default()
        }
    }

    /// Load from a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let name = &self.local_server;
        if name.is_empty() || name.contains('/') || name.contains('@') {
            return Err(EngineError::Config(format!(
                "local_server {name:?} is not a valid server name"
            )));
        }
        if self.engine_name.is_empty() {
            return Err(EngineError::Config("engine_name must not be empty".into()));
        }
        Ok(())
    }
}
