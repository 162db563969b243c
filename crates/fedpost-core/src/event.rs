//! Events: signed requests to change a post.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

use crate::canonical::{canonical_json, signed_message, Candidate};
use crate::crypto::{Keypair, SignatureBlob};
use crate::error::CoreError;
use crate::identity::{Identity, PostRef};
use crate::post::{merge_diff, Diff, PostData};
use crate::types::EventId;

/// An inbound authorization request.
///
/// Wire form:
/// ```json
/// {
///   "server": "aaa",
///   "path": "/post1",
///   "authors": ["abraham@aaa"],
///   "diff": {"body": "Hello, World!"},
///   "signatures": {"abraham@aaa": "5f1e..."}
/// }
/// ```
/// A missing `path` makes the event verification-only.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub server: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<Identity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<PostRef>,

    #[serde(default)]
    pub diff: Diff,

    /// Claimed identity string to signature blob. Keys are kept as raw
    /// strings so that unparseable claims are still recorded as evidence.
    #[serde(default)]
    pub signatures: BTreeMap<String, SignatureBlob>,

    /// The peer that relayed this event, if any. Not part of the event id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_from: Option<String>,
}

impl Event {
    /// Parse an event from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        serde_json::from_str(json).map_err(|e| CoreError::Malformed(e.to_string()))
    }

    /// Whether this event only asks for signature verification.
    pub fn is_verification_only(&self) -> bool {
        self.path.is_none()
    }

    /// Declared authors, de-duplicated.
    pub fn author_set(&self) -> BTreeSet<Identity> {
        self.authors.iter().cloned().collect()
    }

    /// Content the signatures must cover, given the post's current content.
    ///
    /// For verification-only events the diff itself is the content.
    pub fn prospective_data(&self, current: &PostData) -> PostData {
        if self.is_verification_only() {
            return self.diff.as_data().clone();
        }
        let mut data = current.clone();
        merge_diff(&mut data, &self.diff);
        data
    }

    /// Build the candidate for the given prospective content.
    pub fn candidate(&self, data: PostData) -> Candidate {
        Candidate {
            server: self.server.clone(),
            path: self.path.clone(),
            authors: self.author_set(),
            parent: self.parent.clone(),
            data,
        }
    }

    /// Content address: Blake3 of the canonical event without `received_from`.
    pub fn id(&self) -> EventId {
        EventId(*blake3::hash(&canonical_json(&self.identity_value())).as_bytes())
    }

    fn identity_value(&self) -> Value {
        let mut authors: Vec<String> = self.author_set().iter().map(Identity::to_string).collect();
        authors.sort();
        let signatures: Map<String, Value> = self
            .signatures
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.to_hex())))
            .collect();

        let mut map = Map::new();
        map.insert("server".into(), Value::String(self.server.clone()));
        map.insert(
            "path".into(),
            self.path.clone().map(Value::String).unwrap_or(Value::Null),
        );
        map.insert(
            "authors".into(),
            Value::Array(authors.into_iter().map(Value::String).collect()),
        );
        map.insert(
            "parent".into(),
            self.parent
                .as_ref()
                .map(|p| Value::String(p.to_string()))
                .unwrap_or(Value::Null),
        );
        map.insert("diff".into(), Value::Object(self.diff.0.clone()));
        map.insert("signatures".into(), Value::Object(signatures));
        Value::Object(map)
    }
}

/// Builder for events, mostly for clients and tests.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            event: Event {
                server: server.into(),
                path: None,
                authors: Vec::new(),
                parent: None,
                diff: Diff::new(),
                signatures: BTreeMap::new(),
                received_from: None,
            },
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.event.path = Some(path.into());
        self
    }

    pub fn author(mut self, identity: Identity) -> Self {
        self.event.authors.push(identity);
        self
    }

    pub fn parent(mut self, parent: PostRef) -> Self {
        self.event.parent = Some(parent);
        self
    }

    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.event.diff = self.event.diff.set(key, value);
        self
    }

    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.event.diff = self.event.diff.remove(key);
        self
    }

    pub fn received_from(mut self, peer: impl Into<String>) -> Self {
        self.event.received_from = Some(peer.into());
        self
    }

    /// Sign the candidate that results from merging the diff into `current`.
    ///
    /// Call after the diff, authors and parent are final.
    pub fn sign(mut self, identity: &Identity, keypair: &Keypair, current: &PostData) -> Self {
        let candidate = self.event.candidate(self.event.prospective_data(current));
        let blob = keypair.sign(&signed_message(&candidate));
        self.event.signatures.insert(identity.to_string(), blob);
        self
    }

    /// Attach a raw signature blob under any claimed identity string.
    pub fn signature(mut self, claimed: impl Into<String>, blob: SignatureBlob) -> Self {
        self.event.signatures.insert(claimed.into(), blob);
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}
