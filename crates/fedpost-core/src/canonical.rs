//! Canonical JSON encoding of candidate content.
//!
//! Signatures never cover the diff alone. They cover the *candidate*: the
//! content a post would have after the diff is merged, together with the
//! target and the declared author set. The encoding is:
//! - compact JSON, no insignificant whitespace
//! - object keys sorted by code point, recursively
//! - `authors` rendered as a sorted, de-duplicated list of `user@server`
//! - `parent` present only when the event names one
//! - `path` is `null` for verification-only candidates
//!
//! Changing any of these rules breaks every signature already issued, so the
//! rules are versioned by [`CANONICAL_VERSION`] and the domain tag.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::crypto::Keypair;
use crate::identity::{Identity, PostRef};
use crate::post::PostData;

/// Version of the canonical candidate encoding.
pub const CANONICAL_VERSION: u8 = 1;

/// Domain separation tag prepended to every signed message.
pub const SIGN_DOMAIN: &[u8] = b"fedpost/candidate-sig/v1";

/// The structurally-defined value that signatures cover.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub server: String,
    pub path: Option<String>,
    pub authors: BTreeSet<Identity>,
    pub parent: Option<PostRef>,
    pub data: PostData,
}

impl Candidate {
    /// The candidate as a JSON value, before canonical encoding.
    pub fn to_value(&self) -> Value {
        let mut authors: Vec<String> = self.authors.iter().map(Identity::to_string).collect();
        authors.sort();

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
        if let Some(parent) = &self.parent {
            map.insert("parent".into(), Value::String(parent.to_string()));
        }
        map.insert("data".into(), Value::Object(self.data.clone()));
        Value::Object(map)
    }
}

/// Encode any JSON value canonically.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128);
    write_value(&mut buf, value);
    buf
}

/// Canonical bytes of a candidate.
pub fn canonical_candidate(candidate: &Candidate) -> Vec<u8> {
    canonical_json(&candidate.to_value())
}

/// Construct the signed message: domain tag || canonical candidate.
pub fn signed_message(candidate: &Candidate) -> Vec<u8> {
    let mut buf = SIGN_DOMAIN.to_vec();
    buf.extend_from_slice(&canonical_candidate(candidate));
    buf
}

/// Sign a candidate and return the lowercase hex blob carried in events.
pub fn sign_candidate(keypair: &Keypair, candidate: &Candidate) -> String {
    keypair.sign(&signed_message(candidate)).to_hex()
}

fn write_value(buf: &mut Vec<u8>, value: &Value) {
    match value {
        Value::Null => buf.extend_from_slice(b"null"),
        Value::Bool(true) => buf.extend_from_slice(b"true"),
        Value::Bool(false) => buf.extend_from_slice(b"false"),
        Value::Number(n) => buf.extend_from_slice(n.to_string().as_bytes()),
        Value::String(s) => write_string(buf, s),
        Value::Array(items) => {
            buf.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_value(buf, item);
            }
            buf.push(b']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            buf.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(b',');
                }
                write_string(buf, key);
                buf.push(b':');
                write_value(buf, item);
            }
            buf.push(b'}');
        }
    }
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.push(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.extend_from_slice(b"\\\""),
            '\\' => buf.extend_from_slice(b"\\\\"),
            '\n' => buf.extend_from_slice(b"\\n"),
            '\r' => buf.extend_from_slice(b"\\r"),
            '\t' => buf.extend_from_slice(b"\\t"),
            '\u{08}' => buf.extend_from_slice(b"\\b"),
            '\u{0c}' => buf.extend_from_slice(b"\\f"),
            c if (c as u32) < 0x20 => {
                buf.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut tmp = [0u8; 4];
                buf.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
    buf.push(b'"');
}
