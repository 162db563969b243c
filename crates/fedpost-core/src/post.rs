//! Post content and partial-update semantics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The full content of a post: a JSON object with string keys.
///
/// Using `Map` rather than `Value` keeps the top level an object by
/// construction.
pub type PostData = Map<String, Value>;

/// A partial update.
///
/// A present non-null value sets the key, a present `null` removes it,
/// absent keys are untouched.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Diff(pub Map<String, Value>);

impl Diff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder-style removal marker.
    pub fn remove(mut self, key: impl Into<String>) -> Self {
        self.0.insert(key.into(), Value::Null);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// The diff viewed as content, used for verification-only events.
    pub fn as_data(&self) -> &PostData {
        &self.0
    }
}

impl From<Map<String, Value>> for Diff {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Apply a diff to post content in place.
///
/// Removing an absent key is a no-op.
pub fn merge_diff(data: &mut PostData, diff: &Diff) {
    for (key, value) in diff.iter() {
        if value.is_null() {
            data.remove(key);
        } else {
            data.insert(key.clone(), value.clone());
        }
    }
}
