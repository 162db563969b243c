//! Federated identities and post references.
//!
//! An identity is `user@server`; a post reference is `server/path`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A user scoped to one federation server.
///
/// Ordered by (user, server) so that sorted sets render the same way as
/// sorted identity strings for the common case.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity {
    user: String,
    server: String,
}

impl Identity {
    /// Build an identity from its parts, validating both.
    pub fn new(user: impl Into<String>, server: impl Into<String>) -> Result<Self, CoreError> {
        let user = user.into();
        let server = server.into();
        if user.is_empty() || server.is_empty() || server.contains('/') || server.contains('@') {
            return Err(CoreError::InvalidIdentity(format!("{user}@{server}")));
        }
        Ok(Self { user, server })
    }

    /// Parse `user@server`, splitting on the first `@`.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (user, server) = s
            .split_once('@')
            .ok_or_else(|| CoreError::InvalidIdentity(s.to_string()))?;
        Self::new(user, server).map_err(|_| CoreError::InvalidIdentity(s.to_string()))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn server(&self) -> &str {
        &self.server
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.server)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A reference to a post: `server/path`, split on the first `/`.
///
/// The path keeps its leading slash, so `aaa//post1` refers to path
/// `/post1` on server `aaa`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PostRef {
    pub server: String,
    pub path: String,
}

impl PostRef {
    pub fn new(server: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            path: path.into(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.split_once('/') {
            Some((server, path)) if !server.is_empty() && !path.is_empty() => {
                Ok(Self::new(server, path))
            }
            _ => Err(CoreError::InvalidPostRef(s.to_string())),
        }
    }
}

impl fmt::Display for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.path)
    }
}

impl fmt::Debug for PostRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PostRef({self})")
    }
}

impl Serialize for PostRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PostRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_on_first_at() {
        let id = Identity::parse("abraham@aaa").unwrap();
        assert_eq!(id.user(), "abraham");
        assert_eq!(id.server(), "aaa");
        assert_eq!(id.to_string(), "abraham@aaa");

        assert!(Identity::parse("a@b@c").is_err());
    }

    #[test]
    fn test_parse_rejects_empty_parts() {
        for bad in ["", "abraham", "@aaa", "abraham@", "abraham@aaa/x"] {
            assert!(Identity::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_identity_serde_as_string() {
        let id = Identity::parse("isaac@bbb").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"isaac@bbb\"");
        let back: Identity = serde_json::from_str("\"isaac@bbb\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_post_ref_keeps_leading_slash() {
        let r = PostRef::parse("aaa//post1").unwrap();
        assert_eq!(r.server, "aaa");
        assert_eq!(r.path, "/post1");
        assert_eq!(r.to_string(), "aaa//post1");

        assert!(PostRef::parse("aaa").is_err());
        assert!(PostRef::parse("/post1").is_err());
    }
}
