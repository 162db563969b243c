//! Authorship policies: who must sign an event.
//!
//! The required-authors set is an input to the engine, not a fixed rule.
//! Three policies are provided; [`DeclaredAndExisting`] is the default.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use fedpost_core::{Event, Identity};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// What a policy may look at.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub event: &'a Event,
    /// Authors already recorded for the target post.
    pub existing_authors: &'a BTreeSet<Identity>,
    /// Whether the target post has been saved before.
    pub post_exists: bool,
}

/// Computes the required-authors set for an event.
pub trait AuthorshipPolicy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn required_authors(&self, input: &PolicyInput<'_>) -> BTreeSet<Identity>;
}

/// Every declared author of the event must sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredAuthors;

impl AuthorshipPolicy for DeclaredAuthors {
    fn name(&self) -> &'static str {
        "declared"
    }

    fn required_authors(&self, input: &PolicyInput<'_>) -> BTreeSet<Identity> {
        input.event.author_set()
    }
}

/// The post's existing authors must sign. A new post falls back to the
/// declared authors.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExistingAuthors;

impl AuthorshipPolicy for ExistingAuthors {
    fn name(&self) -> &'static str {
        "existing"
    }

    fn required_authors(&self, input: &PolicyInput<'_>) -> BTreeSet<Identity> {
        if input.post_exists {
            input.existing_authors.clone()
        } else {
            input.event.author_set()
        }
    }
}

/// Both the declared and the existing authors must sign.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredAndExisting;

impl AuthorshipPolicy for DeclaredAndExisting {
    fn name(&self) -> &'static str {
        "declared_and_existing"
    }

    fn required_authors(&self, input: &PolicyInput<'_>) -> BTreeSet<Identity> {
        let mut required = input.event.author_set();
        required.extend(input.existing_authors.iter().cloned());
        required
    }
}

/// Configurable choice among the provided policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Declared,
    Existing,
    #[default]
    DeclaredAndExisting,
}

impl PolicyKind {
    pub fn build(self) -> Arc<dyn AuthorshipPolicy> {
        match self {
            Self::Declared => Arc::new(DeclaredAuthors),
            Self::Existing => Arc::new(ExistingAuthors),
            Self::DeclaredAndExisting => Arc::new(DeclaredAndExisting),
        }
    }
}

impl FromStr for PolicyKind {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "declared" => Ok(Self::Declared),
            "existing" => Ok(Self::Existing),
            "declared_and_existing" => Ok(Self::DeclaredAndExisting),
            other => Err(AuthError::UnknownPolicy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedpost_core::EventBuilder;

    fn id(s: &str) -> Identity {
        Identity::parse(s).unwrap()
    }

    fn event_by(authors: &[&str]) -> Event {
        authors
            .iter()
            .fold(EventBuilder::new("aaa").path("/p"), |b, a| b.author(id(a)))
            .build()
    }

    #[test]
    fn test_policies_on_existing_post() {
        let event = event_by(&["isaac@aaa"]);
        let existing: BTreeSet<Identity> = [id("abraham@aaa")].into_iter().collect();
        let input = PolicyInput {
            event: &event,
            existing_authors: &existing,
            post_exists: true,
        };

        assert_eq!(
            DeclaredAuthors.required_authors(&input),
            [id("isaac@aaa")].into_iter().collect()
        );
        assert_eq!(ExistingAuthors.required_authors(&input), existing);
        assert_eq!(
            DeclaredAndExisting.required_authors(&input),
            [id("abraham@aaa"), id("isaac@aaa")].into_iter().collect()
        );
    }

    #[test]
    fn test_existing_falls_back_to_declared_for_new_post() {
        let event = event_by(&["abraham@aaa", "abraham@aaa"]);
        let existing = BTreeSet::new();
        let input = PolicyInput {
            event: &event,
            existing_authors: &existing,
            post_exists: false,
        };
        assert_eq!(
            ExistingAuthors.required_authors(&input),
            [id("abraham@aaa")].into_iter().collect()
        );
    }

    #[test]
    fn test_policy_kind_parsing() {
        assert_eq!("existing".parse::<PolicyKind>().unwrap(), PolicyKind::Existing);
        assert!("owner".parse::<PolicyKind>().is_err());
        let kind: PolicyKind = serde_json::from_str("\"declared\"").unwrap();
        assert_eq!(kind.build().name(), "declared");
        assert_eq!(PolicyKind::default().build().name(), "declared_and_existing");
    }
}
