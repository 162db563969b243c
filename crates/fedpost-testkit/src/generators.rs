//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::{Map, Value};

use fedpost_core::{Diff, Identity, Keypair, PostData};

/// A server or user name: short, lowercase, no separators.
pub fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

/// A post path.
pub fn path() -> impl Strategy<Value = String> {
    "/[a-z0-9]{1,12}"
}

/// A random `user@server` identity.
pub fn identity() -> impl Strategy<Value = Identity> {
    (name(), name()).prop_map(|(user, server)| {
        Identity::new(user, server).expect("generated names are valid")
    })
}

/// A small set of distinct identities.
pub fn identities(max: usize) -> impl Strategy<Value = Vec<Identity>> {
    prop::collection::btree_set(identity(), 1..=max).prop_map(|s| s.into_iter().collect())
}

/// A random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// A non-null JSON leaf.
pub fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[ -~]{0,16}".prop_map(Value::String),
    ]
}

/// A JSON value with bounded nesting. Never null at the top.
pub fn json_value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

/// Post content.
pub fn post_data() -> impl Strategy<Value = PostData> {
    prop::collection::btree_map("[a-z]{1,6}", json_value(), 0..6)
        .prop_map(|m| m.into_iter().collect::<Map<String, Value>>())
}

/// A diff mixing sets and removals.
pub fn diff() -> impl Strategy<Value = Diff> {
    let entry = prop_oneof![
        3 => json_value(),
        1 => Just(Value::Null),
    ];
    prop::collection::btree_map("[a-z]{1,6}", entry, 0..6)
        .prop_map(|m| Diff(m.into_iter().collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedpost_core::merge_diff;

    proptest! {
        #[test]
        fn generated_identities_round_trip(id in identity()) {
            let parsed = Identity::parse(&id.to_string()).unwrap();
            prop_assert_eq!(parsed, id);
        }

        #[test]
        fn merged_content_has_no_nulls_at_top(mut data in post_data(), d in diff()) {
            merge_diff(&mut data, &d);
            prop_assert!(data.values().all(|v| !v.is_null()));
        }
    }
}
