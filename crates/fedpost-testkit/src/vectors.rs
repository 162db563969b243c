//! Golden test vectors for deterministic canonical encoding.
//!
//! Every client that signs candidates must produce these bytes exactly.

use serde_json::Value;

use fedpost_core::{
    canonical_candidate, signed_message, Candidate, Identity, Keypair, PostRef, SIGN_DOMAIN,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub server: &'static str,
    /// `None` for a verification-only candidate.
    pub path: Option<&'static str>,
    /// In any order; the encoding sorts them.
    pub authors: &'static [&'static str],
    pub parent: Option<&'static str>,
    /// Prospective content as JSON text.
    pub data: &'static str,
    /// Seed for the deterministic signing key.
    pub seed: [u8; 32],
    /// Expected canonical candidate bytes.
    pub expected_canonical: &'static str,
}

/// Hex of [`SIGN_DOMAIN`], the prefix of every signed message.
pub const SIGN_DOMAIN_HEX: &str = "666564706f73742f63616e6469646174652d7369672f7631";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "single author post",
            server: "aaa",
            path: Some("/post1"),
            authors: &["abraham@aaa"],
            parent: None,
            data: r#"{"foo":"bar","bar":"baz"}"#,
            seed: [0x42; 32],
            expected_canonical: r#"{"authors":["abraham@aaa"],"data":{"bar":"baz","foo":"bar"},"path":"/post1","server":"aaa"}"#,
        },
        GoldenVector {
            name: "co-authored post, authors sorted",
            server: "aaa",
            path: Some("/post2"),
            authors: &["isaac@bbb", "abraham@aaa"],
            parent: None,
            data: r#"{"title":"Hello"}"#,
            seed: [0x01; 32],
            expected_canonical: r#"{"authors":["abraham@aaa","isaac@bbb"],"data":{"title":"Hello"},"path":"/post2","server":"aaa"}"#,
        },
        GoldenVector {
            name: "cross-server comment",
            server: "bbb",
            path: Some("/c1"),
            authors: &["isaac@bbb"],
            parent: Some("aaa//post1"),
            data: r#"{"body":"Nice"}"#,
            seed: [0x02; 32],
            expected_canonical: r#"{"authors":["isaac@bbb"],"data":{"body":"Nice"},"parent":"aaa//post1","path":"/c1","server":"bbb"}"#,
        },
        GoldenVector {
            name: "verification only",
            server: "aaa",
            path: None,
            authors: &["abraham@aaa"],
            parent: None,
            data: r#"{"nonce":"n-1"}"#,
            seed: [0x42; 32],
            expected_canonical: r#"{"authors":["abraham@aaa"],"data":{"nonce":"n-1"},"path":null,"server":"aaa"}"#,
        },
        GoldenVector {
            name: "nested keys and escapes",
            server: "aaa",
            path: Some("/post3"),
            authors: &["abraham@aaa"],
            parent: None,
            data: r#"{"quote":"say \"hi\"\n","meta":{"z":1,"a":[true,null]}}"#,
            seed: [0x00; 32],
            expected_canonical: r#"{"authors":["abraham@aaa"],"data":{"meta":{"a":[true,null],"z":1},"quote":"say \"hi\"\n"},"path":"/post3","server":"aaa"}"#,
        },
        GoldenVector {
            name: "non-ascii content stays utf-8",
            server: "aaa",
            path: Some("/post4"),
            authors: &["abraham@aaa"],
            parent: None,
            data: r#"{"title":"héllo ✓"}"#,
            seed: [0x00; 32],
            expected_canonical: r#"{"authors":["abraham@aaa"],"data":{"title":"héllo ✓"},"path":"/post4","server":"aaa"}"#,
        },
    ]
}

/// Build the candidate described by a vector.
pub fn candidate_from_vector(vector: &GoldenVector) -> Candidate {
    let data = match serde_json::from_str::<Value>(vector.data) {
        Ok(Value::Object(map)) => map,
        other => panic!("vector {:?} data is not an object: {other:?}", vector.name),
    };
    Candidate {
        server: vector.server.to_string(),
        path: vector.path.map(str::to_string),
        authors: vector
            .authors
            .iter()
            .map(|a| Identity::parse(a).expect("vector author must parse"))
            .collect(),
        parent: vector
            .parent
            .map(|p| PostRef::parse(p).expect("vector parent must parse")),
        data,
    }
}

/// Check every vector: canonical bytes, message framing and a
/// sign-then-verify pass with the vector's key.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        let candidate = candidate_from_vector(&vector);

        let canonical = canonical_candidate(&candidate);
        if canonical != vector.expected_canonical.as_bytes() {
            return Err(format!(
                "{}: canonical mismatch\n  expected: {}\n  actual:   {}",
                vector.name,
                vector.expected_canonical,
                String::from_utf8_lossy(&canonical)
            ));
        }

        let message = signed_message(&candidate);
        let prefix = hex::encode(&message[..SIGN_DOMAIN.len()]);
        if prefix != SIGN_DOMAIN_HEX {
            return Err(format!("{}: wrong domain prefix {prefix}", vector.name));
        }

        let keypair = Keypair::from_seed(&vector.seed);
        let first = keypair.sign(&message);
        let second = keypair.sign(&message);
        if first != second {
            return Err(format!("{}: signature is not deterministic", vector.name));
        }
        keypair
            .public_key()
            .verify(&message, &first)
            .map_err(|e| format!("{}: signature does not verify: {e}", vector.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_vectors_hold() {
        verify_all_vectors().unwrap();
    }

    #[test]
    fn test_vector_names_are_unique() {
        let vectors = all_vectors();
        let mut names: Vec<_> = vectors.iter().map(|v| v.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), vectors.len());
    }

    #[test]
    fn test_author_order_does_not_change_bytes() {
        let mut vector = all_vectors()
            .into_iter()
            .find(|v| v.authors.len() > 1)
            .unwrap();
        let before = canonical_candidate(&candidate_from_vector(&vector));
        vector.authors = &["abraham@aaa", "isaac@bbb"];
        let after = canonical_candidate(&candidate_from_vector(&vector));
        assert_eq!(before, after);
    }

    #[test]
    fn test_content_change_breaks_signature() {
        let vector = &all_vectors()[0];
        let keypair = Keypair::from_seed(&vector.seed);
        let candidate = candidate_from_vector(vector);
        let sig = keypair.sign(&signed_message(&candidate));

        let mut altered = candidate.clone();
        altered
            .data
            .insert("foo".into(), Value::String("changed".into()));
        assert!(keypair
            .public_key()
            .verify(&signed_message(&altered), &sig)
            .is_err());
    }
}
