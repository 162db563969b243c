//! End-to-end event processing over the in-memory store.

use std::collections::BTreeSet;

use fedpost::{EngineConfig, EngineError, EventBuilder, Identity, PolicyKind, PostRef, SignatureBlob};
use fedpost_testkit::{corrupt_signature, Signer, TestFixture};
use serde_json::{json, Value};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn fixture_with(signers: &[&Signer]) -> TestFixture {
    init_tracing();
    let fixture = TestFixture::new("aaa").await;
    for signer in signers {
        fixture.register(signer).await;
    }
    fixture
}

fn post(signer: &Signer, path: &str) -> EventBuilder {
    EventBuilder::new(signer.identity.server())
        .path(path)
        .author(signer.identity.clone())
}

#[tokio::test]
async fn test_single_author_creates_post() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(post(&abraham, "/post1").set("body", "Hello, World!"), &[&abraham])
        .await;
    let committed = f.engine.process_event(event).await.unwrap();
    assert!(committed.created);
    assert_eq!(committed.verified, BTreeSet::from([abraham.identity.clone()]));
    assert!(committed.unverified.is_empty());

    let saved = f.engine.post("aaa", "/post1").await.unwrap().unwrap();
    assert_eq!(Value::Object(saved.data), json!({"body": "Hello, World!"}));
    assert_eq!(saved.id, committed.post_id);

    let sigs = f
        .engine
        .signatures_for_event(&committed.event_id)
        .await
        .unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].identity, abraham.identity);
    assert!(sigs[0].post_id.is_some());
    assert_eq!(sigs[0].post_id, saved.id);

    let authors = f.engine.post_authors("aaa", "/post1").await.unwrap();
    assert_eq!(authors, BTreeSet::from([abraham.identity.clone()]));
}

#[tokio::test]
async fn test_update_merges_diff() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let create = f
        .signed(
            post(&abraham, "/post1")
                .set("title", "Hello")
                .set("subtitle", "x")
                .set("body", "y"),
            &[&abraham],
        )
        .await;
    f.engine.process_event(create).await.unwrap();
    let before = f.engine.post("aaa", "/post1").await.unwrap().unwrap();

    let update = f
        .signed(
            post(&abraham, "/post1")
                .set("title", "Hello (updated)")
                .remove("subtitle"),
            &[&abraham],
        )
        .await;
    let committed = f.engine.process_event(update).await.unwrap();
    assert!(!committed.created);

    let after = f.engine.post("aaa", "/post1").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(
        Value::Object(after.data),
        json!({"title": "Hello (updated)", "body": "y"})
    );
    assert_eq!(after.created_at, before.created_at);
    assert!(after.modified_at >= before.modified_at);
}

#[tokio::test]
async fn test_removing_absent_key_is_not_an_error() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(post(&abraham, "/p").set("a", 1).remove("never-there"), &[&abraham])
        .await;
    f.engine.process_event(event).await.unwrap();

    let saved = f.engine.post("aaa", "/p").await.unwrap().unwrap();
    assert_eq!(Value::Object(saved.data), json!({"a": 1}));
}

#[tokio::test]
async fn test_one_corrupt_co_author_rejects() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@aaa", 2);
    let f = fixture_with(&[&abraham, &isaac]).await;

    let event = f
        .signed(
            post(&abraham, "/joint")
                .author(isaac.identity.clone())
                .set("body", "joint work"),
            &[&abraham, &isaac],
        )
        .await;
    let event = corrupt_signature(event, &isaac);
    let event_id = event.id();

    let err = f.engine.process_event(event).await.unwrap_err();
    let action = err.as_unauthorized().expect("unauthorized");
    assert_eq!(action.missing(), BTreeSet::from([isaac.identity.clone()]));
    assert_eq!(action.verified, BTreeSet::from([abraham.identity.clone()]));
    assert_eq!(action.unverified, BTreeSet::from(["isaac@aaa".to_string()]));

    let message = err.to_string();
    assert!(message.contains("Missing authorization by isaac@aaa."));
    assert!(message.contains("Note: Failed to verify isaac@aaa."));

    assert!(f.engine.post("aaa", "/joint").await.unwrap().is_none());

    let sigs = f.engine.signatures_for_event(&event_id).await.unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].identity, abraham.identity);
    assert_eq!(sigs[0].post_id, None);

    let unverified = f.engine.unverified_for_event(&event_id).await.unwrap();
    assert_eq!(unverified.len(), 1);
    assert_eq!(unverified[0].identity, "isaac@aaa");
    assert_eq!(unverified[0].post_id, None);
}

#[tokio::test]
async fn test_superset_not_count() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@aaa", 2);
    let jacob = Signer::new("jacob@aaa", 3);
    let f = fixture_with(&[&abraham, &isaac, &jacob]).await;

    // isaac is a declared author but jacob signs instead.
    let event = f
        .signed(
            post(&abraham, "/p")
                .author(isaac.identity.clone())
                .set("body", "x"),
            &[&abraham, &jacob],
        )
        .await;
    let event_id = event.id();
    let err = f.engine.process_event(event).await.unwrap_err();

    let action = err.as_unauthorized().unwrap();
    assert_eq!(action.missing(), BTreeSet::from([isaac.identity.clone()]));
    assert!(action.verified.contains(&jacob.identity));
    assert!(action.unverified.is_empty());
    assert!(!err.to_string().contains("Note"));

    // Evidence for both valid signatures is kept.
    let sigs = f.engine.signatures_for_event(&event_id).await.unwrap();
    assert_eq!(sigs.len(), 2);
    assert!(sigs.iter().all(|s| s.post_id.is_none()));
}

#[tokio::test]
async fn test_unsigned_event_is_rejected() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = post(&abraham, "/p").set("body", "x").build();
    let err = f.engine.process_event(event).await.unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
    assert!(f.engine.post("aaa", "/p").await.unwrap().is_none());
}

#[tokio::test]
async fn test_signature_over_diff_alone_does_not_verify() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let create = f
        .signed(post(&abraham, "/p").set("title", "Hello"), &[&abraham])
        .await;
    f.engine.process_event(create).await.unwrap();

    // Signed against empty content rather than the stored title.
    let stale = post(&abraham, "/p")
        .set("body", "y")
        .sign(&abraham.identity, &abraham.keypair, &Default::default())
        .build();
    let err = f.engine.process_event(stale).await.unwrap_err();
    assert!(err
        .as_unauthorized()
        .unwrap()
        .unverified
        .contains("abraham@aaa"));

    let saved = f.engine.post("aaa", "/p").await.unwrap().unwrap();
    assert_eq!(Value::Object(saved.data), json!({"title": "Hello"}));
}

#[tokio::test]
async fn test_malformed_claims_are_kept_as_evidence() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(
            post(&abraham, "/p")
                .set("body", "x")
                .signature("not an identity", SignatureBlob::from_bytes(vec![1, 2, 3]))
                .signature("ghost@nowhere", SignatureBlob::from_bytes(vec![0; 64])),
            &[&abraham],
        )
        .await;
    let committed = f.engine.process_event(event).await.unwrap();
    assert_eq!(committed.unverified.len(), 2);

    let unverified = f
        .engine
        .unverified_for_post("aaa", "/p")
        .await
        .unwrap();
    assert_eq!(unverified.len(), 2);
    assert!(unverified.iter().all(|u| u.post_id == committed.post_id));
    assert_eq!(
        f.engine.signatures_for_post("aaa", "/p").await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn test_verification_only_event() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(
            EventBuilder::new("aaa")
                .author(abraham.identity.clone())
                .set("nonce", "n-1"),
            &[&abraham],
        )
        .await;
    assert!(event.is_verification_only());

    let committed = f.engine.process_event(event).await.unwrap();
    assert_eq!(committed.post_id, None);
    assert!(!committed.created);

    let sigs = f
        .engine
        .signatures_for_event(&committed.event_id)
        .await
        .unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].post_id, None);
}

#[tokio::test]
async fn test_verification_only_event_can_fail() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(
            EventBuilder::new("aaa")
                .author(abraham.identity.clone())
                .set("nonce", "n-1"),
            &[&abraham],
        )
        .await;
    let event = corrupt_signature(event, &abraham);
    let event_id = event.id();

    let err = f.engine.process_event(event).await.unwrap_err();
    assert!(err.as_unauthorized().is_some());
    assert_eq!(f.engine.unverified_for_event(&event_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_comment_tree() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@bbb", 2);
    let f = fixture_with(&[&abraham, &isaac]).await;

    let root = f
        .signed(post(&abraham, "/post1").set("title", "root"), &[&abraham])
        .await;
    f.engine.process_event(root).await.unwrap();

    let c1 = f
        .signed(
            post(&isaac, "/c1")
                .parent(PostRef::new("aaa", "/post1"))
                .set("body", "first"),
            &[&isaac],
        )
        .await;
    f.engine.process_event(c1).await.unwrap();

    let r1 = f
        .signed(
            post(&abraham, "/r1")
                .parent(PostRef::new("bbb", "/c1"))
                .set("body", "reply"),
            &[&abraham],
        )
        .await;
    f.engine.process_event(r1).await.unwrap();

    let c2 = f
        .signed(
            post(&isaac, "/c2")
                .parent(PostRef::new("aaa", "/post1"))
                .set("body", "second"),
            &[&isaac],
        )
        .await;
    f.engine.process_event(c2).await.unwrap();

    let tree: Vec<(String, usize)> = f
        .engine
        .comments("aaa", "/post1")
        .await
        .unwrap()
        .into_iter()
        .map(|(p, depth)| (format!("{}{}", p.server, p.path), depth))
        .collect();
    assert_eq!(
        tree,
        vec![
            ("bbb/c1".to_string(), 1),
            ("aaa/r1".to_string(), 2),
            ("bbb/c2".to_string(), 1),
        ]
    );
}

#[tokio::test]
async fn test_unknown_parent_writes_nothing() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(
            post(&abraham, "/c")
                .parent(PostRef::new("aaa", "/missing"))
                .set("body", "orphan"),
            &[&abraham],
        )
        .await;
    let event_id = event.id();

    let err = f.engine.process_event(event).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownPost(ref p) if p.path == "/missing"));
    assert!(f.engine.event(&event_id).await.unwrap().is_none());
    assert!(f.engine.signatures_for_event(&event_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resubmitting_committed_event_is_idempotent() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(post(&abraham, "/p").set("body", "x"), &[&abraham])
        .await;
    let first = f.engine.process_event(event.clone()).await.unwrap();
    let second = f.engine.process_event(event).await.unwrap();

    assert_eq!(first.event_id, second.event_id);
    assert_eq!(first.post_id, second.post_id);
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(
        f.engine
            .signatures_for_event(&first.event_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_process_json() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(post(&abraham, "/p").set("body", "wire"), &[&abraham])
        .await;
    let wire = serde_json::to_string(&event).unwrap();
    let committed = f.engine.process_json(&wire).await.unwrap();
    assert_eq!(committed.event_id, event.id());

    let err = f.engine.process_json("{\"path\": 3}").await.unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
}

#[tokio::test]
async fn test_relayed_event_keeps_id() {
    let abraham = Signer::new("abraham@aaa", 1);
    let f = fixture_with(&[&abraham]).await;

    let event = f
        .signed(post(&abraham, "/p").set("body", "x"), &[&abraham])
        .await;
    let mut relayed = event.clone();
    relayed.received_from = Some("bbb".into());
    assert_eq!(event.id(), relayed.id());

    let committed = f.engine.process_event(relayed).await.unwrap();
    let record = f.engine.event(&committed.event_id).await.unwrap().unwrap();
    assert_eq!(record.event.received_from.as_deref(), Some("bbb"));
}

#[tokio::test]
async fn test_existing_policy_requires_owner() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@aaa", 2);
    let f = TestFixture::with_policy("aaa", PolicyKind::Existing).await;
    f.register(&abraham).await;
    f.register(&isaac).await;

    let create = f
        .signed(post(&abraham, "/p").set("body", "mine"), &[&abraham])
        .await;
    f.engine.process_event(create).await.unwrap();

    let takeover = f
        .signed(post(&isaac, "/p").set("body", "theirs"), &[&isaac])
        .await;
    let err = f.engine.process_event(takeover).await.unwrap_err();
    assert_eq!(
        err.as_unauthorized().unwrap().missing(),
        BTreeSet::from([abraham.identity.clone()])
    );
}

#[tokio::test]
async fn test_declared_policy_trusts_declared_authors() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@aaa", 2);
    let f = TestFixture::with_policy("aaa", PolicyKind::Declared).await;
    f.register(&abraham).await;
    f.register(&isaac).await;

    let create = f
        .signed(post(&abraham, "/p").set("body", "mine"), &[&abraham])
        .await;
    f.engine.process_event(create).await.unwrap();

    let edit = f
        .signed(post(&isaac, "/p").set("body", "theirs"), &[&isaac])
        .await;
    f.engine.process_event(edit).await.unwrap();

    let authors = f.engine.post_authors("aaa", "/p").await.unwrap();
    assert_eq!(
        authors,
        BTreeSet::from([abraham.identity.clone(), isaac.identity.clone()])
    );
}

#[tokio::test]
async fn test_default_policy_needs_owner_and_new_author() {
    let abraham = Signer::new("abraham@aaa", 1);
    let isaac = Signer::new("isaac@aaa", 2);
    let f = fixture_with(&[&abraham, &isaac]).await;

    let create = f
        .signed(post(&abraham, "/p").set("body", "mine"), &[&abraham])
        .await;
    f.engine.process_event(create).await.unwrap();

    let alone = f
        .signed(post(&isaac, "/p").set("body", "ours"), &[&isaac])
        .await;
    assert!(f.engine.process_event(alone).await.is_err());

    let together = f
        .signed(post(&isaac, "/p").set("body", "ours"), &[&isaac, &abraham])
        .await;
    f.engine.process_event(together).await.unwrap();
}

#[tokio::test]
async fn test_unknown_server_without_creation() {
    let abraham = Signer::new("abraham@zzz", 1);
    let mut config = EngineConfig::new("aaa");
    config.create_unknown_servers = false;
    let f = TestFixture::with_config(config).await;

    let event = f
        .signed(post(&abraham, "/p").set("body", "x"), &[&abraham])
        .await;
    let event_id = event.id();
    let err = f.engine.process_event(event).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownServer(ref s) if s == "zzz"));
    assert!(f.engine.event(&event_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_registry_lookups() {
    let f = TestFixture::new("aaa").await;
    let sarah = Identity::parse("sarah@aaa").unwrap();

    let err = f.engine.resolve_user(&sarah, false).await.unwrap_err();
    assert!(matches!(err, EngineError::UnknownIdentity(_)));
    assert!(f.engine.keypairs(&sarah).await.is_err());

    let user = f.engine.resolve_user(&sarah, true).await.unwrap();
    let again = f.engine.resolve_user(&sarah, true).await.unwrap();
    assert_eq!(user.id, again.id);
    assert!(f.engine.keypairs(&sarah).await.unwrap().is_empty());

    let key = f.engine.generate_keypair(&sarah).await.unwrap();
    assert!(key.has_secret());
    let keys = f.engine.keypairs(&sarah).await.unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].public_key, key.public_key);
}

#[tokio::test]
async fn test_mismatched_secret_is_refused() {
    let f = TestFixture::new("aaa").await;
    let sarah = Identity::parse("sarah@aaa").unwrap();
    let a = Signer::new("sarah@aaa", 1);
    let b = Signer::new("sarah@aaa", 2);

    let err = f
        .engine
        .add_keypair(&sarah, a.public_key(), Some(b.keypair.seed()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Core(_)));
}

#[tokio::test]
async fn test_local_server_is_registered() {
    let f = TestFixture::new("aaa").await;
    let local = f.engine.local_server().await.unwrap();
    assert_eq!(local.name, "aaa");
    assert!(local.is_local);
    assert_eq!(local.engine_name.as_deref(), Some("fedpost"));
}

#[tokio::test]
async fn test_reads_on_missing_post() {
    let f = TestFixture::new("aaa").await;
    assert!(f.engine.post("aaa", "/nope").await.unwrap().is_none());
    assert!(matches!(
        f.engine.post_authors("aaa", "/nope").await,
        Err(EngineError::UnknownPost(_))
    ));
    assert!(matches!(
        f.engine.comments("aaa", "/nope").await,
        Err(EngineError::UnknownPost(_))
    ));
}
