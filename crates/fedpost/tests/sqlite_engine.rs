//! The engine over a SQLite file: durability of commits and of rejection
//! evidence, and concurrent callers.

use std::sync::Arc;

use fedpost::store::SqliteStore;
use fedpost::{Engine, EngineConfig, EventBuilder, PostData};
use fedpost_testkit::{corrupt_signature, Signer};
use serde_json::{json, Value};
use tempfile::TempDir;

async fn open(dir: &TempDir) -> Engine<SqliteStore> {
    let store = SqliteStore::open(dir.path().join("fedpost.db")).unwrap();
    Engine::open(store, EngineConfig::new("aaa")).await.unwrap()
}

async fn register(engine: &Engine<SqliteStore>, signer: &Signer) {
    engine
        .add_keypair(&signer.identity, signer.public_key(), None)
        .await
        .unwrap();
}

fn signed(signer: &Signer, path: &str, body: &str, current: &PostData) -> fedpost::Event {
    EventBuilder::new("aaa")
        .path(path)
        .author(signer.identity.clone())
        .set("body", body)
        .sign(&signer.identity, &signer.keypair, current)
        .build()
}

#[tokio::test]
async fn test_commit_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let abraham = Signer::new("abraham@aaa", 1);

    let event_id = {
        let engine = open(&dir).await;
        register(&engine, &abraham).await;
        let committed = engine
            .process_event(signed(&abraham, "/p", "durable", &PostData::new()))
            .await
            .unwrap();
        committed.event_id
    };

    let engine = open(&dir).await;
    let saved = engine.post("aaa", "/p").await.unwrap().unwrap();
    assert_eq!(Value::Object(saved.data), json!({"body": "durable"}));

    let sigs = engine.signatures_for_event(&event_id).await.unwrap();
    assert_eq!(sigs.len(), 1);
    assert_eq!(sigs[0].post_id, saved.id);
    assert!(engine.event(&event_id).await.unwrap().is_some());

    // The local server row is reused, not duplicated.
    assert_eq!(engine.local_server().await.unwrap().name, "aaa");
}

#[tokio::test]
async fn test_rejection_evidence_is_durable() {
    let dir = TempDir::new().unwrap();
    let abraham = Signer::new("abraham@aaa", 1);
    let engine = open(&dir).await;
    register(&engine, &abraham).await;

    let event = corrupt_signature(signed(&abraham, "/p", "x", &PostData::new()), &abraham);
    let event_id = event.id();
    assert!(engine.process_event(event).await.is_err());
    drop(engine);

    let engine = open(&dir).await;
    assert!(engine.post("aaa", "/p").await.unwrap().is_none());
    let unverified = engine.unverified_for_event(&event_id).await.unwrap();
    assert_eq!(unverified.len(), 1);
    assert_eq!(unverified[0].identity, "abraham@aaa");
    assert_eq!(unverified[0].post_id, None);
}

#[tokio::test]
async fn test_update_on_sqlite() {
    let dir = TempDir::new().unwrap();
    let abraham = Signer::new("abraham@aaa", 1);
    let engine = open(&dir).await;
    register(&engine, &abraham).await;

    engine
        .process_event(signed(&abraham, "/p", "one", &PostData::new()))
        .await
        .unwrap();
    let current = engine.post("aaa", "/p").await.unwrap().unwrap().data;
    let committed = engine
        .process_event(signed(&abraham, "/p", "two", &current))
        .await
        .unwrap();
    assert!(!committed.created);

    let saved = engine.post("aaa", "/p").await.unwrap().unwrap();
    assert_eq!(Value::Object(saved.data), json!({"body": "two"}));
    assert_eq!(engine.signatures_for_post("aaa", "/p").await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_events_on_distinct_posts() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(open(&dir).await);
    let signers: Vec<Signer> = (0..8u8)
        .map(|i| Signer::new(&format!("user{i}@aaa"), i + 1))
        .collect();
    for s in &signers {
        register(&engine, s).await;
    }

    let mut handles = Vec::new();
    for (i, signer) in signers.into_iter().enumerate() {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let event = signed(&signer, &format!("/p{i}"), "hi", &PostData::new());
            engine.process_event(event).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().created);
    }

    for i in 0..8 {
        assert!(engine.post("aaa", &format!("/p{i}")).await.unwrap().is_some());
    }
}
