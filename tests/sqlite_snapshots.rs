mod common;

use tempfile::TempDir;

use concpipe::{
    engine::replay::ReplayRequest,
    persist::{SnapshotStore, sqlite::SqliteSnapshotStore},
    runtime::{
        events::PipelineEvent,
        handle::{ClientConfig, spawn_pipeline_runtime},
    },
};

use common::*;

#[tokio::test]
async fn appends_are_persisted_and_restorable() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("pipelines.db");
    let store = SqliteSnapshotStore::open(&db_path).expect("open sqlite");

    let steps = query_filter_sort();
    let server = FakeServer::new();
    let mut client = ClientConfig::new(ROOT, context());
    client.runtime.persist_on_append = true;
    let handle = spawn_pipeline_runtime(
        snapshot_cached(&steps),
        client,
        server.clone(),
        Some(Box::new(store)),
    );
    let mut sub = handle.subscribe();

    handle.update_form(1, filter_args("pes")).await.expect("update");
    handle
        .branch(ReplayRequest::through_tail(1))
        .await
        .expect("replay");
    let live = handle.snapshot().await.expect("snapshot");
    handle.shutdown().await.expect("shutdown");

    let mut saw_checkpoint = false;
    while let Ok(evt) = sub.try_recv() {
        if evt
            == (PipelineEvent::Checkpointed {
                tail: Some("sortx-2".to_string()),
            })
        {
            saw_checkpoint = true;
        }
    }
    assert!(saw_checkpoint);

    let reopened = SqliteSnapshotStore::open(&db_path).expect("reopen");
    let saved = reopened
        .load_latest()
        .expect("load")
        .expect("saved snapshot");
    assert_eq!(saved.snapshot, live);
    assert_eq!(saved.context.persistence_id.as_deref(), Some("sortx-2"));
    assert!(reopened.load_by_tail("sortx-2").expect("load").is_some());
}

#[tokio::test]
async fn checkpoint_prunes_to_configured_count() {
    let tmp = TempDir::new().expect("tmp");
    let db_path = tmp.path().join("prune.db");
    let store = SqliteSnapshotStore::open(&db_path).expect("open sqlite");

    let mut client = ClientConfig::new(ROOT, context());
    client.runtime.keep_snapshots = 2;
    let handle = spawn_pipeline_runtime(
        snapshot_cached(&query_filter_sort()),
        client,
        FakeServer::new(),
        Some(Box::new(store)),
    );
    for _ in 0..4 {
        handle.checkpoint().await.expect("checkpoint");
    }
    handle.trim_after(1).await.expect("trim");
    handle.checkpoint().await.expect("checkpoint");
    handle.shutdown().await.expect("shutdown");

    let reopened = SqliteSnapshotStore::open(&db_path).expect("reopen");
    assert_eq!(reopened.count().expect("count"), 2);
    let latest = reopened.load_latest().expect("load").expect("latest");
    assert_eq!(latest.tail_id(), Some("b"));
    assert!(reopened.load_by_tail("c").expect("load").is_some());
}

#[tokio::test]
async fn checkpoint_without_store_is_a_no_op() {
    let handle = spawn_pipeline_runtime(
        snapshot_cached(&query_filter_sort()),
        ClientConfig::new(ROOT, context()),
        FakeServer::new(),
        None,
    );
    let mut sub = handle.subscribe();
    handle.checkpoint().await.expect("checkpoint");
    assert!(sub.try_recv().is_err());
}

#[test]
fn client_config_reads_json() {
    let cfg = ClientConfig::from_json_str(
        r#"{
            "root_url": "https://kontext.example.org/",
            "context": {"corpname": "intercorp_v16_cs", "pagesize": 40},
            "runtime": {"replay_policy": "queue", "persist_on_append": true}
        }"#,
    )
    .expect("parse");
    assert_eq!(cfg.context.corpname, "intercorp_v16_cs");
    assert_eq!(cfg.context.pagesize, Some(40));
    assert!(cfg.runtime.persist_on_append);
    assert_eq!(cfg.runtime.keep_snapshots, 16);
    assert_eq!(
        cfg.runtime.replay_policy,
        concpipe::runtime::state::ReplayPolicy::Queue
    );
}
