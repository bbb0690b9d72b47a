//! Transparent recovery from connections invalidated outside the instance.

mod common;

use common::Harness;
use forage_core::Value;
use forage_engine::{Connection, Engine, EngineErrorKind, MemoryEngine, OpenRequest, VersionChange};

#[tokio::test]
async fn force_closed_connection_is_reopened() {
    let h = Harness::new();
    let forage = h.forage("X", "A");
    forage.set_item("k", "before").await.unwrap();

    assert_eq!(h.engine.force_close("X"), 1);
    forage.set_item("k", "after").await.unwrap();

    assert_eq!(forage.get_item("k").await.unwrap(), Some(Value::from("after")));
    assert_eq!(h.engine.open_connection_count("X"), 1);
}

#[tokio::test]
async fn every_operation_recovers_after_force_close() {
    let h = Harness::new();
    let forage = h.forage("X", "A");
    forage.set_item("a", 1).await.unwrap();
    forage.set_item("b", 2).await.unwrap();

    h.engine.force_close("X");
    assert_eq!(forage.length().await.unwrap(), 2);
    h.engine.force_close("X");
    assert_eq!(forage.key(1).await.unwrap().as_deref(), Some("b"));
    h.engine.force_close("X");
    assert_eq!(forage.keys().await.unwrap(), vec!["a".to_string(), "b".to_string()]);
    h.engine.force_close("X");
    forage.remove_item("a").await.unwrap();
    h.engine.force_close("X");
    let first: Option<String> = forage
        .iterate(|_, key, _| Some(key.to_string()))
        .await
        .unwrap();
    assert_eq!(first.as_deref(), Some("b"));
    h.engine.force_close("X");
    forage.clear().await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 0);
}

#[tokio::test]
async fn reconnect_is_shared_with_siblings() {
    let h = Harness::new();
    let a = h.forage("X", "A");
    let b = h.forage("X", "B");
    a.set_item("k", "a").await.unwrap();
    b.set_item("k", "b").await.unwrap();

    h.engine.force_close("X");
    a.set_item("k", "a2").await.unwrap();

    let ctx = h.registry.get("X").unwrap();
    let shared = ctx.connection().unwrap();
    assert!(!shared.is_closed());
    assert_eq!(b.get_item("k").await.unwrap(), Some(Value::from("b")));
    assert_eq!(h.engine.open_connection_count("X"), 1);
}

#[tokio::test]
async fn external_version_change_is_invisible() {
    let h = Harness::new();
    let forage = h.forage("X", "A");
    forage.set_item("k", "v1").await.unwrap();

    let version = h.engine.database_version("X").unwrap();
    let other = h
        .engine
        .open(
            OpenRequest::new("X")
                .with_version(version + 1)
                .on_upgrade(Box::new(|change: &mut dyn VersionChange| {
                    change.create_object_store("external")
                })),
        )
        .await
        .unwrap();
    other.close();

    assert_eq!(forage.get_item("k").await.unwrap(), Some(Value::from("v1")));
    forage.set_item("k", "v2").await.unwrap();
    assert_eq!(forage.get_item("k").await.unwrap(), Some(Value::from("v2")));
}

#[tokio::test]
async fn external_delete_recreates_store() {
    let h = Harness::new();
    let forage = h.forage("X", "A");
    forage.set_item("k", "v1").await.unwrap();

    h.engine.delete_database("X").await.unwrap();

    assert_eq!(forage.get_item("k").await.unwrap(), None);
    forage.set_item("k", "v2").await.unwrap();
    assert_eq!(forage.get_item("k").await.unwrap(), Some(Value::from("v2")));
    assert!(h.engine.object_store_names("X").contains(&"A".to_string()));
}

#[tokio::test]
async fn quota_error_is_surfaced_unmodified() {
    let h = Harness::with_engine(MemoryEngine::builder().quota(512).build());
    let forage = h.forage("X", "A");
    forage.set_item("small", "ok").await.unwrap();

    let err = forage
        .set_item("big", Value::Bytes(vec![7; 4096]))
        .await
        .unwrap_err();
    assert_eq!(
        err.as_engine().map(|e| e.kind()),
        Some(EngineErrorKind::QuotaExceeded)
    );

    assert_eq!(forage.get_item("big").await.unwrap(), None);
    assert_eq!(forage.get_item("small").await.unwrap(), Some(Value::from("ok")));
}

#[tokio::test]
async fn operations_after_failed_write_still_work() {
    let h = Harness::with_engine(MemoryEngine::builder().quota(256).build());
    let forage = h.forage("X", "A");
    assert!(forage.set_item("big", Value::Bytes(vec![0; 1024])).await.is_err());
    forage.set_item("k", 1).await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 1);
}
