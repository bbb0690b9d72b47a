//! Instances sharing one database through the registry.

mod common;

use common::Harness;
use forage_core::{Forage, ForageConfig, Value, DETECT_BLOB_SUPPORT_STORE};
use forage_engine::EngineErrorKind;
use proptest::prelude::*;
use std::collections::HashMap;

#[tokio::test]
async fn stores_on_same_database_are_independent() {
    let h = Harness::new();
    let a = h.forage("X", "A");
    let b = h.forage("X", "B");

    a.set_item("k", "v1").await.unwrap();
    b.set_item("k", "v2").await.unwrap();

    assert_eq!(a.get_item("k").await.unwrap(), Some(Value::from("v1")));
    assert_eq!(b.get_item("k").await.unwrap(), Some(Value::from("v2")));
}

#[tokio::test]
async fn instances_share_one_connection() {
    let h = Harness::new();
    let a = h.forage("X", "A");
    let b = h.forage("X", "B");
    a.ready().await.unwrap();
    b.ready().await.unwrap();

    assert_eq!(h.engine.open_connection_count("X"), 1);
    assert_eq!(h.engine.database_version("X"), Some(3));
    let ctx = h.registry.get("X").unwrap();
    assert_eq!(ctx.instance_count(), 2);
    assert!(ctx.connection().is_some());
}

#[tokio::test]
async fn concurrent_initialisation_upgrades_once_per_store() {
    let h = Harness::new();
    let a = h.forage("db", "a");
    let b = h.forage("db", "b");
    let c = h.forage("db", "c");

    let (ra, rb, rc) = tokio::join!(a.ready(), b.ready(), c.ready());
    ra.unwrap();
    rb.unwrap();
    rc.unwrap();

    assert_eq!(h.engine.database_version("db"), Some(4));
    assert_eq!(h.engine.open_connection_count("db"), 1);
    let stores = h.engine.object_store_names("db");
    for store in ["a", "b", "c"] {
        assert!(stores.contains(&store.to_string()), "missing {store}");
    }
}

#[tokio::test]
async fn fresh_database_with_one_store_is_at_version_two() {
    let h = Harness::new();
    let forage = h.forage("fresh", "only");
    forage.ready().await.unwrap();

    assert_eq!(h.engine.database_version("fresh"), Some(2));
    let stores = h.engine.object_store_names("fresh");
    assert!(stores.contains(&"only".to_string()));
    assert!(stores.contains(&DETECT_BLOB_SUPPORT_STORE.to_string()));
}

#[tokio::test]
async fn adding_a_store_past_the_highest_version_fails() {
    let h = Harness::new();
    let top = h.forage_with(
        ForageConfig::new("db")
            .with_store_name("top")
            .with_version(u32::MAX),
    );
    top.set_item("k", 1).await.unwrap();
    assert_eq!(h.engine.database_version("db"), Some(u32::MAX));

    let late = h.forage("db", "late");
    let err = late.ready().await.unwrap_err();
    assert_eq!(
        err.as_engine().map(|e| e.kind()),
        Some(EngineErrorKind::Version)
    );
    assert_eq!(top.get_item("k").await.unwrap(), Some(Value::from(1)));
}

#[tokio::test]
async fn same_store_is_shared() {
    let h = Harness::new();
    let first = h.forage("db", "items");
    let second = h.forage("db", "items");

    first.set_item("k", true).await.unwrap();
    assert_eq!(second.get_item("k").await.unwrap(), Some(Value::from(true)));
    assert_eq!(h.engine.database_version("db"), Some(2));
}

#[tokio::test]
async fn different_databases_do_not_interact() {
    let h = Harness::new();
    let a = h.forage("one", "s");
    let b = h.forage("two", "s");
    a.set_item("k", 1).await.unwrap();

    assert_eq!(b.get_item("k").await.unwrap(), None);
    assert_eq!(h.registry.len(), 2);
}

async fn write_then_read(forage: &Forage, tag: &str, rounds: usize) {
    for i in 0..rounds {
        let key = format!("key{}", i % 4);
        let value = format!("{tag}-{i}");
        forage.set_item(&key, value.as_str()).await.unwrap();
        assert_eq!(
            forage.get_item(&key).await.unwrap(),
            Some(Value::from(value)),
            "{tag} lost its write to {key}"
        );
    }
}

#[tokio::test]
async fn interleaved_writes_are_read_back_while_a_store_is_added() {
    let h = Harness::new();
    let a = h.forage("db", "a");
    let b = h.forage("db", "b");
    let c = h.forage("db", "c");
    a.ready().await.unwrap();
    b.ready().await.unwrap();
    c.ready().await.unwrap();

    let late = h.forage("db", "late");
    tokio::join!(
        write_then_read(&a, "a", 20),
        write_then_read(&b, "b", 20),
        write_then_read(&c, "c", 20),
        write_then_read(&late, "late", 5),
    );

    assert_eq!(a.length().await.unwrap(), 4);
    assert_eq!(late.length().await.unwrap(), 4);
    assert_eq!(h.engine.database_version("db"), Some(5));
}

#[derive(Debug, Clone)]
enum Op {
    Set(usize, u8, i32),
    Get(usize, u8),
    Remove(usize, u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..2, 0u8..4, any::<i32>()).prop_map(|(i, k, v)| Op::Set(i, k, v)),
        (0usize..2, 0u8..4).prop_map(|(i, k)| Op::Get(i, k)),
        (0usize..2, 0u8..4).prop_map(|(i, k)| Op::Remove(i, k)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn instances_behave_like_separate_maps(ops in proptest::collection::vec(op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let h = Harness::new();
            let instances = [h.forage("db", "left"), h.forage("db", "right")];
            let mut model: [HashMap<String, Value>; 2] = Default::default();

            for op in ops {
                match op {
                    Op::Set(i, k, v) => {
                        let key = k.to_string();
                        instances[i].set_item(&key, v).await.unwrap();
                        model[i].insert(key, Value::from(v));
                    }
                    Op::Get(i, k) => {
                        let key = k.to_string();
                        let got = instances[i].get_item(&key).await.unwrap();
                        assert_eq!(got.as_ref(), model[i].get(&key));
                    }
                    Op::Remove(i, k) => {
                        let key = k.to_string();
                        instances[i].remove_item(&key).await.unwrap();
                        model[i].remove(&key);
                    }
                }
            }

            for (forage, expected) in instances.iter().zip(&model) {
                assert_eq!(forage.length().await.unwrap(), expected.len() as u64);
            }
        });
    }
}
