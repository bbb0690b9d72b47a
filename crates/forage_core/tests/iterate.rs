//! Key listing and iteration over a store.

mod common;

use common::Harness;
use forage_core::{execute_callback, ForageResult, Value};
use std::sync::mpsc;

#[tokio::test]
async fn iterate_visits_keys_in_order_with_sequence_numbers() {
    let h = Harness::new();
    let forage = h.forage("db", "items");
    for (key, value) in [("c", 3), ("a", 1), ("b", 2)] {
        forage.set_item(key, value).await.unwrap();
    }

    let mut seen = Vec::new();
    let found: Option<()> = forage
        .iterate(|value, key, sequence| {
            seen.push((key.to_string(), value, sequence));
            None
        })
        .await
        .unwrap();

    assert_eq!(found, None);
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Value::from(1), 1),
            ("b".to_string(), Value::from(2), 2),
            ("c".to_string(), Value::from(3), 3),
        ]
    );
}

#[tokio::test]
async fn iterate_stops_at_first_result() {
    let h = Harness::new();
    let forage = h.forage("db", "items");
    for key in ["a", "b", "c", "d"] {
        forage.set_item(key, key).await.unwrap();
    }

    let mut calls = 0;
    let found = forage
        .iterate(|value, _, sequence| {
            calls += 1;
            (sequence == 2).then_some(value)
        })
        .await
        .unwrap();

    assert_eq!(found, Some(Value::from("b")));
    assert_eq!(calls, 2);
}

#[tokio::test]
async fn iterate_over_empty_store() {
    let h = Harness::new();
    let forage = h.forage("db", "items");

    let mut calls = 0;
    let found: Option<u32> = forage
        .iterate(|_, _, _| {
            calls += 1;
            None
        })
        .await
        .unwrap();

    assert_eq!(found, None);
    assert_eq!(calls, 0);
}

#[tokio::test]
async fn keys_key_and_length_agree() {
    let h = Harness::new();
    let forage = h.forage("db", "items");
    for key in ["pear", "apple", "fig"] {
        forage.set_item(key, true).await.unwrap();
    }

    let keys = forage.keys().await.unwrap();
    assert_eq!(keys, vec!["apple", "fig", "pear"]);
    assert_eq!(forage.length().await.unwrap(), keys.len() as u64);
    for (index, expected) in keys.iter().enumerate() {
        assert_eq!(forage.key(index).await.unwrap().as_ref(), Some(expected));
    }
    assert_eq!(forage.key(keys.len()).await.unwrap(), None);
}

#[tokio::test]
async fn remove_and_clear() {
    let h = Harness::new();
    let forage = h.forage("db", "items");
    let other = h.forage("db", "other");
    forage.set_item("a", 1).await.unwrap();
    forage.set_item("b", 2).await.unwrap();
    other.set_item("a", 1).await.unwrap();

    forage.remove_item("a").await.unwrap();
    forage.remove_item("missing").await.unwrap();
    assert_eq!(forage.keys().await.unwrap(), vec!["b"]);

    forage.clear().await.unwrap();
    assert_eq!(forage.length().await.unwrap(), 0);
    assert_eq!(other.length().await.unwrap(), 1);
}

#[tokio::test]
async fn set_item_returns_the_value() {
    let h = Harness::new();
    let forage = h.forage("db", "items");

    let stored = forage.set_item("k", "v").await.unwrap();
    assert_eq!(stored, Value::from("v"));
    assert_eq!(forage.get_item("missing").await.unwrap(), None);
}

#[tokio::test]
async fn callbacks_receive_operation_results() {
    let h = Harness::new();
    let forage = h.forage("db", "items");
    let (tx, rx) = mpsc::channel();

    let sink = tx.clone();
    execute_callback(
        forage.set_item("k", 5),
        Some(Box::new(move |r: ForageResult<Value>| {
            sink.send(r.map(Some)).unwrap();
        })),
    )
    .await
    .unwrap();
    execute_callback(
        forage.get_item("k"),
        Some(Box::new(move |r: ForageResult<Option<Value>>| {
            tx.send(r).unwrap();
        })),
    )
    .await
    .unwrap();

    assert_eq!(rx.recv().unwrap(), Ok(Some(Value::from(5))));
    assert_eq!(rx.recv().unwrap(), Ok(Some(Value::from(5))));
}
