//! History store contract tests.
//!
//! Every backend must behave identically from the caller's point of view.
//! The same suite runs against the in-memory store and against the `DynamoDB`
//! store on an in-process table client, which exercises the real item
//! encoding and the provisioning path.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::float_cmp)]

use memvault::models::SetId;
use memvault::storage::HistoryStore;
use memvault::{Error, LongTermRecord, MemorySnapshot, ShortTermRecord};

fn set_id(id: &str) -> SetId {
    SetId::new(id).expect("valid set id")
}

fn short(id: &str, embedding: Vec<f64>) -> ShortTermRecord {
    ShortTermRecord::new(id, format!("prompt {id}"), format!("output {id}"), 1_700_000_000.5)
        .with_embedding(embedding)
        .with_concepts(vec!["topic".to_string(), format!("concept-{id}")])
}

fn long(id: &str, total_score: f64) -> LongTermRecord {
    LongTermRecord {
        id: id.to_string(),
        prompt: format!("prompt {id}"),
        output: format!("output {id}"),
        timestamp: 1_699_999_000.25,
        access_count: 7,
        decay_factor: 0.8,
        total_score,
    }
}

fn round_trip_empty(store: &dyn HistoryStore) {
    store.save_history(&set_id("empty"), &[], &[]).unwrap();
    let history = store.load_history(&set_id("empty")).unwrap();
    assert!(history.short_term.is_empty());
    assert!(history.long_term.is_empty());
}

fn round_trip_single(store: &dyn HistoryStore) {
    let record = ShortTermRecord::new("1", "hi", "hello", 1000.0)
        .with_embedding(vec![0.1, 0.2])
        .with_concepts(vec!["greeting".to_string()]);
    store
        .save_history(&set_id("userA"), std::slice::from_ref(&record), &[])
        .unwrap();

    let history = store.load_history(&set_id("userA")).unwrap();
    assert_eq!(history.short_term, vec![record]);
    assert!(history.long_term.is_empty());
    assert_eq!(history.short_term[0].access_count, 0);
    assert_eq!(history.short_term[0].decay_factor, 1.0);
}

fn round_trip_many(store: &dyn HistoryStore) {
    let short_term: Vec<_> = (0..25_u32)
        .map(|i| {
            short(&i.to_string(), vec![f64::from(i) * 0.013, -0.5, 1.0 / 3.0])
                .with_access_count(u64::from(i) * 3)
                .with_decay_factor(0.99_f64.powf(f64::from(i)))
        })
        .collect();
    let long_term: Vec<_> = (0..10)
        .map(|i| long(&format!("lt-{i}"), f64::from(i) / 7.0))
        .collect();

    store
        .save_history(&set_id("many"), &short_term, &long_term)
        .unwrap();
    let history = store.load_history(&set_id("many")).unwrap();
    assert_eq!(history.short_term, short_term);
    assert_eq!(history.long_term, long_term);
}

fn unknown_set_is_empty(store: &dyn HistoryStore) {
    let history = store.load_history(&set_id("never-saved")).unwrap();
    assert!(history.is_empty());
}

fn overwrite_not_merge(store: &dyn HistoryStore) {
    let id = set_id("overwrite");
    store
        .save_history(
            &id,
            &[short("a", vec![0.1]), short("b", vec![0.2])],
            &[long("x", 1.0)],
        )
        .unwrap();
    store
        .save_history(&id, &[short("c", vec![0.3])], &[])
        .unwrap();

    let history = store.load_history(&id).unwrap();
    assert_eq!(history.short_term, vec![short("c", vec![0.3])]);
    assert!(history.long_term.is_empty());
}

fn mismatch_leaves_prior_state(store: &dyn HistoryStore) {
    let id = set_id("mismatch");
    store
        .save_history(&id, &[short("a", vec![0.1, 0.2])], &[])
        .unwrap();

    let mut snapshot = MemorySnapshot::from_memory_set(&store.load_history(&id).unwrap());
    snapshot.timestamps.push(42.0);
    let err = store.save_snapshot(&id, &snapshot).unwrap_err();
    assert!(matches!(err, Error::SerializationMismatch(_)));

    let history = store.load_history(&id).unwrap();
    assert_eq!(history.short_term, vec![short("a", vec![0.1, 0.2])]);
}

fn invalid_records_are_rejected(store: &dyn HistoryStore) {
    let id = set_id("invalid");
    let fractional = MemorySnapshot {
        access_counts: vec![1.5],
        ..MemorySnapshot::from_memory_set(&memvault::MemorySet::new(
            vec![short("a", vec![0.1])],
            vec![],
        ))
    };
    assert!(matches!(
        store.save_snapshot(&id, &fractional),
        Err(Error::SerializationMismatch(_))
    ));

    let duplicate = [short("a", vec![0.1]), short("a", vec![0.2])];
    assert!(store.save_history(&id, &duplicate, &[]).is_err());

    let uneven = [short("a", vec![0.1]), short("b", vec![0.1, 0.2])];
    assert!(store.save_history(&id, &uneven, &[]).is_err());

    assert!(store.load_history(&id).unwrap().is_empty());
}

fn missing_decay_defaults_to_one(store: &dyn HistoryStore) {
    let id = set_id("decay");
    let mut snapshot = MemorySnapshot::new();
    snapshot.push_interaction(
        memvault::InteractionEntry::new("1", "hi", "hello"),
        vec![0.5, 0.25],
        1000.0,
        vec!["greeting".to_string()],
    );
    store.save_snapshot(&id, &snapshot).unwrap();

    let loaded = store.load_snapshot(&id).unwrap();
    assert_eq!(loaded.short_term[0].decay_factor, Some(1.0));
    assert_eq!(loaded.embeddings, vec![vec![0.5_f32, 0.25]]);
    assert_eq!(loaded.access_counts, vec![0.0]);
    assert_eq!(loaded.concepts, vec![vec!["greeting".to_string()]]);
}

fn sets_are_isolated(store: &dyn HistoryStore) {
    store
        .save_history(&set_id("iso-a"), &[short("1", vec![0.1])], &[])
        .unwrap();
    store
        .save_history(&set_id("iso-b"), &[], &[long("2", 0.5)])
        .unwrap();

    let a = store.load_history(&set_id("iso-a")).unwrap();
    let b = store.load_history(&set_id("iso-b")).unwrap();
    assert_eq!(a.short_term.len(), 1);
    assert!(a.long_term.is_empty());
    assert!(b.short_term.is_empty());
    assert_eq!(b.long_term, vec![long("2", 0.5)]);
}

fn concurrent_loads_see_whole_sets(store: &dyn HistoryStore) {
    let id = set_id("concurrent");
    let first = vec![short("a", vec![0.1]), short("b", vec![0.2])];
    let second = vec![short("c", vec![0.3])];
    store.save_history(&id, &first, &[]).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for _ in 0..20 {
                store.save_history(&id, &second, &[]).unwrap();
                store.save_history(&id, &first, &[]).unwrap();
            }
        });
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..20 {
                    let loaded = store.load_history(&id).unwrap().short_term;
                    assert!(loaded == first || loaded == second);
                }
            });
        }
    });
}

macro_rules! history_store_contract {
    ($name:ident, $store:expr) => {
        mod $name {
            use super::*;

            fn store() -> Box<dyn HistoryStore> {
                Box::new($store)
            }

            #[test]
            fn round_trip_empty_set() {
                round_trip_empty(store().as_ref());
            }

            #[test]
            fn round_trip_single_record() {
                round_trip_single(store().as_ref());
            }

            #[test]
            fn round_trip_many_records() {
                round_trip_many(store().as_ref());
            }

            #[test]
            fn unknown_set_loads_empty() {
                unknown_set_is_empty(store().as_ref());
            }

            #[test]
            fn save_overwrites_instead_of_merging() {
                overwrite_not_merge(store().as_ref());
            }

            #[test]
            fn misaligned_snapshot_is_rejected() {
                mismatch_leaves_prior_state(store().as_ref());
            }

            #[test]
            fn invalid_records_are_rejected_before_write() {
                invalid_records_are_rejected(store().as_ref());
            }

            #[test]
            fn missing_decay_factor_defaults_to_one() {
                missing_decay_defaults_to_one(store().as_ref());
            }

            #[test]
            fn sets_are_isolated_by_id() {
                sets_are_isolated(store().as_ref());
            }

            #[test]
            fn loads_never_observe_partial_saves() {
                concurrent_loads_see_whole_sets(store().as_ref());
            }
        }
    };
}

history_store_contract!(memory, memvault::InMemoryHistoryStore::new());

history_store_contract!(
    dynamodb_local,
    memvault::DynamoHistoryStore::with_client(
        memvault::LocalTableClient::with_creation_delay(3),
        &memvault::DynamoConfig::default()
            .with_table_name("memvault_contract")
            .with_provision_polling(
                std::time::Duration::from_secs(5),
                std::time::Duration::ZERO
            ),
    )
);
