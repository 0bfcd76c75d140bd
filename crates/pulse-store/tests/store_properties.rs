//! Property tests for gauge and counter semantics.

use std::collections::HashMap;

use proptest::prelude::*;
use pulse_proto::Metric;
use pulse_store::{MemoryStore, MetricsStore, Snapshot};

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

fn name() -> impl Strategy<Value = String> {
    "[a-e]"
}

proptest! {
    #[test]
    fn counter_is_sum_of_deltas(deltas in prop::collection::vec(-1_000_000_i64..1_000_000, 1..32)) {
        let total = block_on(async {
            let store = MemoryStore::new();
            for delta in &deltas {
                store.set_counter("c", *delta).await.unwrap();
            }
            store.get_counter("c").await.unwrap()
        });
        prop_assert_eq!(total, Some(deltas.iter().sum::<i64>()));
    }

    #[test]
    fn gauge_keeps_last_finite_write(values in prop::collection::vec(any::<f64>(), 1..32)) {
        let (last, rejected) = block_on(async {
            let store = MemoryStore::new();
            let mut rejected = 0_usize;
            for value in &values {
                if store.set_gauge("g", *value).await.is_err() {
                    rejected += 1;
                }
            }
            (store.get_gauge("g").await.unwrap(), rejected)
        });
        prop_assert_eq!(last, values.iter().rev().find(|v| v.is_finite()).copied());
        prop_assert_eq!(rejected, values.iter().filter(|v| !v.is_finite()).count());
    }

    #[test]
    fn bulk_counters_match_individual_writes(
        batches in prop::collection::vec(prop::collection::hash_map(name(), -1000_i64..1000, 0..5), 0..8)
    ) {
        let (bulk, single) = block_on(async {
            let bulk = MemoryStore::new();
            let single = MemoryStore::new();
            for batch in &batches {
                bulk.set_counters(batch).await.unwrap();
                for (name, delta) in batch {
                    single.set_counter(name, *delta).await.unwrap();
                }
            }
            (bulk.get_counters().await.unwrap(), single.get_counters().await.unwrap())
        });
        prop_assert_eq!(bulk, single);
    }

    #[test]
    fn folding_metrics_matches_store_writes(
        metrics in prop::collection::vec(
            prop_oneof![
                (name(), -1000.0_f64..1000.0).prop_map(|(id, v)| Metric::gauge(id, v)),
                (name(), -1000_i64..1000).prop_map(|(id, d)| Metric::counter(id, d)),
            ],
            0..24,
        )
    ) {
        let folded = Snapshot::from_metrics(metrics.clone());
        let stored = block_on(async {
            let store = MemoryStore::new();
            for metric in metrics {
                match metric {
                    Metric::Gauge { id, value } => store.set_gauge(&id, value).await.unwrap(),
                    Metric::Counter { id, delta } => store.set_counter(&id, delta).await.unwrap(),
                }
            }
            store.snapshot().await.unwrap()
        });
        prop_assert_eq!(folded, stored);
    }

    #[test]
    fn clears_always_empty_the_store(
        gauges in prop::collection::hash_map(name(), -10.0_f64..10.0, 0..5),
        counters in prop::collection::hash_map(name(), -10_i64..10, 0..5),
    ) {
        let (after, points) = block_on(async {
            let store = MemoryStore::new();
            store.set_gauges(&gauges).await.unwrap();
            store.set_counters(&counters).await.unwrap();
            store.clear_gauges().await.unwrap();
            store.clear_counters().await.unwrap();

            let mut points = HashMap::new();
            for name in gauges.keys().chain(counters.keys()) {
                points.insert(
                    name.clone(),
                    (store.get_gauge(name).await.unwrap(), store.get_counter(name).await.unwrap()),
                );
            }
            (store.snapshot().await.unwrap(), points)
        });
        prop_assert!(after.is_empty());
        prop_assert!(points.values().all(|p| *p == (None, None)));
    }
}
