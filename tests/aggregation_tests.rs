//! Aggregation engine integration tests over a seeded in-memory store.

use abpulse::aggregation::MetricsAggregator;
use abpulse::core::config::{CacheConfig, StoreConfig};
use abpulse::core::types::{TestFilters, TestStatus};
use abpulse::events::EventBus;
use abpulse::store::{MemoryMetricsStore, MetricsStore};
use std::sync::Arc;
use std::time::Duration;

fn seeded_store() -> Arc<MemoryMetricsStore> {
    let store = Arc::new(MemoryMetricsStore::new());
    store.put_hash(
        "ab:test:t1",
        &[
            ("name", "Checkout copy"),
            ("status", "active"),
            ("start_date", "2026-08-01T00:00:00Z"),
            ("significance", "0.97"),
            ("confidence", "97"),
        ],
    );
    store.put_hash(
        "ab:variation:t1:control",
        &[
            ("name", "Control"),
            ("visitors", "500"),
            ("conversions", "25"),
            ("is_control", "true"),
        ],
    );
    store.put_hash(
        "ab:variation:t1:bold",
        &[("name", "Bold"), ("visitors", "480"), ("conversions", "36")],
    );
    store.put_hash(
        "ab:revenue:t1",
        &[
            ("total_revenue", "5230.0"),
            ("control_revenue", "2100.0"),
            ("treatment_revenue", "3130.0"),
            ("avg_order_value", "61.5"),
        ],
    );
    store.put_hash(
        "ab:test:t2",
        &[
            ("name", "Old banner"),
            ("status", "completed"),
            ("start_date", "2026-05-01T00:00:00Z"),
            ("end_date", "2026-06-01T00:00:00Z"),
            ("significance", "0.99"),
            ("winner", "Control"),
        ],
    );
    store.put_hash(
        "ab:variation:t2:control",
        &[("visitors", "1000"), ("conversions", "90"), ("is_control", "true")],
    );
    store
}

fn aggregator_over(store: Arc<MemoryMetricsStore>, ttl: Duration) -> MetricsAggregator {
    MetricsAggregator::new(
        store as Arc<dyn MetricsStore>,
        Arc::new(EventBus::new()),
        StoreConfig::default(),
        CacheConfig { ttl },
    )
}

#[tokio::test]
async fn test_test_metrics_totals_and_lift() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));

    let test = aggregator
        .get_test_metrics("t1")
        .await
        .unwrap()
        .expect("test t1 should exist");

    assert_eq!(test.total_visitors, 980);
    assert_eq!(test.total_conversions, 61);
    assert!((test.conversion_rate - 61.0 / 980.0).abs() < 1e-9);

    // Control converts at 5%, the treatment at 7.5%: a 50% lift.
    let bold = test
        .variations
        .iter()
        .find(|v| v.name == "Bold")
        .expect("bold variation present");
    assert!((bold.lift - 0.5).abs() < 1e-9);

    let control = test.control().expect("control present");
    assert_eq!(control.lift, 0.0);
}

#[tokio::test]
async fn test_unknown_test_reads_as_none() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));
    assert!(aggregator.get_test_metrics("nope").await.unwrap().is_none());
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));

    let all = aggregator.get_test_list(&TestFilters::default()).await.unwrap();
    assert_eq!(all.len(), 2);
    // Newest start date first.
    assert_eq!(all[0].id, "t1");

    let filters = TestFilters {
        statuses: Some(vec![TestStatus::Completed]),
        ..Default::default()
    };
    let completed = aggregator.get_test_list(&filters).await.unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, "t2");
}

#[tokio::test]
async fn test_cache_serves_stale_until_ttl_expires() {
    let store = seeded_store();
    let aggregator = aggregator_over(Arc::clone(&store), Duration::from_millis(50));

    let before = aggregator.get_test_metrics("t1").await.unwrap().unwrap();
    assert_eq!(before.total_visitors, 980);

    // Update the store; the cached entry keeps serving until its TTL lapses.
    store.put_hash(
        "ab:variation:t1:bold",
        &[("name", "Bold"), ("visitors", "1480"), ("conversions", "36")],
    );
    let cached = aggregator.get_test_metrics("t1").await.unwrap().unwrap();
    assert_eq!(cached.total_visitors, 980);

    tokio::time::sleep(Duration::from_millis(70)).await;
    let fresh = aggregator.get_test_metrics("t1").await.unwrap().unwrap();
    assert_eq!(fresh.total_visitors, 1980);
}

#[tokio::test]
async fn test_clear_cache_forces_recompute() {
    let store = seeded_store();
    let aggregator = aggregator_over(Arc::clone(&store), Duration::from_secs(300));

    let _ = aggregator.get_test_metrics("t1").await.unwrap();
    store.put_hash(
        "ab:variation:t1:bold",
        &[("name", "Bold"), ("visitors", "980"), ("conversions", "36")],
    );

    aggregator.clear_cache();
    let fresh = aggregator.get_test_metrics("t1").await.unwrap().unwrap();
    assert_eq!(fresh.total_visitors, 1480);
}

#[tokio::test]
async fn test_executive_summary_counts() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));

    let summary = aggregator
        .get_executive_summary(&TestFilters::default())
        .await
        .unwrap();

    assert_eq!(summary.total_tests, 2);
    assert_eq!(summary.active_tests, 1);
    assert_eq!(summary.completed_tests, 1);
    // t2 is significant with a declared winner; t1 has no winner yet.
    assert!((summary.success_rate - 0.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_revenue_attribution_for_unknown_test_is_none() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));
    assert!(aggregator
        .get_revenue_attribution(Some("ghost"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_revenue_attribution_across_tests() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));

    let attribution = aggregator
        .get_revenue_attribution(None)
        .await
        .unwrap()
        .expect("cross-test attribution always present");
    assert!(attribution.test_id.is_none());
    assert!((attribution.total_revenue - 5230.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_revenue_attribution_cache_keys_never_collide() {
    // A test literally named "all" must not share a cache entry with the
    // cross-test aggregate.
    let store = Arc::new(MemoryMetricsStore::new());
    store.put_hash("ab:test:all", &[("name", "All users banner"), ("status", "active")]);
    store.put_hash(
        "ab:variation:all:control",
        &[("visitors", "100"), ("conversions", "10"), ("is_control", "true")],
    );
    store.put_hash("ab:revenue:all", &[("total_revenue", "100.0")]);
    store.put_hash("ab:test:other", &[("name", "Other"), ("status", "completed")]);
    store.put_hash(
        "ab:variation:other:control",
        &[("visitors", "100"), ("conversions", "10"), ("is_control", "true")],
    );
    store.put_hash("ab:revenue:other", &[("total_revenue", "900.0")]);

    let aggregator = aggregator_over(store, Duration::from_secs(300));

    let aggregate = aggregator.get_revenue_attribution(None).await.unwrap().unwrap();
    assert_eq!(aggregate.test_id, None);
    assert!((aggregate.total_revenue - 1000.0).abs() < 1e-9);

    // Both orders: the aggregate is already cached, the single test must
    // still resolve to its own data.
    let single = aggregator
        .get_revenue_attribution(Some("all"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(single.test_id.as_deref(), Some("all"));
    assert!((single.total_revenue - 100.0).abs() < 1e-9);

    let aggregate_again = aggregator.get_revenue_attribution(None).await.unwrap().unwrap();
    assert_eq!(aggregate_again.test_id, None);
    assert!((aggregate_again.total_revenue - 1000.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_real_time_snapshot_covers_active_tests_only() {
    let aggregator = aggregator_over(seeded_store(), Duration::from_secs(300));

    let snapshot = aggregator.get_real_time_metrics(3).await.unwrap();
    assert_eq!(snapshot.active_tests, 1);
    assert_eq!(snapshot.total_visitors, 980);
    assert_eq!(snapshot.total_conversions, 61);
    assert!((snapshot.conversion_rate - 61.0 / 980.0).abs() < 1e-9);
    assert_eq!(snapshot.unacknowledged_alerts, 3);
}

#[tokio::test]
async fn test_malformed_counters_read_as_zero() {
    let store = Arc::new(MemoryMetricsStore::new());
    store.put_hash("ab:test:bad", &[("name", "Broken"), ("status", "active")]);
    store.put_hash(
        "ab:variation:bad:control",
        &[("visitors", "not-a-number"), ("conversions", ""), ("is_control", "true")],
    );

    let aggregator = aggregator_over(store, Duration::from_secs(300));
    let test = aggregator.get_test_metrics("bad").await.unwrap().unwrap();
    assert_eq!(test.total_visitors, 0);
    assert_eq!(test.conversion_rate, 0.0);
}
