//! Integration tests for the visit store and the stats built on top of it
//!
//! Tests can be filtered by database backend using the DATABASE_BACKEND environment variable:
//! - `DATABASE_BACKEND=sqlite cargo test` - Run only SQLite tests
//! - `DATABASE_BACKEND=postgres cargo test` - Run only PostgreSQL tests (needs DATABASE_URL)
//! - By default, both backends are tested

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;
use tempfile::TempDir;
use visitlog::clock::ManualClock;
use visitlog::models::{IpCount, NewVisit, RecordOutcome};
use visitlog::stats::StatsAggregator;
use visitlog::storage::{PostgresStorage, SqliteStorage, Storage};

/// Get the database backend to test from environment variable
fn should_test_backend(backend: &str) -> bool {
    match std::env::var("DATABASE_BACKEND") {
        Ok(val) => val.to_lowercase() == backend.to_lowercase(),
        Err(_) => true,
    }
}

/// Helper to create SQLite test storage
async fn create_sqlite_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Helper to create file-backed SQLite storage with a real connection pool
async fn create_sqlite_file_storage(dir: &TempDir, max_connections: u32) -> Arc<dyn Storage> {
    let url = format!("sqlite://{}", dir.path().join("visits.db").display());
    let storage = SqliteStorage::new(&url, max_connections).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

/// Helper to create PostgreSQL test storage
async fn create_postgres_storage() -> Option<Arc<dyn Storage>> {
    let db_url = std::env::var("DATABASE_URL").ok()?;
    if !db_url.starts_with("postgres") {
        return None;
    }
    let storage = PostgresStorage::new(&db_url, 5).await.ok()?;
    storage.init().await.ok()?;
    Some(Arc::new(storage))
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap()
}

fn visit(ip: &str) -> NewVisit {
    NewVisit {
        ip: ip.to_string(),
        user_agent: Some("Mozilla/5.0".to_string()),
        region: None,
    }
}

async fn count_for_ip(storage: &Arc<dyn Storage>, ip: &str) -> usize {
    storage
        .recent_visits(1000)
        .await
        .unwrap()
        .into_iter()
        .filter(|v| v.ip == ip)
        .count()
}

#[tokio::test]
async fn test_dedup_within_window_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    let first = storage.record_visit(&visit("1.2.3.4"), 60, now).await.unwrap();
    let second = storage
        .record_visit(&visit("1.2.3.4"), 60, now + Duration::seconds(30))
        .await
        .unwrap();

    assert!(matches!(first, RecordOutcome::Inserted(_)));
    assert_eq!(second, RecordOutcome::Deduplicated);
    assert_eq!(count_for_ip(&storage, "1.2.3.4").await, 1);
}

#[tokio::test]
async fn test_zero_window_disables_dedup_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    let first = storage.record_visit(&visit("1.2.3.4"), 0, now).await.unwrap();
    let second = storage.record_visit(&visit("1.2.3.4"), 0, now).await.unwrap();

    match (first, second) {
        (RecordOutcome::Inserted(a), RecordOutcome::Inserted(b)) => assert!(b > a),
        other => panic!("expected two inserts, got {other:?}"),
    }
    assert_eq!(count_for_ip(&storage, "1.2.3.4").await, 2);
}

#[tokio::test]
async fn test_dedup_window_elapses_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    storage.record_visit(&visit("1.2.3.4"), 60, now).await.unwrap();

    // Exactly at the window edge the earlier visit still counts
    let at_edge = storage
        .record_visit(&visit("1.2.3.4"), 60, now + Duration::seconds(60))
        .await
        .unwrap();
    assert_eq!(at_edge, RecordOutcome::Deduplicated);

    let after = storage
        .record_visit(&visit("1.2.3.4"), 60, now + Duration::seconds(61))
        .await
        .unwrap();
    assert!(matches!(after, RecordOutcome::Inserted(_)));
    assert_eq!(count_for_ip(&storage, "1.2.3.4").await, 2);
}

#[tokio::test]
async fn test_dedup_is_per_ip_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    storage.record_visit(&visit("1.2.3.4"), 60, now).await.unwrap();
    let other = storage.record_visit(&visit("5.6.7.8"), 60, now).await.unwrap();

    assert!(matches!(other, RecordOutcome::Inserted(_)));
}

#[tokio::test]
async fn test_fields_are_persisted_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    let new_visit = NewVisit {
        ip: "8.8.8.8".to_string(),
        user_agent: None,
        region: Some("California".to_string()),
    };
    storage.record_visit(&new_visit, 60, now).await.unwrap();

    let visits = storage.recent_visits(10).await.unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].ip, "8.8.8.8");
    assert_eq!(visits[0].user_agent, None);
    assert_eq!(visits[0].region.as_deref(), Some("California"));
    assert_eq!(visits[0].created_at_utc(), Some(now));
}

#[tokio::test]
async fn test_recent_visits_newest_first_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    for (i, ip) in ["1.1.1.1", "2.2.2.2", "3.3.3.3"].iter().enumerate() {
        storage
            .record_visit(&visit(ip), 0, now + Duration::seconds(i as i64))
            .await
            .unwrap();
    }

    let visits = storage.recent_visits(2).await.unwrap();
    let ips: Vec<&str> = visits.iter().map(|v| v.ip.as_str()).collect();
    assert_eq!(ips, vec!["3.3.3.3", "2.2.2.2"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_same_ip_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    // Deferred writes for the same IP can arrive together. A file database
    // with a multi-connection pool lets them really overlap; the conditional
    // insert must still let only one of them land.
    let dir = TempDir::new().unwrap();
    let storage = create_sqlite_file_storage(&dir, 5).await;
    let now = base_time();

    for round in 0..20 {
        let ip = format!("9.9.9.{round}");
        let mut handles = vec![];
        for _ in 0..10 {
            let storage = Arc::clone(&storage);
            let ip = ip.clone();
            handles.push(tokio::spawn(async move {
                storage.record_visit(&visit(&ip), 60, now).await
            }));
        }

        let mut inserted = 0;
        for handle in handles {
            if let RecordOutcome::Inserted(_) = handle.await.unwrap().unwrap() {
                inserted += 1;
            }
        }

        assert_eq!(inserted, 1, "round {round}");
        assert_eq!(count_for_ip(&storage, &ip).await, 1, "round {round}");
    }
}

#[tokio::test]
async fn test_stats_counts_and_ranking_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    for i in 0..3 {
        storage
            .record_visit(&visit("10.10.10.10"), 0, now - Duration::minutes(i))
            .await
            .unwrap();
    }
    storage
        .record_visit(&visit("20.20.20.20"), 0, now - Duration::hours(1))
        .await
        .unwrap();

    let clock = Arc::new(ManualClock::new(now));
    let aggregator = StatsAggregator::new(Arc::clone(&storage), clock);
    let stats = aggregator.stats(10, 24).await.unwrap();

    assert_eq!(stats.since, now - Duration::hours(24));
    assert_eq!(stats.hours, 24);
    assert_eq!(stats.total_visits, 4);
    assert_eq!(stats.unique_ips, 2);
    assert_eq!(
        stats.top_ips,
        vec![
            IpCount {
                ip: "10.10.10.10".to_string(),
                count: 3
            },
            IpCount {
                ip: "20.20.20.20".to_string(),
                count: 1
            },
        ]
    );
}

#[tokio::test]
async fn test_stats_exclude_visits_outside_window_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    storage
        .record_visit(&visit("1.1.1.1"), 0, now - Duration::hours(25))
        .await
        .unwrap();
    storage
        .record_visit(&visit("2.2.2.2"), 0, now - Duration::hours(30))
        .await
        .unwrap();
    storage
        .record_visit(&visit("2.2.2.2"), 0, now - Duration::hours(2))
        .await
        .unwrap();

    let aggregator = StatsAggregator::new(Arc::clone(&storage), Arc::new(ManualClock::new(now)));

    let stats = aggregator.stats(10, 24).await.unwrap();
    assert_eq!(stats.total_visits, 1);
    assert_eq!(stats.unique_ips, 1);
    assert_eq!(stats.top_ips.len(), 1);
    assert_eq!(stats.top_ips[0].ip, "2.2.2.2");

    let wider = aggregator.stats(10, 48).await.unwrap();
    assert_eq!(wider.total_visits, 3);
    assert_eq!(wider.unique_ips, 2);
}

#[tokio::test]
async fn test_stats_top_n_limit_and_tie_order_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let now = base_time();

    for ip in ["3.3.3.3", "1.1.1.1", "2.2.2.2", "4.4.4.4", "4.4.4.4"] {
        storage.record_visit(&visit(ip), 0, now).await.unwrap();
    }

    let aggregator = StatsAggregator::new(Arc::clone(&storage), Arc::new(ManualClock::new(now)));
    let stats = aggregator.stats(3, 1).await.unwrap();

    assert_eq!(stats.total_visits, 5);
    assert_eq!(stats.unique_ips, 4);
    let ranked: Vec<(&str, i64)> = stats
        .top_ips
        .iter()
        .map(|c| (c.ip.as_str(), c.count))
        .collect();
    assert_eq!(ranked, vec![("4.4.4.4", 2), ("1.1.1.1", 1), ("2.2.2.2", 1)]);
}

#[tokio::test]
async fn test_stats_empty_store_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    let aggregator =
        StatsAggregator::new(Arc::clone(&storage), Arc::new(ManualClock::new(base_time())));

    let stats = aggregator.stats(10, 24).await.unwrap();
    assert_eq!(stats.total_visits, 0);
    assert_eq!(stats.unique_ips, 0);
    assert!(stats.top_ips.is_empty());
}

#[tokio::test]
async fn test_init_is_idempotent_sqlite() {
    if !should_test_backend("sqlite") {
        return;
    }

    let storage = create_sqlite_storage().await;
    storage
        .record_visit(&visit("1.2.3.4"), 0, base_time())
        .await
        .unwrap();

    storage.init().await.unwrap();
    assert_eq!(storage.recent_visits(10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_dedup_and_concurrency_postgres() {
    if !should_test_backend("postgres") {
        return;
    }
    let Some(storage) = create_postgres_storage().await else {
        return;
    };

    // Unique IP per run so a shared database does not interfere
    let ip = format!("pg-{}", Utc::now().timestamp_nanos_opt().unwrap_or_default());
    let now = Utc::now();

    let mut handles = vec![];
    for _ in 0..10 {
        let storage = Arc::clone(&storage);
        let ip = ip.clone();
        handles.push(tokio::spawn(async move {
            storage.record_visit(&visit(&ip), 60, now).await
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if let RecordOutcome::Inserted(_) = handle.await.unwrap().unwrap() {
            inserted += 1;
        }
    }
    assert_eq!(inserted, 1);

    let again = storage.record_visit(&visit(&ip), 0, now).await.unwrap();
    assert!(matches!(again, RecordOutcome::Inserted(_)));
}
