//! CompensationStore contract tests.
//!
//! Each test leaves the store empty so they can share one instance.

use chrono::{DateTime, Duration, Utc};
use walletstream::scheduler::Compensation;
use walletstream::storage::CompensationStore;

fn at(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .unwrap()
        .with_timezone(&Utc)
}

fn compensation(id: &str, key: &str, delta: i64, fire_at: DateTime<Utc>) -> Compensation {
    Compensation {
        id: id.to_string(),
        key: key.to_string(),
        delta,
        fire_at,
    }
}

pub async fn test_list_empty<S: CompensationStore>(store: &S) {
    let pending = store.list().await.expect("list should succeed");
    assert!(pending.is_empty());
}

pub async fn test_put_and_list<S: CompensationStore>(store: &S) {
    let stored = compensation("threshold/0/1", "w1", -6000, at("2026-03-01T12:00:00.250Z"));
    store.put(&stored).await.expect("put should succeed");

    let pending = store.list().await.unwrap();
    assert_eq!(pending, vec![stored]);

    store.remove("threshold/0/1").await.unwrap();
}

pub async fn test_list_ordered_by_deadline<S: CompensationStore>(store: &S) {
    let base = at("2026-03-01T12:00:00Z");
    store
        .put(&compensation("threshold/1/9", "w2", -1, base + Duration::seconds(90)))
        .await
        .unwrap();
    store
        .put(&compensation("threshold/0/4", "w1", -2, base + Duration::milliseconds(500)))
        .await
        .unwrap();
    store
        .put(&compensation("threshold/0/5", "w1", -3, base + Duration::seconds(10)))
        .await
        .unwrap();

    let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|c| c.id).collect();
    assert_eq!(ids, vec!["threshold/0/4", "threshold/0/5", "threshold/1/9"]);

    for id in ids {
        store.remove(&id).await.unwrap();
    }
}

pub async fn test_put_same_id_replaces<S: CompensationStore>(store: &S) {
    let base = at("2026-03-01T12:00:00Z");
    store
        .put(&compensation("threshold/0/7", "w1", -100, base))
        .await
        .unwrap();
    store
        .put(&compensation("threshold/0/7", "w1", -100, base + Duration::seconds(5)))
        .await
        .unwrap();

    let pending = store.list().await.unwrap();
    assert_eq!(pending.len(), 1, "same id must not duplicate");
    assert_eq!(pending[0].fire_at, base + Duration::seconds(5));

    store.remove("threshold/0/7").await.unwrap();
}

pub async fn test_remove_unknown_is_ok<S: CompensationStore>(store: &S) {
    store
        .remove("threshold/9/9")
        .await
        .expect("removing an unknown id should succeed");
}

#[macro_export]
macro_rules! run_compensation_store_tests {
    ($store:expr) => {
        storage::compensation_store_tests::test_list_empty($store).await;
        println!("  test_list_empty: PASSED");
        storage::compensation_store_tests::test_put_and_list($store).await;
        println!("  test_put_and_list: PASSED");
        storage::compensation_store_tests::test_list_ordered_by_deadline($store).await;
        println!("  test_list_ordered_by_deadline: PASSED");
        storage::compensation_store_tests::test_put_same_id_replaces($store).await;
        println!("  test_put_same_id_replaces: PASSED");
        storage::compensation_store_tests::test_remove_unknown_is_ok($store).await;
        println!("  test_remove_unknown_is_ok: PASSED");
    };
}
