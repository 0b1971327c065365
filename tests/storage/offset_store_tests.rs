//! OffsetStore contract tests.

use walletstream::storage::OffsetStore;

pub async fn test_get_nonexistent<S: OffsetStore>(store: &S) {
    let result = store
        .get("test_group", "wallet", 0)
        .await
        .expect("get should succeed");
    assert!(result.is_none(), "uncommitted partition should be None");
}

pub async fn test_put_and_get<S: OffsetStore>(store: &S) {
    store
        .put("test_group", "wallet", 1, 42)
        .await
        .expect("put should succeed");

    let result = store.get("test_group", "wallet", 1).await.unwrap();
    assert_eq!(result, Some(42));
}

pub async fn test_put_update<S: OffsetStore>(store: &S) {
    store.put("test_group", "wallet", 2, 10).await.unwrap();
    store.put("test_group", "wallet", 2, 25).await.unwrap();

    let result = store.get("test_group", "wallet", 2).await.unwrap();
    assert_eq!(result, Some(25), "should return updated offset");
}

pub async fn test_partitions_isolated<S: OffsetStore>(store: &S) {
    store.put("test_iso", "wallet", 0, 5).await.unwrap();
    store.put("test_iso", "wallet", 3, 9).await.unwrap();
    store.put("test_iso", "threshold", 0, 7).await.unwrap();

    assert_eq!(store.get("test_iso", "wallet", 0).await.unwrap(), Some(5));
    assert_eq!(store.get("test_iso", "wallet", 3).await.unwrap(), Some(9));
    assert_eq!(store.get("test_iso", "threshold", 0).await.unwrap(), Some(7));
    assert_eq!(store.get("test_other", "wallet", 0).await.unwrap(), None);
}

pub async fn test_large_offset<S: OffsetStore>(store: &S) {
    let offset = u32::MAX as u64 + 17;
    store.put("test_group", "wallet", 4, offset).await.unwrap();

    assert_eq!(store.get("test_group", "wallet", 4).await.unwrap(), Some(offset));
}

#[macro_export]
macro_rules! run_offset_store_tests {
    ($store:expr) => {
        storage::offset_store_tests::test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");
        storage::offset_store_tests::test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");
        storage::offset_store_tests::test_put_update($store).await;
        println!("  test_put_update: PASSED");
        storage::offset_store_tests::test_partitions_isolated($store).await;
        println!("  test_partitions_isolated: PASSED");
        storage::offset_store_tests::test_large_offset($store).await;
        println!("  test_large_offset: PASSED");
    };
}
