//! TableStore contract tests.

use walletstream::storage::TableStore;

pub async fn test_get_nonexistent<S: TableStore>(store: &S) {
    let result = store
        .get("test_group", "missing")
        .await
        .expect("get should succeed");
    assert!(result.is_none(), "unknown key should be None");
}

pub async fn test_put_and_get<S: TableStore>(store: &S) {
    store
        .put("test_group", "w1", vec![0x0a, 0x02, b'w', b'1'])
        .await
        .expect("put should succeed");

    let result = store
        .get("test_group", "w1")
        .await
        .expect("get should succeed")
        .expect("state should exist");
    assert_eq!(result, vec![0x0a, 0x02, b'w', b'1']);
}

pub async fn test_put_replaces<S: TableStore>(store: &S) {
    store.put("test_group", "w2", vec![1]).await.unwrap();
    store.put("test_group", "w2", vec![2, 3]).await.unwrap();

    let result = store.get("test_group", "w2").await.unwrap().unwrap();
    assert_eq!(result, vec![2, 3], "second put should win");
}

pub async fn test_empty_value<S: TableStore>(store: &S) {
    // A zero-valued protobuf state encodes to no bytes at all.
    store.put("test_group", "w3", Vec::new()).await.unwrap();

    let result = store.get("test_group", "w3").await.unwrap();
    assert_eq!(result, Some(Vec::new()), "empty state is not a missing state");
}

pub async fn test_groups_isolated<S: TableStore>(store: &S) {
    store.put("test_balance", "w4", vec![1]).await.unwrap();
    store.put("test_windowed", "w4", vec![2]).await.unwrap();

    assert_eq!(store.get("test_balance", "w4").await.unwrap(), Some(vec![1]));
    assert_eq!(store.get("test_windowed", "w4").await.unwrap(), Some(vec![2]));
}

#[macro_export]
macro_rules! run_table_store_tests {
    ($store:expr) => {
        storage::table_store_tests::test_get_nonexistent($store).await;
        println!("  test_get_nonexistent: PASSED");
        storage::table_store_tests::test_put_and_get($store).await;
        println!("  test_put_and_get: PASSED");
        storage::table_store_tests::test_put_replaces($store).await;
        println!("  test_put_replaces: PASSED");
        storage::table_store_tests::test_empty_value($store).await;
        println!("  test_empty_value: PASSED");
        storage::table_store_tests::test_groups_isolated($store).await;
        println!("  test_groups_isolated: PASSED");
    };
}
