mod common;

use common::{seed_accounts, setup, Account};
use emissary_cache::EntityCache;
use emissary_data::{AndMap, Cond, FindOptions, OrderBy, PageRequest};

#[tokio::test]
async fn point_lookups_hit_after_the_first_read() {
    let mut db = setup().await;
    let account = seed_accounts(&mut db.delegator, 1).await.remove(0);
    db.delegator.cache().reset_stats();

    for _ in 0..3 {
        let found = db
            .delegator
            .find_by_id_with::<Account>(account.id, true)
            .await
            .unwrap();
        assert_eq!(found.as_ref(), Some(&account));
    }

    let stats = db.delegator.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.puts, 1);
}

#[tokio::test]
async fn absent_rows_are_not_cached() {
    let mut db = setup().await;
    db.delegator.cache().reset_stats();

    for _ in 0..2 {
        let found = db.delegator.find_by_id_with::<Account>(777i64, true).await.unwrap();
        assert!(found.is_none());
    }

    let stats = db.delegator.cache().stats();
    assert_eq!(stats.hits, 0);
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.puts, 0);
}

#[tokio::test]
async fn uncached_reads_leave_the_cache_alone() {
    let mut db = setup().await;
    let account = seed_accounts(&mut db.delegator, 1).await.remove(0);
    db.delegator.cache().reset_stats();

    db.delegator.find_by_id::<Account>(account.id).await.unwrap();
    db.delegator
        .find_list::<Account>(&Cond::all())
        .await
        .unwrap();

    let stats = db.delegator.cache().stats();
    assert_eq!(stats.hits + stats.misses + stats.puts, 0);
}

#[tokio::test]
async fn update_invalidates_point_and_query_entries() {
    let mut db = setup().await;
    let mut account = seed_accounts(&mut db.delegator, 3).await.remove(0);
    let open = AndMap::new().with("status", "open");
    let opts = FindOptions::cached();

    assert_eq!(
        db.delegator.find_list_by_and_with::<Account>(&open, &opts).await.unwrap().len(),
        3
    );
    db.delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();

    account.status = "closed".into();
    db.delegator.update(&account).await.unwrap();

    let list = db.delegator.find_list_by_and_with::<Account>(&open, &opts).await.unwrap();
    assert_eq!(list.len(), 2);
    let stored = db
        .delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();
    assert_eq!(stored.map(|a| a.status), Some("closed".to_string()));
}

#[tokio::test]
async fn writes_from_another_handle_invalidate_shared_entries() {
    let mut db = setup().await;
    seed_accounts(&mut db.delegator, 2).await;
    let mut writer = db.delegator.handle();
    let opts = FindOptions::cached();

    assert_eq!(db.delegator.count_by_cond_with::<Account>(&Cond::all(), &opts).await.unwrap(), 2);
    writer.save(&mut Account::new("late", 1.0)).await.unwrap();
    assert_eq!(db.delegator.count_by_cond_with::<Account>(&Cond::all(), &opts).await.unwrap(), 3);

    writer.remove_by_id::<Account>(1i64).await.unwrap();
    assert_eq!(db.delegator.count_by_cond_with::<Account>(&Cond::all(), &opts).await.unwrap(), 2);
}

#[tokio::test]
async fn reads_inside_a_transaction_bypass_the_cache() {
    let mut db = setup().await;
    let account = seed_accounts(&mut db.delegator, 1).await.remove(0);
    db.delegator.cache().reset_stats();

    db.delegator.begin_transaction().await.unwrap();
    db.delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();
    db.delegator
        .count_by_and_with::<Account>(&AndMap::new(), &FindOptions::cached())
        .await
        .unwrap();
    db.delegator.commit_transaction().await.unwrap();
    db.delegator.end_transaction().await;

    let stats = db.delegator.cache().stats();
    assert_eq!(stats.hits + stats.misses + stats.puts, 0);
}

#[tokio::test]
async fn rollback_discards_queued_invalidations() {
    let mut db = setup().await;
    let mut account = seed_accounts(&mut db.delegator, 1).await.remove(0);
    db.delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();
    let before = db.delegator.cache().stats().invalidations;

    db.delegator.begin_transaction().await.unwrap();
    account.owner = "renamed".into();
    db.delegator.update(&account).await.unwrap();
    db.delegator.rollback().await.unwrap();
    db.delegator.end_transaction().await;

    assert_eq!(db.delegator.cache().stats().invalidations, before);
    let cached = db
        .delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();
    assert_eq!(cached.map(|a| a.owner), Some("owner-0".to_string()));
}

#[tokio::test]
async fn equivalent_criteria_share_a_cache_entry() {
    let mut db = setup().await;
    seed_accounts(&mut db.delegator, 5).await;
    db.delegator.cache().reset_stats();

    let a = AndMap::new().with("status", "open").with("owner", "owner-1");
    let b = AndMap::new().with("owner", "owner-1").with("status", "open");
    let opts_a = FindOptions::cached()
        .select(["status", "owner"])
        .order_by(OrderBy::asc("balance"));
    let opts_b = FindOptions::cached()
        .select(["owner", "status"])
        .order_by_str("balance asc")
        .unwrap();
    db.delegator.find_list_by_and_with::<Account>(&a, &opts_a).await.unwrap();
    db.delegator.find_list_by_and_with::<Account>(&b, &opts_b).await.unwrap();

    let c1 = Cond::new("balance  >= ?\n  AND status = 'open'").bind(2.0);
    let c2 = Cond::new(" balance >= ? AND status = 'open' ").bind(2.0);
    db.delegator.find_list_with::<Account>(&c1, &FindOptions::cached()).await.unwrap();
    db.delegator.find_list_with::<Account>(&c2, &FindOptions::cached()).await.unwrap();

    let stats = db.delegator.cache().stats();
    assert_eq!(stats.misses, 2);
    assert_eq!(stats.hits, 2);
}

#[tokio::test]
async fn different_parameters_use_different_entries() {
    let mut db = setup().await;
    seed_accounts(&mut db.delegator, 5).await;

    let opts = FindOptions::cached();
    let low = Cond::new("balance >= ?").bind(1.0);
    let high = Cond::new("balance >= ?").bind(4.0);
    assert_eq!(db.delegator.find_list_with::<Account>(&low, &opts).await.unwrap().len(), 4);
    assert_eq!(db.delegator.find_list_with::<Account>(&high, &opts).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cached_pages_keep_their_total() {
    let mut db = setup().await;
    seed_accounts(&mut db.delegator, 12).await;
    db.delegator.cache().reset_stats();

    let opts = FindOptions::cached();
    let first = db
        .delegator
        .find_page_by_and_with::<Account>(&AndMap::new(), PageRequest::new(2, 5), &opts)
        .await
        .unwrap();
    let second = db
        .delegator
        .find_page_by_and_with::<Account>(&AndMap::new(), PageRequest::new(2, 5), &opts)
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(second.total_count, 12);
    assert_eq!(db.delegator.cache().stats().hits, 1);
}

#[tokio::test]
async fn entries_live_under_the_data_source_prefix() {
    let mut db = setup().await;
    let account = seed_accounts(&mut db.delegator, 1).await.remove(0);
    db.delegator
        .find_by_id_with::<Account>(account.id, true)
        .await
        .unwrap();

    let key = EntityCache::point_key("main", "accounts", &account.id.to_string());
    assert!(db.delegator.cache().get(&key).await.is_some());
}
