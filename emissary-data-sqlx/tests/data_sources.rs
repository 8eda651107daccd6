mod common;

use common::{account_rules, create_schema, seed_accounts, sqlite_url, Account};
use emissary_core::{DataSourceSettings, EmissaryConfig};
use emissary_data::{AndMap, DataError, Dialect};
use emissary_data_sqlx::{BuildError, Delegator};

fn two_sources(dir: &tempfile::TempDir) -> Delegator {
    Delegator::builder()
        .data_source(DataSourceSettings::new("main", &sqlite_url(dir, "main.db")))
        .data_source(DataSourceSettings::new("archive", &sqlite_url(dir, "archive.db")))
        .primary("main")
        .validator(account_rules())
        .build()
        .unwrap()
}

#[tokio::test]
async fn unknown_data_source_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let delegator = two_sources(&dir);

    let err = delegator.use_data_source("reporting").unwrap_err();
    assert!(matches!(err, DataError::UnknownDataSource(ref name) if name == "reporting"));
    assert_eq!(delegator.data_source_names(), ["archive", "main"]);
}

#[tokio::test]
async fn data_sources_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut main = two_sources(&dir);
    let mut archive = main.use_data_source("archive").unwrap();
    assert_eq!(main.data_source(), "main");
    assert_eq!(archive.data_source(), "archive");
    assert_eq!(archive.dialect(), Dialect::Sqlite);

    create_schema(&mut main).await;
    create_schema(&mut archive).await;
    seed_accounts(&mut main, 3).await;
    seed_accounts(&mut archive, 1).await;

    assert_eq!(main.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 3);
    assert_eq!(archive.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn cache_entries_do_not_leak_across_data_sources() {
    let dir = tempfile::tempdir().unwrap();
    let mut main = two_sources(&dir);
    let mut archive = main.use_data_source("archive").unwrap();
    create_schema(&mut main).await;
    create_schema(&mut archive).await;

    let mut in_main = Account::new("main-only", 1.0);
    main.save(&mut in_main).await.unwrap();
    let mut in_archive = Account::new("archive-only", 2.0);
    archive.save(&mut in_archive).await.unwrap();
    assert_eq!(in_main.id, in_archive.id);

    let a = main.find_by_id_with::<Account>(in_main.id, true).await.unwrap();
    let b = archive.find_by_id_with::<Account>(in_archive.id, true).await.unwrap();
    assert_eq!(a.map(|a| a.owner), Some("main-only".to_string()));
    assert_eq!(b.map(|b| b.owner), Some("archive-only".to_string()));
}

#[tokio::test]
async fn builds_from_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let yaml = format!(
        "emissary:\n  primary: primary\n  cache:\n    ttl: 30\n  datasources:\n    primary:\n      url: \"{}\"\n      pool:\n        size: 2\n",
        sqlite_url(&dir, "configured.db")
    );
    let config = EmissaryConfig::from_yaml_str(&yaml, "test").unwrap();

    let mut delegator = Delegator::from_config(&config).unwrap();
    assert_eq!(delegator.data_source(), "primary");
    assert_eq!(delegator.cache().ttl().as_secs(), 30);

    create_schema(&mut delegator).await;
    seed_accounts(&mut delegator, 2).await;
    assert_eq!(delegator.count_by_and::<Account>(&AndMap::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn builder_needs_a_data_source() {
    let err = Delegator::builder().build().unwrap_err();
    assert!(matches!(err, BuildError::NoDataSource));

    let err = Delegator::builder()
        .data_source(DataSourceSettings::new("main", "sqlite::memory:"))
        .primary("other")
        .build()
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownPrimary(ref name) if name == "other"));
}

#[tokio::test]
async fn raw_connections_come_from_the_bound_pool() {
    let dir = tempfile::tempdir().unwrap();
    let delegator = two_sources(&dir);
    let mut conn = delegator.get_connection().await.unwrap();
    let one: (i64,) = sqlx::query_as("SELECT 1").fetch_one(&mut *conn).await.unwrap();
    assert_eq!(one.0, 1);
}
