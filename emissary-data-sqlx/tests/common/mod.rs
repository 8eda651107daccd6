#![allow(dead_code)]

use emissary_core::{DataSourceSettings, LogSettings};
use emissary_data::validation::{DecimalMin, NotBlank, ValidatorRegistry};
use emissary_data::{DataError, Entity, FromValue, IdGeneration, Identity, Row, Value};
use emissary_data_sqlx::Delegator;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub owner: String,
    pub balance: f64,
    pub status: String,
}

impl Account {
    pub fn new(owner: &str, balance: f64) -> Self {
        Self {
            id: 0,
            owner: owner.to_string(),
            balance,
            status: "open".to_string(),
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }
}

impl Entity for Account {
    fn table_name() -> &'static str {
        "accounts"
    }

    fn id_columns() -> &'static [&'static str] {
        &["id"]
    }

    fn columns() -> &'static [&'static str] {
        &["id", "owner", "balance", "status"]
    }

    fn id_generation() -> IdGeneration {
        IdGeneration::Generated
    }

    fn id(&self) -> Identity {
        Identity::from(self.id)
    }

    fn assign_generated_id(&mut self, id: Value) -> Result<(), DataError> {
        self.id = i64::from_value(&id).map_err(|e| DataError::mapping("accounts", e))?;
        Ok(())
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("owner", self.owner.as_str())
            .with("balance", self.balance)
            .with("status", self.status.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, DataError> {
        Ok(Self {
            id: row.try_get("id")?,
            owner: row.get_or_default("owner")?,
            balance: row.get_or_default("balance")?,
            status: row.get_or_default("status")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditEntry {
    pub account_id: i64,
    pub seq: i64,
    pub note: Option<String>,
}

impl AuditEntry {
    pub fn new(account_id: i64, seq: i64, note: &str) -> Self {
        Self {
            account_id,
            seq,
            note: Some(note.to_string()),
        }
    }
}

impl Entity for AuditEntry {
    fn table_name() -> &'static str {
        "audit_entries"
    }

    fn id_columns() -> &'static [&'static str] {
        &["account_id", "seq"]
    }

    fn columns() -> &'static [&'static str] {
        &["account_id", "seq", "note"]
    }

    fn id(&self) -> Identity {
        Identity::from((self.account_id, self.seq))
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("account_id", self.account_id)
            .with("seq", self.seq)
            .with("note", self.note.clone())
    }

    fn from_row(row: &Row) -> Result<Self, DataError> {
        Ok(Self {
            account_id: row.try_get("account_id")?,
            seq: row.try_get("seq")?,
            note: row.try_get("note")?,
        })
    }
}

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        balance REAL NOT NULL,
        status TEXT NOT NULL
    )",
    "CREATE TABLE audit_entries (
        account_id INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        note TEXT,
        PRIMARY KEY (account_id, seq)
    )",
];

/// A delegator over a fresh file-backed SQLite database.
///
/// The directory must outlive the delegator.
pub struct TestDb {
    pub delegator: Delegator,
    pub dir: TempDir,
}

pub fn sqlite_url(dir: &TempDir, file: &str) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join(file).display())
}

pub fn account_rules() -> ValidatorRegistry {
    let mut rules = ValidatorRegistry::new();
    rules
        .register::<Account>("owner", NotBlank::new())
        .register::<Account>("balance", DecimalMin::new(0.0));
    rules
}

pub async fn create_schema(delegator: &mut Delegator) {
    for ddl in SCHEMA {
        delegator.execute_by_raw_sql(ddl, &[]).await.unwrap();
    }
}

pub async fn setup() -> TestDb {
    emissary_core::init_tracing(&LogSettings::default());
    let dir = tempfile::tempdir().unwrap();
    let mut delegator = Delegator::builder()
        .data_source(DataSourceSettings::new("main", &sqlite_url(&dir, "main.db")))
        .validator(account_rules())
        .build()
        .unwrap();
    create_schema(&mut delegator).await;
    TestDb { delegator, dir }
}

/// Insert `n` open accounts owned by `owner-0`, `owner-1`, ... with balance `i`.
pub async fn seed_accounts(delegator: &mut Delegator, n: usize) -> Vec<Account> {
    let mut accounts: Vec<Account> = (0..n)
        .map(|i| Account::new(&format!("owner-{i}"), i as f64))
        .collect();
    delegator.save_all(&mut accounts).await.unwrap();
    accounts
}
