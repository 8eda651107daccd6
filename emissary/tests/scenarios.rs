use emissary::prelude::*;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct Member {
    id: i64,
    name: String,
    status: String,
}

impl Member {
    fn new(name: &str, status: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            status: status.to_string(),
        }
    }
}

impl Entity for Member {
    fn table_name() -> &'static str {
        "members"
    }

    fn id_columns() -> &'static [&'static str] {
        &["id"]
    }

    fn columns() -> &'static [&'static str] {
        &["id", "name", "status"]
    }

    fn id_generation() -> IdGeneration {
        IdGeneration::Generated
    }

    fn id(&self) -> Identity {
        Identity::from(self.id)
    }

    fn assign_generated_id(&mut self, id: Value) -> Result<(), DataError> {
        self.id = i64::from_value(&id).map_err(|e| DataError::mapping("members", e))?;
        Ok(())
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("id", self.id)
            .with("name", self.name.as_str())
            .with("status", self.status.as_str())
    }

    fn from_row(row: &Row) -> Result<Self, DataError> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.get_or_default("name")?,
            status: row.get_or_default("status")?,
        })
    }
}

async fn delegator(dir: &TempDir) -> Delegator {
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("app.db").display());
    let mut rules = ValidatorRegistry::new();
    rules.register::<Member>("name", NotBlank::new());
    let mut delegator = Delegator::builder()
        .data_source(DataSourceSettings::new("main", &url))
        .validator(rules)
        .build()
        .unwrap();
    delegator
        .execute_by_raw_sql(
            "CREATE TABLE members (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL, status TEXT NOT NULL)",
            &[],
        )
        .await
        .unwrap();
    delegator
}

#[tokio::test]
async fn rolled_back_save_is_not_visible() {
    let dir = tempfile::tempdir().unwrap();
    let mut d = delegator(&dir).await;

    d.begin_transaction().await.unwrap();
    let mut member = Member::new("ada", "active");
    d.save(&mut member).await.unwrap();
    d.rollback().await.unwrap();
    d.end_transaction().await;

    assert!(d.find_by_id::<Member>(member.id).await.unwrap().is_none());
}

#[tokio::test]
async fn third_page_holds_the_last_five_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut d = delegator(&dir).await;

    let mut members: Vec<Member> = (1..=25)
        .map(|i| Member::new(&format!("member-{i}"), "active"))
        .collect();
    members.push(Member::new("dormant", "inactive"));
    d.save_all(&mut members).await.unwrap();

    let page = d
        .find_page_by_and::<Member>(&AndMap::new().with("status", "active"), PageRequest::new(3, 10))
        .await
        .unwrap();

    assert_eq!(page.total_count, 25);
    let names: Vec<&str> = page.items.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(
        names,
        ["member-21", "member-22", "member-23", "member-24", "member-25"]
    );
}

#[tokio::test]
async fn blank_names_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut d = delegator(&dir).await;

    let err = d.save(&mut Member::new("  ", "active")).await.unwrap_err();
    assert_eq!(err.violations().len(), 1);
    assert_eq!(err.violations()[0].field_name, "name");
}
