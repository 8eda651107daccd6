//! Field validation consumed by `save` and `update`.
//!
//! Rules are registered explicitly per entity table and field, then run
//! against the entity's [`Row`] before anything is written.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::entity::Entity;
use crate::value::{Row, Value};

/// Which mutation a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ValidateProfile {
    #[default]
    All,
    Create,
    Update,
}

impl ValidateProfile {
    /// Whether a rule registered with `self` runs for an operation of `operation`.
    pub fn applies_to(self, operation: ValidateProfile) -> bool {
        self == ValidateProfile::All || operation == ValidateProfile::All || self == operation
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintViolation {
    pub field_name: String,
    pub message: String,
    pub original_value: Value,
}

impl ConstraintViolation {
    pub fn new(field_name: &str, message: impl Into<String>, original_value: Value) -> Self {
        Self {
            field_name: field_name.to_string(),
            message: message.into(),
            original_value,
        }
    }
}

impl fmt::Display for ConstraintViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field_name, self.message)
    }
}

/// The validation capability used by the delegator.
pub trait Validate: Send + Sync {
    fn validate(
        &self,
        entity: &str,
        row: &Row,
        profile: ValidateProfile,
    ) -> Vec<ConstraintViolation>;
}

/// Accepts everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoValidation;

impl Validate for NoValidation {
    fn validate(&self, _: &str, _: &Row, _: ValidateProfile) -> Vec<ConstraintViolation> {
        Vec::new()
    }
}

/// A single-field rule. Returns the violation message, or `None` when the value passes.
pub trait Constraint: Send + Sync {
    fn check(&self, value: &Value) -> Option<String>;
}

impl<F> Constraint for F
where
    F: Fn(&Value) -> Option<String> + Send + Sync,
{
    fn check(&self, value: &Value) -> Option<String> {
        self(value)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotNull {
    message: Option<String>,
}

impl NotNull {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for NotNull {
    fn check(&self, value: &Value) -> Option<String> {
        value.is_null().then(|| {
            self.message
                .clone()
                .unwrap_or_else(|| "This value should not be null.".into())
        })
    }
}

/// Rejects null, empty and whitespace-only text.
#[derive(Debug, Clone, Default)]
pub struct NotBlank {
    message: Option<String>,
}

impl NotBlank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for NotBlank {
    fn check(&self, value: &Value) -> Option<String> {
        let blank = match value {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        };
        blank.then(|| {
            self.message
                .clone()
                .unwrap_or_else(|| "This value should not be blank.".into())
        })
    }
}

fn char_len(value: &Value) -> Option<usize> {
    match value {
        Value::Null => None,
        Value::Text(s) => Some(s.chars().count()),
        Value::Bytes(b) => Some(b.len()),
        other => Some(other.to_string().chars().count()),
    }
}

#[derive(Debug, Clone)]
pub struct MinLength {
    min: usize,
    message: Option<String>,
}

impl MinLength {
    pub fn new(min: usize) -> Self {
        Self { min, message: None }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for MinLength {
    fn check(&self, value: &Value) -> Option<String> {
        let len = char_len(value)?;
        (len < self.min).then(|| {
            self.message.clone().unwrap_or_else(|| {
                format!(
                    "This value is too short. It should have {} characters or more.",
                    self.min
                )
            })
        })
    }
}

#[derive(Debug, Clone)]
pub struct MaxLength {
    max: usize,
    message: Option<String>,
}

impl MaxLength {
    pub fn new(max: usize) -> Self {
        Self { max, message: None }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for MaxLength {
    fn check(&self, value: &Value) -> Option<String> {
        let len = char_len(value)?;
        (len > self.max).then(|| {
            self.message.clone().unwrap_or_else(|| {
                format!(
                    "This value is too long. It should have {} characters or less.",
                    self.max
                )
            })
        })
    }
}

const NOT_A_NUMBER: &str = "This value should be a valid number.";

#[derive(Debug, Clone)]
pub struct DecimalMin {
    min: f64,
    message: Option<String>,
}

impl DecimalMin {
    pub fn new(min: f64) -> Self {
        Self { min, message: None }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for DecimalMin {
    fn check(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            return None;
        }
        let Some(n) = value.as_f64() else {
            return Some(NOT_A_NUMBER.into());
        };
        (n < self.min).then(|| {
            self.message.clone().unwrap_or_else(|| {
                format!("This value should be greater than or equal to {}.", self.min)
            })
        })
    }
}

#[derive(Debug, Clone)]
pub struct DecimalMax {
    max: f64,
    message: Option<String>,
}

impl DecimalMax {
    pub fn new(max: f64) -> Self {
        Self { max, message: None }
    }

    pub fn message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }
}

impl Constraint for DecimalMax {
    fn check(&self, value: &Value) -> Option<String> {
        if value.is_null() {
            return None;
        }
        let Some(n) = value.as_f64() else {
            return Some(NOT_A_NUMBER.into());
        };
        (n > self.max).then(|| {
            self.message.clone().unwrap_or_else(|| {
                format!("This value should be less than or equal to {}.", self.max)
            })
        })
    }
}

struct Rule {
    field: String,
    profile: ValidateProfile,
    constraint: Box<dyn Constraint>,
}

/// Explicit table of rules keyed by entity table name.
///
/// ```
/// use emissary_data::validation::{MinLength, NotBlank, ValidatorRegistry};
/// # use emissary_data::{DataError, Entity, Identity, Row};
/// # struct Account;
/// # impl Entity for Account {
/// #     fn table_name() -> &'static str { "accounts" }
/// #     fn id_columns() -> &'static [&'static str] { &["id"] }
/// #     fn columns() -> &'static [&'static str] { &["id", "owner"] }
/// #     fn id(&self) -> Identity { Identity::from(1i64) }
/// #     fn to_row(&self) -> Row { Row::new() }
/// #     fn from_row(_: &Row) -> Result<Self, DataError> { Ok(Account) }
/// # }
/// let mut rules = ValidatorRegistry::new();
/// rules
///     .register::<Account>("owner", NotBlank::new())
///     .register::<Account>("owner", MinLength::new(3));
/// ```
#[derive(Default)]
pub struct ValidatorRegistry {
    rules: HashMap<&'static str, Vec<Rule>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: Entity>(
        &mut self,
        field: &str,
        constraint: impl Constraint + 'static,
    ) -> &mut Self {
        self.register_with_profile::<E>(field, ValidateProfile::All, constraint)
    }

    pub fn register_with_profile<E: Entity>(
        &mut self,
        field: &str,
        profile: ValidateProfile,
        constraint: impl Constraint + 'static,
    ) -> &mut Self {
        self.rules.entry(E::table_name()).or_default().push(Rule {
            field: field.to_string(),
            profile,
            constraint: Box::new(constraint),
        });
        self
    }

    /// Register a closure rule.
    pub fn register_fn<E, F>(&mut self, field: &str, check: F) -> &mut Self
    where
        E: Entity,
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.register::<E>(field, check)
    }

    pub fn rule_count(&self, entity: &str) -> usize {
        self.rules.get(entity).map_or(0, Vec::len)
    }
}

impl Validate for ValidatorRegistry {
    fn validate(
        &self,
        entity: &str,
        row: &Row,
        profile: ValidateProfile,
    ) -> Vec<ConstraintViolation> {
        let Some(rules) = self.rules.get(entity) else {
            return Vec::new();
        };
        rules
            .iter()
            .filter(|rule| rule.profile.applies_to(profile))
            .filter_map(|rule| {
                let value = row.get(&rule.field).cloned().unwrap_or(Value::Null);
                rule.constraint
                    .check(&value)
                    .map(|message| ConstraintViolation::new(&rule.field, message, value))
            })
            .collect()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self.rules.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("ValidatorRegistry").field("rules", &counts).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Identity;
    use crate::error::DataError;

    struct Account;

    impl Entity for Account {
        fn table_name() -> &'static str {
            "accounts"
        }
        fn id_columns() -> &'static [&'static str] {
            &["id"]
        }
        fn columns() -> &'static [&'static str] {
            &["id", "owner", "balance"]
        }
        fn id(&self) -> Identity {
            Identity::from(1i64)
        }
        fn to_row(&self) -> Row {
            Row::new()
        }
        fn from_row(_row: &Row) -> Result<Self, DataError> {
            Ok(Account)
        }
    }

    #[test]
    fn default_messages() {
        assert_eq!(
            MinLength::new(3).check(&"ab".into()).unwrap(),
            "This value is too short. It should have 3 characters or more."
        );
        assert_eq!(
            DecimalMax::new(100.0).check(&Value::Float(100.5)).unwrap(),
            "This value should be less than or equal to 100."
        );
        assert_eq!(MinLength::new(3).message("short").check(&"ab".into()).unwrap(), "short");
    }

    #[test]
    fn null_passes_everything_but_presence_rules() {
        assert!(MinLength::new(3).check(&Value::Null).is_none());
        assert!(MaxLength::new(3).check(&Value::Null).is_none());
        assert!(DecimalMin::new(0.0).check(&Value::Null).is_none());
        assert!(NotNull::new().check(&Value::Null).is_some());
        assert!(NotBlank::new().check(&Value::Null).is_some());
        assert!(NotBlank::new().check(&"   ".into()).is_some());
        assert!(NotBlank::new().check(&"x".into()).is_none());
    }

    #[test]
    fn decimal_bounds() {
        assert!(DecimalMin::new(0.0).check(&Value::Int(-1)).is_some());
        assert!(DecimalMin::new(0.0).check(&Value::Int(0)).is_none());
        assert!(DecimalMax::new(10.0).check(&"12.5".into()).is_some());
        assert_eq!(DecimalMax::new(10.0).check(&"abc".into()).unwrap(), NOT_A_NUMBER);
    }

    #[test]
    fn registry_collects_violations_per_profile() {
        let mut rules = ValidatorRegistry::new();
        rules
            .register::<Account>("owner", NotBlank::new())
            .register_with_profile::<Account>(
                "balance",
                ValidateProfile::Create,
                DecimalMin::new(0.0),
            )
            .register_fn::<Account, _>("owner", |v| {
                (v.as_str() == Some("root")).then(|| "reserved".to_string())
            });
        assert_eq!(rules.rule_count("accounts"), 3);

        let row = Row::new().with("owner", "").with("balance", -5i64);
        let on_create = rules.validate("accounts", &row, ValidateProfile::Create);
        assert_eq!(on_create.len(), 2);
        assert_eq!(on_create[0].field_name, "owner");
        assert_eq!(on_create[1].original_value, Value::Int(-5));

        let on_update = rules.validate("accounts", &row, ValidateProfile::Update);
        assert_eq!(on_update.len(), 1);

        let root = Row::new().with("owner", "root").with("balance", 1i64);
        let found = rules.validate("accounts", &root, ValidateProfile::Update);
        assert_eq!(found[0].message, "reserved");

        assert!(rules.validate("other", &row, ValidateProfile::Create).is_empty());
    }

    #[test]
    fn missing_column_is_treated_as_null() {
        let mut rules = ValidatorRegistry::new();
        rules.register::<Account>("owner", NotNull::new().message("owner required"));
        let found = rules.validate("accounts", &Row::new(), ValidateProfile::All);
        assert_eq!(found[0].message, "owner required");
        assert!(NoValidation.validate("accounts", &Row::new(), ValidateProfile::All).is_empty());
    }
}
