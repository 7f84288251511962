//! # Validation Engine
//!
//! Pure, synchronous evaluation of ordered rule chains.
//!
//! A [`FieldRule`] inspects one value (and, for cross-field rules, the whole
//! record) and returns an error message or nothing. Rules for a field run in
//! declaration order and evaluation stops at the first message: the result is
//! the *first* failure, never an aggregate. Fields are independent of each
//! other.
//!
//! Records are JSON objects. A field missing from the record is evaluated as
//! `null`, and every rule except [`rules::required`] treats `null` as "does
//! not apply".

pub mod rules;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

/// A form record: field name to value.
pub type Record = serde_json::Map<String, Value>;

type RuleFn = dyn Fn(&Value, Option<&Record>) -> Option<String> + Send + Sync;

/// A single validation rule.
#[derive(Clone)]
pub struct FieldRule {
    name: &'static str,
    check: Arc<RuleFn>,
}

impl FieldRule {
    /// Build a rule from a check function.
    ///
    /// The function receives the field value and, when available, the full
    /// record. It must not panic on partial records.
    pub fn new<F>(name: &'static str, check: F) -> Self
    where
        F: Fn(&Value, Option<&Record>) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            name,
            check: Arc::new(check),
        }
    }

    /// Rule name (for logs and debugging).
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Evaluate the rule.
    #[must_use]
    pub fn check(&self, value: &Value, record: Option<&Record>) -> Option<String> {
        (self.check)(value, record)
    }

    /// Replace the message this rule reports when it fails.
    #[must_use]
    pub fn with_message(self, message: impl Into<String>) -> Self {
        let message = message.into();
        let inner = self.check;
        Self {
            name: self.name,
            check: Arc::new(move |value, record| inner(value, record).map(|_| message.clone())),
        }
    }
}

impl fmt::Debug for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRule").field("name", &self.name).finish()
    }
}

/// Outcome of validating one field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

/// Outcome of validating a whole record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FormValidation {
    pub is_valid: bool,
    /// First error per failing field; fields that pass have no entry.
    pub errors: BTreeMap<String, String>,
}

/// Ordered rule chains keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    fields: IndexMap<String, Vec<FieldRule>>,
}

impl RuleSet {
    /// Empty rule set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `rules` to the chain for `field`.
    #[must_use]
    pub fn field(
        mut self,
        field: impl Into<String>,
        rules: impl IntoIterator<Item = FieldRule>,
    ) -> Self {
        self.fields.entry(field.into()).or_default().extend(rules);
        self
    }

    /// Rules declared for `field` (empty if none).
    #[must_use]
    pub fn rules_for(&self, field: &str) -> &[FieldRule] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fields with at least one declared rule, in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether no field has rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Validate one value against an ordered rule chain.
#[must_use]
pub fn validate_field(
    value: &Value,
    rules: &[FieldRule],
    record: Option<&Record>,
) -> FieldValidation {
    let error = rules.iter().find_map(|rule| rule.check(value, record));
    FieldValidation {
        is_valid: error.is_none(),
        error,
    }
}

/// Validate every field of `record` that has rules in `rule_set`.
///
/// The error map is built from scratch; it never carries entries from an
/// earlier pass.
#[must_use]
pub fn validate_form(record: &Record, rule_set: &RuleSet) -> FormValidation {
    let mut errors = BTreeMap::new();
    for (field, rules) in &rule_set.fields {
        let value = record.get(field).unwrap_or(&Value::Null);
        if let Some(error) = validate_field(value, rules, Some(record)).error {
            errors.insert(field.clone(), error);
        }
    }
    FormValidation {
        is_valid: errors.is_empty(),
        errors,
    }
}
