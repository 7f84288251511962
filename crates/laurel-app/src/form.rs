//! # Form Controller
//!
//! Per-form state built on the validation engine: current values, per-field
//! errors, and the dirty and submitting flags.
//!
//! Full validation passes rebuild the error map from scratch. Single-field
//! operations only touch that field's entry. Validation failures stay in the
//! error map and never surface as `Err`; only the submit handler's own error
//! is returned to the caller.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use laurel_core::LaurelError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::validation::{self, Record, RuleSet};

/// Form behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormConfig {
    /// Re-run a field's rules on every `set_field_value`.
    pub validate_on_change: bool,
}

/// Snapshot of a form.
#[derive(Debug, Clone, PartialEq)]
pub struct FormState {
    pub values: Record,
    pub errors: BTreeMap<String, String>,
    pub dirty: bool,
    pub submitting: bool,
}

/// What `handle_submit` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Validation passed and the handler completed.
    Submitted,
    /// Validation failed; the handler was not called.
    Invalid,
    /// Another submission was still running; nothing happened.
    AlreadySubmitting,
}

#[derive(Debug)]
struct FormInner {
    initial: Record,
    values: Record,
    errors: BTreeMap<String, String>,
    submitting: bool,
}

/// Stateful controller for one form.
///
/// Clones share state, so a handle can be moved into UI callbacks.
#[derive(Debug, Clone)]
pub struct FormController {
    rules: Arc<RuleSet>,
    config: FormConfig,
    inner: Arc<Mutex<FormInner>>,
}

/// Clears `submitting` when dropped, including on panic or cancellation.
struct SubmittingGuard<'a> {
    inner: &'a Mutex<FormInner>,
}

impl Drop for SubmittingGuard<'_> {
    fn drop(&mut self) {
        self.inner.lock().submitting = false;
    }
}

impl FormController {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Controller over `initial` values. The initial snapshot is what
    /// `is_dirty` compares against and what `reset` restores.
    pub fn new(initial: Record, rules: RuleSet, config: FormConfig) -> Self {
        Self {
            rules: Arc::new(rules),
            config,
            inner: Arc::new(Mutex::new(FormInner {
                values: initial.clone(),
                initial,
                errors: BTreeMap::new(),
                submitting: false,
            })),
        }
    }

    /// Controller whose initial values come from a serializable struct.
    pub fn from_values<T: Serialize>(
        initial: &T,
        rules: RuleSet,
        config: FormConfig,
    ) -> Result<Self, LaurelError> {
        match serde_json::to_value(initial)? {
            Value::Object(record) => Ok(Self::new(record, rules, config)),
            other => Err(LaurelError::invalid(format!(
                "Form values must serialize to an object, got {other}"
            ))),
        }
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Set one field. Clears that field's error, then re-validates it if the
    /// form validates on change.
    pub fn set_field_value(&self, field: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut inner = self.inner.lock();
        inner.errors.remove(field);
        inner.values.insert(field.to_string(), value);
        if self.config.validate_on_change {
            self.revalidate_field(&mut inner, field);
        }
    }

    /// Replace several fields at once. Errors for the touched fields are
    /// cleared; nothing is re-validated.
    pub fn set_values(&self, values: Record) {
        let mut inner = self.inner.lock();
        for (field, value) in values {
            inner.errors.remove(&field);
            inner.values.insert(field, value);
        }
    }

    /// Set or clear a field's error directly (e.g. from a server response).
    pub fn set_field_error(&self, field: &str, error: Option<String>) {
        let mut inner = self.inner.lock();
        match error {
            Some(message) => {
                inner.errors.insert(field.to_string(), message);
            }
            None => {
                inner.errors.remove(field);
            }
        }
    }

    /// Restore the initial snapshot and drop all errors.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.values = inner.initial.clone();
        inner.errors.clear();
    }

    /// Adopt `values` as the new initial snapshot and reset to it.
    pub fn reset_to(&self, values: Record) {
        let mut inner = self.inner.lock();
        inner.initial = values.clone();
        inner.values = values;
        inner.errors.clear();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Re-run one field's rules; only that field's error entry changes.
    pub fn validate_field(&self, field: &str) -> bool {
        let mut inner = self.inner.lock();
        self.revalidate_field(&mut inner, field)
    }

    /// Full pass over every field with rules. Replaces the error map.
    pub fn validate_form(&self) -> bool {
        let mut inner = self.inner.lock();
        let result = validation::validate_form(&inner.values, &self.rules);
        inner.errors = result.errors;
        result.is_valid
    }

    fn revalidate_field(&self, inner: &mut FormInner, field: &str) -> bool {
        let value = inner.values.get(field).cloned().unwrap_or(Value::Null);
        let result =
            validation::validate_field(&value, self.rules.rules_for(field), Some(&inner.values));
        match result.error {
            Some(message) => {
                inner.errors.insert(field.to_string(), message);
            }
            None => {
                inner.errors.remove(field);
            }
        }
        result.is_valid
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Validate and, if valid, run `on_submit` with the current values.
    ///
    /// A call made while another submission is running returns
    /// [`SubmitOutcome::AlreadySubmitting`] without validating or calling the
    /// handler. The handler's error is returned unchanged. `submitting` is
    /// cleared however the handler finishes, including when the returned
    /// future is dropped mid-flight.
    pub async fn handle_submit<F, Fut, E>(&self, on_submit: F) -> Result<SubmitOutcome, E>
    where
        F: FnOnce(Record) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let values = {
            let mut inner = self.inner.lock();
            if inner.submitting {
                tracing::debug!("Submission already in progress; ignoring");
                return Ok(SubmitOutcome::AlreadySubmitting);
            }

            let result = validation::validate_form(&inner.values, &self.rules);
            inner.errors = result.errors;
            if !result.is_valid {
                tracing::debug!(
                    failing_fields = inner.errors.len(),
                    "Form invalid; submission aborted"
                );
                return Ok(SubmitOutcome::Invalid);
            }

            inner.submitting = true;
            inner.values.clone()
        };

        let _guard = SubmittingGuard { inner: &self.inner };
        on_submit(values).await?;
        Ok(SubmitOutcome::Submitted)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> FormState {
        let inner = self.inner.lock();
        FormState {
            values: inner.values.clone(),
            errors: inner.errors.clone(),
            dirty: inner.values != inner.initial,
            submitting: inner.submitting,
        }
    }

    #[must_use]
    pub fn values(&self) -> Record {
        self.inner.lock().values.clone()
    }

    /// Current values deserialized into a typed payload.
    pub fn values_as<T: DeserializeOwned>(&self) -> Result<T, LaurelError> {
        let values = self.values();
        Ok(serde_json::from_value(Value::Object(values))?)
    }

    #[must_use]
    pub fn value(&self, field: &str) -> Option<Value> {
        self.inner.lock().values.get(field).cloned()
    }

    /// Structural comparison against the initial snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        let inner = self.inner.lock();
        inner.values != inner.initial
    }

    #[must_use]
    pub fn is_submitting(&self) -> bool {
        self.inner.lock().submitting
    }

    #[must_use]
    pub fn errors(&self) -> BTreeMap<String, String> {
        self.inner.lock().errors.clone()
    }

    #[must_use]
    pub fn error(&self, field: &str) -> Option<String> {
        self.inner.lock().errors.get(field).cloned()
    }
}
