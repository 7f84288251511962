//! Built-in field rules.
//!
//! Every rule except [`required`] passes on `null` and on blank strings, so
//! optional fields only get checked once the user has typed something.

use std::sync::LazyLock;

use chrono::{DateTime, Local, NaiveDate};
use regex::Regex;
use serde_json::Value;
use url::Url;

use super::{FieldRule, Record};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Length in characters for strings, element count for arrays.
fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

/// Numbers as-is, numeric strings parsed; anything else is not a number.
fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Calendar date of a `YYYY-MM-DD` or RFC 3339 string.
fn date_of(value: &Value) -> Option<NaiveDate> {
    let raw = value.as_str()?.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Value must be present: not null, not a blank string, not an empty array.
pub fn required() -> FieldRule {
    FieldRule::new("required", |value, _| {
        let missing = match value {
            Value::Array(items) => items.is_empty(),
            other => is_blank(other),
        };
        missing.then(|| "This field is required".to_string())
    })
}

pub fn min_length(min: usize) -> FieldRule {
    FieldRule::new("min_length", move |value, _| {
        if is_blank(value) {
            return None;
        }
        match length_of(value) {
            Some(len) if len < min => Some(format!("Must be at least {min} characters")),
            _ => None,
        }
    })
}

pub fn max_length(max: usize) -> FieldRule {
    FieldRule::new("max_length", move |value, _| match length_of(value) {
        Some(len) if len > max => Some(format!("Must be at most {max} characters")),
        _ => None,
    })
}

pub fn email() -> FieldRule {
    FieldRule::new("email", |value, _| {
        if is_blank(value) {
            return None;
        }
        match value.as_str() {
            Some(s) if EMAIL_RE.is_match(s.trim()) => None,
            _ => Some("Please enter a valid email address".to_string()),
        }
    })
}

/// String must match `pattern`.
pub fn pattern(pattern: Regex, message: impl Into<String>) -> FieldRule {
    let message = message.into();
    FieldRule::new("pattern", move |value, _| {
        if is_blank(value) {
            return None;
        }
        match value.as_str() {
            Some(s) if pattern.is_match(s) => None,
            _ => Some(message.clone()),
        }
    })
}

/// Absolute `http` or `https` URL.
pub fn url() -> FieldRule {
    FieldRule::new("url", |value, _| {
        if is_blank(value) {
            return None;
        }
        let ok = value
            .as_str()
            .and_then(|s| Url::parse(s.trim()).ok())
            .is_some_and(|u| matches!(u.scheme(), "http" | "https"));
        (!ok).then(|| "Please enter a valid URL".to_string())
    })
}

/// Value must equal the record's `other` field (password confirmation).
///
/// Without a record, or with `other` missing from it, the rule compares
/// against `null`.
pub fn matches_field(other: impl Into<String>) -> FieldRule {
    let other = other.into();
    FieldRule::new("matches_field", move |value, record| {
        if is_blank(value) {
            return None;
        }
        let expected = record.and_then(|r| r.get(&other)).unwrap_or(&Value::Null);
        (value != expected).then(|| "Values do not match".to_string())
    })
}

pub fn numeric() -> FieldRule {
    FieldRule::new("numeric", |value, _| {
        if is_blank(value) {
            return None;
        }
        number_of(value)
            .is_none()
            .then(|| "Must be a number".to_string())
    })
}

/// Numeric lower bound. Non-numeric values are left to [`numeric`].
pub fn min_value(min: f64) -> FieldRule {
    FieldRule::new("min_value", move |value, _| match number_of(value) {
        Some(n) if n < min => Some(format!("Must be at least {min}")),
        _ => None,
    })
}

/// Numeric upper bound. Non-numeric values are left to [`numeric`].
pub fn max_value(max: f64) -> FieldRule {
    FieldRule::new("max_value", move |value, _| match number_of(value) {
        Some(n) if n > max => Some(format!("Must be at most {max}")),
        _ => None,
    })
}

pub fn valid_date() -> FieldRule {
    FieldRule::new("valid_date", |value, _| {
        if is_blank(value) {
            return None;
        }
        date_of(value)
            .is_none()
            .then(|| "Please enter a valid date".to_string())
    })
}

/// Date must not be after the date `today` returns.
///
/// `today` is asked on every check, so a rule set held by a long-lived form
/// follows the calendar past midnight. Compares calendar dates: anything
/// dated today passes whatever its time of day. Unparseable dates are left
/// to [`valid_date`].
pub fn not_in_future<F>(today: F) -> FieldRule
where
    F: Fn() -> NaiveDate + Send + Sync + 'static,
{
    FieldRule::new("not_in_future", move |value, _| match date_of(value) {
        Some(date) if date > today() => Some("Date cannot be in the future".to_string()),
        _ => None,
    })
}

/// [`not_in_future`] against the device's local calendar.
pub fn not_in_future_local() -> FieldRule {
    not_in_future(|| Local::now().date_naive())
}

/// Caller-supplied check.
pub fn custom<F>(check: F) -> FieldRule
where
    F: Fn(&Value, Option<&Record>) -> Option<String> + Send + Sync + 'static,
{
    FieldRule::new("custom", check)
}
