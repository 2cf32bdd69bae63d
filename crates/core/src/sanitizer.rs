//! Redaction of sensitive values in outbound event payloads.
//!
//! Payloads are free-form, so matching is by value shape (email, phone)
//! as well as by explicitly tagged critical field names. Sanitization is
//! idempotent and never fails; values it cannot classify pass through
//! unchanged.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

pub const EMAIL_REDACTION: &str = "<EMAIL>";
pub const PHONE_REDACTION: &str = "<PHONE>";
pub const CRITICAL_REDACTION: &str = "<REDACTED>";

static EMAIL_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern")
});

// At least seven digits, optional leading +, common separators. Applied to
// string values only, so numeric fields like attempt counters never match.
static PHONE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\+?[0-9][0-9 ().\-]{5,18}[0-9]$").expect("phone pattern")
});

#[derive(Clone, Debug, Default)]
pub struct Sanitizer {
    critical_fields: BTreeSet<String>,
}

impl Sanitizer {
    pub fn new(critical_fields: impl IntoIterator<Item = String>) -> Self {
        Self {
            critical_fields: critical_fields
                .into_iter()
                .map(|field| field.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_critical_field(&self, key: &str) -> bool {
        self.critical_fields.contains(&key.to_ascii_lowercase())
    }

    /// Returns a copy of `payload` with sensitive values replaced by fixed
    /// redaction markers.
    pub fn sanitize(&self, payload: &Value) -> Value {
        self.sanitize_value(payload, false)
    }

    fn sanitize_value(&self, value: &Value, under_critical_key: bool) -> Value {
        match value {
            Value::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, field_value)| {
                        let critical = under_critical_key || self.is_critical_field(key);
                        (key.clone(), self.sanitize_value(field_value, critical))
                    })
                    .collect(),
            ),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|item| self.sanitize_value(item, under_critical_key))
                    .collect(),
            ),
            Value::String(text) => Value::String(sanitize_string(text, under_critical_key)),
            _ if under_critical_key => Value::String(CRITICAL_REDACTION.to_owned()),
            other => other.clone(),
        }
    }
}

fn sanitize_string(text: &str, under_critical_key: bool) -> String {
    if text == EMAIL_REDACTION || text == PHONE_REDACTION || text == CRITICAL_REDACTION {
        return text.to_owned();
    }
    if under_critical_key {
        return CRITICAL_REDACTION.to_owned();
    }
    let trimmed = text.trim();
    if EMAIL_SHAPE.is_match(trimmed) {
        EMAIL_REDACTION.to_owned()
    } else if PHONE_SHAPE.is_match(trimmed) && digit_count(trimmed) >= 7 {
        PHONE_REDACTION.to_owned()
    } else {
        text.to_owned()
    }
}

fn digit_count(text: &str) -> usize {
    text.chars().filter(char::is_ascii_digit).count()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Sanitizer, CRITICAL_REDACTION, EMAIL_REDACTION, PHONE_REDACTION};

    #[test]
    fn email_shaped_values_are_redacted_and_other_fields_untouched() {
        let sanitizer = Sanitizer::default();
        let sanitized = sanitizer.sanitize(&json!({
            "email": "jane@example.com",
            "attempts": 3
        }));

        assert_eq!(sanitized, json!({"email": EMAIL_REDACTION, "attempts": 3}));
    }

    #[test]
    fn phone_shaped_strings_are_redacted_by_value_not_key() {
        let sanitizer = Sanitizer::default();
        let sanitized = sanitizer.sanitize(&json!({
            "captured": "+1 (555) 010-7788",
            "note": "call back tomorrow"
        }));

        assert_eq!(
            sanitized,
            json!({"captured": PHONE_REDACTION, "note": "call back tomorrow"})
        );
    }

    #[test]
    fn critical_fields_redact_any_value_shape() {
        let sanitizer = Sanitizer::new(["ssn".to_owned()]);
        let sanitized = sanitizer.sanitize(&json!({
            "ssn": 123456789,
            "nested": {"SSN": "anything at all"}
        }));

        assert_eq!(
            sanitized,
            json!({
                "ssn": CRITICAL_REDACTION,
                "nested": {"SSN": CRITICAL_REDACTION}
            })
        );
    }

    #[test]
    fn sanitization_is_idempotent() {
        let sanitizer = Sanitizer::new(["password".to_owned()]);
        let payload = json!({
            "email": "ops@example.net",
            "phones": ["+44 20 7946 0958", "n/a"],
            "password": "hunter2",
            "attempts": 2
        });

        let once = sanitizer.sanitize(&payload);
        let twice = sanitizer.sanitize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn short_numeric_strings_are_not_phone_shaped() {
        let sanitizer = Sanitizer::default();
        let sanitized = sanitizer.sanitize(&json!({"zip": "94107", "year": "2026"}));
        assert_eq!(sanitized, json!({"zip": "94107", "year": "2026"}));
    }

    #[test]
    fn arrays_and_nesting_are_traversed() {
        let sanitizer = Sanitizer::default();
        let sanitized = sanitizer.sanitize(&json!({
            "contacts": [{"value": "a@b.io"}, {"value": "unknown"}]
        }));

        assert_eq!(
            sanitized,
            json!({"contacts": [{"value": EMAIL_REDACTION}, {"value": "unknown"}]})
        );
    }
}
