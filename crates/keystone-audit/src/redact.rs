//! Snapshot redaction.

use serde_json::Value;

/// Replacement written over sensitive values.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Field names whose values never reach the audit store. Matched exactly.
pub const SENSITIVE_FIELDS: &[&str] = &["password", "token", "secret", "key", "apiKey", "jwt"];

/// Returns true if `field` names a sensitive value.
#[must_use]
pub fn is_sensitive(field: &str) -> bool {
    SENSITIVE_FIELDS.contains(&field)
}

/// Redacts sensitive fields in place, at any depth.
pub fn redact_in_place(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (field, inner) in map.iter_mut() {
                if is_sensitive(field) {
                    *inner = Value::String(REDACTION_MARKER.to_string());
                } else {
                    redact_in_place(inner);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_in_place),
        _ => {}
    }
}

/// Returns a redacted copy of `value`.
#[must_use]
pub fn redact(mut value: Value) -> Value {
    redact_in_place(&mut value);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_fields() {
        let out = redact(json!({"email": "a@b.c", "password": "hunter2", "jwt": "eyJ"}));
        assert_eq!(out["email"], "a@b.c");
        assert_eq!(out["password"], REDACTION_MARKER);
        assert_eq!(out["jwt"], REDACTION_MARKER);
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let out = redact(json!({
            "user": {"profile": {"secret": "s", "name": "n"}},
            "integrations": [{"apiKey": "k1"}, {"config": {"token": "t"}}],
        }));
        assert_eq!(out["user"]["profile"]["secret"], REDACTION_MARKER);
        assert_eq!(out["user"]["profile"]["name"], "n");
        assert_eq!(out["integrations"][0]["apiKey"], REDACTION_MARKER);
        assert_eq!(out["integrations"][1]["config"]["token"], REDACTION_MARKER);
    }

    #[test]
    fn test_sensitive_object_value_replaced_whole() {
        let out = redact(json!({"key": {"id": 1, "material": "abc"}}));
        assert_eq!(out["key"], REDACTION_MARKER);
    }

    #[test]
    fn test_match_is_exact_and_case_sensitive() {
        let out = redact(json!({"Password": "p", "apikey": "k", "keyring": "r", "api_key": "x"}));
        assert_eq!(out["Password"], "p");
        assert_eq!(out["apikey"], "k");
        assert_eq!(out["keyring"], "r");
        assert_eq!(out["api_key"], "x");
    }

    #[test]
    fn test_scalars_untouched() {
        assert_eq!(redact(json!("password")), json!("password"));
        assert_eq!(redact(json!(["token", 1])), json!(["token", 1]));
    }

    #[test]
    fn test_no_sensitive_values_survive() {
        fn contains_sensitive(v: &Value) -> bool {
            match v {
                Value::Object(map) => map.iter().any(|(k, v)| {
                    (is_sensitive(k) && v != REDACTION_MARKER) || contains_sensitive(v)
                }),
                Value::Array(items) => items.iter().any(contains_sensitive),
                _ => false,
            }
        }

        let input = json!([
            {"a": [{"b": {"password": "x", "c": [{"token": {"secret": "y"}}]}}]},
            {"apiKey": null, "jwt": [1, 2]},
        ]);
        assert!(contains_sensitive(&input));
        assert!(!contains_sensitive(&redact(input)));
    }
}
