//! Field validation over structured payload data.
//!
//! Rules are pipe-separated strings per field (`"required|min:3"`). Every
//! rule runs independently and appends its own message; nothing is thrown.
//! The one exception is `nullable`, which skips the remaining rules for a
//! field whose value is absent or the empty string.

use chrono::NaiveDate;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::net::IpAddr;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap();
    static ref URL_RE: Regex = Regex::new(r"^https?://[^\s/$.?#].[^\s]*$").unwrap();
}

/// Result of a validation pass. `errors` keeps field registration order and
/// per-field message order.
#[derive(Debug, Clone)]
pub struct Validation {
    pub ok: bool,
    pub errors: IndexMap<String, Vec<String>>,
}

impl Validation {
    /// Errors as a JSON object, for embedding in a response body.
    pub fn errors_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for (field, messages) in &self.errors {
            map.insert(
                field.clone(),
                Value::Array(messages.iter().cloned().map(Value::String).collect()),
            );
        }
        Value::Object(map)
    }
}

/// A single parsed rule. Unknown names are preserved so they can report the
/// generic fallback message instead of failing hard.
#[derive(Debug, Clone, PartialEq)]
enum Rule {
    Nullable,
    Required,
    Email,
    Min(String),
    Max(String),
    Numeric,
    Str,
    Integer,
    Float,
    Boolean,
    Arr,
    Date,
    Url,
    Ip,
    Object,
    Json,
    Enum(String),
    HasKey,
    Unknown(String),
}

impl Rule {
    fn parse(raw: &str) -> Rule {
        let (name, param) = match raw.split_once(':') {
            Some((n, p)) => (n, Some(p)),
            None => (raw, None),
        };
        match name {
            "nullable" => Rule::Nullable,
            "required" => Rule::Required,
            "email" => Rule::Email,
            "min" => Rule::Min(param.unwrap_or("").to_string()),
            "max" => Rule::Max(param.unwrap_or("").to_string()),
            "numeric" => Rule::Numeric,
            "string" => Rule::Str,
            "integer" => Rule::Integer,
            "float" => Rule::Float,
            "boolean" => Rule::Boolean,
            "array" => Rule::Arr,
            "date" => Rule::Date,
            "url" => Rule::Url,
            "ip" => Rule::Ip,
            "object" => Rule::Object,
            "json" => Rule::Json,
            "enum" => Rule::Enum(param.unwrap_or("").to_string()),
            "hasKey" => Rule::HasKey,
            other => Rule::Unknown(other.to_string()),
        }
    }
}

/// Validate `data` against per-field rule strings. Rule declaration order
/// drives both evaluation and error order.
pub fn validate(
    data: &IndexMap<String, Value>,
    rules: &IndexMap<String, String>,
) -> Validation {
    let mut errors: IndexMap<String, Vec<String>> = IndexMap::new();

    for (field, rule_str) in rules {
        let parsed: Vec<Rule> = rule_str.split('|').map(Rule::parse).collect();
        let is_nullable = parsed.contains(&Rule::Nullable);
        let value = data.get(field).cloned().unwrap_or(Value::Null);

        for rule in &parsed {
            if *rule == Rule::Nullable {
                continue;
            }
            if is_nullable && is_empty(&value) {
                break;
            }
            if let Some(message) = check_rule(rule, field, &value, data) {
                errors.entry(field.clone()).or_default().push(message);
            }
        }
    }

    Validation {
        ok: errors.is_empty(),
        errors,
    }
}

/// Absent or empty string, the two "no value" shapes.
fn is_empty(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

/// Textual view of a value, used by length and enum checks.
fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn check_rule(
    rule: &Rule,
    field: &str,
    value: &Value,
    data: &IndexMap<String, Value>,
) -> Option<String> {
    match rule {
        Rule::Nullable => None,
        Rule::Required => {
            is_empty(value).then(|| format!("{field} is required."))
        }
        Rule::Email => {
            (!EMAIL_RE.is_match(&text_of(value)))
                .then(|| format!("{field} must be a valid email address."))
        }
        Rule::Min(param) => {
            let min: usize = param.parse().unwrap_or(0);
            (text_of(value).chars().count() < min)
                .then(|| format!("{field} must be at least {param} characters."))
        }
        Rule::Max(param) => {
            let max: usize = param.parse().unwrap_or(usize::MAX);
            (text_of(value).chars().count() > max)
                .then(|| format!("{field} must be no more than {param} characters."))
        }
        Rule::Numeric => {
            let ok = value.is_number() || text_of(value).parse::<f64>().is_ok();
            (!ok).then(|| format!("{field} must be a number."))
        }
        Rule::Str => {
            (!value.is_string()).then(|| format!("{field} must be a string."))
        }
        Rule::Integer => {
            let ok = value.is_i64() || value.is_u64()
                || matches!(value, Value::String(s) if s.parse::<i64>().is_ok());
            (!ok).then(|| format!("{field} must be an integer."))
        }
        Rule::Float => {
            let ok = value.is_number() || text_of(value).parse::<f64>().is_ok();
            (!ok).then(|| format!("{field} must be a float."))
        }
        Rule::Boolean => {
            (!value.is_boolean()).then(|| format!("{field} must be a boolean."))
        }
        Rule::Arr => {
            (!value.is_array()).then(|| format!("{field} must be an array."))
        }
        Rule::Date => {
            let text = text_of(value);
            let ok = NaiveDate::parse_from_str(&text, "%Y-%m-%d")
                .map(|d| d.format("%Y-%m-%d").to_string() == text)
                .unwrap_or(false);
            (!ok).then(|| format!("{field} must be a valid date in the format 'Y-m-d'."))
        }
        Rule::Url => {
            (!URL_RE.is_match(&text_of(value)))
                .then(|| format!("{field} must be a valid URL."))
        }
        Rule::Ip => {
            (text_of(value).parse::<IpAddr>().is_err())
                .then(|| format!("{field} must be a valid IP address."))
        }
        Rule::Object => {
            (!value.is_object()).then(|| format!("{field} must be an object."))
        }
        Rule::Json => {
            let ok = matches!(value, Value::String(s) if serde_json::from_str::<Value>(s).is_ok());
            (!ok).then(|| format!("{field} must be a valid JSON string."))
        }
        Rule::Enum(param) => {
            let allowed: Vec<&str> = param.split(',').collect();
            let text = text_of(value);
            (!allowed.contains(&text.as_str())).then(|| {
                format!(
                    "{field} must be one of the following values: {}.",
                    allowed.join(", ")
                )
            })
        }
        Rule::HasKey => {
            (!data.contains_key(field))
                .then(|| format!("{field} key must be present in the data."))
        }
        Rule::Unknown(name) => Some(format!("{field} must satisfy the {name} rule.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn data_of(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn rules_of(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_valid_data_passes() {
        let data = data_of(&[
            ("name", json!("ada")),
            ("email", json!("ada@example.com")),
        ]);
        let rules = rules_of(&[("name", "required|min:3"), ("email", "required|email")]);
        let result = validate(&data, &rules);
        assert!(result.ok);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_empty_required_field_fires_every_rule() {
        let data = data_of(&[("name", json!(""))]);
        let rules = rules_of(&[("name", "required|min:3")]);
        let result = validate(&data, &rules);
        assert!(!result.ok);
        assert_eq!(
            result.errors["name"],
            vec![
                "name is required.".to_string(),
                "name must be at least 3 characters.".to_string(),
            ]
        );
    }

    #[test]
    fn test_absent_field_is_treated_as_null() {
        let data = data_of(&[]);
        let rules = rules_of(&[("email", "required|email")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors["email"],
            vec![
                "email is required.".to_string(),
                "email must be a valid email address.".to_string(),
            ]
        );
    }

    #[test]
    fn test_nullable_skips_remaining_rules_when_empty() {
        let data = data_of(&[("nickname", json!(""))]);
        let rules = rules_of(&[("nickname", "nullable|min:3")]);
        let result = validate(&data, &rules);
        assert!(result.ok);
    }

    #[test]
    fn test_nullable_still_validates_present_values() {
        let data = data_of(&[("nickname", json!("x"))]);
        let rules = rules_of(&[("nickname", "nullable|min:3")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors["nickname"],
            vec!["nickname must be at least 3 characters.".to_string()]
        );
    }

    #[test]
    fn test_enum_message_lists_allowed_values() {
        let data = data_of(&[("status", json!("archived"))]);
        let rules = rules_of(&[("status", "enum:active,inactive")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors["status"],
            vec!["status must be one of the following values: active, inactive.".to_string()]
        );
    }

    #[test]
    fn test_unknown_rule_reports_generic_message() {
        let data = data_of(&[("code", json!("abc"))]);
        let rules = rules_of(&[("code", "palindrome")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors["code"],
            vec!["code must satisfy the palindrome rule.".to_string()]
        );
    }

    #[test]
    fn test_date_rule_requires_exact_format() {
        let data = data_of(&[("from", json!("2024-02-30")), ("to", json!("2024-02-29"))]);
        let rules = rules_of(&[("from", "date"), ("to", "date")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors["from"],
            vec!["from must be a valid date in the format 'Y-m-d'.".to_string()]
        );
        assert!(!result.errors.contains_key("to"));
    }

    #[test]
    fn test_type_rules() {
        let data = data_of(&[
            ("count", json!("12")),
            ("ratio", json!(0.5)),
            ("flag", json!("yes")),
            ("tags", json!(["a", "b"])),
            ("meta", json!({"k": 1})),
            ("blob", json!("{\"ok\":true}")),
            ("addr", json!("10.0.0.1")),
            ("site", json!("https://example.com/x")),
        ]);
        let rules = rules_of(&[
            ("count", "integer|numeric"),
            ("ratio", "float"),
            ("flag", "boolean"),
            ("tags", "array"),
            ("meta", "object"),
            ("blob", "json"),
            ("addr", "ip"),
            ("site", "url"),
        ]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors.keys().collect::<Vec<_>>(),
            vec![&"flag".to_string()]
        );
        assert_eq!(
            result.errors["flag"],
            vec!["flag must be a boolean.".to_string()]
        );
    }

    #[test]
    fn test_has_key_checks_presence_not_value() {
        let data = data_of(&[("present", json!(null))]);
        let rules = rules_of(&[("present", "hasKey"), ("missing", "hasKey")]);
        let result = validate(&data, &rules);
        assert!(!result.errors.contains_key("present"));
        assert_eq!(
            result.errors["missing"],
            vec!["missing key must be present in the data.".to_string()]
        );
    }

    #[test]
    fn test_errors_json_shape() {
        let data = data_of(&[("name", json!(""))]);
        let rules = rules_of(&[("name", "required")]);
        let result = validate(&data, &rules);
        assert_eq!(
            result.errors_json(),
            json!({"name": ["name is required."]})
        );
    }
}
