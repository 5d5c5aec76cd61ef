//! Node configuration schemas and the configuration validator.
//!
//! A template's `config_schema` maps field names to a [`FieldSchema`]. The set
//! of field kinds is closed ([`FieldKind`]); each kind owns its validation rule
//! ([`FieldKind::check`]) and its text coercion rule ([`FieldKind::coerce`]).
//!
//! [`validate_config`] is pure: the same schema and config always yield the
//! same [`FieldErrors`]. It applies only the literal schema. Cross-field and
//! node-type-specific business rules belong to the backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A node's configuration: field name to value.
pub type NodeConfig = BTreeMap<String, Value>;

/// A template's configuration schema: field name to descriptor.
pub type ConfigSchema = BTreeMap<String, FieldSchema>;

/// Validation result: field name to error message. Empty when valid.
pub type FieldErrors = BTreeMap<String, String>;

/// Message reported for a required field that is missing or empty.
pub const REQUIRED_MESSAGE: &str = "This field is required";

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// The closed set of configuration field kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Text,
    Password,
    Textarea,
    Select { options: Vec<String> },
    MultiSelect { options: Vec<String> },
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    KeyValue,
    Json,
    File,
}

impl FieldKind {
    /// Wire name of the kind, as used in the `type` key of a field descriptor.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Password => "password",
            FieldKind::Textarea => "textarea",
            FieldKind::Select { .. } => "select",
            FieldKind::MultiSelect { .. } => "multi_select",
            FieldKind::Number { .. } => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::KeyValue => "key_value",
            FieldKind::Json => "json",
            FieldKind::File => "file",
        }
    }

    /// Checks a present, non-empty value against this kind's rule.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            FieldKind::Text | FieldKind::Password | FieldKind::Textarea => match value {
                Value::String(_) => Ok(()),
                _ => Err("Must be text".to_string()),
            },
            FieldKind::Select { options } => match value {
                Value::String(s) if options.iter().any(|o| o == s) => Ok(()),
                _ => Err(format!("Must be one of: {}", options.join(", "))),
            },
            FieldKind::MultiSelect { options } => {
                let selected: Vec<&Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    Value::String(_) => vec![value],
                    _ => return Err("Must be a list of options".to_string()),
                };
                let invalid: Vec<String> = selected
                    .into_iter()
                    .filter(|v| !matches!(v, Value::String(s) if options.contains(s)))
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect();
                if invalid.is_empty() {
                    Ok(())
                } else {
                    Err(format!("Invalid selection: {}", invalid.join(", ")))
                }
            }
            FieldKind::Number { min, max } => {
                let Some(n) = as_number(value) else {
                    return Err("Must be a number".to_string());
                };
                if let Some(min) = min {
                    if n < *min {
                        return Err(format!("Must be at least {min}"));
                    }
                }
                if let Some(max) = max {
                    if n > *max {
                        return Err(format!("Must be at most {max}"));
                    }
                }
                Ok(())
            }
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => Err("Must be true or false".to_string()),
            },
            FieldKind::KeyValue => match value {
                Value::Object(map) if map.keys().any(|k| k.trim().is_empty()) => {
                    Err("Keys must not be empty".to_string())
                }
                Value::Object(_) => Ok(()),
                _ => Err("Must be a set of key/value pairs".to_string()),
            },
            FieldKind::Json => match value {
                Value::String(raw) => match JsonInput::parse(raw) {
                    JsonInput::Parsed(_) => Ok(()),
                    JsonInput::Pending(_) => Err("Must be valid JSON".to_string()),
                },
                _ => Ok(()),
            },
            FieldKind::File => match value {
                Value::String(_) => Ok(()),
                Value::Object(obj) => match obj.get("name") {
                    Some(Value::String(name)) if !name.trim().is_empty() => Ok(()),
                    _ => Err("Must be a file name".to_string()),
                },
                _ => Err("Must be a file name".to_string()),
            },
        }
    }

    /// Converts text input into the value this kind stores.
    ///
    /// Input that cannot be converted is kept as a string so nothing the user
    /// typed is dropped; [`FieldKind::check`] then reports it.
    pub fn coerce(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        match self {
            FieldKind::Text
            | FieldKind::Password
            | FieldKind::Textarea
            | FieldKind::Select { .. }
            | FieldKind::File => Value::String(raw.to_string()),
            FieldKind::Number { .. } => {
                if let Ok(i) = trimmed.parse::<i64>() {
                    Value::from(i)
                } else {
                    trimmed
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or_else(|| Value::String(raw.to_string()))
                }
            }
            FieldKind::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Value::Bool(true),
                "false" | "no" | "0" => Value::Bool(false),
                _ => Value::String(raw.to_string()),
            },
            FieldKind::MultiSelect { .. } => Value::Array(
                trimmed
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::String(s.to_string()))
                    .collect(),
            ),
            FieldKind::KeyValue => {
                let mut map = serde_json::Map::new();
                for pair in trimmed.split(',').filter(|p| !p.trim().is_empty()) {
                    let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                    map.insert(key.trim().to_string(), Value::String(value.trim().to_string()));
                }
                Value::Object(map)
            }
            // A JSON string literal stays as its raw text so re-validation parses
            // the same input the user typed.
            FieldKind::Json => match JsonInput::parse(raw) {
                JsonInput::Parsed(Value::String(_)) => Value::String(raw.to_string()),
                other => other.into_value(),
            },
        }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

// ---------------------------------------------------------------------------
// JSON input
// ---------------------------------------------------------------------------

/// Text entered into a `json` field.
///
/// Text that does not parse yet is kept verbatim as [`JsonInput::Pending`]
/// rather than discarded.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonInput {
    Parsed(Value),
    Pending(String),
}

impl JsonInput {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => JsonInput::Parsed(value),
            Err(_) => JsonInput::Pending(raw.to_string()),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, JsonInput::Pending(_))
    }

    /// The value to store: the parsed structure, or the raw text.
    pub fn into_value(self) -> Value {
        match self {
            JsonInput::Parsed(value) => value,
            JsonInput::Pending(raw) => Value::String(raw),
        }
    }
}

// ---------------------------------------------------------------------------
// Field descriptor
// ---------------------------------------------------------------------------

/// Descriptor for one configuration field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldSchema", into = "RawFieldSchema")]
pub struct FieldSchema {
    pub kind: FieldKind,
    pub required: bool,
    pub default: Option<Value>,
    pub placeholder: Option<String>,
    pub label: Option<String>,
}

impl FieldSchema {
    /// An optional field of the given kind with no default.
    pub fn new(kind: FieldKind) -> Self {
        Self {
            kind,
            required: false,
            default: None,
            placeholder: None,
            label: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Checks one value (absent when the field is missing from the config).
    pub fn check(&self, value: Option<&Value>) -> Result<(), String> {
        match value.filter(|v| !is_blank(v)) {
            Some(value) => self.kind.check(value),
            None if self.required => Err(REQUIRED_MESSAGE.to_string()),
            None => Ok(()),
        }
    }
}

/// Validates `config` against `schema`, returning one message per failing field.
///
/// Keys in `config` that the schema does not declare are ignored.
pub fn validate_config(schema: &ConfigSchema, config: &NodeConfig) -> FieldErrors {
    schema
        .iter()
        .filter_map(|(name, field)| {
            field
                .check(config.get(name))
                .err()
                .map(|message| (name.clone(), message))
        })
        .collect()
}

/// Builds a config containing every field's declared default.
pub fn default_config(schema: &ConfigSchema) -> NodeConfig {
    schema
        .iter()
        .filter_map(|(name, field)| field.default.clone().map(|d| (name.clone(), d)))
        .collect()
}

/// Wire shape of a field descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFieldSchema {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    options: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
}

impl TryFrom<RawFieldSchema> for FieldSchema {
    type Error = String;

    fn try_from(raw: RawFieldSchema) -> Result<Self, Self::Error> {
        // Options arrive either as plain strings or as `{value, label}` objects.
        let options = || -> Vec<String> {
            raw.options
                .iter()
                .filter_map(|o| match o {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj.get("value").and_then(Value::as_str).map(String::from),
                    _ => None,
                })
                .collect()
        };
        let kind = match raw.kind.as_str() {
            "text" => FieldKind::Text,
            "password" => FieldKind::Password,
            "textarea" => FieldKind::Textarea,
            "select" => FieldKind::Select { options: options() },
            "multi_select" | "multiselect" => FieldKind::MultiSelect { options: options() },
            "number" => FieldKind::Number {
                min: raw.min,
                max: raw.max,
            },
            "boolean" => FieldKind::Boolean,
            "key_value" => FieldKind::KeyValue,
            "json" => FieldKind::Json,
            "file" => FieldKind::File,
            other => return Err(format!("unknown field type `{other}`")),
        };
        Ok(FieldSchema {
            kind,
            required: raw.required,
            default: raw.default,
            placeholder: raw.placeholder,
            label: raw.label,
        })
    }
}

impl From<FieldSchema> for RawFieldSchema {
    fn from(field: FieldSchema) -> Self {
        let (options, min, max) = match &field.kind {
            FieldKind::Select { options } | FieldKind::MultiSelect { options } => (
                options.iter().cloned().map(Value::String).collect(),
                None,
                None,
            ),
            FieldKind::Number { min, max } => (Vec::new(), *min, *max),
            _ => (Vec::new(), None, None),
        };
        RawFieldSchema {
            kind: field.kind.as_str().to_string(),
            required: field.required,
            default: field.default,
            options,
            min,
            max,
            placeholder: field.placeholder,
            label: field.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(entries: &[(&str, FieldSchema)]) -> ConfigSchema {
        entries
            .iter()
            .map(|(name, field)| (name.to_string(), field.clone()))
            .collect()
    }

    fn config(value: Value) -> NodeConfig {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn required_text_field_must_be_present() {
        let s = schema(&[("host", FieldSchema::new(FieldKind::Text).required())]);

        let errors = validate_config(&s, &NodeConfig::new());
        assert_eq!(errors.get("host").map(String::as_str), Some(REQUIRED_MESSAGE));
        assert_eq!(errors.len(), 1);

        assert!(validate_config(&s, &config(json!({"host": "db1"}))).is_empty());
    }

    #[test]
    fn whitespace_only_text_counts_as_empty() {
        let s = schema(&[("host", FieldSchema::new(FieldKind::Text).required())]);
        let errors = validate_config(&s, &config(json!({"host": "   "})));
        assert_eq!(errors.get("host").map(String::as_str), Some(REQUIRED_MESSAGE));
    }

    #[test]
    fn select_rejects_values_outside_options() {
        let s = schema(&[(
            "proto",
            FieldSchema::new(FieldKind::Select {
                options: vec!["a".into(), "b".into()],
            })
            .required(),
        )]);
        let errors = validate_config(&s, &config(json!({"proto": "c"})));
        assert!(errors.contains_key("proto"));
        assert!(validate_config(&s, &config(json!({"proto": "b"}))).is_empty());
    }

    #[test]
    fn optional_select_may_be_left_empty() {
        let s = schema(&[(
            "proto",
            FieldSchema::new(FieldKind::Select {
                options: vec!["a".into()],
            }),
        )]);
        assert!(validate_config(&s, &config(json!({"proto": ""}))).is_empty());
    }

    #[test]
    fn multi_select_must_be_subset_of_options() {
        let s = schema(&[(
            "columns",
            FieldSchema::new(FieldKind::MultiSelect {
                options: vec!["a".into(), "b".into()],
            }),
        )]);
        assert!(validate_config(&s, &config(json!({"columns": ["a", "b"]}))).is_empty());
        let errors = validate_config(&s, &config(json!({"columns": ["a", "z"]})));
        assert_eq!(
            errors.get("columns").map(String::as_str),
            Some("Invalid selection: z")
        );
    }

    #[test]
    fn number_respects_bounds() {
        let s = schema(&[(
            "threshold",
            FieldSchema::new(FieldKind::Number {
                min: Some(0.0),
                max: Some(1.0),
            }),
        )]);
        assert!(validate_config(&s, &config(json!({"threshold": 0.5}))).is_empty());
        assert!(validate_config(&s, &config(json!({"threshold": "0.25"}))).is_empty());
        assert_eq!(
            validate_config(&s, &config(json!({"threshold": 2})))
                .get("threshold")
                .map(String::as_str),
            Some("Must be at most 1")
        );
        assert_eq!(
            validate_config(&s, &config(json!({"threshold": -1})))
                .get("threshold")
                .map(String::as_str),
            Some("Must be at least 0")
        );
        assert!(validate_config(&s, &config(json!({"threshold": "lots"}))).contains_key("threshold"));
    }

    #[test]
    fn any_boolean_is_valid() {
        let s = schema(&[("header", FieldSchema::new(FieldKind::Boolean).required())]);
        assert!(validate_config(&s, &config(json!({"header": false}))).is_empty());
        assert!(validate_config(&s, &config(json!({"header": true}))).is_empty());
        assert!(validate_config(&s, &config(json!({"header": "maybe"}))).contains_key("header"));
    }

    #[test]
    fn key_value_rejects_empty_keys() {
        let s = schema(&[("headers", FieldSchema::new(FieldKind::KeyValue))]);
        assert!(validate_config(&s, &config(json!({"headers": {"Accept": "json"}}))).is_empty());
        assert_eq!(
            validate_config(&s, &config(json!({"headers": {"": "x", "a": "b"}})))
                .get("headers")
                .map(String::as_str),
            Some("Keys must not be empty")
        );
    }

    #[test]
    fn unparseable_json_text_is_pending() {
        let s = schema(&[("body", FieldSchema::new(FieldKind::Json))]);
        assert!(validate_config(&s, &config(json!({"body": {"a": 1}}))).is_empty());
        assert!(validate_config(&s, &config(json!({"body": "{\"a\": 1}"}))).is_empty());
        assert!(validate_config(&s, &config(json!({"body": "{\"a\": "}))).contains_key("body"));
    }

    #[test]
    fn required_file_needs_a_name() {
        let s = schema(&[("upload", FieldSchema::new(FieldKind::File).required())]);
        assert!(validate_config(&s, &config(json!({"upload": ""}))).contains_key("upload"));
        assert!(validate_config(&s, &config(json!({"upload": "sales.csv"}))).is_empty());
        assert!(
            validate_config(&s, &config(json!({"upload": {"name": "sales.csv"}}))).is_empty()
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let s = schema(&[
            ("a", FieldSchema::new(FieldKind::Text).required()),
            ("b", FieldSchema::new(FieldKind::Boolean).required()),
        ]);
        let c = NodeConfig::new();
        assert_eq!(validate_config(&s, &c), validate_config(&s, &c));
        assert_eq!(validate_config(&s, &c).len(), 2);
    }

    #[test]
    fn coerce_keeps_unparseable_input() {
        let json = FieldKind::Json;
        assert_eq!(json.coerce("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(json.coerce("{\"a\":"), json!("{\"a\":"));
        assert_eq!(json.coerce("\"quoted\""), json!("\"quoted\""));

        let number = FieldKind::Number { min: None, max: None };
        assert_eq!(number.coerce("42"), json!(42));
        assert_eq!(number.coerce("0.5"), json!(0.5));
        assert_eq!(number.coerce("many"), json!("many"));
    }

    #[test]
    fn coerce_splits_lists_and_pairs() {
        let multi = FieldKind::MultiSelect { options: vec![] };
        assert_eq!(multi.coerce("a, b,,c"), json!(["a", "b", "c"]));
        assert_eq!(
            FieldKind::KeyValue.coerce("Accept=json, X-Env = prod"),
            json!({"Accept": "json", "X-Env": "prod"})
        );
        assert_eq!(FieldKind::Boolean.coerce("Yes"), json!(true));
    }

    #[test]
    fn field_descriptor_deserialises_from_wire_shape() {
        let field: FieldSchema = serde_json::from_value(json!({
            "type": "select",
            "required": true,
            "options": ["csv", {"value": "tsv", "label": "Tab separated"}],
            "default": "csv"
        }))
        .unwrap();
        assert!(field.required);
        assert_eq!(
            field.kind,
            FieldKind::Select {
                options: vec!["csv".into(), "tsv".into()]
            }
        );

        let unknown = serde_json::from_value::<FieldSchema>(json!({"type": "colour"}));
        assert!(unknown.is_err());
    }

    #[test]
    fn default_config_collects_declared_defaults() {
        let s = schema(&[
            ("delimiter", FieldSchema::new(FieldKind::Text).with_default(json!(","))),
            ("path", FieldSchema::new(FieldKind::File).required()),
        ]);
        assert_eq!(default_config(&s), config(json!({"delimiter": ","})));
    }
}
