//! Argument repair for near-miss tool calls.
//!
//! Models frequently produce arguments that are semantically right but
//! structurally off: wrong JSON type, a synonym instead of the schema's
//! enum literal, or snake_case keys against a camelCase schema. Coercion
//! runs before every provider call; key repair runs once after a
//! schema-shaped rejection.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Canonical enum value and the synonyms normalized to it
const ENUM_SYNONYMS: &[(&str, &[&str])] = &[
    ("hard", &["complex", "complicated", "difficult"]),
    ("medium", &["moderate", "average", "normal"]),
    ("easy", &["simple", "basic"]),
    ("high", &["important", "critical", "urgent"]),
    ("low", &["minor", "unimportant"]),
];

/// Patterns that pull expected field names out of schema error messages
static EXPECTED_FIELD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"missing field `([A-Za-z0-9_]+)`").unwrap(),
        Regex::new(r#"required property ['"]([A-Za-z0-9_]+)['"]"#).unwrap(),
        Regex::new(r#"unknown field `[A-Za-z0-9_]+`, expected (?:one of )?`([A-Za-z0-9_]+)`"#)
            .unwrap(),
    ]
});

/// Coerce argument values toward the declared schema types.
///
/// Only values that are present and confidently convertible change; on any
/// doubt the original value is kept.
pub fn coerce_arguments(arguments: &Value, schema: &Value) -> Value {
    let (Some(args), Some(properties)) = (
        arguments.as_object(),
        schema.get("properties").and_then(Value::as_object),
    ) else {
        return arguments.clone();
    };

    let mut coerced = Map::new();
    for (key, value) in args {
        let repaired = match properties.get(key) {
            Some(property) => coerce_value(value, property),
            None => value.clone(),
        };
        coerced.insert(key.clone(), repaired);
    }
    Value::Object(coerced)
}

fn coerce_value(value: &Value, property: &Value) -> Value {
    if let Some(options) = property.get("enum").and_then(Value::as_array) {
        if let Some(s) = value.as_str() {
            return normalize_enum(s, options);
        }
    }

    let declared = property.get("type").and_then(Value::as_str);
    match (declared, value) {
        (Some("string"), Value::Array(items)) => {
            let parts: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
            if parts.len() == items.len() {
                Value::String(parts.join(", "))
            } else {
                value.clone()
            }
        }
        (Some("array"), Value::String(_)) => Value::Array(vec![value.clone()]),
        (Some("number"), Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        (Some("integer"), Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|n| Value::Number(n.into()))
            .unwrap_or_else(|_| value.clone()),
        (Some("boolean"), Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Map a string onto an enum's literal options: exact, then
/// case-insensitive, then the synonym table
fn normalize_enum(value: &str, options: &[Value]) -> Value {
    let literals: Vec<&str> = options.iter().filter_map(Value::as_str).collect();
    if literals.iter().any(|opt| *opt == value) {
        return Value::String(value.to_string());
    }

    let lower = value.to_lowercase();
    if let Some(option) = literals.iter().find(|opt| opt.to_lowercase() == lower) {
        return Value::String(option.to_string());
    }

    for (canonical, synonyms) in ENUM_SYNONYMS {
        if synonyms.contains(&lower.as_str()) {
            if let Some(option) = literals
                .iter()
                .find(|opt| opt.to_lowercase() == *canonical)
            {
                return Value::String(option.to_string());
            }
        }
    }

    Value::String(value.to_string())
}

pub fn snake_to_camel(key: &str) -> String {
    let mut result = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' {
            upper_next = true;
        } else if upper_next {
            result.extend(c.to_uppercase());
            upper_next = false;
        } else {
            result.push(c);
        }
    }
    result
}

/// Field names the provider said it expected, pulled from the error text
pub fn extract_expected_fields(error_message: &str) -> Vec<String> {
    let mut fields = Vec::new();
    for pattern in EXPECTED_FIELD_PATTERNS.iter() {
        for captures in pattern.captures_iter(error_message) {
            if let Some(field) = captures.get(1) {
                let field = field.as_str().to_string();
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
    }
    fields
}

/// Rewrite argument keys after a schema rejection.
///
/// Keys matching an expected field modulo case and underscores take the
/// provider's spelling; everything else gets a blanket snake→camel pass.
pub fn repair_argument_keys(arguments: &Value, error_message: &str) -> Value {
    let Some(args) = arguments.as_object() else {
        return arguments.clone();
    };
    let expected = extract_expected_fields(error_message);

    let mut repaired = Map::new();
    for (key, value) in args {
        let normalized = normalize_key(key);
        let new_key = expected
            .iter()
            .find(|field| normalize_key(field) == normalized)
            .cloned()
            .unwrap_or_else(|| snake_to_camel(key));
        repaired.insert(new_key, value.clone());
    }
    Value::Object(repaired)
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(|c| c.to_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_numeric_and_boolean_coercion() {
        let schema = json!({"properties": {
            "count": {"type": "integer"},
            "ratio": {"type": "number"},
            "force": {"type": "boolean"},
        }});
        let args = json!({"count": "5", "ratio": "0.5", "force": "True"});
        let coerced = coerce_arguments(&args, &schema);
        assert_eq!(coerced, json!({"count": 5, "ratio": 0.5, "force": true}));
    }

    #[test]
    fn test_string_array_coercion_both_ways() {
        let schema = json!({"properties": {
            "names": {"type": "array"},
            "summary": {"type": "string"},
        }});
        let args = json!({"names": "alice", "summary": ["one", "two"]});
        let coerced = coerce_arguments(&args, &schema);
        assert_eq!(coerced, json!({"names": ["alice"], "summary": "one, two"}));
    }

    #[test]
    fn test_unparseable_values_unchanged() {
        let schema = json!({"properties": {"count": {"type": "integer"}}});
        let args = json!({"count": "several"});
        assert_eq!(coerce_arguments(&args, &schema), args);
    }

    #[test]
    fn test_enum_case_insensitive() {
        let schema = json!({"properties": {
            "level": {"type": "string", "enum": ["Easy", "Medium", "Hard"]},
        }});
        let coerced = coerce_arguments(&json!({"level": "medium"}), &schema);
        assert_eq!(coerced, json!({"level": "Medium"}));
    }

    #[test]
    fn test_enum_synonym_normalization() {
        let schema = json!({"properties": {
            "difficulty": {"type": "string", "enum": ["easy", "medium", "hard"]},
        }});
        let coerced = coerce_arguments(&json!({"difficulty": "complicated"}), &schema);
        assert_eq!(coerced, json!({"difficulty": "hard"}));

        let coerced = coerce_arguments(&json!({"difficulty": "moderate"}), &schema);
        assert_eq!(coerced, json!({"difficulty": "medium"}));
    }

    #[test]
    fn test_enum_unknown_value_unchanged() {
        let schema = json!({"properties": {
            "difficulty": {"type": "string", "enum": ["easy", "hard"]},
        }});
        let coerced = coerce_arguments(&json!({"difficulty": "purple"}), &schema);
        assert_eq!(coerced, json!({"difficulty": "purple"}));
    }

    #[test]
    fn test_snake_to_camel() {
        assert_eq!(snake_to_camel("file_path"), "filePath");
        assert_eq!(snake_to_camel("max_line_count"), "maxLineCount");
        assert_eq!(snake_to_camel("already"), "already");
    }

    #[test]
    fn test_extract_expected_fields() {
        let fields = extract_expected_fields("missing field `filePath` at line 1");
        assert_eq!(fields, vec!["filePath".to_string()]);

        let fields = extract_expected_fields("Invalid params: required property 'maxResults'");
        assert_eq!(fields, vec!["maxResults".to_string()]);
    }

    #[test]
    fn test_repair_keys_round_trip() {
        let args = json!({"file_path": "/tmp/x", "line_count": 10});
        let repaired = repair_argument_keys(&args, "missing field `filePath`");
        assert_eq!(repaired, json!({"filePath": "/tmp/x", "lineCount": 10}));
    }

    #[test]
    fn test_repair_prefers_provider_spelling() {
        // Provider expects snake_case; the error message wins over the
        // blanket camelCase conversion
        let args = json!({"filepath": "/tmp/x"});
        let repaired = repair_argument_keys(&args, "missing field `file_path`");
        assert_eq!(repaired, json!({"file_path": "/tmp/x"}));
    }
}
