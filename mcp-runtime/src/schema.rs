//! Generic argument validation against the JSON Schema subset the tool
//! definitions actually use: required properties, primitive types, enums,
//! and `additionalProperties: false`. Runs before the handler, so a
//! malformed call never produces a network request.

use serde_json::{Map, Value};

pub(crate) fn validate_arguments(
    schema: &Value,
    args: &Map<String, Value>,
) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            match args.get(key) {
                None | Some(Value::Null) => {
                    problems.push(format!("missing required field '{key}'"));
                }
                Some(Value::String(s)) if s.trim().is_empty() => {
                    problems.push(format!("'{key}' must not be empty"));
                }
                Some(_) => {}
            }
        }
    }

    let reject_unknown =
        schema.get("additionalProperties").and_then(Value::as_bool) == Some(false);

    for (key, value) in args {
        let Some(property) = properties.and_then(|props| props.get(key)) else {
            if reject_unknown {
                problems.push(format!("unknown field '{key}'"));
            }
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !matches_type(value, expected) {
                problems.push(format!("'{key}' must be of type {expected}"));
                continue;
            }
        }
        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let rendered: Vec<String> = allowed.iter().map(Value::to_string).collect();
                problems.push(format!("'{key}' must be one of {}", rendered.join(", ")));
            }
        }
    }

    if problems.is_empty() { Ok(()) } else { Err(problems) }
}

fn matches_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.is_number(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}
