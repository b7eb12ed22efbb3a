//! JSON Schema subset validator.
//!
//! Supported keywords: `type` (a name or a list of names), `properties`,
//! `required`, `additionalProperties` (boolean or schema), `items`, `enum`,
//! `minLength`, `maxLength`, `minimum`, `maximum`, `minItems`, `maxItems`
//! and `format: "email"`. Unknown keywords are ignored.
//!
//! Every violation is reported, each with the JSON pointer of the offending
//! value.

use serde::Serialize;
use serde_json::{Map, Value};

/// A single schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaError {
    /// JSON pointer to the offending value (`""` is the document root).
    pub path: String,
    /// What went wrong.
    pub message: String,
}

impl SchemaError {
    fn new(path: &str, message: impl Into<String>) -> Self {
        Self {
            path: path.to_owned(),
            message: message.into(),
        }
    }
}

/// Validate `instance` against `schema`.
///
/// # Errors
///
/// Returns every violation found, in document order.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use tandem_server::schema::validate;
///
/// let schema = json!({
///     "type": "object",
///     "properties": {"age": {"type": "integer", "minimum": 0}},
///     "required": ["age"],
/// });
///
/// assert!(validate(&schema, &json!({"age": 42})).is_ok());
///
/// let errors = validate(&schema, &json!({"age": -1})).unwrap_err();
/// assert_eq!(errors[0].path, "/age");
/// ```
pub fn validate(schema: &Value, instance: &Value) -> Result<(), Vec<SchemaError>> {
    let mut errors = Vec::new();
    check(schema, instance, "", &mut errors);
    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

fn pointer(parent: &str, token: &str) -> String {
    format!("{parent}/{}", token.replace('~', "~0").replace('/', "~1"))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn has_type(value: &Value, expected: &str) -> bool {
    match expected {
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        other => type_name(value) == other,
    }
}

fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !value.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

fn limit(schema: &Map<String, Value>, keyword: &str) -> Option<usize> {
    schema
        .get(keyword)
        .and_then(Value::as_u64)
        .and_then(|n| usize::try_from(n).ok())
}

fn check(schema: &Value, instance: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let schema = match schema {
        Value::Object(map) => map,
        Value::Bool(false) => {
            errors.push(SchemaError::new(path, "no value is allowed here"));
            return;
        }
        _ => return,
    };

    if let Some(expected) = schema.get("type") {
        let names: Vec<&str> = match expected {
            Value::String(name) => vec![name.as_str()],
            Value::Array(names) => names.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        };
        if !names.is_empty() && !names.iter().any(|name| has_type(instance, name)) {
            errors.push(SchemaError::new(
                path,
                format!("expected {}, found {}", names.join(" or "), type_name(instance)),
            ));
            // Remaining keywords assume the declared type.
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(instance) {
            let choices = Value::Array(allowed.clone());
            errors.push(SchemaError::new(path, format!("value is not one of {choices}")));
        }
    }

    match instance {
        Value::String(text) => check_string(schema, text, path, errors),
        Value::Number(_) => check_number(schema, instance, path, errors),
        Value::Array(items) => check_array(schema, items, path, errors),
        Value::Object(object) => check_object(schema, object, path, errors),
        Value::Null | Value::Bool(_) => {}
    }
}

fn check_string(
    schema: &Map<String, Value>,
    text: &str,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    let length = text.chars().count();
    if let Some(min) = limit(schema, "minLength") {
        if length < min {
            errors.push(SchemaError::new(path, format!("must be at least {min} characters long")));
        }
    }
    if let Some(max) = limit(schema, "maxLength") {
        if length > max {
            errors.push(SchemaError::new(path, format!("must be at most {max} characters long")));
        }
    }
    if schema.get("format").and_then(Value::as_str) == Some("email") && !is_email(text) {
        errors.push(SchemaError::new(path, "must be a valid email address"));
    }
}

fn check_number(
    schema: &Map<String, Value>,
    number: &Value,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    let Some(value) = number.as_f64() else {
        return;
    };
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64) {
        if value < min {
            errors.push(SchemaError::new(path, format!("must be >= {min}")));
        }
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64) {
        if value > max {
            errors.push(SchemaError::new(path, format!("must be <= {max}")));
        }
    }
}

fn check_array(
    schema: &Map<String, Value>,
    items: &[Value],
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    if let Some(min) = limit(schema, "minItems") {
        if items.len() < min {
            errors.push(SchemaError::new(path, format!("must contain at least {min} items")));
        }
    }
    if let Some(max) = limit(schema, "maxItems") {
        if items.len() > max {
            errors.push(SchemaError::new(path, format!("must contain at most {max} items")));
        }
    }
    if let Some(item_schema) = schema.get("items") {
        for (index, item) in items.iter().enumerate() {
            check(item_schema, item, &pointer(path, &index.to_string()), errors);
        }
    }
}

fn check_object(
    schema: &Map<String, Value>,
    object: &Map<String, Value>,
    path: &str,
    errors: &mut Vec<SchemaError>,
) {
    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(name) {
                errors.push(SchemaError::new(path, format!("missing required property '{name}'")));
            }
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    for (name, value) in object {
        let child = pointer(path, name);
        match properties.and_then(|props| props.get(name)) {
            Some(property_schema) => check(property_schema, value, &child, errors),
            None => match schema.get("additionalProperties") {
                Some(Value::Bool(false)) => {
                    errors.push(SchemaError::new(&child, format!("unexpected property '{name}'")));
                }
                Some(extra @ Value::Object(_)) => check(extra, value, &child, errors),
                _ => {}
            },
        }
    }
}
