//! Template parameter schema validation.
//!
//! Supports the JSON schema subset ClusterTemplates use for their
//! parameters: `type`, `required`, `properties`, `additionalProperties`,
//! `items` and `enum`. Every violation is collected and reported as
//! `<path>: <message>`, with `(root)` for the top-level document.

use serde_json::Value;
use std::fmt;

/// All violations found in one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolations(pub Vec<String>);

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("; "))
    }
}

impl std::error::Error for SchemaViolations {}

/// Validates `document` against `schema`.
///
/// An empty or null schema accepts everything.
pub fn validate(schema: &Value, document: &Value) -> Result<(), SchemaViolations> {
    let mut violations = Vec::new();
    validate_at(schema, document, &mut Vec::new(), &mut violations);
    if violations.is_empty() {
        Ok(())
    } else {
        Err(SchemaViolations(violations))
    }
}

/// Returns the schema of a top-level property, if the schema declares one.
pub fn property_schema<'a>(schema: &'a Value, property: &str) -> Option<&'a Value> {
    schema.get("properties").and_then(|p| p.get(property))
}

/// Closes every object schema that lists `properties` to unknown fields.
///
/// An explicit `additionalProperties` is kept. Recurses through
/// `properties` and `items`.
pub fn disallow_unknown_fields(schema: &mut Value) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    if let Some(properties) = object.get_mut("properties") {
        if let Some(properties) = properties.as_object_mut() {
            for property in properties.values_mut() {
                disallow_unknown_fields(property);
            }
        }
        object
            .entry("additionalProperties")
            .or_insert(Value::Bool(false));
    }
    if let Some(items) = object.get_mut("items") {
        disallow_unknown_fields(items);
    }
}

fn validate_at(schema: &Value, document: &Value, path: &mut Vec<String>, out: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        if !type_matches(expected, document) {
            out.push(format!(
                "{}: Invalid type. Expected: {}, given: {}",
                display_path(path),
                type_names(expected),
                json_type(document)
            ));
            return;
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(document) {
            let choices: Vec<String> = allowed.iter().map(Value::to_string).collect();
            out.push(format!(
                "{}: must be one of the following: {}",
                display_path(path),
                choices.join(", ")
            ));
        }
    }

    if let Some(object) = document.as_object() {
        for required in schema.get("required").and_then(Value::as_array).into_iter().flatten() {
            if let Some(name) = required.as_str() {
                if !object.contains_key(name) {
                    out.push(format!("{}: {} is required", display_path(path), name));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);
        for (key, value) in object {
            path.push(key.clone());
            match (properties.and_then(|p| p.get(key)), schema.get("additionalProperties")) {
                (Some(property_schema), _) => validate_at(property_schema, value, path, out),
                (None, Some(Value::Bool(false))) => {
                    path.pop();
                    out.push(format!("{}: Additional property {} is not allowed", display_path(path), key));
                    continue;
                }
                (None, Some(additional)) => validate_at(additional, value, path, out),
                (None, None) => {}
            }
            path.pop();
        }
    }

    if let (Some(items), Some(elements)) = (schema.get("items"), document.as_array()) {
        for (index, element) in elements.iter().enumerate() {
            path.push(index.to_string());
            validate_at(items, element, path, out);
            path.pop();
        }
    }
}

fn type_matches(expected: &Value, document: &Value) -> bool {
    match expected {
        Value::String(name) => single_type_matches(name, document),
        Value::Array(names) => names
            .iter()
            .filter_map(Value::as_str)
            .any(|name| single_type_matches(name, document)),
        _ => true,
    }
}

fn single_type_matches(name: &str, document: &Value) -> bool {
    match name {
        "object" => document.is_object(),
        "array" => document.is_array(),
        "string" => document.is_string(),
        "boolean" => document.is_boolean(),
        "null" => document.is_null(),
        "number" => document.is_number(),
        "integer" => document.is_i64() || document.is_u64() || document.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => true,
    }
}

fn type_names(expected: &Value) -> String {
    match expected {
        Value::Array(names) => names.iter().filter_map(Value::as_str).collect::<Vec<_>>().join("/"),
        other => other.as_str().unwrap_or_default().to_string(),
    }
}

fn json_type(document: &Value) -> &'static str {
    match document {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.join(".")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cluster_schema() -> Value {
        json!({
            "type": "object",
            "required": ["clusterName", "nodes"],
            "properties": {
                "clusterName": { "type": "string" },
                "nodes": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["hostName"],
                        "properties": {
                            "hostName": { "type": "string" },
                            "role": { "type": "string", "enum": ["master", "worker"] }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_valid_document_passes() {
        let doc = json!({ "clusterName": "site-1", "nodes": [{ "hostName": "node1", "role": "master" }] });
        assert_eq!(validate(&cluster_schema(), &doc), Ok(()));
    }

    #[test]
    fn test_missing_required_field_reports_path() {
        let doc = json!({ "clusterName": "site-1", "nodes": [{ "role": "master" }] });
        let err = validate(&cluster_schema(), &doc).unwrap_err();
        assert_eq!(err.to_string(), "nodes.0: hostName is required");
    }

    #[test]
    fn test_all_violations_are_collected() {
        let doc = json!({ "nodes": [{ "hostName": 7, "role": "storage" }] });
        let err = validate(&cluster_schema(), &doc).unwrap_err();
        assert_eq!(
            err.0,
            vec![
                "(root): clusterName is required".to_string(),
                "nodes.0.hostName: Invalid type. Expected: string, given: integer".to_string(),
                "nodes.0.role: must be one of the following: \"master\", \"worker\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_additional_properties_false() {
        let schema = json!({ "type": "object", "properties": { "a": {} }, "additionalProperties": false });
        let err = validate(&schema, &json!({ "a": 1, "b": 2 })).unwrap_err();
        assert_eq!(err.to_string(), "(root): Additional property b is not allowed");
    }

    #[test]
    fn test_empty_schema_accepts_anything() {
        assert!(validate(&json!({}), &json!({ "anything": [1, 2, 3] })).is_ok());
        assert!(validate(&Value::Null, &json!("x")).is_ok());
    }

    #[test]
    fn test_property_schema_lookup() {
        let schema = json!({ "properties": { "clusterInstanceParameters": cluster_schema() } });
        assert_eq!(property_schema(&schema, "clusterInstanceParameters"), Some(&cluster_schema()));
        assert_eq!(property_schema(&schema, "policyTemplateParameters"), None);
    }

    #[test]
    fn test_disallow_unknown_fields_closes_nested_objects() {
        let mut schema = cluster_schema();
        disallow_unknown_fields(&mut schema);
        let doc = json!({
            "clusterName": "site-1",
            "templateRefs": [{ "name": "custom" }],
            "nodes": [{ "hostName": "node1", "bmcAddress": "x" }]
        });
        let err = validate(&schema, &doc).unwrap_err();
        assert_eq!(err.0.len(), 2, "{err}");
        assert!(err.0.contains(&"nodes.0: Additional property bmcAddress is not allowed".to_string()));
        assert!(err.0.contains(&"(root): Additional property templateRefs is not allowed".to_string()));
    }

    #[test]
    fn test_disallow_unknown_fields_keeps_explicit_setting() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "extraLabels": { "type": "object", "additionalProperties": { "type": "object" } },
                "networking": { "type": "object" }
            }
        });
        disallow_unknown_fields(&mut schema);
        let doc = json!({ "extraLabels": { "ManagedCluster": { "a": "b" } }, "networking": { "any": 1 } });
        assert_eq!(validate(&schema, &doc), Ok(()));
        assert!(validate(&schema, &json!({ "other": 1 })).is_err());
    }
}
