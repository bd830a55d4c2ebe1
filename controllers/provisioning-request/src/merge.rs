//! Template merging.
//!
//! Combines a template's default document with the user's parameters.
//! Mappings merge recursively with user values winning; sequences merge
//! element by element. The `extraLabels` and `extraAnnotations` blocks
//! (top level and per node) follow the opposite rule: for a key set on
//! both sides the template default wins, so users can add labels but
//! cannot override or drop the ones the template owns.

use serde_json::{Map, Value};
use thiserror::Error;

/// Mapping fields where template defaults take precedence
pub const LABEL_FIELDS: [&str; 2] = ["extraLabels", "extraAnnotations"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("expected data not provided in either the ProvisioningRequest or the defaults ConfigMap")]
    MissingInput,

    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// Merges user input over template defaults.
///
/// Empty (null or `{}`) on one side yields the other side unchanged.
pub fn merge(defaults: &Value, input: &Value) -> Result<Value, ConfigurationError> {
    match (is_empty(defaults), is_empty(input)) {
        (true, true) => Err(ConfigurationError::MissingInput),
        (false, true) => Ok(defaults.clone()),
        (true, false) => Ok(input.clone()),
        (false, false) => {
            let mut merged = defaults.clone();
            deep_merge(&mut merged, input, &mut Vec::new())?;
            apply_default_labels(&mut merged, defaults, input)?;
            Ok(merged)
        }
    }
}

/// Recursively merges `src` into `dst`.
///
/// A null source leaves the destination alone; scalars replace scalars
/// regardless of kind; a mapping or sequence facing a different kind is
/// a [`ConfigurationError::TypeMismatch`].
pub fn deep_merge(dst: &mut Value, src: &Value, path: &mut Vec<String>) -> Result<(), ConfigurationError> {
    if src.is_null() {
        return Ok(());
    }
    if dst.is_null() {
        *dst = src.clone();
        return Ok(());
    }
    match (dst, src) {
        (Value::Object(d), Value::Object(s)) => {
            for (key, value) in s {
                if let Some(existing) = d.get_mut(key) {
                    path.push(key.clone());
                    deep_merge(existing, value, path)?;
                    path.pop();
                } else {
                    d.insert(key.clone(), value.clone());
                }
            }
        }
        (Value::Array(d), Value::Array(s)) => {
            for (index, value) in s.iter().enumerate() {
                if index >= d.len() {
                    d.push(value.clone());
                    continue;
                }
                let existing = &mut d[index];
                if existing.is_object() && value.is_object() {
                    path.push(index.to_string());
                    deep_merge(existing, value, path)?;
                    path.pop();
                } else {
                    *existing = value.clone();
                }
            }
        }
        (d, s) => {
            if is_container(d) || is_container(s) {
                return Err(mismatch(path, kind(d), kind(s)));
            }
            *d = s.clone();
        }
    }
    Ok(())
}

fn apply_default_labels(merged: &mut Value, defaults: &Value, input: &Value) -> Result<(), ConfigurationError> {
    override_label_fields(merged, defaults, input, "")?;

    let (Some(default_nodes), Some(input_nodes)) = (
        defaults.get("nodes").and_then(Value::as_array),
        input.get("nodes").and_then(Value::as_array),
    ) else {
        return Ok(());
    };
    let Some(merged_nodes) = merged.get_mut("nodes").and_then(Value::as_array_mut) else {
        return Ok(());
    };
    for (index, (default_node, input_node)) in default_nodes.iter().zip(input_nodes).enumerate() {
        if let Some(node) = merged_nodes.get_mut(index) {
            override_label_fields(node, default_node, input_node, &format!("nodes.{index}."))?;
        }
    }
    Ok(())
}

/// Restores the default's value for every label key the input also sets.
///
/// `target` already holds the deep merge, so entries only one side sets are
/// left as they are.
fn override_label_fields(target: &mut Value, defaults: &Value, input: &Value, prefix: &str) -> Result<(), ConfigurationError> {
    for field in LABEL_FIELDS {
        let (Some(default_field), Some(input_field)) = (defaults.get(field), input.get(field)) else {
            continue;
        };
        let path = format!("{prefix}{field}");
        let default_field = as_mapping(default_field, &path)?;
        let input_field = as_mapping(input_field, &path)?;

        for (resource_type, default_labels) in default_field {
            let Some(input_labels) = input_field.get(resource_type) else {
                continue;
            };
            let labels_path = format!("{path}.{resource_type}");
            let default_labels = as_mapping(default_labels, &labels_path)?;
            let input_labels = as_mapping(input_labels, &labels_path)?;

            let Some(merged_labels) = target
                .get_mut(field)
                .and_then(|f| f.get_mut(resource_type))
                .and_then(Value::as_object_mut)
            else {
                continue;
            };
            for (key, value) in default_labels {
                if input_labels.contains_key(key) {
                    merged_labels.insert(key.clone(), value.clone());
                }
            }
        }
    }
    Ok(())
}

fn as_mapping<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>, ConfigurationError> {
    value.as_object().ok_or_else(|| ConfigurationError::TypeMismatch {
        path: path.to_string(),
        expected: "mapping",
        found: kind(value),
    })
}

fn mismatch(path: &[String], expected: &'static str, found: &'static str) -> ConfigurationError {
    let path = if path.is_empty() { "(root)".to_string() } else { path.join(".") };
    ConfigurationError::TypeMismatch { path, expected, found }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
#[path = "merge_test.rs"]
mod merge_test;
