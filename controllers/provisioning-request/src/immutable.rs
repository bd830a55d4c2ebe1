//! Immutable field detection for rendered ClusterInstances.
//!
//! Once installation has started, the applied descriptor may only change in
//! a few places. Differences are collected as dotted paths over normalized
//! documents and then classified against fixed path patterns, where `*`
//! matches any single segment and a pattern also covers everything below it.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Fields users may edit at any time
const ALLOWED_FIELDS: &[&[&str]] = &[
    &["extraAnnotations"],
    &["extraLabels"],
    &["nodes", "*", "extraAnnotations"],
    &["nodes", "*", "extraLabels"],
];

/// Fields filled in from hardware or owned by the install backend
const IGNORED_FIELDS: &[&[&str]] = &[
    &["nodes", "*", "bmcAddress"],
    &["nodes", "*", "bmcCredentialsName"],
    &["nodes", "*", "bootMACAddress"],
    &["nodes", "*", "hostRef"],
    &["nodes", "*", "nodeNetwork", "interfaces", "*", "macAddress"],
    &["nodes", "*", "nodeNetwork", "interfaces", "*", "label"],
    &["suppressedManifests"],
];

/// Editable only after installation completed
const IMAGE_SET_FIELD: &[&str] = &["clusterImageSetNameRef"];

/// Classified differences between an applied and a newly rendered spec
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldChanges {
    /// Paths that must not change in the current state
    pub changed: Vec<String>,
    /// Node additions or removals accepted as scaling
    pub scaling: Vec<String>,
    /// The image set changed after a completed install
    pub image_set_updated: bool,
}

impl FieldChanges {
    pub fn is_blocking(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Compares two descriptor specs.
///
/// `install_completed` is true when ClusterProvisioned already reached
/// Completed; it unlocks image-set changes and node scaling.
pub fn diff(existing: &Value, candidate: &Value, install_completed: bool) -> FieldChanges {
    let existing = normalize(existing);
    let candidate = normalize(candidate);

    let mut differences = Vec::new();
    collect_differences(existing.as_ref(), candidate.as_ref(), &mut Vec::new(), &mut differences);

    let mut changed = BTreeSet::new();
    let mut scaling = BTreeSet::new();
    let mut image_set_updated = false;
    for difference in differences {
        let path = difference.path.join(".");
        if matches_any(&difference.path, ALLOWED_FIELDS) || matches_any(&difference.path, IGNORED_FIELDS) {
            continue;
        }
        if matches_pattern(&difference.path, IMAGE_SET_FIELD) {
            if install_completed {
                image_set_updated = true;
            } else {
                changed.insert(path);
            }
            continue;
        }
        if difference.node_count_change {
            if install_completed {
                scaling.insert(path);
            } else {
                changed.insert(path);
            }
            continue;
        }
        changed.insert(path);
    }

    FieldChanges {
        changed: changed.into_iter().collect(),
        scaling: scaling.into_iter().collect(),
        image_set_updated,
    }
}

struct Difference {
    path: Vec<String>,
    node_count_change: bool,
}

fn collect_differences(a: Option<&Value>, b: Option<&Value>, path: &mut Vec<String>, out: &mut Vec<Difference>) {
    match (a, b) {
        (None, None) => {}
        (Some(Value::Object(a)), Some(Value::Object(b))) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                path.push(key.clone());
                collect_differences(a.get(key), b.get(key), path, out);
                path.pop();
            }
        }
        (Some(Value::Array(a)), Some(Value::Array(b))) => {
            let node_list = path.len() == 1 && path[0] == "nodes";
            for index in 0..a.len().max(b.len()) {
                path.push(index.to_string());
                if node_list && (index >= a.len() || index >= b.len()) {
                    out.push(Difference {
                        path: path.clone(),
                        node_count_change: true,
                    });
                } else {
                    collect_differences(a.get(index), b.get(index), path, out);
                }
                path.pop();
            }
        }
        (a, b) if a == b => {}
        _ => out.push(Difference {
            path: path.clone(),
            node_count_change: false,
        }),
    }
}

fn matches_any(path: &[String], patterns: &[&[&str]]) -> bool {
    patterns.iter().any(|pattern| matches_pattern(path, pattern))
}

fn matches_pattern(path: &[String], pattern: &[&str]) -> bool {
    path.len() >= pattern.len()
        && pattern
            .iter()
            .zip(path)
            .all(|(expected, actual)| *expected == "*" || expected == actual)
}

/// Drops nulls, empty collections, `false` and `""` from mappings so that
/// "absent" and "empty" compare equal. Returns `None` if nothing remains.
fn normalize(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Object(map) => {
            let normalized: Map<String, Value> = map
                .iter()
                .filter_map(|(k, v)| normalize(v).map(|v| (k.clone(), v)))
                .collect();
            (!normalized.is_empty()).then_some(Value::Object(normalized))
        }
        Value::Array(items) if items.is_empty() => None,
        // Sequence positions are significant, so elements are kept in place
        Value::Array(items) => Some(Value::Array(
            items.iter().map(|v| normalize(v).unwrap_or(Value::Null)).collect(),
        )),
        other => Some(other.clone()),
    }
}
