//! Schema overrides for free-form fields.

use schemars::{json_schema, Schema, SchemaGenerator};

/// Free-form object schema that the API server stores without pruning.
///
/// Used for template parameters and parameter schemas, which are only
/// validated by the orchestrator.
pub fn preserve_unknown_fields(_: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
