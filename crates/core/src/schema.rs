//! JSON-schema validation of definition bodies.
//!
//! Schemas are embedded in the binary and compiled once into a
//! process-wide registry, keyed by the `schema_version` string stored on
//! every definition row (`wizard.v1`, `page.v1`).

use std::collections::HashMap;
use std::sync::OnceLock;

use jsonschema::{Draft, Validator};
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

const WIZARD_V1: &str = include_str!("schemas/wizard.v1.schema.json");
const PAGE_V1: &str = include_str!("schemas/page.v1.schema.json");

/// One schema (or structural) validation failure, addressed by the JSON
/// pointer of the offending node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaViolation {
    pub instance_path: String,
    pub message: String,
}

impl SchemaViolation {
    pub fn new(instance_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instance_path: instance_path.into(),
            message: message.into(),
        }
    }
}

fn registry() -> &'static HashMap<&'static str, Validator> {
    static REGISTRY: OnceLock<HashMap<&'static str, Validator>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        map.insert("wizard.v1", compile(WIZARD_V1));
        map.insert("page.v1", compile(PAGE_V1));
        map
    })
}

// Embedded schemas are part of the binary; failing to compile them is a
// build defect, so panicking here is the fail-fast behaviour we want.
fn compile(source: &str) -> Validator {
    let schema: Value = serde_json::from_str(source).expect("embedded schema is valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("embedded schema compiles")
}

/// Whether `schema_version` names a schema this build knows about.
pub fn is_known(schema_version: &str) -> bool {
    registry().contains_key(schema_version)
}

/// Validate a body against the named schema.
///
/// Returns the full list of violations (empty when valid). Fails only when
/// `schema_version` itself is unknown.
pub fn validate(schema_version: &str, body: &Value) -> Result<Vec<SchemaViolation>, CoreError> {
    let validator = registry().get(schema_version).ok_or_else(|| {
        CoreError::Validation(format!(
            "Unknown schema_version '{schema_version}'. Known: wizard.v1, page.v1"
        ))
    })?;

    Ok(validator
        .iter_errors(body)
        .map(|err| {
            let path = err.instance_path().to_string();
            SchemaViolation::new(
                if path.is_empty() { "root".to_string() } else { path },
                err.to_string(),
            )
        })
        .collect())
}
