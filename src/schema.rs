//! Tool input schemas
//!
//! Converts derived schemas into self-contained JSON Schema documents for
//! `tools/list`, and validates raw `tools/call` arguments against them.

use std::{fmt, marker::PhantomData};

use jsonschema::{Draft, JSONSchema};
use schemars::{gen::SchemaSettings, JsonSchema};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const DEFINITIONS_REF_PREFIX: &str = "#/definitions/";

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// JSON pointer into the arguments object; empty for the root.
    pub path: String,
    pub message: String,
}

/// Structured diagnostics produced when arguments fail validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationDiagnostics(pub Vec<ValidationIssue>);

impl ValidationDiagnostics {
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self(vec![ValidationIssue {
            path: path.into(),
            message: message.into(),
        }])
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.0
    }
}

impl fmt::Display for ValidationDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&rendered)
    }
}

impl std::error::Error for ValidationDiagnostics {}

/// Structural validator backing a tool's declared input.
pub trait Validator: Send + Sync + 'static {
    type Output: Send + 'static;

    /// JSON Schema advertised to clients.
    fn json_schema(&self) -> Value;

    fn validate(&self, raw: &Value) -> Result<Self::Output, ValidationDiagnostics>;
}

/// Validator for any `serde` + `schemars` type.
pub struct TypedSchema<T> {
    document: Value,
    compiled: JSONSchema,
    _input: PhantomData<fn() -> T>,
}

impl<T> TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Send + 'static,
{
    pub fn new(name: &str) -> Result<Self, String> {
        let document = schema_for::<T>(name);
        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(&document)
            .map_err(|err| err.to_string())?;

        Ok(Self {
            document,
            compiled,
            _input: PhantomData,
        })
    }
}

impl<T> Validator for TypedSchema<T>
where
    T: JsonSchema + DeserializeOwned + Send + 'static,
{
    type Output = T;

    fn json_schema(&self) -> Value {
        self.document.clone()
    }

    fn validate(&self, raw: &Value) -> Result<T, ValidationDiagnostics> {
        if let Err(errors) = self.compiled.validate(raw) {
            let issues = errors
                .map(|error| ValidationIssue {
                    path: error.instance_path.to_string(),
                    message: error.to_string(),
                })
                .collect();
            return Err(ValidationDiagnostics(issues));
        }

        serde_json::from_value(raw.clone())
            .map_err(|err| ValidationDiagnostics::single("", err.to_string()))
    }
}

/// Generates a draft-07 schema for `T` and normalizes it for clients.
pub fn schema_for<T: JsonSchema>(name: &str) -> Value {
    let generator = SchemaSettings::draft07().into_generator();
    let root = generator.into_root_schema_for::<T>();
    let document = serde_json::to_value(root).expect("json schema serialization");
    to_json_schema(name, document)
}

/// Replaces a root `$ref` to `#/definitions/<name>` with the definition itself,
/// so clients receive a self-contained document. Other definitions are kept
/// only while something still refers to them.
pub fn to_json_schema(name: &str, document: Value) -> Value {
    let Value::Object(mut root) = document else {
        return document;
    };

    let Some(target) = root
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| reference.strip_prefix(DEFINITIONS_REF_PREFIX))
        .map(str::to_string)
    else {
        return Value::Object(root);
    };

    let mut definitions = match root.remove("definitions") {
        Some(Value::Object(definitions)) => definitions,
        other => {
            if let Some(other) = other {
                root.insert("definitions".to_string(), other);
            }
            return Value::Object(root);
        }
    };

    if target != name {
        debug!(schema = name, reference = %target, "root reference names another definition");
    }

    let Some(Value::Object(inlined)) = definitions.remove(&target) else {
        root.insert("definitions".to_string(), Value::Object(definitions));
        return Value::Object(root);
    };

    let mut document = Map::new();
    if let Some(schema_uri) = root.remove("$schema") {
        document.insert("$schema".to_string(), schema_uri);
    }
    document.extend(inlined);

    let remaining = reachable_definitions(&Value::Object(document.clone()), definitions);
    if !remaining.is_empty() {
        document.insert("definitions".to_string(), Value::Object(remaining));
    }

    Value::Object(document)
}

fn reachable_definitions(body: &Value, mut pending: Map<String, Value>) -> Map<String, Value> {
    let mut kept = Map::new();
    loop {
        let reached: Vec<String> = pending
            .keys()
            .filter(|key| {
                references(body, key) || kept.values().any(|schema| references(schema, key))
            })
            .cloned()
            .collect();
        if reached.is_empty() {
            return kept;
        }
        for key in reached {
            if let Some(schema) = pending.remove(&key) {
                kept.insert(key, schema);
            }
        }
    }
}

fn references(value: &Value, definition: &str) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, item)| {
            (key == "$ref"
                && item
                    .as_str()
                    .and_then(|reference| reference.strip_prefix(DEFINITIONS_REF_PREFIX))
                    == Some(definition))
                || references(item, definition)
        }),
        Value::Array(items) => items.iter().any(|item| references(item, definition)),
        _ => false,
    }
}
