//! Data binding declarations between workflow steps.
//!
//! A binding connects a named output of one step (`sourcePath`) to an input
//! parameter of another (`targetParam`). Transforms are recorded here but
//! never executed by the client; the execution engine interprets them.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// A named field exposed by a step, either an output (source side) or an input (target side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    pub name: String,
    /// Dotted path into the step's output. Target inputs usually leave this empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Sample value captured from a previous execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

impl DataField {
    /// Creates an output field with a path.
    pub fn output(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            field_type: None,
            value: None,
        }
    }

    /// Creates an input field (no path).
    pub fn input(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: String::new(),
            field_type: None,
            value: None,
        }
    }

    /// Attaches a type hint.
    pub fn with_type(mut self, field_type: impl Into<String>) -> Self {
        self.field_type = Some(field_type.into());
        self
    }
}

/// Identity of a step taking part in a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepEndpoint {
    pub id: String,
    pub name: String,
}

impl StepEndpoint {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Declared transformation applied to a bound value before it reaches the target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataTransform {
    /// Reference to a named function known to the execution engine.
    Function { function: String },
    /// Template string rendered by the execution engine.
    Template { template: String },
}

impl DataTransform {
    /// The function name or template text.
    pub fn expression(&self) -> &str {
        match self {
            DataTransform::Function { function } => function,
            DataTransform::Template { template } => template,
        }
    }
}

/// A single source-path to target-parameter connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataBinding {
    pub id: String,
    pub source_step_id: String,
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    pub target_step_id: String,
    pub target_param: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<DataTransform>,
}

/// Persisted form of a mapping between two steps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDocument {
    pub source: StepEndpoint,
    pub target: StepEndpoint,
    #[serde(default)]
    pub source_outputs: Vec<DataField>,
    #[serde(default)]
    pub target_inputs: Vec<DataField>,
    #[serde(default)]
    pub bindings: Vec<DataBinding>,
}
