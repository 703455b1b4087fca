use std::fmt;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};

/// A detection plan: a DAG of operator nodes wired output-to-input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub nodes: Vec<PlanNodeSpec>,
}

impl Plan {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Load a plan file; `.json` files are read as JSON, anything else as TOML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content),
            _ => Self::from_toml(&content),
        }
    }
}

/// Declarative description of one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanNodeSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<InputBinding>,
    /// Output keys this node promises. Left empty, the operator's defaults apply.
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl PlanNodeSpec {
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            params: Map::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_input(
        mut self,
        target_property: impl Into<String>,
        source_node: impl Into<String>,
        source_output_key: impl Into<String>,
    ) -> Self {
        self.inputs.push(InputBinding {
            target_property: target_property.into(),
            source_node: source_node.into(),
            source_output_key: source_output_key.into(),
        });
        self
    }

    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Deserialize `params` into an operator's typed parameter struct.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(|e| {
            PipelineError::InvalidParams {
                node: self.name.clone(),
                reason: e.to_string(),
            }
        })
    }

    pub fn context_key(&self, output: &str) -> ContextKey {
        ContextKey::new(&self.name, output)
    }
}

/// Wires `source_node.source_output_key` into this node under `target_property`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputBinding {
    pub target_property: String,
    #[serde(alias = "sourceNodeName")]
    pub source_node: String,
    pub source_output_key: String,
}

impl InputBinding {
    pub fn source_key(&self) -> ContextKey {
        ContextKey::new(&self.source_node, &self.source_output_key)
    }
}

/// Identifies one produced result: `node.output`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextKey {
    pub node: String,
    pub output: String,
}

impl ContextKey {
    pub fn new(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.output)
    }
}

impl Serialize for ContextKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
