//! The operator seam: what a plan node runs, and the registry that maps a
//! node's `type` to an implementation.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tripwire_core::{DataTable, DetectionInterval, DetectionResult, PipelineResult};

use crate::datasource::{DataSource, DataSourceCache};
use crate::detectors::DetectorRegistry;
use crate::error::{PipelineError, Result};
use crate::operators;
use crate::plan::PlanNodeSpec;

/// What one operator publishes, by output key.
pub type Outputs = IndexMap<String, PipelineResult>;

/// A unit of work in a plan.
///
/// The executor builds a fresh operator for every run, calls `init` once
/// with the node's resolved inputs, then `execute`, then collects `outputs`.
pub trait Operator: Send {
    fn init(&mut self, context: OperatorContext) -> Result<()>;

    fn execute(&mut self) -> Result<()>;

    /// Hand over what `execute` produced.
    fn outputs(&mut self) -> Outputs;
}

// ── Contexts ─────────────────────────────────────────────────────────

/// Properties shared by every node of a run.
pub struct RunContext {
    pub datasources: DataSourceCache,
    pub detectors: DetectorRegistry,
    /// Abort data fetching when a macro expands to unparseable SQL.
    pub strict_macros: bool,
    /// Free-form values operators may read.
    pub properties: Map<String, Value>,
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            datasources: DataSourceCache::new(),
            detectors: DetectorRegistry::builtin(),
            strict_macros: false,
            properties: Map::new(),
        }
    }
}

impl RunContext {
    pub fn with_datasource(mut self, source: Arc<dyn DataSource>) -> Self {
        self.datasources.register(source);
        self
    }

    pub fn with_strict_macros(mut self, strict: bool) -> Self {
        self.strict_macros = strict;
        self
    }
}

/// Everything one node sees when it runs.
pub struct OperatorContext {
    pub node: PlanNodeSpec,
    pub interval: DetectionInterval,
    /// Upstream results keyed by the input's target property.
    pub inputs: IndexMap<String, PipelineResult>,
    pub run: Arc<RunContext>,
}

impl OperatorContext {
    pub fn name(&self) -> &str {
        &self.node.name
    }

    pub fn params<T: DeserializeOwned>(&self) -> Result<T> {
        self.node.params()
    }

    pub fn input(&self, property: &str) -> Result<&PipelineResult> {
        self.inputs
            .get(property)
            .ok_or_else(|| PipelineError::MissingInput {
                node: self.node.name.clone(),
                property: property.to_string(),
            })
    }

    /// Table bound to `property`, checked to be rectangular.
    pub fn table_input(&self, property: &str) -> Result<&DataTable> {
        let result = self.input(property)?;
        let table = result
            .as_table()
            .ok_or_else(|| self.input_type(property, "table", result))?;
        table.validate()?;
        Ok(table)
    }

    pub fn detection_input(&self, property: &str) -> Result<&DetectionResult> {
        let result = self.input(property)?;
        result
            .as_detection()
            .ok_or_else(|| self.input_type(property, "detection", result))
    }

    pub(crate) fn input_type(
        &self,
        property: &str,
        expected: &'static str,
        actual: &PipelineResult,
    ) -> PipelineError {
        PipelineError::InputType {
            node: self.node.name.clone(),
            property: property.to_string(),
            expected,
            actual: actual.kind(),
        }
    }
}

/// Bookkeeping every builtin operator carries between `init` and `outputs`.
#[derive(Default)]
pub struct OperatorState {
    context: Option<OperatorContext>,
    outputs: Outputs,
}

impl OperatorState {
    pub fn init(&mut self, context: OperatorContext) {
        self.context = Some(context);
        self.outputs.clear();
    }

    pub fn context(&self) -> Result<&OperatorContext> {
        self.context.as_ref().ok_or(PipelineError::NotInitialized)
    }

    pub fn publish(&mut self, key: impl Into<String>, result: PipelineResult) {
        self.outputs.insert(key.into(), result);
    }

    pub fn take_outputs(&mut self) -> Outputs {
        std::mem::take(&mut self.outputs)
    }
}

// ── Registry ─────────────────────────────────────────────────────────

pub type OperatorFactory = fn() -> Box<dyn Operator>;

/// Output keys a node gets when its spec declares none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOutputs {
    Fixed(&'static [&'static str]),
    /// One output per input, named after the input's target property;
    /// `fallback` applies to a node without inputs.
    PerInput { fallback: Option<&'static str> },
}

impl DefaultOutputs {
    pub fn resolve(&self, node: &PlanNodeSpec) -> Vec<String> {
        match self {
            DefaultOutputs::Fixed(keys) => keys.iter().map(|k| k.to_string()).collect(),
            DefaultOutputs::PerInput { fallback } => {
                if node.inputs.is_empty() {
                    fallback.iter().map(|k| k.to_string()).collect()
                } else {
                    node.inputs.iter().map(|i| i.target_property.clone()).collect()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OperatorDescriptor {
    pub factory: OperatorFactory,
    pub default_outputs: DefaultOutputs,
}

impl OperatorDescriptor {
    pub fn new(factory: OperatorFactory, default_outputs: DefaultOutputs) -> Self {
        Self {
            factory,
            default_outputs,
        }
    }
}

/// Node types known to a compiler, by exact type name.
#[derive(Debug, Clone, Default)]
pub struct OperatorRegistry {
    types: IndexMap<String, OperatorDescriptor>,
}

impl OperatorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        operators::register_builtins(&mut registry);
        registry
    }

    pub fn register(&mut self, type_name: impl Into<String>, descriptor: OperatorDescriptor) {
        self.types.insert(type_name.into(), descriptor);
    }

    pub fn get(&self, type_name: &str) -> Option<&OperatorDescriptor> {
        self.types.get(type_name)
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }
}
