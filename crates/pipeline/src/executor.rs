//! Plan compilation and execution.
//!
//! [`PlanExecutor::compile`] validates a list of node specs against an
//! operator registry and fixes the execution order. [`PlanExecutor::execute`]
//! then runs every node once, feeding each one the results its inputs name.

mod graph;
#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use tripwire_core::{DetectionInterval, PipelineResult};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::operator::{OperatorContext, OperatorDescriptor, OperatorRegistry, Outputs, RunContext};
use crate::plan::{ContextKey, PlanNodeSpec};

/// Every result a run produced, in the order it was produced.
pub type Results = IndexMap<ContextKey, PipelineResult>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Run the nodes of one dependency level concurrently.
    pub parallel: bool,
    /// Thread pool size in parallel mode; 0 lets rayon decide.
    pub max_parallelism: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeReport {
    pub node: String,
    pub node_type: String,
    pub elapsed_ms: u64,
    pub outputs: Vec<String>,
    pub anomalies: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub interval: DetectionInterval,
    pub parallel: bool,
    pub nodes: Vec<NodeReport>,
    pub failed_node: Option<String>,
    pub elapsed_ms: u64,
}

struct CompiledNode {
    spec: PlanNodeSpec,
    descriptor: OperatorDescriptor,
}

pub struct PlanExecutor {
    run_id: Uuid,
    interval: DetectionInterval,
    run: Arc<RunContext>,
    settings: ExecutionSettings,
    nodes: Vec<CompiledNode>,
    order: Vec<usize>,
    levels: Vec<Vec<usize>>,
    results: Results,
    report: RunReport,
    executed: bool,
}

impl PlanExecutor {
    /// Compile against the builtin operator types.
    pub fn compile(
        nodes: Vec<PlanNodeSpec>,
        interval: DetectionInterval,
        run: Arc<RunContext>,
    ) -> Result<Self> {
        Self::compile_with(nodes, interval, run, &OperatorRegistry::builtin())
    }

    pub fn compile_with(
        nodes: Vec<PlanNodeSpec>,
        interval: DetectionInterval,
        run: Arc<RunContext>,
        registry: &OperatorRegistry,
    ) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name.clone(), i).is_some() {
                return Err(PipelineError::DuplicateNode(node.name.clone()));
            }
        }

        let mut compiled = Vec::with_capacity(nodes.len());
        for mut spec in nodes {
            let descriptor = *registry.get(&spec.node_type).ok_or_else(|| {
                PipelineError::UnknownOperatorType {
                    node: spec.name.clone(),
                    type_name: spec.node_type.clone(),
                }
            })?;
            if spec.outputs.is_empty() {
                spec.outputs = descriptor.default_outputs.resolve(&spec);
            }
            compiled.push(CompiledNode { spec, descriptor });
        }

        let mut deps: Vec<Vec<usize>> = Vec::with_capacity(compiled.len());
        for node in &compiled {
            let mut seen_properties = HashSet::new();
            let mut sources = Vec::new();
            for input in &node.spec.inputs {
                if !seen_properties.insert(input.target_property.as_str()) {
                    return Err(PipelineError::DuplicateInput {
                        node: node.spec.name.clone(),
                        property: input.target_property.clone(),
                    });
                }
                let &source = index.get(&input.source_node).ok_or_else(|| {
                    PipelineError::UnknownSourceNode {
                        node: node.spec.name.clone(),
                        source_node: input.source_node.clone(),
                    }
                })?;
                if !compiled[source].spec.outputs.contains(&input.source_output_key) {
                    return Err(PipelineError::UnknownSourceOutput {
                        node: node.spec.name.clone(),
                        source_node: input.source_node.clone(),
                        output: input.source_output_key.clone(),
                    });
                }
                if !sources.contains(&source) {
                    sources.push(source);
                }
            }
            deps.push(sources);
        }

        let order = graph::topological_sort(&deps).map_err(|stuck| {
            let names: Vec<&str> = stuck.iter().map(|&i| compiled[i].spec.name.as_str()).collect();
            PipelineError::CircularDependency(format!(
                "cycle detected among nodes: {}",
                names.join(" -> ")
            ))
        })?;
        let levels = graph::levels(&deps, &order);

        let run_id = Uuid::new_v4();
        info!(
            run_id = %run_id,
            nodes = compiled.len(),
            levels = levels.len(),
            order = ?order.iter().map(|&i| compiled[i].spec.name.as_str()).collect::<Vec<_>>(),
            "plan compiled"
        );

        Ok(Self {
            run_id,
            interval,
            run,
            settings: ExecutionSettings::default(),
            nodes: compiled,
            order,
            levels,
            results: Results::new(),
            report: RunReport {
                run_id,
                interval,
                parallel: false,
                nodes: Vec::new(),
                failed_node: None,
                elapsed_ms: 0,
            },
            executed: false,
        })
    }

    pub fn with_settings(mut self, settings: ExecutionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Node names in sequential execution order.
    pub fn order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.nodes[i].spec.name.as_str()).collect()
    }

    /// Node names grouped by dependency level, as parallel mode runs them.
    pub fn levels(&self) -> Vec<Vec<&str>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|&i| self.nodes[i].spec.name.as_str()).collect())
            .collect()
    }

    /// Output keys each node was compiled with, in declaration order.
    pub fn declared_outputs(&self) -> Vec<ContextKey> {
        self.nodes
            .iter()
            .flat_map(|n| n.spec.outputs.iter().map(|o| n.spec.context_key(o)))
            .collect()
    }

    /// Results produced so far. After a failed run this holds what the
    /// nodes before the failure produced.
    pub fn results(&self) -> &Results {
        &self.results
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_results(self) -> Results {
        self.results
    }

    /// Run every node once. A plan runs at most once per compilation.
    pub fn execute(&mut self) -> Result<&Results> {
        if self.executed {
            return Err(PipelineError::AlreadyExecuted);
        }
        self.executed = true;
        self.report.parallel = self.settings.parallel;

        let started = Instant::now();
        let outcome = if self.settings.parallel {
            self.execute_levels()
        } else {
            self.execute_sequential()
        };
        self.report.elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(()) => {
                info!(
                    run_id = %self.run_id,
                    results = self.results.len(),
                    elapsed_ms = self.report.elapsed_ms,
                    "plan executed"
                );
                Ok(&self.results)
            }
            Err(err) => {
                self.report.failed_node = err.failed_node().map(str::to_string);
                error!(
                    run_id = %self.run_id,
                    node = ?self.report.failed_node,
                    completed = self.report.nodes.len(),
                    error = %err,
                    "plan aborted"
                );
                Err(err)
            }
        }
    }

    fn execute_sequential(&mut self) -> Result<()> {
        for position in 0..self.order.len() {
            let node = &self.nodes[self.order[position]];
            let (outputs, report) = run_node(node, self.interval, &self.run, &self.results)?;
            self.store(outputs, report);
        }
        Ok(())
    }

    fn execute_levels(&mut self) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.max_parallelism)
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;

        for level in 0..self.levels.len() {
            let outcomes: Vec<Result<(Outputs, NodeReport)>> = {
                let ready = &self.levels[level];
                let nodes = &self.nodes;
                let results = &self.results;
                let run = &self.run;
                let interval = self.interval;
                pool.install(|| {
                    ready
                        .par_iter()
                        .map(|&i| run_node(&nodes[i], interval, run, results))
                        .collect()
                })
            };

            let mut first_error = None;
            for outcome in outcomes {
                match outcome {
                    Ok((outputs, report)) => self.store(outputs, report),
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }
            if let Some(err) = first_error {
                return Err(err);
            }
        }
        Ok(())
    }

    fn store(&mut self, outputs: Outputs, report: NodeReport) {
        for (output, result) in outputs {
            self.results
                .insert(ContextKey::new(report.node.as_str(), output), result);
        }
        self.report.nodes.push(report);
    }
}

/// Build, initialize and run one node's operator.
fn run_node(
    node: &CompiledNode,
    interval: DetectionInterval,
    run: &Arc<RunContext>,
    results: &Results,
) -> Result<(Outputs, NodeReport)> {
    let spec = &node.spec;
    let fail = |source: PipelineError| PipelineError::ExecutionFailed {
        node: spec.name.clone(),
        source: Box::new(source),
    };

    let mut inputs = IndexMap::with_capacity(spec.inputs.len());
    for input in &spec.inputs {
        let result = results.get(&input.source_key()).ok_or_else(|| {
            fail(PipelineError::MissingInput {
                node: spec.name.clone(),
                property: input.target_property.clone(),
            })
        })?;
        inputs.insert(input.target_property.clone(), result.clone());
    }

    debug!(node = %spec.name, node_type = %spec.node_type, "node starting");
    let started = Instant::now();
    let mut operator = (node.descriptor.factory)();
    operator
        .init(OperatorContext {
            node: spec.clone(),
            interval,
            inputs,
            run: Arc::clone(run),
        })
        .map_err(fail)?;
    operator.execute().map_err(fail)?;
    let mut produced = operator.outputs();

    let mut outputs = Outputs::with_capacity(spec.outputs.len());
    for key in &spec.outputs {
        let result = produced.shift_remove(key).ok_or_else(|| {
            fail(PipelineError::MissingOutput {
                node: spec.name.clone(),
                output: key.clone(),
            })
        })?;
        outputs.insert(key.clone(), result);
    }
    for extra in produced.keys() {
        warn!(node = %spec.name, output = %extra, "dropping undeclared output");
    }

    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!(node = %spec.name, elapsed_ms, outputs = outputs.len(), "node finished");
    let report = NodeReport {
        node: spec.name.clone(),
        node_type: spec.node_type.clone(),
        elapsed_ms,
        outputs: outputs.keys().cloned().collect(),
        anomalies: outputs.values().map(PipelineResult::anomaly_count).sum(),
    };
    Ok((outputs, report))
}
