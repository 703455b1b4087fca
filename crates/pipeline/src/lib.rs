//! Plan compilation and execution for anomaly detection.
//!
//! A plan is a DAG of typed nodes. Each node names an operator type from an
//! [`OperatorRegistry`], binds upstream outputs to its inputs, and publishes
//! its own results under `node.output` keys.

pub mod config;
pub mod datasource;
pub mod detectors;
pub mod error;
pub mod executor;
pub mod operator;
pub mod operators;
pub mod plan;

pub use config::ExecutorConfig;
pub use datasource::{DataSource, DataSourceCache, InMemoryDataSource, PreparedQuery};
pub use detectors::{AnomalyDetector, DetectorRegistry};
pub use error::PipelineError;
pub use executor::{ExecutionSettings, NodeReport, PlanExecutor, Results, RunReport};
pub use operator::{
    DefaultOutputs, Operator, OperatorContext, OperatorDescriptor, OperatorRegistry,
    OperatorState, Outputs, RunContext,
};
pub use plan::{ContextKey, InputBinding, Plan, PlanNodeSpec};
