use thiserror::Error;
use tripwire_core::CoreError;
use tripwire_sql::SqlError;

/// Errors raised while compiling or running a plan.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Plan configuration ──────────────────────────────────────────
    #[error("duplicate node name '{0}'")]
    DuplicateNode(String),

    #[error("node '{node}' has unknown type '{type_name}'")]
    UnknownOperatorType { node: String, type_name: String },

    #[error("node '{node}' references unknown source node '{source_node}'")]
    UnknownSourceNode { node: String, source_node: String },

    #[error("node '{node}' references output '{output}' that node '{source_node}' does not declare")]
    UnknownSourceOutput {
        node: String,
        source_node: String,
        output: String,
    },

    #[error("node '{node}' binds input property '{property}' twice")]
    DuplicateInput { node: String, property: String },

    #[error("circular plan dependency: {0}")]
    CircularDependency(String),

    #[error("node '{node}' has invalid params: {reason}")]
    InvalidParams { node: String, reason: String },

    // ── Execution ───────────────────────────────────────────────────
    #[error("node '{node}' is missing input '{property}'")]
    MissingInput { node: String, property: String },

    #[error("node '{node}' input '{property}' should be a {expected} result, got {actual}")]
    InputType {
        node: String,
        property: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("node '{node}' did not produce declared output '{output}'")]
    MissingOutput { node: String, output: String },

    #[error("node '{node}' uses unknown datasource '{name}'")]
    UnknownDataSource { node: String, name: String },

    #[error("node '{node}' uses unknown detector type '{type_name}'")]
    UnknownDetector { node: String, type_name: String },

    #[error("detector error: {0}")]
    Detector(String),

    #[error("datasource '{name}': {reason}")]
    DataSource { name: String, reason: String },

    #[error("node '{node}' failed: {source}")]
    ExecutionFailed {
        node: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("operator used before init")]
    NotInitialized,

    #[error("plan was already executed; compile it again for a new run")]
    AlreadyExecuted,

    #[error("thread pool error: {0}")]
    ThreadPool(String),

    // ── Wrapped ─────────────────────────────────────────────────────
    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Name of the node whose execution failed, if any.
    pub fn failed_node(&self) -> Option<&str> {
        match self {
            PipelineError::ExecutionFailed { node, .. } => Some(node),
            _ => None,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
