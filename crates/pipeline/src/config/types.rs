use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tripwire_core::DatasetMetadata;
use tripwire_sql::DialectConfig;

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration of a plan run.
///
/// Parsed from `tripwire.toml` with support for environment variable overrides.
/// Defines how plans execute, SQL engine defaults, and the datasources plans
/// may fetch from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub executor: ExecutorSection,

    #[serde(default)]
    pub sql: SqlSection,

    #[serde(default)]
    pub datasources: Vec<DataSourceConfig>,
}

// ── Section configs ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSection {
    /// Run the nodes of one dependency level concurrently.
    #[serde(default)]
    pub parallel: bool,

    /// Thread pool size in parallel mode (0 = rayon default).
    #[serde(default)]
    pub max_parallelism: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlSection {
    /// Fail a fetch when a macro expands to unparseable SQL.
    #[serde(default)]
    pub strict_macros: bool,

    /// Base dialect for datasources without a `dialect` table.
    #[serde(default = "default_dialect")]
    pub default_dialect: String,

    /// Parser nesting limit for datasources that do not set one.
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,
}

fn default_dialect() -> String {
    "ansi".into()
}

fn default_recursion_limit() -> usize {
    50
}

impl Default for SqlSection {
    fn default() -> Self {
        Self {
            strict_macros: false,
            default_dialect: default_dialect(),
            recursion_limit: default_recursion_limit(),
        }
    }
}

/// One datasource plans can name in `DataFetcher` params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,

    /// Only `memory` is built in: tables are loaded from JSON files.
    #[serde(default = "default_kind")]
    pub kind: String,

    #[serde(default)]
    pub dialect: Option<DialectConfig>,

    /// Expression builder: `ansi` or `pinot`.
    #[serde(default = "default_builder")]
    pub builder: String,

    /// Storage format of time columns, for the `ansi` builder.
    #[serde(default)]
    pub time_format: Option<String>,

    #[serde(default)]
    pub tables: Vec<TableSource>,

    #[serde(default)]
    pub datasets: Vec<DatasetMetadata>,
}

fn default_kind() -> String {
    "memory".into()
}

fn default_builder() -> String {
    "ansi".into()
}

/// A table served by a `memory` datasource, stored as a JSON `DataTable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSource {
    pub name: String,
    /// Relative paths resolve against the config file's directory.
    pub path: PathBuf,
}
