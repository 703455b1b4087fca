use std::path::Path;
use std::sync::Arc;

use tracing::info;
use tripwire_core::config::EngineConfig;
use tripwire_core::DataTable;
use tripwire_sql::{
    AnsiExpressionBuilder, DialectConfig, PinotExpressionBuilder, SqlExpressionBuilder,
};

use super::types::{DataSourceConfig, ExecutorConfig, ExecutorSection, SqlSection};
use crate::datasource::InMemoryDataSource;
use crate::error::{PipelineError, Result};
use crate::executor::ExecutionSettings;
use crate::operator::RunContext;

impl ExecutorConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Config without datasources, from the environment-driven engine settings.
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            executor: ExecutorSection {
                parallel: engine.parallel,
                max_parallelism: engine.max_parallelism,
            },
            sql: SqlSection {
                strict_macros: engine.strict_macros,
                default_dialect: engine.default_dialect.clone(),
                recursion_limit: engine.recursion_limit,
            },
            datasources: Vec::new(),
        }
    }

    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            parallel: self.executor.parallel,
            max_parallelism: self.executor.max_parallelism,
        }
    }

    /// Dialect of `source`, with the `[sql]` defaults filled in.
    pub fn dialect_config(&self, source: &DataSourceConfig) -> DialectConfig {
        let mut dialect = source
            .dialect
            .clone()
            .unwrap_or_else(|| DialectConfig::base(self.sql.default_dialect.as_str()));
        dialect.recursion_limit.get_or_insert(self.sql.recursion_limit);
        dialect
    }

    /// Instantiate every datasource. Table paths resolve against `base_dir`.
    pub fn build_run_context(&self, base_dir: &Path) -> Result<RunContext> {
        let mut run = RunContext::default().with_strict_macros(self.sql.strict_macros);
        for source in &self.datasources {
            let dialect = self.dialect_config(source).translate()?;
            let mut memory = InMemoryDataSource::new(
                source.name.as_str(),
                dialect,
                expression_builder(source)?,
            );
            for table in &source.tables {
                let path = base_dir.join(&table.path);
                let content = std::fs::read_to_string(&path).map_err(|e| PipelineError::DataSource {
                    name: source.name.clone(),
                    reason: format!("cannot read table '{}' from {}: {e}", table.name, path.display()),
                })?;
                let data: DataTable = serde_json::from_str(&content).map_err(|e| PipelineError::DataSource {
                    name: source.name.clone(),
                    reason: format!("invalid table '{}' in {}: {e}", table.name, path.display()),
                })?;
                memory = memory.with_table(table.name.as_str(), data);
            }
            for dataset in &source.datasets {
                memory = memory.with_dataset(dataset.clone());
            }
            info!(
                datasource = %source.name,
                tables = source.tables.len(),
                builder = %source.builder,
                "datasource ready"
            );
            run = run.with_datasource(Arc::new(memory));
        }
        Ok(run)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// The keys are the ones `tripwire_core::Config` reads:
    /// - `TRIPWIRE_PARALLEL` -> `executor.parallel`
    /// - `TRIPWIRE_MAX_PARALLELISM` -> `executor.max_parallelism`
    /// - `TRIPWIRE_STRICT_MACROS` -> `sql.strict_macros`
    /// - `TRIPWIRE_DEFAULT_DIALECT` -> `sql.default_dialect`
    /// - `TRIPWIRE_RECURSION_LIMIT` -> `sql.recursion_limit`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_bool("TRIPWIRE_PARALLEL") {
            self.executor.parallel = v;
        }
        if let Some(v) = env_parse("TRIPWIRE_MAX_PARALLELISM") {
            self.executor.max_parallelism = v;
        }
        if let Some(v) = env_bool("TRIPWIRE_STRICT_MACROS") {
            self.sql.strict_macros = v;
        }
        if let Ok(v) = std::env::var("TRIPWIRE_DEFAULT_DIALECT") {
            self.sql.default_dialect = v;
        }
        if let Some(v) = env_parse("TRIPWIRE_RECURSION_LIMIT") {
            self.sql.recursion_limit = v;
        }
    }
}

pub(super) fn expression_builder(source: &DataSourceConfig) -> Result<Box<dyn SqlExpressionBuilder>> {
    match source.builder.as_str() {
        "ansi" => Ok(match &source.time_format {
            Some(format) => Box::new(AnsiExpressionBuilder::for_format(format)?),
            None => Box::new(AnsiExpressionBuilder::default()),
        }),
        "pinot" => Ok(match &source.time_format {
            Some(format) => Box::new(PinotExpressionBuilder::for_format(format)?),
            None => Box::new(PinotExpressionBuilder::default()),
        }),
        other => Err(PipelineError::Config(format!(
            "datasource '{}' has unknown builder '{other}', expected 'ansi' or 'pinot'",
            source.name
        ))),
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
