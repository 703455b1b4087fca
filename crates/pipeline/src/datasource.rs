//! Datasource seam used by the `DataFetcher` operator.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::debug;
use tripwire_core::{DataTable, DatasetMetadata, Properties, PropertyKey};
use tripwire_sql::{DialectSettings, MacroFunction, SqlExpressionBuilder};

use crate::error::{PipelineError, Result};

/// A fully prepared query, ready to be sent to a datasource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedQuery {
    pub sql: String,
    pub table: Option<String>,
    /// Properties written by the macros while preparing `sql`.
    pub properties: Properties,
}

pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn dialect(&self) -> &DialectSettings;

    fn expression_builder(&self) -> &dyn SqlExpressionBuilder;

    /// Macros available to queries of this datasource, next to the builtins.
    fn macros(&self) -> Vec<Arc<dyn MacroFunction>> {
        Vec::new()
    }

    /// Metadata of a dataset served by this datasource.
    fn dataset(&self, _name: &str) -> Option<DatasetMetadata> {
        None
    }

    fn fetch(&self, query: &PreparedQuery) -> Result<DataTable>;
}

/// Datasources of one run, by name.
#[derive(Default, Clone)]
pub struct DataSourceCache {
    sources: IndexMap<String, Arc<dyn DataSource>>,
}

impl DataSourceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl std::fmt::Debug for DataSourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.sources.keys()).finish()
    }
}

// ── In-memory datasource ─────────────────────────────────────────────

/// Serves canned tables and records every query it receives.
///
/// When the prepared query carries a time column present in the table, rows
/// outside `[minTimeMillis, maxTimeMillis)` are dropped, mirroring what the
/// expanded time filter would do in a real database.
pub struct InMemoryDataSource {
    name: String,
    dialect: DialectSettings,
    builder: Box<dyn SqlExpressionBuilder>,
    tables: IndexMap<String, DataTable>,
    datasets: IndexMap<String, DatasetMetadata>,
    received: Mutex<Vec<String>>,
}

impl InMemoryDataSource {
    pub fn new(
        name: impl Into<String>,
        dialect: DialectSettings,
        builder: Box<dyn SqlExpressionBuilder>,
    ) -> Self {
        Self {
            name: name.into(),
            dialect,
            builder,
            tables: IndexMap::new(),
            datasets: IndexMap::new(),
            received: Mutex::new(Vec::new()),
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, table: DataTable) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetMetadata) -> Self {
        self.datasets.insert(dataset.name.clone(), dataset);
        self
    }

    /// SQL of every query fetched so far, oldest first.
    pub fn received_queries(&self) -> Vec<String> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn source_error(&self, reason: impl Into<String>) -> PipelineError {
        PipelineError::DataSource {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl DataSource for InMemoryDataSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn dialect(&self) -> &DialectSettings {
        &self.dialect
    }

    fn expression_builder(&self) -> &dyn SqlExpressionBuilder {
        self.builder.as_ref()
    }

    fn dataset(&self, name: &str) -> Option<DatasetMetadata> {
        self.datasets.get(name).cloned()
    }

    fn fetch(&self, query: &PreparedQuery) -> Result<DataTable> {
        self.received
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(query.sql.clone());

        let table_name = query
            .table
            .as_deref()
            .ok_or_else(|| self.source_error("query names no table"))?;
        let mut table = self
            .tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| self.source_error(format!("unknown table '{table_name}'")))?;

        if let Some((column, min, max)) = time_bounds(&query.properties) {
            if let Ok(idx) = table.column_index(column) {
                let before = table.row_count();
                table.rows.retain(|row| {
                    row.get(idx)
                        .and_then(|v| v.as_long())
                        .is_some_and(|t| t >= min && t < max)
                });
                debug!(
                    datasource = %self.name,
                    table = table_name,
                    kept = table.row_count(),
                    dropped = before - table.row_count(),
                    "time bounds applied"
                );
            }
        }
        Ok(table)
    }
}

fn time_bounds(properties: &Properties) -> Option<(&str, i64, i64)> {
    let column = properties.get(PropertyKey::TimeColumn.as_str())?;
    let min = properties.get(PropertyKey::MinTimeMillis.as_str())?.parse().ok()?;
    let max = properties.get(PropertyKey::MaxTimeMillis.as_str())?.parse().ok()?;
    Some((column.as_str(), min, max))
}
