use serde::Deserialize;
use tracing::{debug, info};
use tripwire_core::{DatasetMetadata, PipelineResult, QueryPredicate};
use tripwire_sql::{FiltersEngine, MacroEngine};

use crate::datasource::PreparedQuery;
use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

pub const DATA_FETCHER_OUTPUT: &str = "currentData";

/// Prepares a templated query for one datasource and fetches its table.
#[derive(Default)]
pub struct DataFetcherOperator {
    state: OperatorState,
    params: Option<Params>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    data_source: String,
    query: String,
    /// Dataset whose time column format and timezone the macros render with.
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    predicates: Vec<QueryPredicate>,
}

impl Operator for DataFetcherOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        let params: Params = context.params()?;
        if context.run.datasources.get(&params.data_source).is_none() {
            return Err(PipelineError::UnknownDataSource {
                node: context.name().to_string(),
                name: params.data_source,
            });
        }
        self.params = Some(params);
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let params = self.params.as_ref().ok_or(PipelineError::NotInitialized)?;
        let source = ctx.run.datasources.get(&params.data_source).ok_or_else(|| {
            PipelineError::UnknownDataSource {
                node: ctx.name().to_string(),
                name: params.data_source.clone(),
            }
        })?;

        let dataset = params
            .table_name
            .as_deref()
            .map(|name| source.dataset(name).unwrap_or_else(|| DatasetMetadata::named(name)));

        let dialect = source.dialect();
        let builder = source.expression_builder();
        let mut engine = MacroEngine::new(dialect, builder, ctx.interval)
            .strict(ctx.run.strict_macros);
        if let Some(dataset) = dataset.as_ref() {
            engine = engine.with_dataset(dataset);
        }
        for function in source.macros() {
            engine = engine.with_macro(function);
        }
        let prepared = engine.prepare_request(&params.query)?;

        let sql = if params.predicates.is_empty() {
            prepared.sql
        } else {
            FiltersEngine::new(dialect, builder).prepare_query(&prepared.sql, &params.predicates)?
        };
        debug!(node = %ctx.name(), datasource = %source.name(), sql = %sql, "query prepared");

        let query = PreparedQuery {
            sql,
            table: prepared.table,
            properties: prepared.properties,
        };
        let mut table = source.fetch(&query)?;
        for (key, value) in query.properties {
            table.properties.insert(key, value);
        }
        info!(
            node = %ctx.name(),
            datasource = %source.name(),
            rows = table.row_count(),
            "data fetched"
        );

        self.state.publish(DATA_FETCHER_OUTPUT, PipelineResult::Table(table));
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}
