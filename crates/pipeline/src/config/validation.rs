use std::collections::HashSet;

use tripwire_sql::DialectConfig;

use super::loading::expression_builder;
use super::types::ExecutorConfig;
use crate::error::{PipelineError, Result};

impl ExecutorConfig {
    /// Validate the config: dialects translate, names are unique, builders exist.
    pub fn validate(&self) -> Result<()> {
        self.validate_default_dialect()?;
        self.validate_datasource_names()?;
        self.validate_datasources()?;
        Ok(())
    }

    fn validate_default_dialect(&self) -> Result<()> {
        DialectConfig::base(self.sql.default_dialect.as_str()).translate()?;
        Ok(())
    }

    fn validate_datasource_names(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.datasources {
            if !seen.insert(source.name.as_str()) {
                return Err(PipelineError::Config(format!(
                    "datasource '{}' is defined twice",
                    source.name
                )));
            }
        }
        Ok(())
    }

    fn validate_datasources(&self) -> Result<()> {
        for source in &self.datasources {
            if source.kind != "memory" {
                return Err(PipelineError::Config(format!(
                    "datasource '{}' has unsupported kind '{}', expected 'memory'",
                    source.name, source.kind
                )));
            }
            self.dialect_config(source).translate()?;
            expression_builder(source)?;

            let mut tables = HashSet::new();
            for table in &source.tables {
                if !tables.insert(table.name.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "datasource '{}' lists table '{}' twice",
                        source.name, table.name
                    )));
                }
            }
        }
        Ok(())
    }
}
