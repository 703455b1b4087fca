//! Executor configuration, parsed from `tripwire.toml`.

mod loading;
mod types;
mod validation;


pub use types::{DataSourceConfig, ExecutorConfig, ExecutorSection, SqlSection, TableSource};
