//! Datasource-agnostic SQL templating.
//!
//! Queries are written with macro calls (`__timeFilter`, `__timeGroup`) and
//! resolved against a concrete dialect by parsing them into an AST,
//! rewriting the AST, and rendering it back to SQL. Drill-down predicates
//! are injected the same way.

pub mod dialect;
pub mod error;
pub mod expression;
pub mod filters;
pub mod macros;
mod shape;

pub use dialect::{Casing, DialectConfig, DialectSettings, Grammar, ParserSettings, RenderSettings};
pub use error::{SqlError, SqlResult};
pub use expression::{AnsiExpressionBuilder, PinotExpressionBuilder, SqlExpressionBuilder};
pub use filters::FiltersEngine;
pub use macros::{
    MacroEngine, MacroExpansionContext, MacroFunction, MacroRegistry, PreparedRequest,
    TIME_FILTER_MACRO, TIME_GROUP_MACRO,
};
