use sqlparser::parser::ParserError;
use thiserror::Error;
use tripwire_core::{CoreError, FilterOperator};

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("failed to parse query: {source}")]
    Parse {
        #[source]
        source: ParserError,
    },

    #[error("unknown base dialect '{name}' (known: {known})")]
    UnknownBaseDialect { name: String, known: String },

    #[error("unknown grammar variant '{0}'")]
    UnknownGrammar(String),

    #[error("unknown conformance '{0}', expected 'default' or 'lenient'")]
    UnknownConformance(String),

    #[error("unsupported filter operator {operator} on column '{column}', only EQ, NEQ and IN can be injected")]
    UnsupportedFilterOperator {
        column: String,
        operator: FilterOperator,
    },

    #[error("invalid predicate on column '{column}': {reason}")]
    InvalidPredicate { column: String, reason: String },

    #[error("query has no WHERE clause to inject filters into")]
    MissingWhereClause,

    #[error("unsupported query shape: {0}")]
    UnsupportedQueryShape(String),

    #[error("macro '{name}' takes {expected} arguments, got {actual}")]
    MacroArity {
        name: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("macro '{name}': {reason}")]
    MacroArgument { name: String, reason: String },

    #[error("macro '{name}' expanded to invalid SQL '{expansion}': {source}")]
    InvalidMacroExpansion {
        name: String,
        expansion: String,
        #[source]
        source: ParserError,
    },

    #[error("expression builder: {0}")]
    ExpressionBuilder(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ParserError> for SqlError {
    fn from(source: ParserError) -> Self {
        SqlError::Parse { source }
    }
}

pub type SqlResult<T> = Result<T, SqlError>;
