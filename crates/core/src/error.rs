use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("invalid ISO-8601 period '{input}': {reason}")]
    InvalidPeriod { input: String, reason: String },

    #[error("invalid detection interval: start {start} is after end {end}")]
    InvalidInterval { start: i64, end: i64 },

    #[error("timestamp out of range: {0}")]
    TimeOutOfRange(i64),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("column '{column}' row {row}: expected {expected}")]
    TypeMismatch {
        column: String,
        row: usize,
        expected: &'static str,
    },

    #[error("row has {actual} cells, table has {expected} columns")]
    RowWidth { expected: usize, actual: usize },

    #[error("table has {columns} columns but {types} column types")]
    ColumnTypes { columns: usize, types: usize },

    #[error("{0}")]
    Other(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
