use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison used by a drill-down predicate.
///
/// Only `Eq`, `Neq` and `In` can be injected into a query; the others exist
/// so that callers can describe them and get a precise rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Eq,
    Neq,
    In,
    Lt,
    Lte,
    Gt,
    Gte,
    Like,
}

impl FilterOperator {
    pub fn is_injectable(&self) -> bool {
        matches!(self, FilterOperator::Eq | FilterOperator::Neq | FilterOperator::In)
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOperator::Eq => "EQ",
            FilterOperator::Neq => "NEQ",
            FilterOperator::In => "IN",
            FilterOperator::Lt => "LT",
            FilterOperator::Lte => "LTE",
            FilterOperator::Gt => "GT",
            FilterOperator::Gte => "GTE",
            FilterOperator::Like => "LIKE",
        };
        f.write_str(s)
    }
}

/// `column <op> value(s)`, optionally qualified by the dataset (table) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPredicate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    pub column: String,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl QueryPredicate {
    pub fn new(column: impl Into<String>, operator: FilterOperator, values: Vec<String>) -> Self {
        Self {
            dataset: None,
            column: column.into(),
            operator,
            values,
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Eq, vec![value.into()])
    }

    pub fn neq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column, FilterOperator::Neq, vec![value.into()])
    }

    pub fn in_list<I, S>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            column,
            FilterOperator::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }
}

impl fmt::Display for QueryPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(dataset) = &self.dataset {
            write!(f, "{dataset}.")?;
        }
        write!(f, "{} {} [{}]", self.column, self.operator, self.values.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_uppercase_operators() {
        let p: QueryPredicate = serde_json::from_str(
            r#"{"column": "browser", "operator": "IN", "values": ["chrome", "safari"]}"#,
        )
        .unwrap();
        assert_eq!(p, QueryPredicate::in_list("browser", ["chrome", "safari"]));
        assert!(p.operator.is_injectable());
        assert!(!FilterOperator::Like.is_injectable());
    }

    #[test]
    fn display_names_dataset_and_column() {
        let p = QueryPredicate::eq("browser", "chrome").with_dataset("pageviews");
        assert_eq!(p.to_string(), "pageviews.browser EQ [chrome]");
    }
}
