//! Datasource-specific rendering of the fragments macros and filters need.

mod ansi;
mod pinot;
mod time_format;

use sqlparser::ast::{BinaryOperator, Expr, Ident, Value};
use tripwire_core::{FilterOperator, Period, QueryPredicate};

use crate::error::{SqlError, SqlResult};

pub use ansi::AnsiExpressionBuilder;
pub use pinot::PinotExpressionBuilder;
pub use time_format::{EpochUnit, TimeFormat};

/// One implementation per concrete datasource.
pub trait SqlExpressionBuilder: Send + Sync {
    /// Half-open bound `column in [min_millis, max_millis)`.
    fn time_filter_expression(&self, column: &str, min_millis: i64, max_millis: i64)
        -> SqlResult<String>;

    /// Half-open bound on a column stored in `format`, whatever format the
    /// builder was configured with.
    fn time_filter_expression_in_format(
        &self,
        column: &str,
        min_millis: i64,
        max_millis: i64,
        format: &TimeFormat,
    ) -> SqlResult<String> {
        Ok(format!(
            "{column} >= {} AND {column} < {}",
            format.filter_bound(min_millis)?,
            format.filter_bound(max_millis)?
        ))
    }

    /// Round `column` down to its `granularity` bucket and return it as
    /// epoch milliseconds. `format` describes how the column stores time.
    fn time_group_expression(
        &self,
        column: &str,
        format: &str,
        granularity: &Period,
        timezone: Option<&str>,
    ) -> SqlResult<String>;

    /// AST node for one injected predicate.
    fn predicate_expr(&self, predicate: &QueryPredicate) -> SqlResult<Expr> {
        default_predicate_expr(predicate)
    }
}

/// `dataset.column = 'v'`, `column <> 'v'` or `column IN ('a', 'b')`.
///
/// Values are always rendered as string literals.
pub fn default_predicate_expr(predicate: &QueryPredicate) -> SqlResult<Expr> {
    let invalid = |reason: &str| SqlError::InvalidPredicate {
        column: predicate.column.clone(),
        reason: reason.to_string(),
    };

    let column = match &predicate.dataset {
        Some(dataset) => Expr::CompoundIdentifier(vec![
            Ident::new(dataset.as_str()),
            Ident::new(predicate.column.as_str()),
        ]),
        None => Expr::Identifier(Ident::new(predicate.column.as_str())),
    };
    let literal = |v: &String| Expr::Value(Value::SingleQuotedString(v.clone()));

    match predicate.operator {
        FilterOperator::Eq | FilterOperator::Neq => {
            let [value] = predicate.values.as_slice() else {
                return Err(invalid(&format!(
                    "{} takes exactly one value, got {}",
                    predicate.operator,
                    predicate.values.len()
                )));
            };
            let op = if predicate.operator == FilterOperator::Eq {
                BinaryOperator::Eq
            } else {
                BinaryOperator::NotEq
            };
            Ok(Expr::BinaryOp {
                left: Box::new(column),
                op,
                right: Box::new(literal(value)),
            })
        }
        FilterOperator::In => {
            if predicate.values.is_empty() {
                return Err(invalid("IN needs at least one value"));
            }
            Ok(Expr::InList {
                expr: Box::new(column),
                list: predicate.values.iter().map(literal).collect(),
                negated: false,
            })
        }
        other => Err(SqlError::UnsupportedFilterOperator {
            column: predicate.column.clone(),
            operator: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_each_supported_operator() {
        let eq = default_predicate_expr(&QueryPredicate::eq("browser", "chrome")).unwrap();
        assert_eq!(eq.to_string(), "browser = 'chrome'");

        let neq = default_predicate_expr(&QueryPredicate::neq("country", "US")).unwrap();
        assert_eq!(neq.to_string(), "country <> 'US'");

        let within = default_predicate_expr(
            &QueryPredicate::in_list("browser", ["chrome", "safari"]).with_dataset("pageviews"),
        )
        .unwrap();
        assert_eq!(within.to_string(), "pageviews.browser IN ('chrome', 'safari')");
    }

    #[test]
    fn numeric_values_stay_string_literals() {
        let expr = default_predicate_expr(&QueryPredicate::eq("code", "42")).unwrap();
        assert_eq!(expr.to_string(), "code = '42'");
    }

    #[test]
    fn rejects_bad_value_counts() {
        let p = QueryPredicate::new("a", FilterOperator::Eq, vec!["x".into(), "y".into()]);
        assert!(matches!(
            default_predicate_expr(&p),
            Err(SqlError::InvalidPredicate { .. })
        ));
        let p = QueryPredicate::in_list("a", Vec::<String>::new());
        assert!(default_predicate_expr(&p).is_err());
    }
}
