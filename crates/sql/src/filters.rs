//! Conjunction of drill-down predicates into an already prepared query.
//!
//! The query must be a single SELECT, optionally wrapped by one ORDER BY
//! and/or one WITH, and must already have a WHERE clause. Joins and deeper
//! nesting are not handled specially: predicates land on the top-level
//! SELECT whatever its FROM clause contains.

use sqlparser::ast::{BinaryOperator, Expr};
use tracing::debug;
use tripwire_core::QueryPredicate;

use crate::dialect::DialectSettings;
use crate::error::{SqlError, SqlResult};
use crate::expression::SqlExpressionBuilder;
use crate::shape;

pub struct FiltersEngine<'a> {
    dialect: &'a DialectSettings,
    expression_builder: &'a dyn SqlExpressionBuilder,
}

impl<'a> FiltersEngine<'a> {
    pub fn new(
        dialect: &'a DialectSettings,
        expression_builder: &'a dyn SqlExpressionBuilder,
    ) -> Self {
        Self {
            dialect,
            expression_builder,
        }
    }

    /// Return `query` with every predicate AND-ed onto its WHERE clause.
    ///
    /// Operators are checked before anything is parsed; on any error the
    /// caller's query is left as it was.
    pub fn prepare_query(&self, query: &str, predicates: &[QueryPredicate]) -> SqlResult<String> {
        if let Some(bad) = predicates.iter().find(|p| !p.operator.is_injectable()) {
            return Err(SqlError::UnsupportedFilterOperator {
                column: bad.column.clone(),
                operator: bad.operator,
            });
        }
        let conditions = predicates
            .iter()
            .map(|p| self.predicate_expr(p))
            .collect::<SqlResult<Vec<_>>>()?;

        let mut statement = self.dialect.parser.parse_statement(query)?;
        if conditions.is_empty() {
            return Ok(statement.to_string());
        }

        let select = shape::top_level_select_mut(shape::query_mut(&mut statement)?)?;
        let existing = select.selection.take().ok_or(SqlError::MissingWhereClause)?;
        let conjunction = conditions
            .into_iter()
            .fold(protect_disjunction(existing), |acc, condition| Expr::BinaryOp {
                left: Box::new(acc),
                op: BinaryOperator::And,
                right: Box::new(Expr::Nested(Box::new(condition))),
            });
        select.selection = Some(conjunction);

        debug!(predicates = predicates.len(), "filters injected");
        Ok(statement.to_string())
    }

    fn predicate_expr(&self, predicate: &QueryPredicate) -> SqlResult<Expr> {
        let render = &self.dialect.render;
        let normalized = QueryPredicate {
            dataset: predicate
                .dataset
                .as_deref()
                .map(|d| render.normalize_identifier(d)),
            column: render.normalize_identifier(&predicate.column),
            ..predicate.clone()
        };
        self.expression_builder.predicate_expr(&normalized)
    }
}

/// `a OR b` must stay one operand once AND-ed with more conditions.
fn protect_disjunction(expr: Expr) -> Expr {
    match expr {
        Expr::BinaryOp {
            op: BinaryOperator::Or | BinaryOperator::Xor,
            ..
        } => Expr::Nested(Box::new(expr)),
        other => other,
    }
}
