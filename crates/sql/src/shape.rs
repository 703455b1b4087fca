//! Locating the top-level SELECT of a query.
//!
//! A query may wrap its SELECT in at most one ORDER BY and one WITH. In the
//! parsed tree both live on the outer `Query`; a parenthesized body adds
//! one more level that is unwrapped too, as long as the WITH clauses do not
//! stack.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor};

use crate::error::{SqlError, SqlResult};

pub(crate) fn query_mut(statement: &mut Statement) -> SqlResult<&mut Query> {
    match statement {
        Statement::Query(query) => Ok(query.as_mut()),
        other => Err(SqlError::UnsupportedQueryShape(format!(
            "expected a SELECT query, found '{}'",
            statement_kind(other)
        ))),
    }
}

pub(crate) fn top_level_select_mut(query: &mut Query) -> SqlResult<&mut Select> {
    let outer_has_with = query.with.is_some();
    match query.body.as_mut() {
        SetExpr::Select(select) => Ok(select.as_mut()),
        SetExpr::Query(inner) => {
            if outer_has_with && inner.with.is_some() {
                return Err(SqlError::UnsupportedQueryShape(
                    "nested WITH clauses are not supported".into(),
                ));
            }
            match inner.body.as_mut() {
                SetExpr::Select(select) => Ok(select.as_mut()),
                _ => Err(SqlError::UnsupportedQueryShape(
                    "more than one level of query nesting".into(),
                )),
            }
        }
        SetExpr::SetOperation { .. } => Err(SqlError::UnsupportedQueryShape(
            "set operations (UNION, INTERSECT, EXCEPT) are not supported".into(),
        )),
        other => Err(SqlError::UnsupportedQueryShape(format!(
            "unsupported query body '{other}'"
        ))),
    }
}

/// Name of the first table in the FROM clause of the top-level SELECT.
pub(crate) fn first_table_name(statement: &mut Statement) -> Option<String> {
    let query = query_mut(statement).ok()?;
    let select = top_level_select_mut(query).ok()?;
    select
        .from
        .first()
        .and_then(|table| match &table.relation {
            TableFactor::Table { name, .. } => Some(name.to_string()),
            _ => None,
        })
}

fn statement_kind(statement: &Statement) -> String {
    let text = statement.to_string();
    text.split_whitespace()
        .next()
        .unwrap_or_default()
        .to_uppercase()
}
