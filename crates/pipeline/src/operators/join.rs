use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;
use tripwire_core::{DataTable, PipelineResult, Value};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

pub const JOIN_OUTPUT: &str = "output_JoinResult";

/// Inner join of the `left` and `right` input tables on one key column.
///
/// Output columns are the left columns followed by the right ones minus the
/// key; a right column whose name is already taken is prefixed with `right_`.
#[derive(Default)]
pub struct JoinOperator {
    state: OperatorState,
    params: Option<Params>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    key: String,
    #[serde(default = "default_left")]
    left: String,
    #[serde(default = "default_right")]
    right: String,
}

fn default_left() -> String {
    "left".to_string()
}

fn default_right() -> String {
    "right".to_string()
}

impl Operator for JoinOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        let params: Params = context.params()?;
        if params.left == params.right {
            return Err(PipelineError::InvalidParams {
                node: context.name().to_string(),
                reason: format!("left and right both read input '{}'", params.left),
            });
        }
        self.params = Some(params);
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let params = self.params.as_ref().ok_or(PipelineError::NotInitialized)?;
        let left = ctx.table_input(&params.left)?;
        let right = ctx.table_input(&params.right)?;
        let joined = inner_join(left, right, &params.key)?;
        debug!(
            node = %ctx.name(),
            left = left.row_count(),
            right = right.row_count(),
            joined = joined.row_count(),
            "joined"
        );
        self.state.publish(JOIN_OUTPUT, PipelineResult::Table(joined));
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}

fn join_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn inner_join(left: &DataTable, right: &DataTable, key: &str) -> Result<DataTable> {
    let left_key = left.column_index(key)?;
    let right_key = right.column_index(key)?;

    let mut columns: Vec<(String, _)> = left
        .columns
        .iter()
        .cloned()
        .zip(left.column_types.iter().copied())
        .collect();
    let right_columns: Vec<usize> = (0..right.columns.len()).filter(|c| *c != right_key).collect();
    for &c in &right_columns {
        let name = &right.columns[c];
        let name = if left.has_column(name) {
            format!("right_{name}")
        } else {
            name.clone()
        };
        columns.push((name, right.column_types[c]));
    }

    let mut right_rows: HashMap<String, Vec<&Vec<Value>>> = HashMap::new();
    for row in &right.rows {
        if let Some(k) = row.get(right_key).and_then(join_key) {
            right_rows.entry(k).or_default().push(row);
        }
    }

    let mut out = DataTable::new(columns);
    out.properties = left.properties.clone();
    for row in &left.rows {
        let Some(matches) = row.get(left_key).and_then(join_key).and_then(|k| right_rows.get(&k))
        else {
            continue;
        };
        for other in matches {
            let mut joined = row.clone();
            joined.extend(right_columns.iter().map(|&c| other[c].clone()));
            out.push_row(joined)?;
        }
    }
    Ok(out)
}
