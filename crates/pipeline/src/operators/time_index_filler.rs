use std::collections::HashMap;

use serde::Deserialize;
use tracing::debug;
use tripwire_core::{
    ColumnType, DataTable, DetectionInterval, Period, PipelineResult, PropertyKey, Value,
};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

/// How a missing value of a filled bucket is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillNullMethod {
    #[default]
    KeepNull,
    FillWithZeroes,
    FillForward,
    FillBackward,
}

/// Where one end of the generated time index comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeLimitInference {
    FromData,
    FromDetectionTime,
    FromDetectionTimeWithLookback,
}

/// Completes each input table with one row per granularity bucket.
///
/// Rows whose time is not on the bucket grid are dropped, missing buckets get
/// null metrics which the fill method then replaces. Replacement never crosses
/// the start of the detection interval, so history and detection window are
/// filled independently.
#[derive(Default)]
pub struct TimeIndexFillerOperator {
    state: OperatorState,
    params: Option<Params>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(default = "default_timestamp")]
    timestamp: String,
    #[serde(default)]
    monitoring_granularity: Option<Period>,
    #[serde(default)]
    fill_null_method: FillNullMethod,
    #[serde(default)]
    lookback: Option<Period>,
    #[serde(default)]
    min_time_inference: Option<TimeLimitInference>,
    #[serde(default)]
    max_time_inference: Option<TimeLimitInference>,
}

fn default_timestamp() -> String {
    "timestamp".to_string()
}

impl Operator for TimeIndexFillerOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        let params: Params = context.params()?;
        let wants_lookback = [params.min_time_inference, params.max_time_inference]
            .contains(&Some(TimeLimitInference::FromDetectionTimeWithLookback));
        if wants_lookback && params.lookback.map_or(true, |p| p.is_zero()) {
            return Err(PipelineError::InvalidParams {
                node: context.name().to_string(),
                reason: "FROM_DETECTION_TIME_WITH_LOOKBACK needs a non-zero lookback".into(),
            });
        }
        if params.monitoring_granularity.is_some_and(|g| g.is_zero()) {
            return Err(PipelineError::InvalidParams {
                node: context.name().to_string(),
                reason: "monitoringGranularity must not be zero".into(),
            });
        }
        self.params = Some(params);
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let params = self.params.as_ref().ok_or(PipelineError::NotInitialized)?;

        let mut filled = Vec::with_capacity(ctx.inputs.len());
        for property in ctx.inputs.keys() {
            let table = ctx.table_input(property)?;
            let out = fill(params, table, ctx.interval).map_err(|e| match e {
                PipelineError::InvalidParams { reason, .. } => PipelineError::InvalidParams {
                    node: ctx.name().to_string(),
                    reason,
                },
                other => other,
            })?;
            debug!(
                node = %ctx.name(),
                input = %property,
                raw_rows = table.row_count(),
                filled_rows = out.row_count(),
                "time index filled"
            );
            filled.push((property.clone(), out));
        }
        for (property, table) in filled {
            self.state.publish(property, PipelineResult::Table(table));
        }
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}

fn fill(params: &Params, raw: &DataTable, interval: DetectionInterval) -> Result<DataTable> {
    let invalid = |reason: String| PipelineError::InvalidParams {
        node: String::new(),
        reason,
    };

    let granularity = match params.monitoring_granularity {
        Some(g) => g,
        None => raw
            .properties
            .get(PropertyKey::Granularity.as_str())
            .and_then(|g| g.parse::<Period>().ok())
            .filter(|g| !g.is_zero())
            .ok_or_else(|| {
                invalid("monitoringGranularity is not set and the table has no granularity".into())
            })?,
    };
    let time_idx = raw.column_index(&params.timestamp)?;

    let mut by_time: HashMap<i64, &Vec<Value>> = HashMap::with_capacity(raw.row_count());
    for (r, row) in raw.rows.iter().enumerate() {
        let t = raw.long_at(r, &params.timestamp)?;
        by_time.entry(t).or_insert(row);
    }

    let (min, max) = time_limits(params, raw, interval, &by_time)?;
    let mut index = Vec::new();
    if min < max {
        let mut t = granularity.first_bucket_at_or_after(min)?;
        let last = granularity.last_bucket_before(max)?;
        while t <= last {
            index.push(t);
            t = granularity.add_to(t)?;
        }
    }

    let width = raw.columns.len();
    let mut out = DataTable {
        columns: raw.columns.clone(),
        column_types: raw.column_types.clone(),
        rows: Vec::with_capacity(index.len()),
        properties: raw.properties.clone(),
    };
    for t in &index {
        let row = match by_time.get(t) {
            Some(row) => (*row).clone(),
            None => {
                let mut row = vec![Value::Null; width];
                row[time_idx] = Value::Long(*t);
                row
            }
        };
        out.rows.push(row);
    }
    out.properties.insert(
        PropertyKey::Granularity.as_str().to_string(),
        granularity.to_string(),
    );

    let split = index.partition_point(|t| *t < interval.start);
    for column in (0..width).filter(|c| *c != time_idx) {
        let column_type = out.column_types[column];
        let (history, window) = out.rows.split_at_mut(split);
        replace_nulls(history, column, column_type, params.fill_null_method);
        replace_nulls(window, column, column_type, params.fill_null_method);
    }
    Ok(out)
}

fn time_limits(
    params: &Params,
    raw: &DataTable,
    interval: DetectionInterval,
    by_time: &HashMap<i64, &Vec<Value>>,
) -> Result<(i64, i64)> {
    let from_properties = || -> Option<(i64, i64)> {
        let min = raw.properties.get(PropertyKey::MinTimeMillis.as_str())?.parse().ok()?;
        let max = raw.properties.get(PropertyKey::MaxTimeMillis.as_str())?.parse().ok()?;
        Some((min, max))
    };
    if params.min_time_inference.is_none() && params.max_time_inference.is_none() {
        if let Some(limits) = from_properties() {
            return Ok(limits);
        }
    }

    let data_min = by_time.keys().min().copied();
    let data_max = by_time.keys().max().copied();
    let lookback = params.lookback.unwrap_or(Period::ZERO);

    let min = match params.min_time_inference.unwrap_or(TimeLimitInference::FromData) {
        TimeLimitInference::FromData => data_min.unwrap_or(interval.start),
        TimeLimitInference::FromDetectionTime => interval.start,
        TimeLimitInference::FromDetectionTimeWithLookback => lookback.subtract_from(interval.start)?,
    };
    let max = match params
        .max_time_inference
        .unwrap_or(TimeLimitInference::FromDetectionTime)
    {
        TimeLimitInference::FromData => data_max.map_or(interval.end, |t| t + 1),
        TimeLimitInference::FromDetectionTime
        | TimeLimitInference::FromDetectionTimeWithLookback => interval.end,
    };
    Ok((min, max))
}

fn replace_nulls(rows: &mut [Vec<Value>], column: usize, column_type: ColumnType, method: FillNullMethod) {
    match method {
        FillNullMethod::KeepNull => {}
        FillNullMethod::FillWithZeroes => {
            let zero = match column_type {
                ColumnType::Long => Value::Long(0),
                ColumnType::Double => Value::Double(0.0),
                ColumnType::String | ColumnType::Boolean => return,
            };
            for row in rows.iter_mut().filter(|r| r[column].is_null()) {
                row[column] = zero.clone();
            }
        }
        FillNullMethod::FillForward => carry(rows.iter_mut(), column),
        FillNullMethod::FillBackward => carry(rows.iter_mut().rev(), column),
    }
}

fn carry<'r>(rows: impl Iterator<Item = &'r mut Vec<Value>>, column: usize) {
    let mut last: Option<Value> = None;
    for row in rows {
        if row[column].is_null() {
            if let Some(v) = &last {
                row[column] = v.clone();
            }
        } else {
            last = Some(row[column].clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;
    use tripwire_core::CoreError;

    use super::*;
    use crate::detectors::fixtures::table;
    use crate::operator::RunContext;
    use crate::plan::PlanNodeSpec;

    fn run(node: PlanNodeSpec, input: DataTable, interval: (i64, i64)) -> Result<DataTable> {
        let mut inputs = IndexMap::new();
        inputs.insert("current".to_string(), PipelineResult::Table(input));
        let mut op = TimeIndexFillerOperator::default();
        op.init(OperatorContext {
            node,
            interval: DetectionInterval::new(interval.0, interval.1).unwrap(),
            inputs,
            run: Arc::new(RunContext::default()),
        })?;
        op.execute()?;
        match op.outputs().shift_remove("current") {
            Some(PipelineResult::Table(t)) => Ok(t),
            other => panic!("unexpected output {other:?}"),
        }
    }

    fn filler(method: &str) -> PlanNodeSpec {
        PlanNodeSpec::new("filler", "TimeIndexFiller")
            .with_param("monitoringGranularity", "PT1S")
            .with_param("fillNullMethod", method)
    }

    #[test]
    fn fills_missing_buckets_up_to_detection_end() {
        let input = table(&[(0, Some(1.0)), (2_000, Some(3.0))]);
        let out = run(filler("KEEP_NULL"), input, (0, 4_000)).unwrap();
        assert_eq!(out.longs("timestamp").unwrap(), vec![0, 1_000, 2_000, 3_000]);
        assert_eq!(
            out.doubles("value").unwrap(),
            vec![Some(1.0), None, Some(3.0), None]
        );
        assert_eq!(out.properties.get("granularity").map(String::as_str), Some("PT1S"));
    }

    #[test]
    fn off_grid_rows_are_dropped() {
        let input = table(&[(0, Some(1.0)), (1_500, Some(9.0))]);
        let out = run(filler("KEEP_NULL"), input, (0, 2_000)).unwrap();
        assert_eq!(out.doubles("value").unwrap(), vec![Some(1.0), None]);
    }

    #[test]
    fn zeroes_and_forward_fill() {
        let input = table(&[(0, Some(1.0)), (3_000, Some(4.0))]);
        let zeroes = run(filler("FILL_WITH_ZEROES"), input.clone(), (0, 4_000)).unwrap();
        assert_eq!(
            zeroes.doubles("value").unwrap(),
            vec![Some(1.0), Some(0.0), Some(0.0), Some(4.0)]
        );
        let forward = run(filler("FILL_FORWARD"), input, (0, 4_000)).unwrap();
        assert_eq!(
            forward.doubles("value").unwrap(),
            vec![Some(1.0), Some(1.0), Some(1.0), Some(4.0)]
        );
    }

    #[test]
    fn fill_does_not_cross_detection_start() {
        let input = table(&[(0, Some(1.0)), (3_000, Some(4.0))]);
        let node = filler("FILL_BACKWARD");
        let out = run(node, input, (2_000, 4_000)).unwrap();
        assert_eq!(
            out.doubles("value").unwrap(),
            vec![Some(1.0), None, Some(4.0), Some(4.0)]
        );
    }

    #[test]
    fn lookback_inference_moves_the_start() {
        let input = table(&[(5_000, Some(1.0))]);
        let node = filler("KEEP_NULL")
            .with_param("minTimeInference", "FROM_DETECTION_TIME_WITH_LOOKBACK")
            .with_param("lookback", "PT2S");
        let out = run(node, input, (5_000, 6_000)).unwrap();
        assert_eq!(out.longs("timestamp").unwrap(), vec![3_000, 4_000, 5_000]);
    }

    #[test]
    fn lookback_inference_requires_a_lookback() {
        let node = filler("KEEP_NULL").with_param("minTimeInference", "FROM_DETECTION_TIME_WITH_LOOKBACK");
        let err = run(node, table(&[]), (0, 1_000)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParams { .. }));
    }

    #[test]
    fn macro_bounds_are_used_when_present() {
        let mut input = table(&[(1_000, Some(1.0))]);
        input.properties.insert("minTimeMillis".into(), "0".into());
        input.properties.insert("maxTimeMillis".into(), "3000".into());
        let out = run(filler("KEEP_NULL"), input, (1_000, 2_000)).unwrap();
        assert_eq!(out.longs("timestamp").unwrap(), vec![0, 1_000, 2_000]);
    }

    #[test]
    fn missing_granularity_names_the_node() {
        let node = PlanNodeSpec::new("filler", "TimeIndexFiller");
        let err = run(node, table(&[(0, Some(1.0))]), (0, 1_000)).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParams { ref node, .. } if node == "filler"));
    }

    #[test]
    fn ragged_input_is_an_error() {
        let mut input = table(&[(0, Some(1.0))]);
        input.column_types.pop();
        input.rows.push(vec![Value::Long(2_000)]);
        let err = run(filler("FILL_WITH_ZEROES"), input, (0, 3_000)).unwrap_err();
        assert!(matches!(err, PipelineError::Core(CoreError::ColumnTypes { .. })));
    }
}
