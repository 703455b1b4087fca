use serde::Deserialize;
use tracing::info;
use tripwire_core::{
    Anomaly, DataTable, DetectionResult, Period, PipelineResult, PropertyKey, TimeSeries,
};

use crate::detectors::{AnomalyDetector, DetectionRow, DetectorInput};
use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

pub const ANOMALY_DETECTOR_OUTPUT: &str = "output_AnomalyDetectorResult";

const CURRENT_INPUT: &str = "current";
const BASELINE_INPUT: &str = "baseline";

/// Runs one registered detector on the `current` (and optional `baseline`)
/// table and turns flagged rows inside the detection interval into anomalies.
#[derive(Default)]
pub struct AnomalyDetectorOperator {
    state: OperatorState,
    params: Option<Params>,
    detector: Option<Box<dyn AnomalyDetector>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(rename = "type")]
    detector_type: String,
    /// Falls back to the `granularity` property of the current table.
    #[serde(default)]
    monitoring_granularity: Option<Period>,
    #[serde(default, rename = "anomaly.metric")]
    metric: Option<String>,
    #[serde(default, rename = "anomaly.dataset")]
    dataset: Option<String>,
    #[serde(default, rename = "anomaly.source")]
    source: Option<String>,
}

impl Operator for AnomalyDetectorOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        let params: Params = context.params()?;
        let factory = context
            .run
            .detectors
            .get(&params.detector_type)
            .ok_or_else(|| PipelineError::UnknownDetector {
                node: context.name().to_string(),
                type_name: params.detector_type.clone(),
            })?;
        self.detector = Some(factory(&context.node)?);
        self.params = Some(params);
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let (Some(params), Some(detector)) = (self.params.as_ref(), self.detector.as_ref()) else {
            return Err(PipelineError::NotInitialized);
        };

        let current = ctx.table_input(CURRENT_INPUT)?;
        let baseline = if ctx.inputs.contains_key(BASELINE_INPUT) {
            Some(ctx.table_input(BASELINE_INPUT)?)
        } else {
            None
        };
        let granularity = granularity(params, current).ok_or_else(|| {
            PipelineError::InvalidParams {
                node: ctx.name().to_string(),
                reason: "monitoringGranularity is not set and the current table has no granularity"
                    .to_string(),
            }
        })?;

        let rows = detector.detect(&DetectorInput {
            current,
            baseline,
            interval: ctx.interval,
        })?;
        let rows: Vec<DetectionRow> = rows
            .into_iter()
            .filter(|r| ctx.interval.contains(r.time))
            .collect();

        let mut anomalies = Vec::new();
        for (i, row) in rows.iter().enumerate().filter(|(_, r)| r.anomaly) {
            let end = match rows.get(i + 1) {
                Some(next) => next.time,
                None => granularity.add_to(row.time)?,
            };
            let mut anomaly = Anomaly::new(row.time, end);
            anomaly.current = row.current;
            anomaly.baseline = row.baseline;
            anomaly.metric = params.metric.clone();
            anomaly.dataset = params.dataset.clone();
            anomaly.source = params.source.clone();
            anomalies.push(anomaly);
        }
        info!(
            node = %ctx.name(),
            detector = %params.detector_type,
            points = rows.len(),
            anomalies = anomalies.len(),
            "detection finished"
        );

        let result = DetectionResult {
            anomalies,
            time_series: Some(time_series(&rows)),
        };
        self.state
            .publish(ANOMALY_DETECTOR_OUTPUT, PipelineResult::Detection(result));
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}

fn granularity(params: &Params, table: &DataTable) -> Option<Period> {
    params.monitoring_granularity.or_else(|| {
        table
            .properties
            .get(PropertyKey::Granularity.as_str())
            .and_then(|g| g.parse().ok())
    })
}

fn time_series(rows: &[DetectionRow]) -> TimeSeries {
    let bound = |pick: fn(&DetectionRow) -> Option<f64>| -> Option<Vec<f64>> {
        rows.iter().map(pick).collect()
    };
    TimeSeries {
        timestamps: rows.iter().map(|r| r.time).collect(),
        current: rows.iter().map(|r| r.current).collect(),
        baseline: rows.iter().map(|r| r.baseline).collect(),
        upper_bound: bound(|r| r.upper).filter(|b| !b.is_empty()),
        lower_bound: bound(|r| r.lower).filter(|b| !b.is_empty()),
    }
}
