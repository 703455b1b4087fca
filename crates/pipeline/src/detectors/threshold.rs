use serde::Deserialize;

use super::{series, AnomalyDetector, Columns, DetectionRow, DetectorInput};
use crate::error::{PipelineError, Result};
use crate::plan::PlanNodeSpec;

/// Flags values outside `[min, max]`. Either bound may be left out.
#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    columns: Columns,
    min: Option<f64>,
    max: Option<f64>,
}

#[derive(Deserialize)]
struct Params {
    #[serde(flatten)]
    columns: Columns,
    #[serde(default)]
    min: Option<f64>,
    #[serde(default)]
    max: Option<f64>,
}

pub(super) fn build(node: &PlanNodeSpec) -> Result<Box<dyn AnomalyDetector>> {
    let params: Params = node.params()?;
    if let (Some(min), Some(max)) = (params.min, params.max) {
        if min > max {
            return Err(PipelineError::InvalidParams {
                node: node.name.clone(),
                reason: format!("threshold min {min} is above max {max}"),
            });
        }
    }
    Ok(Box::new(ThresholdDetector {
        columns: params.columns,
        min: params.min,
        max: params.max,
    }))
}

impl AnomalyDetector for ThresholdDetector {
    fn detect(&self, input: &DetectorInput<'_>) -> Result<Vec<DetectionRow>> {
        let rows = series(input.current, &self.columns)?
            .into_iter()
            .map(|(time, current)| {
                let anomaly = current.is_some_and(|v| {
                    self.min.is_some_and(|min| v < min) || self.max.is_some_and(|max| v > max)
                });
                DetectionRow {
                    time,
                    current,
                    baseline: None,
                    upper: self.max,
                    lower: self.min,
                    anomaly,
                }
            })
            .collect();
        Ok(rows)
    }
}
