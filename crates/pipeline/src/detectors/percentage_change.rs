use std::collections::HashMap;

use serde::Deserialize;

use super::{series, AnomalyDetector, Columns, DetectionRow, DetectorInput};
use crate::error::{PipelineError, Result};
use crate::plan::PlanNodeSpec;

/// Direction of change that counts as anomalous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Pattern {
    Up,
    Down,
    #[default]
    UpOrDown,
}

impl Pattern {
    fn flags_up(self) -> bool {
        matches!(self, Pattern::Up | Pattern::UpOrDown)
    }

    fn flags_down(self) -> bool {
        matches!(self, Pattern::Down | Pattern::UpOrDown)
    }
}

/// Compares the current table against a baseline table aligned by
/// timestamp. A point is anomalous when it leaves
/// `baseline * (1 ± percentage_change)` in a direction the pattern allows.
#[derive(Debug, Clone)]
pub struct PercentageChangeDetector {
    columns: Columns,
    percentage_change: f64,
    pattern: Pattern,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(flatten)]
    columns: Columns,
    /// Fraction, `0.1` for 10%.
    percentage_change: f64,
    #[serde(default)]
    pattern: Pattern,
}

pub(super) fn build(node: &PlanNodeSpec) -> Result<Box<dyn AnomalyDetector>> {
    let params: Params = node.params()?;
    if !params.percentage_change.is_finite() || params.percentage_change < 0.0 {
        return Err(PipelineError::InvalidParams {
            node: node.name.clone(),
            reason: format!(
                "percentageChange must be a non-negative fraction, got {}",
                params.percentage_change
            ),
        });
    }
    Ok(Box::new(PercentageChangeDetector {
        columns: params.columns,
        percentage_change: params.percentage_change,
        pattern: params.pattern,
    }))
}

impl AnomalyDetector for PercentageChangeDetector {
    fn detect(&self, input: &DetectorInput<'_>) -> Result<Vec<DetectionRow>> {
        let baseline_table = input.baseline.ok_or_else(|| {
            PipelineError::Detector("PERCENTAGE_CHANGE needs a baseline input".to_string())
        })?;
        let baseline: HashMap<i64, f64> = series(baseline_table, &self.columns)?
            .into_iter()
            .filter_map(|(t, v)| v.map(|v| (t, v)))
            .collect();

        let rows = series(input.current, &self.columns)?
            .into_iter()
            .map(|(time, current)| {
                let base = baseline.get(&time).copied();
                let (upper, lower) = match base {
                    Some(b) => {
                        let delta = (b * self.percentage_change).abs();
                        (Some(b + delta), Some(b - delta))
                    }
                    None => (None, None),
                };
                let anomaly = match (current, upper, lower) {
                    (Some(v), Some(up), Some(low)) => {
                        (self.pattern.flags_up() && v > up) || (self.pattern.flags_down() && v < low)
                    }
                    _ => false,
                };
                DetectionRow {
                    time,
                    current,
                    baseline: base,
                    upper,
                    lower,
                    anomaly,
                }
            })
            .collect();
        Ok(rows)
    }
}
