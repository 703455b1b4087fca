use serde::Deserialize;
use tracing::debug;
use tripwire_core::{Anomaly, AnomalyLabel, PipelineResult};

use crate::error::{PipelineError, Result};
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

/// Post-processor marking anomalies whose change is too small to matter.
///
/// An anomaly with both a current and a baseline value gets an
/// `ignore = true` label when its absolute change is below
/// `minAbsoluteChange` or its relative change below `minRelativeChange`.
/// Each detection input is republished under its own target property.
#[derive(Default)]
pub struct AnomalyLabelerOperator {
    state: OperatorState,
    params: Option<Params>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Params {
    #[serde(default)]
    min_absolute_change: Option<f64>,
    /// Fraction of the baseline, `0.05` for 5%.
    #[serde(default)]
    min_relative_change: Option<f64>,
    #[serde(default = "default_label")]
    label_name: String,
}

fn default_label() -> String {
    "below threshold".to_string()
}

impl Params {
    fn is_minor(&self, anomaly: &Anomaly) -> bool {
        let (Some(current), Some(baseline)) = (anomaly.current, anomaly.baseline) else {
            return false;
        };
        let absolute = (current - baseline).abs();
        let below_absolute = self.min_absolute_change.is_some_and(|min| absolute < min);
        let below_relative = self.min_relative_change.is_some_and(|min| {
            baseline != 0.0 && absolute / baseline.abs() < min
        });
        below_absolute || below_relative
    }
}

impl Operator for AnomalyLabelerOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        let params: Params = context.params()?;
        if params.min_absolute_change.is_none() && params.min_relative_change.is_none() {
            return Err(PipelineError::InvalidParams {
                node: context.name().to_string(),
                reason: "set minAbsoluteChange and/or minRelativeChange".into(),
            });
        }
        self.params = Some(params);
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let params = self.params.as_ref().ok_or(PipelineError::NotInitialized)?;

        let mut labeled = Vec::with_capacity(ctx.inputs.len());
        for property in ctx.inputs.keys() {
            let mut detection = ctx.detection_input(property)?.clone();
            let mut ignored = 0usize;
            for anomaly in detection.anomalies.iter_mut().filter(|a| params.is_minor(a)) {
                anomaly.labels.push(AnomalyLabel {
                    name: params.label_name.clone(),
                    ignore: true,
                });
                ignored += 1;
            }
            debug!(node = %ctx.name(), input = %property, ignored, "anomalies labeled");
            labeled.push((property.clone(), detection));
        }
        for (property, detection) in labeled {
            self.state.publish(property, PipelineResult::Detection(detection));
        }
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}
