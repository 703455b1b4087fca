use tracing::debug;
use tripwire_core::{DetectionResult, PipelineResult};

use crate::error::Result;
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

pub const COMBINER_OUTPUT: &str = "output_CombinerResult";

/// Concatenates the anomalies of every detection input, ordered by start
/// time. Per-input time series are not carried over.
#[derive(Default)]
pub struct CombinerOperator {
    state: OperatorState,
}

impl Operator for CombinerOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let ctx = self.state.context()?;
        let mut anomalies = Vec::new();
        for property in ctx.inputs.keys() {
            anomalies.extend(ctx.detection_input(property)?.anomalies.iter().cloned());
        }
        anomalies.sort_by_key(|a| a.start_millis);
        debug!(node = %ctx.name(), inputs = ctx.inputs.len(), anomalies = anomalies.len(), "combined");

        self.state.publish(
            COMBINER_OUTPUT,
            PipelineResult::Detection(DetectionResult {
                anomalies,
                time_series: None,
            }),
        );
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;
    use tripwire_core::{Anomaly, DetectionInterval};

    use super::*;
    use crate::operator::RunContext;
    use crate::plan::PlanNodeSpec;

    fn detection(starts: &[i64]) -> PipelineResult {
        PipelineResult::Detection(DetectionResult {
            anomalies: starts.iter().map(|s| Anomaly::new(*s, s + 1)).collect(),
            time_series: None,
        })
    }

    #[test]
    fn merges_and_sorts_by_start() {
        let mut inputs = IndexMap::new();
        inputs.insert("a".to_string(), detection(&[5, 1]));
        inputs.insert("b".to_string(), detection(&[3]));
        let mut op = CombinerOperator::default();
        op.init(OperatorContext {
            node: PlanNodeSpec::new("combiner", "Combiner"),
            interval: DetectionInterval::new(0, 10).unwrap(),
            inputs,
            run: Arc::new(RunContext::default()),
        })
        .unwrap();
        op.execute().unwrap();
        let out = op.outputs();
        let starts: Vec<i64> = out[COMBINER_OUTPUT]
            .as_detection()
            .unwrap()
            .anomalies
            .iter()
            .map(|a| a.start_millis)
            .collect();
        assert_eq!(starts, vec![1, 3, 5]);
    }
}
