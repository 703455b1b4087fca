use serde::Deserialize;
use serde_json::Value;
use tripwire_core::PipelineResult;

use crate::error::Result;
use crate::operator::{Operator, OperatorContext, OperatorState, Outputs};

pub const ECHO_OUTPUT: &str = "output";

/// Republishes every input under its target property, or the `echo` param
/// when the node has no inputs.
#[derive(Default)]
pub struct EchoOperator {
    state: OperatorState,
}

#[derive(Deserialize)]
struct Params {
    #[serde(default)]
    echo: Value,
}

impl Operator for EchoOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        context.params::<Params>()?;
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        let published: Vec<(String, PipelineResult)> = {
            let ctx = self.state.context()?;
            if ctx.inputs.is_empty() {
                let params: Params = ctx.params()?;
                vec![(ECHO_OUTPUT.to_string(), PipelineResult::Echo(params.echo))]
            } else {
                ctx.inputs
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            }
        };
        for (key, result) in published {
            self.state.publish(key, result);
        }
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}
