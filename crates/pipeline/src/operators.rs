//! Builtin operator types.

mod anomaly_detector;
mod anomaly_labeler;
mod combiner;
mod data_fetcher;
mod echo;
mod join;
mod time_index_filler;

pub use anomaly_detector::{AnomalyDetectorOperator, ANOMALY_DETECTOR_OUTPUT};
pub use anomaly_labeler::AnomalyLabelerOperator;
pub use combiner::{CombinerOperator, COMBINER_OUTPUT};
pub use data_fetcher::{DataFetcherOperator, DATA_FETCHER_OUTPUT};
pub use echo::{EchoOperator, ECHO_OUTPUT};
pub use join::{JoinOperator, JOIN_OUTPUT};
pub use time_index_filler::{FillNullMethod, TimeIndexFillerOperator, TimeLimitInference};

use crate::operator::{DefaultOutputs, Operator, OperatorDescriptor, OperatorRegistry};

fn boxed<T: Operator + Default + 'static>() -> Box<dyn Operator> {
    Box::new(T::default())
}

pub(crate) fn register_builtins(registry: &mut OperatorRegistry) {
    let per_input = DefaultOutputs::PerInput { fallback: None };
    let builtins = [
        (
            "Echo",
            OperatorDescriptor::new(
                boxed::<EchoOperator>,
                DefaultOutputs::PerInput {
                    fallback: Some(ECHO_OUTPUT),
                },
            ),
        ),
        (
            "DataFetcher",
            OperatorDescriptor::new(
                boxed::<DataFetcherOperator>,
                DefaultOutputs::Fixed(&[DATA_FETCHER_OUTPUT]),
            ),
        ),
        (
            "AnomalyDetector",
            OperatorDescriptor::new(
                boxed::<AnomalyDetectorOperator>,
                DefaultOutputs::Fixed(&[ANOMALY_DETECTOR_OUTPUT]),
            ),
        ),
        (
            "TimeIndexFiller",
            OperatorDescriptor::new(boxed::<TimeIndexFillerOperator>, per_input),
        ),
        (
            "Combiner",
            OperatorDescriptor::new(
                boxed::<CombinerOperator>,
                DefaultOutputs::Fixed(&[COMBINER_OUTPUT]),
            ),
        ),
        (
            "Join",
            OperatorDescriptor::new(boxed::<JoinOperator>, DefaultOutputs::Fixed(&[JOIN_OUTPUT])),
        ),
        (
            "AnomalyLabeler",
            OperatorDescriptor::new(boxed::<AnomalyLabelerOperator>, per_input),
        ),
    ];
    for (name, descriptor) in builtins {
        registry.register(name, descriptor);
    }
}
