use std::sync::Arc;

use serde_json::json;
use tripwire_core::{ColumnType, DataTable, DetectionInterval, PipelineResult, Value};
use tripwire_sql::{AnsiExpressionBuilder, DialectSettings};

use super::*;
use crate::datasource::InMemoryDataSource;
use crate::operator::{DefaultOutputs, Operator, OperatorState};
use crate::operators::{ANOMALY_DETECTOR_OUTPUT, DATA_FETCHER_OUTPUT};

struct FailingOperator;

impl Operator for FailingOperator {
    fn init(&mut self, _context: OperatorContext) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        Err(PipelineError::Detector("boom".into()))
    }

    fn outputs(&mut self) -> Outputs {
        Outputs::new()
    }
}

/// Declares an output but never publishes it.
#[derive(Default)]
struct SilentOperator {
    state: OperatorState,
}

impl Operator for SilentOperator {
    fn init(&mut self, context: OperatorContext) -> Result<()> {
        self.state.init(context);
        Ok(())
    }

    fn execute(&mut self) -> Result<()> {
        Ok(())
    }

    fn outputs(&mut self) -> Outputs {
        self.state.take_outputs()
    }
}

fn registry() -> OperatorRegistry {
    let mut registry = OperatorRegistry::builtin();
    registry.register(
        "Fail",
        OperatorDescriptor::new(|| Box::new(FailingOperator), DefaultOutputs::Fixed(&["output"])),
    );
    registry.register(
        "Silent",
        OperatorDescriptor::new(
            || Box::new(SilentOperator::default()),
            DefaultOutputs::Fixed(&["output"]),
        ),
    );
    registry
}

fn interval() -> DetectionInterval {
    DetectionInterval::new(0, 10_000).unwrap()
}

fn compile(nodes: Vec<PlanNodeSpec>) -> Result<PlanExecutor> {
    PlanExecutor::compile_with(nodes, interval(), Arc::new(RunContext::default()), &registry())
}

fn echo(name: &str, value: i64) -> PlanNodeSpec {
    PlanNodeSpec::new(name, "Echo").with_param("echo", value)
}

// ── Compilation ──────────────────────────────────────────────────────

#[test]
fn duplicate_names_are_rejected() {
    let err = compile(vec![echo("a", 1), echo("a", 2)]).err().unwrap();
    assert!(matches!(err, PipelineError::DuplicateNode(ref n) if n == "a"));
}

#[test]
fn unknown_type_is_rejected() {
    let err = compile(vec![PlanNodeSpec::new("a", "Nope")]).err().unwrap();
    assert!(matches!(err, PipelineError::UnknownOperatorType { ref type_name, .. } if type_name == "Nope"));
}

#[test]
fn dangling_source_is_rejected() {
    let node = PlanNodeSpec::new("b", "Echo").with_input("x", "ghost", "output");
    let err = compile(vec![node]).err().unwrap();
    assert!(matches!(err, PipelineError::UnknownSourceNode { ref source_node, .. } if source_node == "ghost"));
}

#[test]
fn undeclared_source_output_is_rejected() {
    let b = PlanNodeSpec::new("b", "Echo").with_input("x", "a", "currentData");
    let err = compile(vec![echo("a", 1), b]).err().unwrap();
    assert!(matches!(err, PipelineError::UnknownSourceOutput { ref output, .. } if output == "currentData"));
}

#[test]
fn duplicate_target_property_is_rejected() {
    let c = PlanNodeSpec::new("c", "Echo")
        .with_input("x", "a", "output")
        .with_input("x", "b", "output");
    let err = compile(vec![echo("a", 1), echo("b", 2), c]).err().unwrap();
    assert!(matches!(err, PipelineError::DuplicateInput { .. }));
}

#[test]
fn cycles_are_rejected() {
    let a = PlanNodeSpec::new("a", "Echo")
        .with_input("x", "b", "x")
        .with_outputs(["x"]);
    let b = PlanNodeSpec::new("b", "Echo")
        .with_input("x", "a", "x")
        .with_outputs(["x"]);
    let err = compile(vec![a, b]).err().unwrap();
    match err {
        PipelineError::CircularDependency(msg) => assert!(msg.contains("a -> b")),
        other => panic!("expected a cycle error, got {other}"),
    }
}

#[test]
fn order_breaks_ties_by_declaration() {
    let sink = PlanNodeSpec::new("sink", "Echo")
        .with_input("first", "z", "output")
        .with_input("second", "y", "output");
    let exec = compile(vec![sink, echo("z", 1), echo("y", 2)]).unwrap();
    assert_eq!(exec.order(), vec!["z", "y", "sink"]);
    assert_eq!(exec.levels(), vec![vec!["z", "y"], vec!["sink"]]);
}

#[test]
fn default_outputs_are_filled_in() {
    let exec = compile(vec![
        PlanNodeSpec::new("fetch", "DataFetcher"),
        echo("e", 1),
    ])
    .unwrap();
    let keys: Vec<String> = exec.declared_outputs().iter().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["fetch.currentData", "e.output"]);
}

// ── Execution ────────────────────────────────────────────────────────

#[test]
fn results_are_keyed_by_node_and_output() {
    let pass = PlanNodeSpec::new("pass", "Echo").with_input("value", "source", "output");
    let mut exec = compile(vec![echo("source", 7), pass]).unwrap();
    let results = exec.execute().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(
        results[&ContextKey::new("pass", "value")],
        PipelineResult::Echo(json!(7))
    );
    assert_eq!(exec.report().nodes.len(), 2);
    assert!(exec.report().failed_node.is_none());
}

#[test]
fn failure_keeps_partial_results_and_names_the_node() {
    let after = PlanNodeSpec::new("after", "Echo").with_input("x", "broken", "output");
    let mut exec = compile(vec![echo("before", 1), PlanNodeSpec::new("broken", "Fail"), after]).unwrap();
    let err = exec.execute().unwrap_err();
    assert_eq!(err.failed_node(), Some("broken"));
    assert_eq!(exec.report().failed_node.as_deref(), Some("broken"));

    let keys: Vec<String> = exec.results().keys().map(ToString::to_string).collect();
    assert_eq!(keys, vec!["before.output"]);
}

#[test]
fn missing_declared_output_fails_the_node() {
    let mut exec = compile(vec![PlanNodeSpec::new("quiet", "Silent")]).unwrap();
    let err = exec.execute().unwrap_err();
    match err {
        PipelineError::ExecutionFailed { node, source } => {
            assert_eq!(node, "quiet");
            assert!(matches!(*source, PipelineError::MissingOutput { .. }));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn a_plan_runs_once() {
    let mut exec = compile(vec![echo("a", 1)]).unwrap();
    exec.execute().unwrap();
    assert!(matches!(exec.execute().unwrap_err(), PipelineError::AlreadyExecuted));
}

#[test]
fn parallel_mode_matches_sequential() {
    let plan = || {
        vec![
            echo("a", 1),
            echo("b", 2),
            PlanNodeSpec::new("both", "Echo")
                .with_input("left", "a", "output")
                .with_input("right", "b", "output"),
        ]
    };
    let mut sequential = compile(plan()).unwrap();
    let expected = sequential.execute().unwrap().clone();

    let mut parallel = compile(plan()).unwrap().with_settings(ExecutionSettings {
        parallel: true,
        max_parallelism: 2,
    });
    let actual = parallel.execute().unwrap();
    assert_eq!(actual.len(), expected.len());
    for (key, value) in &expected {
        assert_eq!(actual.get(key), Some(value), "{key}");
    }
    assert!(parallel.report().parallel);
}

#[test]
fn parallel_failure_keeps_sibling_results() {
    let mut exec = compile(vec![echo("ok", 1), PlanNodeSpec::new("broken", "Fail")])
        .unwrap()
        .with_settings(ExecutionSettings {
            parallel: true,
            max_parallelism: 0,
        });
    assert!(exec.execute().is_err());
    assert!(exec.results().contains_key(&ContextKey::new("ok", "output")));
}

// ── End to end ───────────────────────────────────────────────────────

fn pageviews() -> DataTable {
    let rows = [(0, 10.0), (1_000, 11.0), (3_000, 95.0), (4_000, 12.0), (20_000, 500.0)]
        .iter()
        .map(|(t, v)| vec![Value::Long(*t), Value::Double(*v)])
        .collect();
    DataTable::new(vec![
        ("ts".into(), ColumnType::Long),
        ("views".into(), ColumnType::Double),
    ])
    .with_rows(rows)
    .unwrap()
}

#[test]
fn fetch_fill_detect_label() {
    let source = Arc::new(
        InMemoryDataSource::new(
            "pageviews_db",
            DialectSettings::default(),
            Box::new(AnsiExpressionBuilder::default()),
        )
        .with_table("pageviews", pageviews()),
    );
    let run = RunContext::default().with_datasource(source.clone());

    let plan: crate::plan::Plan = serde_json::from_value(json!({
        "nodes": [
            {
                "name": "fetch",
                "type": "DataFetcher",
                "params": {
                    "dataSource": "pageviews_db",
                    "query": "SELECT __timeGroup(ts, 'EPOCH_MILLIS', 'PT1S') AS ts, views FROM pageviews WHERE __timeFilter(ts) AND country = 'FR'",
                    "predicates": [{ "column": "browser", "operator": "IN", "values": ["chrome", "safari"] }]
                }
            },
            {
                "name": "filler",
                "type": "TimeIndexFiller",
                "params": { "timestamp": "ts", "fillNullMethod": "FILL_WITH_ZEROES" },
                "inputs": [{ "targetProperty": "current", "sourceNode": "fetch", "sourceOutputKey": "currentData" }]
            },
            {
                "name": "detector",
                "type": "AnomalyDetector",
                "params": { "type": "THRESHOLD", "timestamp": "ts", "metric": "views", "min": 5, "max": 50 },
                "inputs": [{ "targetProperty": "current", "sourceNode": "filler", "sourceOutputKey": "current" }]
            },
            {
                "name": "labeler",
                "type": "AnomalyLabeler",
                "params": { "minAbsoluteChange": 1 },
                "inputs": [{ "targetProperty": "views", "sourceNode": "detector", "sourceOutputKey": "output_AnomalyDetectorResult" }]
            }
        ]
    }))
    .unwrap();

    let mut exec = PlanExecutor::compile(plan.nodes, interval(), Arc::new(run)).unwrap();
    let results = exec.execute().unwrap();

    let fetched = results[&ContextKey::new("fetch", DATA_FETCHER_OUTPUT)].as_table().unwrap();
    assert_eq!(fetched.row_count(), 4);
    assert_eq!(fetched.properties.get("granularity").map(String::as_str), Some("PT1S"));

    let sql = &source.received_queries()[0];
    assert!(sql.contains("(ts >= 0 AND ts < 10000)"), "{sql}");
    assert!(sql.ends_with("AND (browser IN ('chrome', 'safari'))"), "{sql}");

    let detection = results[&ContextKey::new("detector", ANOMALY_DETECTOR_OUTPUT)]
        .as_detection()
        .unwrap();
    let starts: Vec<i64> = detection.anomalies.iter().map(|a| a.start_millis).collect();
    // 2s and 5s..9s were filled with zeroes, 3s is above max
    assert_eq!(starts, vec![2_000, 3_000, 5_000, 6_000, 7_000, 8_000, 9_000]);

    let labeled = results[&ContextKey::new("labeler", "views")].as_detection().unwrap();
    assert_eq!(labeled.anomalies.len(), detection.anomalies.len());
    assert!(labeled.anomalies.iter().all(|a| !a.is_ignored()));
}

#[test]
fn macro_errors_fail_the_fetch_node() {
    let source = Arc::new(InMemoryDataSource::new(
        "db",
        DialectSettings::default(),
        Box::new(AnsiExpressionBuilder::default()),
    ));
    let run = RunContext::default().with_datasource(source);
    let fetch = PlanNodeSpec::new("fetch", "DataFetcher")
        .with_param("dataSource", "db")
        .with_param("query", "SELECT * FROM t WHERE __timeGroup(ts)");
    let mut exec = PlanExecutor::compile(vec![fetch], interval(), Arc::new(run)).unwrap();
    let err = exec.execute().unwrap_err();
    assert_eq!(err.failed_node(), Some("fetch"));
}

#[test]
fn unknown_datasource_fails_at_init() {
    let fetch = PlanNodeSpec::new("fetch", "DataFetcher")
        .with_param("dataSource", "nowhere")
        .with_param("query", "SELECT 1");
    let mut exec = compile(vec![fetch]).unwrap();
    match exec.execute().unwrap_err() {
        PipelineError::ExecutionFailed { source, .. } => {
            assert!(matches!(*source, PipelineError::UnknownDataSource { .. }))
        }
        other => panic!("unexpected error {other}"),
    }
}
