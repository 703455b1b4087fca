use serde::{Deserialize, Serialize};

use crate::anomaly::{Anomaly, TimeSeries};
use crate::table::DataTable;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub time_series: Option<TimeSeries>,
}

/// What an operator publishes under one output key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum PipelineResult {
    Table(DataTable),
    Detection(DetectionResult),
    Echo(serde_json::Value),
}

impl PipelineResult {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineResult::Table(_) => "table",
            PipelineResult::Detection(_) => "detection",
            PipelineResult::Echo(_) => "echo",
        }
    }

    pub fn as_table(&self) -> Option<&DataTable> {
        match self {
            PipelineResult::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_detection(&self) -> Option<&DetectionResult> {
        match self {
            PipelineResult::Detection(d) => Some(d),
            _ => None,
        }
    }

    pub fn anomaly_count(&self) -> usize {
        self.as_detection().map(|d| d.anomalies.len()).unwrap_or(0)
    }
}
