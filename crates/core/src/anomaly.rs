use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyLabel {
    pub name: String,
    /// When set, notification layers drop the anomaly.
    #[serde(default)]
    pub ignore: bool,
}

/// One detected anomaly over `[start_millis, end_millis)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub start_millis: i64,
    pub end_millis: i64,
    #[serde(default)]
    pub current: Option<f64>,
    #[serde(default)]
    pub baseline: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<AnomalyLabel>,
}

impl Anomaly {
    pub fn new(start_millis: i64, end_millis: i64) -> Self {
        Self {
            start_millis,
            end_millis,
            current: None,
            baseline: None,
            metric: None,
            dataset: None,
            source: None,
            labels: Vec::new(),
        }
    }

    pub fn is_ignored(&self) -> bool {
        self.labels.iter().any(|l| l.ignore)
    }
}

/// Per-timestamp view of what a detector compared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub timestamps: Vec<i64>,
    pub current: Vec<Option<f64>>,
    pub baseline: Vec<Option<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<Vec<f64>>,
}

impl TimeSeries {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}
