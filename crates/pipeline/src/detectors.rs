//! Anomaly detection algorithms pluggable into the `AnomalyDetector` operator.

mod percentage_change;
mod threshold;

use indexmap::IndexMap;
use serde::Deserialize;
use tripwire_core::{DataTable, DetectionInterval};

use crate::error::Result;
use crate::plan::PlanNodeSpec;

pub use percentage_change::{PercentageChangeDetector, Pattern};
pub use threshold::ThresholdDetector;

/// Tables handed to a detector.
pub struct DetectorInput<'a> {
    pub current: &'a DataTable,
    pub baseline: Option<&'a DataTable>,
    pub interval: DetectionInterval,
}

/// Verdict for one timestamp of the current table.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    pub time: i64,
    pub current: Option<f64>,
    pub baseline: Option<f64>,
    pub upper: Option<f64>,
    pub lower: Option<f64>,
    pub anomaly: bool,
}

pub trait AnomalyDetector: Send + Sync {
    /// One row per row of `input.current`, in time order.
    fn detect(&self, input: &DetectorInput<'_>) -> Result<Vec<DetectionRow>>;
}

pub type DetectorFactory = fn(&PlanNodeSpec) -> Result<Box<dyn AnomalyDetector>>;

/// Detector types by upper-case name (`THRESHOLD`, `PERCENTAGE_CHANGE`).
#[derive(Debug, Clone, Default)]
pub struct DetectorRegistry {
    factories: IndexMap<String, DetectorFactory>,
}

impl DetectorRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register("THRESHOLD", threshold::build);
        registry.register("PERCENTAGE_CHANGE", percentage_change::build);
        registry
    }

    pub fn register(&mut self, type_name: &str, factory: DetectorFactory) {
        self.factories.insert(type_name.to_ascii_uppercase(), factory);
    }

    pub fn get(&self, type_name: &str) -> Option<DetectorFactory> {
        self.factories.get(&type_name.to_ascii_uppercase()).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

/// Column names shared by the builtin detectors.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Columns {
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    #[serde(default = "default_metric")]
    pub metric: String,
}

fn default_timestamp() -> String {
    "timestamp".to_string()
}

fn default_metric() -> String {
    "value".to_string()
}

/// `(time, metric)` pairs of `table`, sorted by time.
pub(crate) fn series(table: &DataTable, columns: &Columns) -> Result<Vec<(i64, Option<f64>)>> {
    let times = table.longs(&columns.timestamp)?;
    let values = table.doubles(&columns.metric)?;
    let mut points: Vec<_> = times.into_iter().zip(values).collect();
    points.sort_by_key(|(t, _)| *t);
    Ok(points)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use tripwire_core::{ColumnType, DataTable, Value};

    pub fn table(points: &[(i64, Option<f64>)]) -> DataTable {
        DataTable::new(vec![
            ("timestamp".into(), ColumnType::Long),
            ("value".into(), ColumnType::Double),
        ])
        .with_rows(
            points
                .iter()
                .map(|(t, v)| vec![Value::Long(*t), v.map(Value::Double).unwrap_or(Value::Null)])
                .collect(),
        )
        .unwrap()
    }
}
