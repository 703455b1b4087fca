pub mod anomaly;
pub mod config;
pub mod dataset;
pub mod error;
pub mod interval;
pub mod period;
pub mod predicate;
pub mod properties;
pub mod result;
pub mod table;

pub use anomaly::*;
pub use config::Config;
pub use dataset::DatasetMetadata;
pub use error::*;
pub use interval::DetectionInterval;
pub use period::Period;
pub use predicate::*;
pub use properties::{Properties, PropertyKey};
pub use result::*;
pub use table::*;
