//! Well-known keys of the properties map that macros fill in and that
//! travels with a fetched table.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    TimeColumn,
    MinTimeMillis,
    MaxTimeMillis,
    Granularity,
}

impl PropertyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKey::TimeColumn => "timeColumn",
            PropertyKey::MinTimeMillis => "minTimeMillis",
            PropertyKey::MaxTimeMillis => "maxTimeMillis",
            PropertyKey::Granularity => "granularity",
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered string properties, in insertion order.
pub type Properties = indexmap::IndexMap<String, String>;
