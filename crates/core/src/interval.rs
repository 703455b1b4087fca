use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::period::Period;

/// Half-open `[start, end)` window, in epoch milliseconds, evaluated by one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectionInterval {
    pub start: i64,
    pub end: i64,
}

impl DetectionInterval {
    pub fn new(start: i64, end: i64) -> CoreResult<Self> {
        if start > end {
            return Err(CoreError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn from_datetimes(start: DateTime<Utc>, end: DateTime<Utc>) -> CoreResult<Self> {
        Self::new(start.timestamp_millis(), end.timestamp_millis())
    }

    pub fn contains(&self, millis: i64) -> bool {
        self.start <= millis && millis < self.end
    }

    pub fn duration_millis(&self) -> i64 {
        self.end - self.start
    }

    /// Both bounds moved back by their own lookback.
    pub fn with_lookback(&self, from_start: &Period, from_end: &Period) -> CoreResult<Self> {
        Self::new(
            from_start.subtract_from(self.start)?,
            from_end.subtract_from(self.end)?,
        )
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.start).single()
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.end).single()
    }
}

impl fmt::Display for DetectionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start_datetime(), self.end_datetime()) {
            (Some(s), Some(e)) => write!(f, "[{}, {})", s.to_rfc3339(), e.to_rfc3339()),
            _ => write!(f, "[{}, {})", self.start, self.end),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(DetectionInterval::new(10, 5).is_err());
        assert!(DetectionInterval::new(5, 5).is_ok());
    }

    #[test]
    fn contains_is_half_open() {
        let interval = DetectionInterval::new(1_000, 2_000).unwrap();
        assert!(interval.contains(1_000));
        assert!(interval.contains(1_999));
        assert!(!interval.contains(2_000));
    }

    #[test]
    fn lookback_moves_each_bound() {
        let day = 86_400_000;
        let interval = DetectionInterval::new(10 * day, 20 * day).unwrap();
        let shifted = interval
            .with_lookback(&Period::days(7), &Period::days(1))
            .unwrap();
        assert_eq!(shifted.start, 3 * day);
        assert_eq!(shifted.end, 19 * day);
    }
}
