use tripwire_core::Period;

use super::pinot::is_utc_like;
use super::time_format::{EpochUnit, TimeFormat};
use super::SqlExpressionBuilder;
use crate::error::{SqlError, SqlResult};

/// Portable builder using only arithmetic and `FLOOR`.
///
/// Time filters work on epoch and date-string columns. Grouping works for
/// epoch columns and fixed-length granularities in UTC.
#[derive(Debug, Clone)]
pub struct AnsiExpressionBuilder {
    time_format: TimeFormat,
}

impl Default for AnsiExpressionBuilder {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::Epoch {
                unit: EpochUnit::Milliseconds,
            },
        }
    }
}

impl AnsiExpressionBuilder {
    /// Builder whose time filters compare against a column stored in `format`.
    pub fn for_format(format: &str) -> SqlResult<Self> {
        Ok(Self {
            time_format: TimeFormat::parse(format)?,
        })
    }

    fn millis_expr(column: &str, format: &TimeFormat) -> SqlResult<String> {
        match format {
            TimeFormat::Epoch { unit } if unit.millis() == 1 => Ok(column.to_string()),
            TimeFormat::Epoch { unit } => Ok(format!("{column} * {}", unit.millis())),
            TimeFormat::SimpleDate { pattern } => Err(SqlError::ExpressionBuilder(format!(
                "ANSI datasources cannot bucket date strings ('{pattern}'), store time as epoch"
            ))),
        }
    }
}

impl SqlExpressionBuilder for AnsiExpressionBuilder {
    fn time_filter_expression(
        &self,
        column: &str,
        min_millis: i64,
        max_millis: i64,
    ) -> SqlResult<String> {
        self.time_filter_expression_in_format(column, min_millis, max_millis, &self.time_format)
    }

    fn time_group_expression(
        &self,
        column: &str,
        format: &str,
        granularity: &Period,
        timezone: Option<&str>,
    ) -> SqlResult<String> {
        if let Some(tz) = timezone.filter(|tz| !is_utc_like(tz)) {
            return Err(SqlError::ExpressionBuilder(format!(
                "ANSI datasources only bucket in UTC, got timezone '{tz}'"
            )));
        }
        let millis = Self::millis_expr(column, &TimeFormat::parse(format)?)?;
        if granularity.is_zero() {
            return Ok(millis);
        }
        let bucket = granularity.fixed_millis().ok_or_else(|| {
            SqlError::ExpressionBuilder(format!(
                "ANSI datasources cannot bucket by calendar granularity {granularity}"
            ))
        })?;
        Ok(format!("FLOOR({millis} / {bucket}) * {bucket}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_filter_is_half_open() {
        let builder = AnsiExpressionBuilder::default();
        assert_eq!(
            builder.time_filter_expression("ts", 1_000_000, 2_000_000).unwrap(),
            "ts >= 1000000 AND ts < 2000000"
        );
    }

    #[test]
    fn time_filter_converts_to_column_unit() {
        let builder = AnsiExpressionBuilder::for_format("EPOCH").unwrap();
        assert_eq!(
            builder.time_filter_expression("ts", 1_000_000, 2_000_000).unwrap(),
            "ts >= 1000 AND ts < 2000"
        );
    }

    #[test]
    fn time_filter_rounds_partial_units_up() {
        let builder = AnsiExpressionBuilder::for_format("EPOCH").unwrap();
        assert_eq!(
            builder.time_filter_expression("ts", 1_500, 2_500).unwrap(),
            "ts >= 2 AND ts < 3"
        );
    }

    #[test]
    fn time_filter_compares_date_strings() {
        let builder = AnsiExpressionBuilder::for_format("SIMPLE_DATE_FORMAT:yyyyMMdd").unwrap();
        // 2024-01-01T00:00:00Z to 2024-01-03T00:00:00Z
        assert_eq!(
            builder
                .time_filter_expression("day", 1_704_067_200_000, 1_704_240_000_000)
                .unwrap(),
            "day >= '20240101' AND day < '20240103'"
        );
    }

    #[test]
    fn time_group_floors_to_bucket() {
        let builder = AnsiExpressionBuilder::default();
        let expr = builder
            .time_group_expression("ts", "EPOCH", &Period::days(1), None)
            .unwrap();
        assert_eq!(expr, "FLOOR(ts * 1000 / 86400000) * 86400000");
    }

    #[test]
    fn time_group_rejects_what_it_cannot_express() {
        let builder = AnsiExpressionBuilder::default();
        let month = Period::parse("P1M").unwrap();
        assert!(builder
            .time_group_expression("ts", "EPOCH_MILLIS", &month, None)
            .is_err());
        assert!(builder
            .time_group_expression("ts", "yyyyMMdd", &Period::days(1), None)
            .is_err());
        assert!(builder
            .time_group_expression("ts", "EPOCH_MILLIS", &Period::days(1), Some("Europe/Paris"))
            .is_err());
    }
}
