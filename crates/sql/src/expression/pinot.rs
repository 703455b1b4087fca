use tripwire_core::Period;

use super::time_format::{EpochUnit, TimeFormat};
use super::SqlExpressionBuilder;
use crate::error::{SqlError, SqlResult};

const UTC_LIKE_TIMEZONES: &[&str] = &["UTC", "GMT", "Etc/UTC", "Etc/GMT", "Z", "+00:00"];

pub(super) fn is_utc_like(timezone: &str) -> bool {
    UTC_LIKE_TIMEZONES
        .iter()
        .any(|tz| tz.eq_ignore_ascii_case(timezone))
}

fn escape_literal(s: &str) -> String {
    s.replace('\'', "''")
}

/// Builder for Apache Pinot, bucketing with `DATETIMECONVERT`/`DATETRUNC`.
#[derive(Debug, Clone)]
pub struct PinotExpressionBuilder {
    time_format: TimeFormat,
}

impl Default for PinotExpressionBuilder {
    fn default() -> Self {
        Self {
            time_format: TimeFormat::Epoch {
                unit: EpochUnit::Milliseconds,
            },
        }
    }
}

impl PinotExpressionBuilder {
    /// Builder whose time filters compare against a column stored in `format`.
    pub fn for_format(format: &str) -> SqlResult<Self> {
        Ok(Self {
            time_format: TimeFormat::parse(format)?,
        })
    }

    /// `N:UNIT` for `DATETIMECONVERT`. Pinot cannot round to weeks,
    /// months or years, and mixed periods have no single unit.
    fn granularity_spec(granularity: &Period) -> SqlResult<String> {
        if granularity.years > 0 || granularity.months > 0 || granularity.weeks > 0 {
            return Err(SqlError::ExpressionBuilder(format!(
                "Pinot cannot round to calendar granularity {granularity}"
            )));
        }
        let units = [
            (granularity.days, "DAYS"),
            (granularity.hours, "HOURS"),
            (granularity.minutes, "MINUTES"),
            (granularity.seconds, "SECONDS"),
            (granularity.millis, "MILLISECONDS"),
        ];
        let mut set = units.iter().filter(|(n, _)| *n > 0);
        match (set.next(), set.next()) {
            (Some((n, unit)), None) => Ok(format!("{n}:{unit}")),
            (None, _) => Err(SqlError::ExpressionBuilder(
                "cannot bucket by an empty granularity".into(),
            )),
            (Some(_), Some(_)) => Err(SqlError::ExpressionBuilder(format!(
                "Pinot granularity must use a single unit, got {granularity}"
            ))),
        }
    }

    /// `DATETRUNC` unit for periods of exactly one unit.
    fn date_trunc_unit(granularity: &Period) -> Option<&'static str> {
        let one = |p: Period| p == *granularity;
        let candidates = [
            (Period { years: 1, ..Period::ZERO }, "year"),
            (Period { months: 1, ..Period::ZERO }, "month"),
            (Period { weeks: 1, ..Period::ZERO }, "week"),
            (Period::days(1), "day"),
            (Period::hours(1), "hour"),
            (Period::minutes(1), "minute"),
            (Period { seconds: 1, ..Period::ZERO }, "second"),
            (Period { millis: 1, ..Period::ZERO }, "millisecond"),
        ];
        candidates
            .into_iter()
            .find(|(p, _)| one(*p))
            .map(|(_, unit)| unit)
    }
}

impl SqlExpressionBuilder for PinotExpressionBuilder {
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
        let time_format = TimeFormat::parse(format)?;
        let source_format = escape_literal(&time_format.canonical());

        match timezone {
            None => {}
            Some(tz) if is_utc_like(tz) => {}
            Some(tz) => {
                if let (TimeFormat::Epoch { unit }, Some(trunc)) =
                    (&time_format, Self::date_trunc_unit(granularity))
                {
                    return Ok(format!(
                        "DATETRUNC('{trunc}', {column}, '{}', '{}', 'MILLISECONDS')",
                        unit.name(),
                        escape_literal(tz)
                    ));
                }
                let spec = Self::granularity_spec(granularity)?;
                return Ok(format!(
                    "FromDateTime(DATETIMECONVERT({column}, '{source_format}', \
                     '1:DAYS:SIMPLE_DATE_FORMAT:yyyy-MM-dd HH:mm:ss.SSSZ tz({})', '{spec}'), \
                     'yyyy-MM-dd HH:mm:ss.SSSZ')",
                    escape_literal(tz)
                ));
            }
        }

        let spec = Self::granularity_spec(granularity)?;
        Ok(format!(
            "DATETIMECONVERT({column}, '{source_format}', '1:MILLISECONDS:EPOCH', '{spec}')"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_epoch_seconds_in_seconds() {
        let builder = PinotExpressionBuilder::for_format("1:SECONDS:EPOCH").unwrap();
        assert_eq!(
            builder.time_filter_expression("ts", 1_000_000, 2_000_000).unwrap(),
            "ts >= 1000 AND ts < 2000"
        );
        assert_eq!(
            PinotExpressionBuilder::default()
                .time_filter_expression("ts", 1_000_000, 2_000_000)
                .unwrap(),
            "ts >= 1000000 AND ts < 2000000"
        );
    }

    #[test]
    fn filters_date_strings_in_their_pattern() {
        let builder = PinotExpressionBuilder::for_format("1:DAYS:SIMPLE_DATE_FORMAT:yyyyMMdd").unwrap();
        assert_eq!(
            builder
                .time_filter_expression("date", 1_704_067_200_000, 1_704_153_600_000)
                .unwrap(),
            "date >= '20240101' AND date < '20240102'"
        );
    }

    #[test]
    fn groups_with_datetimeconvert_in_utc() {
        let expr = PinotExpressionBuilder::default()
            .time_group_expression("ts", "EPOCH", &Period::days(1), Some("UTC"))
            .unwrap();
        assert_eq!(
            expr,
            "DATETIMECONVERT(ts, '1:SECONDS:EPOCH', '1:MILLISECONDS:EPOCH', '1:DAYS')"
        );
    }

    #[test]
    fn groups_date_strings_with_escaped_pattern() {
        let expr = PinotExpressionBuilder::default()
            .time_group_expression("date", "yyyy-MM-dd'T'HH", &Period::hours(1), None)
            .unwrap();
        assert!(expr.contains("'1:DAYS:SIMPLE_DATE_FORMAT:yyyy-MM-dd''T''HH'"));
        assert!(expr.ends_with("'1:HOURS')"));
    }

    #[test]
    fn uses_datetrunc_for_custom_timezone() {
        let expr = PinotExpressionBuilder::default()
            .time_group_expression("ts", "EPOCH_MILLIS", &Period::days(1), Some("Europe/Amsterdam"))
            .unwrap();
        assert_eq!(
            expr,
            "DATETRUNC('day', ts, 'MILLISECONDS', 'Europe/Amsterdam', 'MILLISECONDS')"
        );
    }

    #[test]
    fn rejects_calendar_and_mixed_granularities() {
        for p in ["P1W", "P1M", "P1Y", "P1DT1H"] {
            let period = Period::parse(p).unwrap();
            assert!(
                PinotExpressionBuilder::default()
                    .time_group_expression("ts", "EPOCH_MILLIS", &period, None)
                    .is_err(),
                "{p} should be rejected"
            );
        }
    }
}
