use tripwire_core::{Period, PropertyKey};

use crate::expression::TimeFormat;

use super::{MacroExpansionContext, MacroFunction};
use crate::error::{SqlError, SqlResult};

pub const TIME_FILTER_MACRO: &str = "__timeFilter";
pub const TIME_GROUP_MACRO: &str = "__timeGroup";

fn parse_period(macro_name: &str, text: &str) -> SqlResult<Period> {
    Period::parse(text).map_err(|e| SqlError::MacroArgument {
        name: macro_name.to_string(),
        reason: e.to_string(),
    })
}

/// `__timeFilter(timeColumn[, lookbackFromStart[, lookbackFromEnd]])`
///
/// Restricts `timeColumn` to the detection interval, each bound optionally
/// moved back by an ISO-8601 lookback. When the dataset declares a time
/// format for `timeColumn`, the bounds are rendered in that format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeFilterMacro;

impl MacroFunction for TimeFilterMacro {
    fn name(&self) -> &str {
        TIME_FILTER_MACRO
    }

    fn expand(&self, args: &[String], context: &mut MacroExpansionContext<'_>) -> SqlResult<String> {
        let (column, from_start, from_end) = match args {
            [column] => (column, None, None),
            [column, start] => (column, Some(start), None),
            [column, start, end] => (column, Some(start), Some(end)),
            _ => {
                return Err(SqlError::MacroArity {
                    name: TIME_FILTER_MACRO.to_string(),
                    expected: "1 to 3",
                    actual: args.len(),
                })
            }
        };
        let from_start = match from_start {
            Some(text) => parse_period(TIME_FILTER_MACRO, text)?,
            None => Period::ZERO,
        };
        let from_end = match from_end {
            Some(text) => parse_period(TIME_FILTER_MACRO, text)?,
            None => Period::ZERO,
        };

        let bounds = context.interval.with_lookback(&from_start, &from_end)?;
        context.set_property(PropertyKey::TimeColumn, column.as_str());
        context.set_property(PropertyKey::MinTimeMillis, bounds.start.to_string());
        context.set_property(PropertyKey::MaxTimeMillis, bounds.end.to_string());

        match context.time_format_of(column) {
            Some(format) => {
                let format = TimeFormat::parse(format)?;
                context.expression_builder.time_filter_expression_in_format(
                    column,
                    bounds.start,
                    bounds.end,
                    &format,
                )
            }
            None => context
                .expression_builder
                .time_filter_expression(column, bounds.start, bounds.end),
        }
    }
}

/// `__timeGroup(timeColumn, timeColumnFormat, granularity)`
///
/// Buckets `timeColumn` by `granularity` and yields epoch milliseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeGroupMacro;

impl MacroFunction for TimeGroupMacro {
    fn name(&self) -> &str {
        TIME_GROUP_MACRO
    }

    fn expand(&self, args: &[String], context: &mut MacroExpansionContext<'_>) -> SqlResult<String> {
        let [column, format, granularity] = args else {
            return Err(SqlError::MacroArity {
                name: TIME_GROUP_MACRO.to_string(),
                expected: "3",
                actual: args.len(),
            });
        };
        let granularity = parse_period(TIME_GROUP_MACRO, granularity)?;
        context.set_property(PropertyKey::Granularity, granularity.to_string());

        let timezone = context.timezone();
        context
            .expression_builder
            .time_group_expression(column, format, &granularity, timezone)
    }
}
