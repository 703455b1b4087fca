use chrono::{TimeZone, Utc};
use tripwire_core::Period;

use crate::error::{SqlError, SqlResult};

const SIMPLE_DATE_FORMAT: &str = "SIMPLE_DATE_FORMAT:";

/// How a time column stores its values.
///
/// Accepts the short names (`EPOCH_MILLIS`, `EPOCH`), the
/// `size:UNIT:EPOCH` form, `[size:UNIT:]SIMPLE_DATE_FORMAT:pattern`, and a
/// bare date pattern such as `yyyyMMdd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeFormat {
    Epoch { unit: EpochUnit },
    SimpleDate { pattern: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl EpochUnit {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "MILLISECONDS" => Some(EpochUnit::Milliseconds),
            "SECONDS" => Some(EpochUnit::Seconds),
            "MINUTES" => Some(EpochUnit::Minutes),
            "HOURS" => Some(EpochUnit::Hours),
            "DAYS" => Some(EpochUnit::Days),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EpochUnit::Milliseconds => "MILLISECONDS",
            EpochUnit::Seconds => "SECONDS",
            EpochUnit::Minutes => "MINUTES",
            EpochUnit::Hours => "HOURS",
            EpochUnit::Days => "DAYS",
        }
    }

    pub fn millis(&self) -> i64 {
        match self {
            EpochUnit::Milliseconds => 1,
            EpochUnit::Seconds => 1_000,
            EpochUnit::Minutes => 60_000,
            EpochUnit::Hours => 3_600_000,
            EpochUnit::Days => 86_400_000,
        }
    }
}

impl TimeFormat {
    pub fn parse(format: &str) -> SqlResult<Self> {
        let format = format.trim();
        if format.is_empty() {
            return Err(SqlError::ExpressionBuilder("empty time column format".into()));
        }
        match format {
            "EPOCH_MILLIS" => {
                return Ok(TimeFormat::Epoch {
                    unit: EpochUnit::Milliseconds,
                })
            }
            "EPOCH" => {
                return Ok(TimeFormat::Epoch {
                    unit: EpochUnit::Seconds,
                })
            }
            _ => {}
        }

        if let Some(pattern) = strip_simple_date_prefix(format) {
            if pattern.is_empty() {
                return Err(SqlError::ExpressionBuilder(format!(
                    "time format '{format}' has no date pattern"
                )));
            }
            return Ok(TimeFormat::SimpleDate {
                pattern: pattern.to_string(),
            });
        }

        let parts: Vec<&str> = format.split(':').collect();
        if let [size, unit, "EPOCH"] = parts.as_slice() {
            let unit = EpochUnit::from_name(unit).ok_or_else(|| {
                SqlError::ExpressionBuilder(format!("unknown epoch unit in '{format}'"))
            })?;
            if *size != "1" {
                return Err(SqlError::ExpressionBuilder(format!(
                    "only single-unit epoch formats are supported, got '{format}'"
                )));
            }
            return Ok(TimeFormat::Epoch { unit });
        }

        Ok(TimeFormat::SimpleDate {
            pattern: format.to_string(),
        })
    }

    pub fn is_epoch(&self) -> bool {
        matches!(self, TimeFormat::Epoch { .. })
    }

    /// `1:SECONDS:EPOCH` / `1:DAYS:SIMPLE_DATE_FORMAT:yyyyMMdd`.
    pub fn canonical(&self) -> String {
        match self {
            TimeFormat::Epoch { unit } => format!("1:{}:EPOCH", unit.name()),
            TimeFormat::SimpleDate { pattern } => format!("1:DAYS:{SIMPLE_DATE_FORMAT}{pattern}"),
        }
    }
}

impl TimeFormat {
    /// SQL literal for the first column value whose time is `>= millis`.
    ///
    /// Epoch values are rounded up to the column unit. Date strings are
    /// rendered in UTC at the pattern's finest field, rounded up to it.
    pub fn filter_bound(&self, millis: i64) -> SqlResult<String> {
        match self {
            TimeFormat::Epoch { unit } => Ok(ceil_div(millis, unit.millis()).to_string()),
            TimeFormat::SimpleDate { pattern } => {
                let date_pattern = DatePattern::parse(pattern)?;
                let text = date_pattern.format(millis)?;
                Ok(format!("'{}'", text.replace('\'', "''")))
            }
        }
    }
}

fn ceil_div(value: i64, unit: i64) -> i64 {
    let floor = value.div_euclid(unit);
    if value.rem_euclid(unit) == 0 {
        floor
    } else {
        floor + 1
    }
}

/// A `SimpleDateFormat` style pattern translated to chrono's strftime syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DatePattern {
    strftime: String,
    resolution: Period,
}

impl DatePattern {
    pub(crate) fn parse(pattern: &str) -> SqlResult<Self> {
        let unsupported = |what: String| {
            SqlError::ExpressionBuilder(format!("date pattern '{pattern}': {what}"))
        };
        let chars: Vec<char> = pattern.chars().collect();
        let mut strftime = String::new();
        let mut resolution: Option<(u8, Period)> = None;
        let mut finer = |rank: u8, period: Period| {
            if resolution.map_or(true, |(r, _)| rank > r) {
                resolution = Some((rank, period));
            }
        };

        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                let end = chars[i + 1..].iter().position(|&q| q == '\'').map(|p| i + 1 + p);
                let Some(end) = end else {
                    return Err(unsupported("unterminated quote".into()));
                };
                if end == i + 1 {
                    strftime.push('\'');
                } else {
                    for &lit in &chars[i + 1..end] {
                        push_literal(&mut strftime, lit);
                    }
                }
                i = end + 1;
                continue;
            }
            if !c.is_ascii_alphabetic() {
                push_literal(&mut strftime, c);
                i += 1;
                continue;
            }

            let run = chars[i..].iter().take_while(|&&x| x == c).count();
            let item = match (c, run) {
                ('y', 2) => "%y",
                ('y', _) => "%Y",
                ('M', 1) => "%-m",
                ('M', 2) => "%m",
                ('M', 3) => "%b",
                ('M', _) => "%B",
                ('d', 1) => "%-d",
                ('d', _) => "%d",
                ('H', 1) => "%-H",
                ('H', _) => "%H",
                ('h', 1) => "%-I",
                ('h', _) => "%I",
                ('m', 1) => "%-M",
                ('m', _) => "%M",
                ('s', 1) => "%-S",
                ('s', _) => "%S",
                ('S', _) => "%3f",
                ('a', _) => "%p",
                ('E', 1..=3) => "%a",
                ('E', _) => "%A",
                ('Z', 1) => "%z",
                ('Z', _) => "%:z",
                (other, _) => return Err(unsupported(format!("unsupported field '{other}'"))),
            };
            strftime.push_str(item);
            match c {
                'y' => finer(0, Period { years: 1, ..Period::ZERO }),
                'M' => finer(1, Period { months: 1, ..Period::ZERO }),
                'd' => finer(2, Period::days(1)),
                'H' | 'h' => finer(3, Period::hours(1)),
                'm' => finer(4, Period::minutes(1)),
                's' => finer(5, Period { seconds: 1, ..Period::ZERO }),
                'S' => finer(6, Period { millis: 1, ..Period::ZERO }),
                _ => {}
            }
            i += run;
        }

        let Some((_, resolution)) = resolution else {
            return Err(unsupported("no date or time field".into()));
        };
        Ok(Self {
            strftime,
            resolution,
        })
    }

    /// Render the first instant at or after `millis` the pattern can express.
    pub(crate) fn format(&self, millis: i64) -> SqlResult<String> {
        let rounded = self.resolution.first_bucket_at_or_after(millis)?;
        let instant = Utc
            .timestamp_millis_opt(rounded)
            .single()
            .ok_or_else(|| SqlError::ExpressionBuilder(format!("timestamp out of range: {rounded}")))?;
        Ok(instant.format(&self.strftime).to_string())
    }
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

/// Remove an optional `size:UNIT:` followed by `SIMPLE_DATE_FORMAT:`.
fn strip_simple_date_prefix(format: &str) -> Option<&str> {
    if let Some(rest) = format.strip_prefix(SIMPLE_DATE_FORMAT) {
        return Some(rest);
    }
    let idx = format.find(SIMPLE_DATE_FORMAT)?;
    let prefix = &format[..idx];
    let mut parts = prefix.trim_end_matches(':').split(':');
    let size_ok = parts
        .next()
        .is_some_and(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()));
    let unit_ok = parts
        .next()
        .is_some_and(|u| !u.is_empty() && u.chars().all(|c| c.is_ascii_uppercase()));
    if size_ok && unit_ok && parts.next().is_none() && prefix.ends_with(':') {
        Some(&format[idx + SIMPLE_DATE_FORMAT.len()..])
    } else {
        None
    }
}
