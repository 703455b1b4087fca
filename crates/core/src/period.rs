//! ISO-8601 periods (`P1D`, `PT1H`, `P1DT12H`, `P2W`, `P1M`) with
//! calendar-aware arithmetic on epoch milliseconds.
//!
//! Day, hour, minute and second components are fixed-length (all times are
//! UTC). Month and year components move along the calendar, so `P1M`
//! subtracted from March 31st lands on the last day of February.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

pub const SECOND_MILLIS: i64 = 1_000;
pub const MINUTE_MILLIS: i64 = 60 * SECOND_MILLIS;
pub const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
pub const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;
pub const WEEK_MILLIS: i64 = 7 * DAY_MILLIS;

/// 1970-01-05 is the first Monday after the epoch; week buckets start there.
const FIRST_MONDAY_MILLIS: i64 = 4 * DAY_MILLIS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    pub years: u32,
    pub months: u32,
    pub weeks: u32,
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
    pub millis: u32,
}

impl Period {
    pub const ZERO: Period = Period {
        years: 0,
        months: 0,
        weeks: 0,
        days: 0,
        hours: 0,
        minutes: 0,
        seconds: 0,
        millis: 0,
    };

    pub fn days(n: u32) -> Self {
        Self { days: n, ..Self::ZERO }
    }

    pub fn hours(n: u32) -> Self {
        Self { hours: n, ..Self::ZERO }
    }

    pub fn minutes(n: u32) -> Self {
        Self { minutes: n, ..Self::ZERO }
    }

    pub fn parse(input: &str) -> CoreResult<Self> {
        input.parse()
    }

    /// Parse `input` when present, `default` otherwise.
    pub fn parse_or(input: Option<&str>, default: Period) -> CoreResult<Self> {
        match input {
            Some(s) => s.parse(),
            None => Ok(default),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Length in milliseconds when the period has no calendar components.
    pub fn fixed_millis(&self) -> Option<i64> {
        if self.years > 0 || self.months > 0 {
            return None;
        }
        Some(self.fixed_part_millis())
    }

    fn fixed_part_millis(&self) -> i64 {
        self.weeks as i64 * WEEK_MILLIS
            + self.days as i64 * DAY_MILLIS
            + self.hours as i64 * HOUR_MILLIS
            + self.minutes as i64 * MINUTE_MILLIS
            + self.seconds as i64 * SECOND_MILLIS
            + self.millis as i64
    }

    fn calendar_months(&self) -> CoreResult<u32> {
        self.years
            .checked_mul(12)
            .and_then(|m| m.checked_add(self.months))
            .ok_or_else(|| CoreError::InvalidPeriod {
                input: self.to_string(),
                reason: "too many months".into(),
            })
    }

    /// `millis + self`.
    pub fn add_to(&self, millis: i64) -> CoreResult<i64> {
        let dt = to_datetime(millis)?;
        let dt = dt
            .checked_add_months(Months::new(self.calendar_months()?))
            .and_then(|d| d.checked_add_signed(Duration::milliseconds(self.fixed_part_millis())))
            .ok_or(CoreError::TimeOutOfRange(millis))?;
        Ok(dt.timestamp_millis())
    }

    /// `millis - self`.
    pub fn subtract_from(&self, millis: i64) -> CoreResult<i64> {
        let dt = to_datetime(millis)?;
        let dt = dt
            .checked_sub_months(Months::new(self.calendar_months()?))
            .and_then(|d| d.checked_sub_signed(Duration::milliseconds(self.fixed_part_millis())))
            .ok_or(CoreError::TimeOutOfRange(millis))?;
        Ok(dt.timestamp_millis())
    }

    /// Round `millis` down to the start of its bucket.
    ///
    /// Calendar periods floor to the first day of the month (or year), week
    /// periods to a Monday, everything else to a multiple of the period
    /// length since the epoch.
    pub fn floor(&self, millis: i64) -> CoreResult<i64> {
        if self.is_zero() {
            return Err(CoreError::InvalidPeriod {
                input: self.to_string(),
                reason: "cannot bucket by an empty period".into(),
            });
        }
        if self.years > 0 || self.months > 0 {
            let dt = to_datetime(millis)?;
            let month = if self.months == 0 { 1 } else { dt.month() };
            let floored = NaiveDate::from_ymd_opt(dt.year(), month, 1)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .ok_or(CoreError::TimeOutOfRange(millis))?;
            return Ok(floored.and_utc().timestamp_millis());
        }
        let len = self.fixed_part_millis();
        let origin = if self.weeks > 0 && len % WEEK_MILLIS == 0 {
            FIRST_MONDAY_MILLIS
        } else {
            0
        };
        millis
            .checked_sub(origin)
            .and_then(|shifted| shifted.div_euclid(len).checked_mul(len))
            .and_then(|floored| floored.checked_add(origin))
            .ok_or(CoreError::TimeOutOfRange(millis))
    }

    /// Smallest bucket start that is `>= millis`.
    pub fn first_bucket_at_or_after(&self, millis: i64) -> CoreResult<i64> {
        let floored = self.floor(millis)?;
        if floored == millis {
            Ok(millis)
        } else {
            self.add_to(floored)
        }
    }

    /// Biggest bucket start that is strictly `< millis`.
    pub fn last_bucket_before(&self, millis: i64) -> CoreResult<i64> {
        let floored = self.floor(millis)?;
        if floored == millis {
            self.subtract_from(millis)
        } else {
            Ok(floored)
        }
    }
}

fn to_datetime(millis: i64) -> CoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(CoreError::TimeOutOfRange(millis))
}

// ── Parsing ──────────────────────────────────────────────────────────

impl FromStr for Period {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidPeriod {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let body = s
            .trim()
            .strip_prefix('P')
            .or_else(|| s.trim().strip_prefix('p'))
            .ok_or_else(|| invalid("must start with 'P'"))?;
        if body.is_empty() {
            return Err(invalid("no components"));
        }

        let (date_part, time_part) = match body.split_once(['T', 't']) {
            Some((d, t)) => {
                if t.is_empty() {
                    return Err(invalid("empty time section after 'T'"));
                }
                (d, Some(t))
            }
            None => (body, None),
        };

        let mut period = Period::ZERO;
        for (number, unit) in components(date_part).map_err(|r| invalid(&r))? {
            let n = parse_whole(&number).map_err(|r| invalid(&r))?;
            match unit.to_ascii_uppercase() {
                'Y' => period.years = n,
                'M' => period.months = n,
                'W' => period.weeks = n,
                'D' => period.days = n,
                other => return Err(invalid(&format!("unknown date unit '{other}'"))),
            }
        }
        if let Some(time_part) = time_part {
            for (number, unit) in components(time_part).map_err(|r| invalid(&r))? {
                match unit.to_ascii_uppercase() {
                    'H' => period.hours = parse_whole(&number).map_err(|r| invalid(&r))?,
                    'M' => period.minutes = parse_whole(&number).map_err(|r| invalid(&r))?,
                    'S' => {
                        let (secs, millis) = parse_seconds(&number).map_err(|r| invalid(&r))?;
                        period.seconds = secs;
                        period.millis = millis;
                    }
                    other => return Err(invalid(&format!("unknown time unit '{other}'"))),
                }
            }
        }
        Ok(period)
    }
}

/// Split `1D12H` style text into `("1", 'D'), ("12", 'H')`.
fn components(text: &str) -> Result<Vec<(String, char)>, String> {
    let mut out = Vec::new();
    let mut number = String::new();
    for c in text.chars() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            number.push(c);
        } else if c.is_ascii_alphabetic() {
            if number.is_empty() {
                return Err(format!("unit '{c}' has no value"));
            }
            out.push((std::mem::take(&mut number), c));
        } else {
            return Err(format!("unexpected character '{c}'"));
        }
    }
    if !number.is_empty() {
        return Err(format!("value '{number}' has no unit"));
    }
    Ok(out)
}

fn parse_whole(number: &str) -> Result<u32, String> {
    number
        .parse()
        .map_err(|_| format!("'{number}' is not a whole number"))
}

fn parse_seconds(number: &str) -> Result<(u32, u32), String> {
    let normalized = number.replace(',', ".");
    match normalized.split_once('.') {
        None => Ok((parse_whole(&normalized)?, 0)),
        Some((whole, frac)) => {
            if frac.len() > 3 || frac.is_empty() {
                return Err(format!("'{number}' must have 1 to 3 fractional digits"));
            }
            let secs = if whole.is_empty() { 0 } else { parse_whole(whole)? };
            let millis = parse_whole(&format!("{frac:0<3}"))?;
            Ok((secs, millis))
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "P0D");
        }
        write!(f, "P")?;
        for (n, unit) in [
            (self.years, 'Y'),
            (self.months, 'M'),
            (self.weeks, 'W'),
            (self.days, 'D'),
        ] {
            if n > 0 {
                write!(f, "{n}{unit}")?;
            }
        }
        if self.hours > 0 || self.minutes > 0 || self.seconds > 0 || self.millis > 0 {
            write!(f, "T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.millis > 0 {
                write!(f, "{}.{:03}S", self.seconds, self.millis)?;
            } else if self.seconds > 0 {
                write!(f, "{}S", self.seconds)?;
            }
        }
        Ok(())
    }
}

impl TryFrom<String> for Period {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(p: Period) -> Self {
        p.to_string()
    }
}
