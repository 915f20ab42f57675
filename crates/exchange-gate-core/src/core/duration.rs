// crates/exchange-gate-core/src/core/duration.rs
// ============================================================================
// Module: Exchange Gate Grant Durations
// Description: Allow-list grant durations and ISO 8601 duration parsing.
// Purpose: Turn administrator-supplied durations into allow-list expiry times.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Allow-list grants are issued for a fixed term. Named terms use calendar
//! arithmetic: one month from January 31 lands on the last day of February.
//! ISO 8601 terms use fixed lengths (a year is 365 days, a month 30 days),
//! matching how approvals were historically stored. An empty duration means
//! the 30 day default.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Duration;
use time::Month;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default grant length when no duration is supplied.
pub const DEFAULT_GRANT_DAYS: i64 = 30;
/// Days counted per ISO 8601 year component.
const DAYS_PER_YEAR: i64 = 365;
/// Days counted per ISO 8601 month component.
const DAYS_PER_MONTH: i64 = 30;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when parsing or applying a grant duration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Input is not a recognized duration.
    #[error("invalid grant duration: {0}")]
    Invalid(String),
    /// Applying the duration overflowed the supported date range.
    #[error("grant duration overflows supported range: {0}")]
    Overflow(String),
}

// ============================================================================
// SECTION: Grant Duration
// ============================================================================

/// Term of an allow-list grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GrantDuration {
    /// One calendar month.
    OneMonth,
    /// One calendar year.
    OneYear,
    /// Fixed-length duration.
    Fixed(Duration),
}

impl Default for GrantDuration {
    fn default() -> Self {
        Self::Fixed(Duration::days(DEFAULT_GRANT_DAYS))
    }
}

impl GrantDuration {
    /// Parses a duration in any accepted form.
    ///
    /// Accepted: `one_month` or `30d`, `one_year` or `365d`, an ISO 8601
    /// duration such as `P1Y2M3DT4H5M6S`, or an empty string for the default.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::Invalid`] for anything else.
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        match input.trim() {
            "" => Ok(Self::default()),
            "one_month" | "30d" => Ok(Self::OneMonth),
            "one_year" | "365d" => Ok(Self::OneYear),
            other => parse_iso8601_duration(other).map(Self::Fixed),
        }
    }

    /// Computes the expiry instant for a grant issued at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError::Overflow`] when the result is unrepresentable.
    pub fn expiry_from(&self, now: Timestamp) -> Result<Timestamp, DurationError> {
        match self {
            Self::OneMonth => add_calendar_months(now, 1),
            Self::OneYear => add_calendar_months(now, 12),
            Self::Fixed(duration) => now
                .checked_add(*duration)
                .ok_or_else(|| DurationError::Overflow(format!("{now} + {duration}"))),
        }
    }
}

impl FromStr for GrantDuration {
    type Err = DurationError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::parse(input)
    }
}

impl TryFrom<String> for GrantDuration {
    type Error = DurationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GrantDuration> for String {
    fn from(value: GrantDuration) -> Self {
        value.to_string()
    }
}

impl fmt::Display for GrantDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneMonth => f.write_str("one_month"),
            Self::OneYear => f.write_str("one_year"),
            Self::Fixed(duration) => write!(f, "PT{}S", duration.whole_seconds()),
        }
    }
}

// ============================================================================
// SECTION: Calendar Arithmetic
// ============================================================================

/// Adds calendar months, clamping the day to the end of the target month.
fn add_calendar_months(now: Timestamp, months: i64) -> Result<Timestamp, DurationError> {
    let overflow = || DurationError::Overflow(format!("{now} + {months} months"));
    let current = now.as_offset();
    let date = current.date();
    let month_index = i64::from(u8::from(date.month())) - 1;
    let total = i64::from(date.year()) * 12 + month_index + months;
    let year = i32::try_from(total.div_euclid(12)).map_err(|_| overflow())?;
    let month_number = u8::try_from(total.rem_euclid(12) + 1).map_err(|_| overflow())?;
    let month = Month::try_from(month_number).map_err(|_| overflow())?;
    let day = date.day().min(days_in_month(year, month));
    let target = Date::from_calendar_date(year, month, day).map_err(|_| overflow())?;
    Ok(Timestamp::from_offset(current.replace_date(target)))
}

/// Returns the number of days in a month.
const fn days_in_month(year: i32, month: Month) -> u8 {
    match month {
        Month::January
        | Month::March
        | Month::May
        | Month::July
        | Month::August
        | Month::October
        | Month::December => 31,
        Month::April | Month::June | Month::September | Month::November => 30,
        Month::February => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    }
}

// ============================================================================
// SECTION: ISO 8601 Parsing
// ============================================================================

/// Parses an ISO 8601 duration of the form `PnYnMnDTnHnMn(.n)S`.
///
/// Components must appear in order and at least one must be present. Only
/// the seconds component may carry a fraction.
///
/// # Errors
///
/// Returns [`DurationError::Invalid`] when the input does not match.
pub fn parse_iso8601_duration(input: &str) -> Result<Duration, DurationError> {
    let invalid = || DurationError::Invalid(input.to_string());
    let body = input.strip_prefix('P').ok_or_else(invalid)?;
    let (date_part, time_part) = match body.split_once('T') {
        Some((date_part, time_part)) => {
            if time_part.is_empty() {
                return Err(invalid());
            }
            (date_part, Some(time_part))
        }
        None => (body, None),
    };

    let mut total = Duration::ZERO;
    let mut components = 0usize;

    let date_units: [(char, i64); 3] =
        [('Y', DAYS_PER_YEAR * 86_400), ('M', DAYS_PER_MONTH * 86_400), ('D', 86_400)];
    let mut rest = date_part;
    for (unit, seconds) in date_units {
        if let Some((value, remaining)) = take_component(rest, unit).map_err(|()| invalid())? {
            total = add_seconds(total, value, seconds).ok_or_else(invalid)?;
            components += 1;
            rest = remaining;
        }
    }
    if !rest.is_empty() {
        return Err(invalid());
    }

    if let Some(time_part) = time_part {
        let time_units: [(char, i64); 2] = [('H', 3_600), ('M', 60)];
        let mut rest = time_part;
        for (unit, seconds) in time_units {
            if let Some((value, remaining)) = take_component(rest, unit).map_err(|()| invalid())? {
                total = add_seconds(total, value, seconds).ok_or_else(invalid)?;
                components += 1;
                rest = remaining;
            }
        }
        if let Some(seconds_text) = rest.strip_suffix('S') {
            let seconds = parse_fractional_seconds(seconds_text).ok_or_else(invalid)?;
            total = total.checked_add(seconds).ok_or_else(invalid)?;
            components += 1;
        } else if !rest.is_empty() {
            return Err(invalid());
        }
    }

    if components == 0 {
        return Err(invalid());
    }
    Ok(total)
}

/// Splits a leading `<digits><unit>` component off `input`.
///
/// Returns `Ok(None)` when the next component has a different unit.
fn take_component(input: &str, unit: char) -> Result<Option<(i64, &str)>, ()> {
    let digits = input.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Ok(None);
    }
    let Some(remaining) = input[digits ..].strip_prefix(unit) else {
        return Ok(None);
    };
    let value = input[.. digits].parse::<i64>().map_err(|_| ())?;
    Ok(Some((value, remaining)))
}

/// Adds `value * unit_seconds` to `total` with overflow checks.
fn add_seconds(total: Duration, value: i64, unit_seconds: i64) -> Option<Duration> {
    let seconds = value.checked_mul(unit_seconds)?;
    total.checked_add(Duration::seconds(seconds))
}

/// Parses `<digits>[.<digits>]` into a duration.
fn parse_fractional_seconds(text: &str) -> Option<Duration> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    if whole.is_empty() || !whole.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    let mut duration = Duration::seconds(whole.parse::<i64>().ok()?);
    if let Some(fraction) = fraction {
        if fraction.is_empty() || !fraction.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }
        let digits: String = fraction.chars().chain(std::iter::repeat('0')).take(9).collect();
        let nanos = digits.parse::<i64>().ok()?;
        duration = duration.checked_add(Duration::nanoseconds(nanos))?;
    }
    Some(duration)
}
