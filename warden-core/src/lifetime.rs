//! Composite durations used for session lifetimes and renewal windows

use crate::error::{ErrorContext, WardenError, WardenResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const MS_PER_SECOND: i64 = 1_000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: i64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: i64 = 7 * MS_PER_DAY;
/// A month is approximated as 30.5 days.
const MS_PER_MONTH: i64 = 61 * MS_PER_DAY / 2;
/// A year is approximated as 365 days.
const MS_PER_YEAR: i64 = 365 * MS_PER_DAY;

/// Longest lifetime, in either direction, that resolves to an instant
pub const MAX_LIFETIME_YEARS: i64 = 10_000;
const MAX_MILLIS: i64 = MAX_LIFETIME_YEARS * MS_PER_YEAR;

/// A duration expressed in calendar-ish units.
///
/// Every component is independent and may be negative; a negative total
/// resolves to an instant in the past.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lifetime {
    pub years: i64,
    pub months: i64,
    pub weeks: i64,
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub milliseconds: i64,
}

impl Lifetime {
    pub fn years(years: i64) -> Self {
        Self { years, ..Self::default() }
    }

    pub fn months(months: i64) -> Self {
        Self { months, ..Self::default() }
    }

    pub fn weeks(weeks: i64) -> Self {
        Self { weeks, ..Self::default() }
    }

    pub fn days(days: i64) -> Self {
        Self { days, ..Self::default() }
    }

    pub fn hours(hours: i64) -> Self {
        Self { hours, ..Self::default() }
    }

    pub fn minutes(minutes: i64) -> Self {
        Self { minutes, ..Self::default() }
    }

    pub fn seconds(seconds: i64) -> Self {
        Self { seconds, ..Self::default() }
    }

    pub fn milliseconds(milliseconds: i64) -> Self {
        Self { milliseconds, ..Self::default() }
    }

    /// Exact total in milliseconds. Wide enough that no combination of
    /// components can overflow.
    fn total_millis(&self) -> i128 {
        [
            (self.years, MS_PER_YEAR),
            (self.months, MS_PER_MONTH),
            (self.weeks, MS_PER_WEEK),
            (self.days, MS_PER_DAY),
            (self.hours, MS_PER_HOUR),
            (self.minutes, MS_PER_MINUTE),
            (self.seconds, MS_PER_SECOND),
            (self.milliseconds, 1),
        ]
        .iter()
        .map(|&(count, unit)| i128::from(count) * i128::from(unit))
        .sum()
    }

    /// Total length in milliseconds, `None` beyond [`MAX_LIFETIME_YEARS`]
    pub fn as_millis(&self) -> Option<i64> {
        let total = self.total_millis();
        if total.abs() > i128::from(MAX_MILLIS) {
            return None;
        }
        i64::try_from(total).ok()
    }

    pub fn is_in_range(&self) -> bool {
        self.as_millis().is_some()
    }

    pub fn as_delta(&self) -> Option<TimeDelta> {
        self.as_millis().and_then(TimeDelta::try_milliseconds)
    }

    /// True when the lifetime does not reach past the instant it starts from
    pub fn is_non_positive(&self) -> bool {
        self.total_millis() <= 0
    }

    /// The instant this lifetime ends when started at `start`
    ///
    /// Fails with a validation error when the lifetime is out of range or
    /// the end falls outside the representable calendar.
    pub fn after(&self, start: DateTime<Utc>) -> WardenResult<DateTime<Utc>> {
        self.as_delta()
            .and_then(|delta| start.checked_add_signed(delta))
            .ok_or_else(|| self.out_of_range())
    }

    fn out_of_range(&self) -> WardenError {
        WardenError::Validation {
            message: format!(
                "Lifetime exceeds {} years in either direction",
                MAX_LIFETIME_YEARS
            ),
            field: None,
            context: ErrorContext::new("lifetime")
                .with_operation("resolve")
                .with_metadata("total_millis", &self.total_millis().to_string())
                .with_suggestion("Use a shorter lifetime"),
        }
    }
}

impl std::ops::Add for Lifetime {
    type Output = Lifetime;

    fn add(self, rhs: Lifetime) -> Lifetime {
        Lifetime {
            years: self.years.saturating_add(rhs.years),
            months: self.months.saturating_add(rhs.months),
            weeks: self.weeks.saturating_add(rhs.weeks),
            days: self.days.saturating_add(rhs.days),
            hours: self.hours.saturating_add(rhs.hours),
            minutes: self.minutes.saturating_add(rhs.minutes),
            seconds: self.seconds.saturating_add(rhs.seconds),
            milliseconds: self.milliseconds.saturating_add(rhs.milliseconds),
        }
    }
}

impl std::ops::Neg for Lifetime {
    type Output = Lifetime;

    fn neg(self) -> Lifetime {
        Lifetime {
            years: self.years.saturating_neg(),
            months: self.months.saturating_neg(),
            weeks: self.weeks.saturating_neg(),
            days: self.days.saturating_neg(),
            hours: self.hours.saturating_neg(),
            minutes: self.minutes.saturating_neg(),
            seconds: self.seconds.saturating_neg(),
            milliseconds: self.milliseconds.saturating_neg(),
        }
    }
}
