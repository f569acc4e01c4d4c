//! Time pattern parsing and next occurrence calculation.
//!
//! Patterns have seven whitespace-separated fields:
//!
//! ```text
//! second minute hour day month year day_of_week
//! ```
//!
//! Every field accepts `*`, `*/n`, `a`, `a-b`, `a-b/n` and comma separated
//! lists of those. Months may be written `jan`..`dec`, weekdays `mon`..`sun`
//! (0 is Monday), and the day field also accepts `last` for the last day of
//! the month. A time matches when every field matches; day-of-month and
//! day-of-week must both match.
//!
//! [`TimePattern`] evaluates patterns on naive calendar times and knows
//! nothing about timezones. [`Schedule`] pins a pattern to a timezone.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::fmt;
use thiserror::Error;

/// Latest year a pattern can fire in.
const MAX_YEAR: i32 = 9999;

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAY_NAMES: &[&str] = &["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Errors that can occur when parsing or using schedules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleError {
    /// Wrong number of fields.
    #[error("expected {expected} fields, got {found}")]
    FieldCount { expected: usize, found: usize },

    /// A single field could not be parsed.
    #[error("invalid {field} expression '{expression}': {reason}")]
    InvalidField {
        field: &'static str,
        expression: String,
        reason: String,
    },

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// The seven pattern fields, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
    DayOfWeek,
}

impl FieldKind {
    /// Field order in a pattern string.
    pub const ALL: [FieldKind; 7] = [
        FieldKind::Second,
        FieldKind::Minute,
        FieldKind::Hour,
        FieldKind::Day,
        FieldKind::Month,
        FieldKind::Year,
        FieldKind::DayOfWeek,
    ];

    /// Field name as used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            FieldKind::Second => "second",
            FieldKind::Minute => "minute",
            FieldKind::Hour => "hour",
            FieldKind::Day => "day",
            FieldKind::Month => "month",
            FieldKind::Year => "year",
            FieldKind::DayOfWeek => "day_of_week",
        }
    }

    /// Inclusive value bounds.
    fn bounds(self) -> (u32, u32) {
        match self {
            FieldKind::Second | FieldKind::Minute => (0, 59),
            FieldKind::Hour => (0, 23),
            FieldKind::Day => (1, 31),
            FieldKind::Month => (1, 12),
            FieldKind::Year => (1970, MAX_YEAR as u32),
            FieldKind::DayOfWeek => (0, 6),
        }
    }

    /// Parse a single value, accepting names where the field has them.
    fn parse_value(self, text: &str) -> Option<u32> {
        if let Ok(value) = text.parse::<u32>() {
            return Some(value);
        }

        let lower = text.to_ascii_lowercase();
        match self {
            FieldKind::Month => MONTH_NAMES
                .iter()
                .position(|name| *name == lower)
                .map(|i| i as u32 + 1),
            FieldKind::DayOfWeek => WEEKDAY_NAMES
                .iter()
                .position(|name| *name == lower)
                .map(|i| i as u32),
            _ => None,
        }
    }
}

/// One comma-separated item of a field.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    /// `start..=end` every `step` values (`*`, `a`, `a-b`, `*/n`, `a-b/n`).
    Range { start: u32, end: u32, step: u32 },
    /// Last day of the month (day field only).
    LastDayOfMonth,
}

impl Expr {
    fn matches(&self, value: u32) -> bool {
        match *self {
            Expr::Range { start, end, step } => {
                value >= start && value <= end && (value - start) % step == 0
            }
            Expr::LastDayOfMonth => false,
        }
    }

    /// Smallest matching value `>= from`.
    fn next_value(&self, from: u32) -> Option<u32> {
        match *self {
            Expr::Range { start, end, step } => {
                let candidate = if from <= start {
                    start
                } else {
                    start + (from - start).div_ceil(step) * step
                };
                (candidate <= end).then_some(candidate)
            }
            Expr::LastDayOfMonth => None,
        }
    }
}

/// A parsed pattern field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    exprs: Vec<Expr>,
}

impl Field {
    fn parse(kind: FieldKind, text: &str) -> Result<Self, ScheduleError> {
        let exprs = text
            .split(',')
            .map(|item| Self::parse_expr(kind, item.trim(), text))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { exprs })
    }

    fn parse_expr(kind: FieldKind, item: &str, whole: &str) -> Result<Expr, ScheduleError> {
        let invalid = |reason: String| ScheduleError::InvalidField {
            field: kind.name(),
            expression: whole.to_string(),
            reason,
        };

        if item.is_empty() {
            return Err(invalid("empty expression".into()));
        }

        if item.eq_ignore_ascii_case("last") {
            return if kind == FieldKind::Day {
                Ok(Expr::LastDayOfMonth)
            } else {
                Err(invalid("'last' is only valid in the day field".into()))
            };
        }

        let (min, max) = kind.bounds();
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u32 = step
                    .parse()
                    .map_err(|_| invalid(format!("invalid step '{}'", step)))?;
                if step == 0 {
                    return Err(invalid("step must be positive".into()));
                }
                (range, Some(step))
            }
            None => (item, None),
        };

        let value = |text: &str| -> Result<u32, ScheduleError> {
            let v = kind
                .parse_value(text)
                .ok_or_else(|| invalid(format!("invalid value '{}'", text)))?;
            if v < min || v > max {
                return Err(invalid(format!("{} is outside {}-{}", v, min, max)));
            }
            Ok(v)
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (value(a)?, value(b)?);
            if a > b {
                return Err(invalid(format!("range start {} is after end {}", a, b)));
            }
            (a, b)
        } else {
            if step.is_some() {
                return Err(invalid("a step needs '*' or a range".into()));
            }
            let v = value(range)?;
            (v, v)
        };

        Ok(Expr::Range {
            start,
            end,
            step: step.unwrap_or(1),
        })
    }

    fn matches(&self, value: u32) -> bool {
        self.exprs.iter().any(|e| e.matches(value))
    }

    fn next_value(&self, from: u32) -> Option<u32> {
        self.exprs.iter().filter_map(|e| e.next_value(from)).min()
    }

    fn matches_day(&self, date: NaiveDate) -> bool {
        self.exprs.iter().any(|e| match e {
            Expr::LastDayOfMonth => is_last_day_of_month(date),
            other => other.matches(date.day()),
        })
    }
}

fn is_last_day_of_month(date: NaiveDate) -> bool {
    date.succ_opt().is_none_or(|next| next.month() != date.month())
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// A seven-field cron-like time pattern evaluated on naive calendar time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePattern {
    expression: String,
    second: Field,
    minute: Field,
    hour: Field,
    day: Field,
    month: Field,
    year: Field,
    day_of_week: Field,
}

impl TimePattern {
    /// Parse a pattern such as `0 */5 * * * * *`.
    pub fn parse(expression: &str) -> Result<Self, ScheduleError> {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != FieldKind::ALL.len() {
            return Err(ScheduleError::FieldCount {
                expected: FieldKind::ALL.len(),
                found: parts.len(),
            });
        }

        let field = |i: usize| Field::parse(FieldKind::ALL[i], parts[i]);

        Ok(Self {
            expression: parts.join(" "),
            second: field(0)?,
            minute: field(1)?,
            hour: field(2)?,
            day: field(3)?,
            month: field(4)?,
            year: field(5)?,
            day_of_week: field(6)?,
        })
    }

    /// Get the normalized expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Check whether a calendar time matches every field.
    pub fn matches(&self, t: NaiveDateTime) -> bool {
        self.year.matches(t.year() as u32)
            && self.month.matches(t.month())
            && self.date_matches(t.date())
            && self.hour.matches(t.hour())
            && self.minute.matches(t.minute())
            && self.second.matches(t.second())
    }

    fn date_matches(&self, date: NaiveDate) -> bool {
        self.day.matches_day(date)
            && self
                .day_of_week
                .matches(date.weekday().num_days_from_monday())
    }

    /// Get the first matching time strictly after `after`, at whole-second
    /// precision. Returns `None` once the pattern is exhausted.
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let mut t = after.with_nanosecond(0)? + Duration::seconds(1);

        loop {
            if t.year() > MAX_YEAR {
                return None;
            }

            let year = t.year() as u32;
            if !self.year.matches(year) {
                let next = self.year.next_value(year + 1)?;
                t = midnight(NaiveDate::from_ymd_opt(next as i32, 1, 1)?);
                continue;
            }

            if !self.month.matches(t.month()) {
                t = match self.month.next_value(t.month() + 1) {
                    Some(month) => midnight(NaiveDate::from_ymd_opt(t.year(), month, 1)?),
                    None => midnight(NaiveDate::from_ymd_opt(t.year() + 1, 1, 1)?),
                };
                continue;
            }

            if !self.date_matches(t.date()) {
                t = midnight(t.date().succ_opt()?);
                continue;
            }

            if !self.hour.matches(t.hour()) {
                t = match self.hour.next_value(t.hour() + 1) {
                    Some(hour) => t.date().and_hms_opt(hour, 0, 0)?,
                    None => midnight(t.date().succ_opt()?),
                };
                continue;
            }

            if !self.minute.matches(t.minute()) {
                t = match self.minute.next_value(t.minute() + 1) {
                    Some(minute) => t.date().and_hms_opt(t.hour(), minute, 0)?,
                    None => t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1),
                };
                continue;
            }

            if !self.second.matches(t.second()) {
                t = match self.second.next_value(t.second() + 1) {
                    Some(second) => t.date().and_hms_opt(t.hour(), t.minute(), second)?,
                    None => {
                        t.date().and_hms_opt(t.hour(), t.minute(), 0)? + Duration::minutes(1)
                    }
                };
                continue;
            }

            return Some(t);
        }
    }
}

impl fmt::Display for TimePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// A time pattern evaluated in a specific timezone.
#[derive(Debug, Clone)]
pub struct Schedule {
    pattern: TimePattern,
    timezone: Tz,
}

impl Schedule {
    /// Create a new schedule evaluated in UTC.
    pub fn new(expression: &str) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a new schedule with a specific IANA timezone.
    pub fn with_timezone(expression: &str, timezone: &str) -> Result<Self, ScheduleError> {
        let timezone = timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;

        Ok(Self {
            pattern: TimePattern::parse(expression)?,
            timezone,
        })
    }

    /// Get the next occurrence after the given time.
    ///
    /// Local times skipped by a DST transition never fire; repeated local
    /// times fire at their earliest instant.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let mut cursor = after.with_timezone(&self.timezone).naive_local();

        loop {
            let candidate = self
                .pattern
                .next_after(cursor)
                .ok_or(ScheduleError::NoMoreOccurrences)?;

            let resolved = match self.timezone.from_local_datetime(&candidate) {
                LocalResult::Single(dt) => Some(dt),
                LocalResult::Ambiguous(earliest, _) => Some(earliest),
                LocalResult::None => None,
            };

            match resolved.map(|dt| dt.with_timezone(&Utc)) {
                Some(next) if next > after => return Ok(next),
                _ => cursor = candidate,
            }
        }
    }

    /// Get the next N occurrences after the given time.
    pub fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let mut results = Vec::with_capacity(n);
        let mut current = after;
        for _ in 0..n {
            match self.next_after(current) {
                Ok(next) => {
                    results.push(next);
                    current = next;
                }
                Err(ScheduleError::NoMoreOccurrences) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Get the underlying pattern.
    pub fn pattern(&self) -> &TimePattern {
        &self.pattern
    }

    /// Get the pattern expression.
    pub fn expression(&self) -> &str {
        self.pattern.expression()
    }

    /// Get the timezone name.
    pub fn timezone(&self) -> &str {
        self.timezone.name()
    }
}
