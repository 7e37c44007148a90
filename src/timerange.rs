//! Time Range Resolution
//!
//! Maps a symbolic [`TimeRangeSelector`] and a reference instant to a concrete
//! `[start, end)` interval. Resolution is a pure function of `(selector, now)`
//! and is recomputed on every call, never cached.
//!
//! ```text
//! today  →  [local midnight of now, now)
//! shift  →  [now - 8h, now)
//! week   →  [now - 7d, now)
//! ```
//!
//! `shift` is a fixed eight hour lookback. It is deliberately not aligned to the
//! configured [`ShiftSchedule`] boundaries.

use chrono::{DateTime, Duration, Local, NaiveTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use thiserror::Error;

/// Lookback used by [`TimeRangeSelector::Shift`]
pub const SHIFT_LOOKBACK_HOURS: i64 = 8;

/// Lookback used by [`TimeRangeSelector::Week`]
pub const WEEK_LOOKBACK_DAYS: i64 = 7;

/// Symbolic time window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimeRangeSelector {
    #[default]
    Today,
    Shift,
    Week,
}

impl TimeRangeSelector {
    /// Parse a selector, falling back to [`TimeRangeSelector::Today`] for
    /// anything unrecognized.
    ///
    /// A typo in a selector degrades to the default window instead of failing
    /// the caller.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" => TimeRangeSelector::Today,
            "shift" => TimeRangeSelector::Shift,
            "week" => TimeRangeSelector::Week,
            other => {
                tracing::debug!(selector = %other, "Unknown time range selector, using today");
                TimeRangeSelector::Today
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRangeSelector::Today => "today",
            TimeRangeSelector::Shift => "shift",
            TimeRangeSelector::Week => "week",
        }
    }
}

impl FromStr for TimeRangeSelector {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse_lenient(s))
    }
}

impl std::fmt::Display for TimeRangeSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved interval with absolute bounds (start inclusive, end exclusive)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRange<Tz: TimeZone> {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
}

impl<Tz: TimeZone> ResolvedRange<Tz> {
    pub fn to_utc(&self) -> ResolvedRange<Utc> {
        ResolvedRange {
            start: self.start.with_timezone(&Utc),
            end: self.end.with_timezone(&Utc),
        }
    }

    /// Check if an instant falls within this range
    pub fn contains<Tz2: TimeZone>(&self, instant: &DateTime<Tz2>) -> bool {
        *instant >= self.start && *instant < self.end
    }

    pub fn duration(&self) -> Duration {
        self.end.clone().signed_duration_since(self.start.clone())
    }
}

impl ResolvedRange<Utc> {
    /// RFC 3339 bounds, as passed to the backend query
    pub fn to_rfc3339(&self) -> (String, String) {
        (
            self.start.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.end.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }
}

/// Resolve a selector against a reference instant
pub fn resolve<Tz: TimeZone>(selector: TimeRangeSelector, now: &DateTime<Tz>) -> ResolvedRange<Tz> {
    let start = match selector {
        TimeRangeSelector::Today => start_of_day(now),
        TimeRangeSelector::Shift => now.clone() - Duration::hours(SHIFT_LOOKBACK_HOURS),
        TimeRangeSelector::Week => now.clone() - Duration::days(WEEK_LOOKBACK_DAYS),
    };

    ResolvedRange {
        start,
        end: now.clone(),
    }
}

/// Resolve a selector against the current local time
pub fn resolve_now(selector: TimeRangeSelector) -> ResolvedRange<Local> {
    resolve(selector, &Local::now())
}

/// Midnight of `now`'s calendar day in its own time zone
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Tz> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(start) => start,
        // Midnight skipped by a DST jump: step back by wall-clock distance
        None => now.clone() - (now.naive_local() - midnight),
    }
}

/// Errors building a shift schedule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeRangeError {
    #[error("Invalid shift time '{0}': expected HH:MM")]
    InvalidShiftTime(String),

    #[error("Shift '{0}' has identical start and end")]
    EmptyShift(String),
}

/// A named production shift in local wall-clock time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shift {
    pub name: String,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Shift {
    pub fn new(name: impl Into<String>, start: &str, end: &str) -> Result<Self, TimeRangeError> {
        let name = name.into();
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        if start == end {
            return Err(TimeRangeError::EmptyShift(name));
        }
        Ok(Self { name, start, end })
    }

    /// Shifts whose end is before their start run across midnight
    pub fn is_overnight(&self) -> bool {
        self.end < self.start
    }

    pub fn covers(&self, time: NaiveTime) -> bool {
        if self.is_overnight() {
            time >= self.start || time < self.end
        } else {
            time >= self.start && time < self.end
        }
    }
}

fn parse_clock(s: &str) -> Result<NaiveTime, TimeRangeError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| TimeRangeError::InvalidShiftTime(s.to_string()))
}

/// Ordered set of shifts covering the production day
#[derive(Debug, Clone, Default)]
pub struct ShiftSchedule {
    shifts: Vec<Shift>,
}

impl ShiftSchedule {
    pub fn new(shifts: Vec<Shift>) -> Self {
        Self { shifts }
    }

    /// Three eight hour shifts starting at 06:00
    pub fn three_shift() -> Self {
        let shift = |name: &str, start: u32, end: u32| Shift {
            name: name.to_string(),
            start: NaiveTime::from_hms_opt(start, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(end, 0, 0).unwrap_or(NaiveTime::MIN),
        };
        Self::new(vec![shift("A", 6, 14), shift("B", 14, 22), shift("C", 22, 6)])
    }

    pub fn shifts(&self) -> &[Shift] {
        &self.shifts
    }

    /// Shift covering the wall-clock time of `instant`, if any
    pub fn shift_at<Tz: TimeZone>(&self, instant: &DateTime<Tz>) -> Option<&Shift> {
        let time = instant.naive_local().time();
        self.shifts.iter().find(|shift| shift.covers(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, NaiveDate};

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(y, m, d)
                .unwrap()
                .and_hms_opt(h, min, 0)
                .unwrap(),
        )
    }

    #[test]
    fn test_resolve_today() {
        let now = at(2024, 3, 15, 15, 30);
        let range = resolve(TimeRangeSelector::Today, &now);

        assert_eq!(range.start, at(2024, 3, 15, 0, 0));
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_resolve_today_uses_local_calendar_day() {
        let tz = FixedOffset::east_opt(3 * 3600).unwrap();
        let now = tz.with_ymd_and_hms(2024, 3, 15, 1, 30, 0).unwrap();
        let range = resolve(TimeRangeSelector::Today, &now);

        assert_eq!(range.start, tz.with_ymd_and_hms(2024, 3, 15, 0, 0, 0).unwrap());
        // Local midnight is the previous evening in UTC
        assert_eq!(range.to_utc().start, at(2024, 3, 14, 21, 0));
    }

    #[test]
    fn test_resolve_shift_is_fixed_lookback() {
        let now = at(2024, 3, 15, 15, 30);
        let range = resolve(TimeRangeSelector::Shift, &now);

        assert_eq!(range.start, at(2024, 3, 15, 7, 30));
        assert_eq!(range.end, now);
        assert_eq!(range.duration(), Duration::hours(8));
    }

    #[test]
    fn test_resolve_week() {
        let now = at(2024, 3, 15, 15, 30);
        let range = resolve(TimeRangeSelector::Week, &now);

        assert_eq!(range.start, at(2024, 3, 8, 15, 30));
        assert_eq!(range.end, now);
    }

    #[test]
    fn test_resolve_is_pure() {
        let now = at(2024, 3, 15, 15, 30);
        assert_eq!(
            resolve(TimeRangeSelector::Week, &now),
            resolve(TimeRangeSelector::Week, &now)
        );
    }

    #[test]
    fn test_unknown_selector_falls_back_to_today() {
        assert_eq!(TimeRangeSelector::parse_lenient("shfit"), TimeRangeSelector::Today);
        assert_eq!(TimeRangeSelector::parse_lenient(" Week "), TimeRangeSelector::Week);
        assert_eq!("shift".parse::<TimeRangeSelector>(), Ok(TimeRangeSelector::Shift));
    }

    #[test]
    fn test_range_contains_is_half_open() {
        let now = at(2024, 3, 15, 15, 30);
        let range = resolve(TimeRangeSelector::Today, &now);

        assert!(range.contains(&at(2024, 3, 15, 0, 0)));
        assert!(range.contains(&at(2024, 3, 15, 12, 0)));
        assert!(!range.contains(&now));
    }

    #[test]
    fn test_rfc3339_bounds() {
        let now = at(2024, 3, 15, 15, 30);
        let (start, end) = resolve(TimeRangeSelector::Today, &now).to_rfc3339();

        assert_eq!(start, "2024-03-15T00:00:00.000Z");
        assert_eq!(end, "2024-03-15T15:30:00.000Z");
    }

    #[test]
    fn test_shift_schedule() {
        let schedule = ShiftSchedule::three_shift();

        assert_eq!(schedule.shift_at(&at(2024, 3, 15, 6, 0)).unwrap().name, "A");
        assert_eq!(schedule.shift_at(&at(2024, 3, 15, 13, 59)).unwrap().name, "A");
        assert_eq!(schedule.shift_at(&at(2024, 3, 15, 14, 0)).unwrap().name, "B");
        assert_eq!(schedule.shift_at(&at(2024, 3, 15, 23, 0)).unwrap().name, "C");
        assert_eq!(schedule.shift_at(&at(2024, 3, 15, 2, 0)).unwrap().name, "C");
    }

    #[test]
    fn test_shift_parsing() {
        let shift = Shift::new("night", "22:00", "06:00").unwrap();
        assert!(shift.is_overnight());

        assert_eq!(
            Shift::new("bad", "25:00", "06:00"),
            Err(TimeRangeError::InvalidShiftTime("25:00".to_string()))
        );
        assert_eq!(
            Shift::new("empty", "06:00", "06:00"),
            Err(TimeRangeError::EmptyShift("empty".to_string()))
        );
    }

    #[test]
    fn test_schedule_with_gap() {
        let schedule = ShiftSchedule::new(vec![Shift::new("day", "08:00", "16:00").unwrap()]);
        assert!(schedule.shift_at(&at(2024, 3, 15, 20, 0)).is_none());
    }
}
