//! Habit streak and progress calculation.
//!
//! Completion dates are exchanged as `YYYY-MM-DD` strings. "Today" is always
//! the UTC calendar date so a streak never depends on the caller's timezone.

use std::collections::BTreeSet;

use chrono::{Days, NaiveDate, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Derived habit counters, written back onto the habit row after every change
/// to its completion dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakResult {
    pub streak: u32,
    pub progress: u8,
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Valid, unique dates. Malformed entries are dropped.
fn unique_dates<S: AsRef<str>>(dates: &[S]) -> BTreeSet<NaiveDate> {
    dates.iter().filter_map(|d| parse_date(d.as_ref())).collect()
}

/// Canonical form for storage: valid dates only, deduplicated, ascending.
pub fn normalize<S: AsRef<str>>(dates: &[S]) -> Vec<String> {
    unique_dates(dates).into_iter().map(format_date).collect()
}

/// Flip completion for `day`. Returns the normalized date list and whether
/// `day` is complete afterwards.
pub fn toggle<S: AsRef<str>>(dates: &[S], day: NaiveDate) -> (Vec<String>, bool) {
    let mut set = unique_dates(dates);
    let completed = if set.remove(&day) {
        false
    } else {
        set.insert(day);
        true
    };
    (set.into_iter().map(format_date).collect(), completed)
}

/// Consecutive completed days ending at `today`.
///
/// If `today` has not been marked yet, counting starts from yesterday instead;
/// the streak only breaks once a whole day is skipped. Dates after `today`
/// are ignored.
pub fn compute_streak<S: AsRef<str>>(completed_dates: &[S], today: NaiveDate) -> u32 {
    let dates = unique_dates(completed_dates);

    let mut cursor = if dates.contains(&today) {
        today
    } else {
        match today.checked_sub_days(Days::new(1)) {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    for date in dates.range(..=cursor).rev() {
        if *date != cursor {
            break;
        }
        streak += 1;
        match cursor.checked_sub_days(Days::new(1)) {
            Some(prev) => cursor = prev,
            None => break,
        }
    }
    streak
}

/// Percentage of `target` reached by the number of distinct valid dates,
/// rounded half away from zero and capped at 100. A non-positive target
/// yields 0.
pub fn compute_progress<S: AsRef<str>>(completed_dates: &[S], target: i64) -> u8 {
    if target <= 0 {
        return 0;
    }
    let count = unique_dates(completed_dates).len() as f64;
    let pct = (count * 100.0 / target as f64).min(100.0).round();
    pct.clamp(0.0, 100.0) as u8
}

pub fn evaluate<S: AsRef<str>>(completed_dates: &[S], target: i64, today: NaiveDate) -> StreakResult {
    StreakResult {
        streak: compute_streak(completed_dates, today),
        progress: compute_progress(completed_dates, target),
    }
}
