//! Calendar helpers for synchronization windows.

use chrono::{NaiveDate, Utc};
use std::fmt;

/// The current calendar day (UTC).
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// First day of the given year.
pub fn start_of_year(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default()
}

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    /// First day of the window.
    pub from: NaiveDate,
    /// Last day of the window (inclusive).
    pub to: NaiveDate,
}

impl DateWindow {
    /// Create a new window.
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        Self { from, to }
    }

    /// A window covering a single day.
    pub fn single(date: NaiveDate) -> Self {
        Self {
            from: date,
            to: date,
        }
    }

    /// Check that the window is non-empty.
    pub fn is_valid(&self) -> bool {
        self.from <= self.to
    }

    /// Number of days covered, inclusive of both ends.
    pub fn days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    /// Check whether a day falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_start_of_year() {
        assert_eq!(start_of_year(2024), day(2024, 1, 1));
    }

    #[test]
    fn test_window_days_inclusive() {
        let window = DateWindow::new(day(2024, 1, 1), day(2024, 1, 31));
        assert_eq!(window.days(), 31);

        assert_eq!(DateWindow::single(day(2024, 1, 1)).days(), 1);
    }

    #[test]
    fn test_window_contains() {
        let window = DateWindow::new(day(2024, 1, 10), day(2024, 1, 20));

        assert!(window.contains(day(2024, 1, 10)));
        assert!(window.contains(day(2024, 1, 20)));
        assert!(!window.contains(day(2024, 1, 9)));
        assert!(!window.contains(day(2024, 1, 21)));
    }

    #[test]
    fn test_window_validity() {
        assert!(DateWindow::new(day(2024, 1, 1), day(2024, 1, 2)).is_valid());
        assert!(!DateWindow::new(day(2024, 1, 2), day(2024, 1, 1)).is_valid());
    }
}
