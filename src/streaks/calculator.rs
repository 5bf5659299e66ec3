//! Windowed streak arithmetic.
//!
//! Both consumers of completion data go through [`compute_streak`]: the
//! streak projection uses [`StreakWindow::full_history`] (habit creation up to
//! today) and the calendar view, through `CalendarMonth::window`, uses
//! [`StreakWindow::month`] (one month, clipped to creation day and today).
//! The window end is the reference day the current streak is anchored to.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl StreakWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Entire life of a habit, from its creation day through `today`.
    pub fn full_history(created_on: NaiveDate, today: NaiveDate) -> Self {
        Self::new(created_on, today)
    }

    /// The month `first..=last`, starting no earlier than the creation day
    /// and ending no later than `today`.
    pub fn month(
        first: NaiveDate,
        last: NaiveDate,
        created_on: NaiveDate,
        today: NaiveDate,
    ) -> Self {
        Self::new(first.max(created_on), last.min(today))
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }

    /// Number of eligible days, zero for an empty window.
    pub fn len_days(&self) -> i32 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start).num_days() as i32 + 1
        }
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |day| *day <= end)
    }
}

/// Summary of a window of per-day completion flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WindowStreak {
    /// Consecutive completed days ending at the window end.
    pub current: i32,
    /// Longest run of consecutive completed days inside the window.
    pub best: i32,
    pub completed_days: i32,
    pub eligible_days: i32,
}

impl WindowStreak {
    /// Completed share of eligible days as a rounded whole percentage.
    pub fn rate_percent(&self) -> i32 {
        if self.eligible_days == 0 {
            return 0;
        }
        ((f64::from(self.completed_days) / f64::from(self.eligible_days)) * 100.0).round() as i32
    }
}

/// Walk backward from the window end while each day is completed. Stops at
/// the first gap or at the window start, whichever comes first.
pub fn current_streak<F>(window: StreakWindow, is_completed: F) -> i32
where
    F: Fn(NaiveDate) -> bool,
{
    let mut streak = 0;
    let mut day = window.end;
    while window.contains(day) && is_completed(day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

pub fn compute_streak<F>(window: StreakWindow, is_completed: F) -> WindowStreak
where
    F: Fn(NaiveDate) -> bool,
{
    let current = current_streak(window, &is_completed);

    let mut run = 0;
    let mut best = 0;
    let mut completed_days = 0;
    for day in window.days() {
        if is_completed(day) {
            run += 1;
            completed_days += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }

    WindowStreak {
        current,
        best,
        completed_days,
        eligible_days: window.len_days(),
    }
}

pub fn last_day_of_month(first: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn set(days: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        days.iter().copied().collect()
    }

    #[test]
    fn test_current_streak_breaks_at_first_gap() {
        let done = set(&[d(2025, 7, 1), d(2025, 7, 2), d(2025, 7, 3), d(2025, 7, 5)]);
        let window = StreakWindow::full_history(d(2025, 7, 1), d(2025, 7, 5));

        let stats = compute_streak(window, |day| done.contains(&day));
        assert_eq!(stats.current, 1);
        assert_eq!(stats.best, 3);
        assert_eq!(stats.completed_days, 4);
        assert_eq!(stats.eligible_days, 5);
    }

    #[test]
    fn test_current_streak_zero_after_gap_day() {
        let created = d(2025, 3, 10);
        let done = set(&[created, d(2025, 3, 11), d(2025, 3, 12)]);

        let on_gap = StreakWindow::full_history(created, d(2025, 3, 13));
        assert_eq!(current_streak(on_gap, |day| done.contains(&day)), 0);

        let on_last = StreakWindow::full_history(created, d(2025, 3, 12));
        assert_eq!(current_streak(on_last, |day| done.contains(&day)), 3);
    }

    #[test]
    fn test_walk_never_crosses_window_start() {
        // Completions before creation are not creditable.
        let done = set(&[d(2025, 6, 29), d(2025, 6, 30), d(2025, 7, 1), d(2025, 7, 2)]);
        let window = StreakWindow::full_history(d(2025, 7, 1), d(2025, 7, 2));

        let stats = compute_streak(window, |day| done.contains(&day));
        assert_eq!(stats.current, 2);
        assert_eq!(stats.best, 2);
    }

    #[test]
    fn test_fresh_habit_has_zero_streak() {
        let today = d(2025, 7, 1);
        let stats = compute_streak(StreakWindow::full_history(today, today), |_| false);
        assert_eq!(stats, WindowStreak { eligible_days: 1, ..Default::default() });
        assert_eq!(stats.rate_percent(), 0);
    }

    #[test]
    fn test_month_window_clips_to_creation_and_today() {
        let window = StreakWindow::month(d(2025, 7, 1), d(2025, 7, 31), d(2025, 7, 10), d(2025, 7, 20));
        assert_eq!(window, StreakWindow::new(d(2025, 7, 10), d(2025, 7, 20)));
        assert_eq!(window.len_days(), 11);

        let past = StreakWindow::month(d(2025, 2, 1), d(2025, 2, 28), d(2024, 1, 1), d(2025, 7, 20));
        assert_eq!(past, StreakWindow::new(d(2025, 2, 1), d(2025, 2, 28)));
    }

    #[test]
    fn test_month_window_empty_before_creation() {
        let window = StreakWindow::month(d(2025, 6, 1), d(2025, 6, 30), d(2025, 7, 3), d(2025, 7, 20));
        assert!(window.is_empty());
        assert_eq!(window.days().count(), 0);
        assert_eq!(compute_streak(window, |_| true), WindowStreak::default());
    }

    #[test]
    fn test_month_streak_is_bounded_by_first_of_month() {
        // A run spanning the month boundary only counts the in-month part.
        let done = set(&[d(2025, 6, 29), d(2025, 6, 30), d(2025, 7, 1), d(2025, 7, 2)]);
        let month = StreakWindow::month(d(2025, 7, 1), d(2025, 7, 31), d(2025, 1, 1), d(2025, 7, 2));
        let full = StreakWindow::full_history(d(2025, 1, 1), d(2025, 7, 2));

        assert_eq!(current_streak(month, |day| done.contains(&day)), 2);
        assert_eq!(current_streak(full, |day| done.contains(&day)), 4);
    }

    #[test]
    fn test_rate_percent_rounds() {
        let stats = WindowStreak {
            current: 0,
            best: 1,
            completed_days: 2,
            eligible_days: 3,
        };
        assert_eq!(stats.rate_percent(), 67);
    }

    #[test]
    fn test_last_day_of_month_handles_december_and_leap_years() {
        assert_eq!(last_day_of_month(d(2025, 12, 1)), Some(d(2025, 12, 31)));
        assert_eq!(last_day_of_month(d(2024, 2, 1)), Some(d(2024, 2, 29)));
    }
}
