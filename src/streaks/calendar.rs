//! Month-scoped calendar view.
//!
//! Answers "how did this month go", which is deliberately not the same
//! question as the cached streak projection: the current streak here is
//! bounded by the first of the displayed month.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use uuid::Uuid;

use crate::models::habit::Habit;
use crate::streaks::calculator::{compute_streak, last_day_of_month, StreakWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarMonth {
    year: i32,
    month: u32,
    first: NaiveDate,
    last: NaiveDate,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid month '{0}', expected YYYY-MM")]
pub struct InvalidMonth(String);

impl CalendarMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let last = last_day_of_month(first)?;
        Some(Self {
            year,
            month,
            first,
            last,
        })
    }

    pub fn containing(date: NaiveDate) -> Self {
        let first = date.with_day(1).unwrap_or(date);
        Self {
            year: date.year(),
            month: date.month(),
            first,
            last: last_day_of_month(first).unwrap_or(date),
        }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first
    }

    pub fn last_day(&self) -> NaiveDate {
        self.last
    }

    pub fn window(&self, created_on: NaiveDate, today: NaiveDate) -> StreakWindow {
        StreakWindow::month(self.first, self.last, created_on, today)
    }
}

impl FromStr for CalendarMonth {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

impl fmt::Display for CalendarMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub completed: bool,
    /// Days before the habit existed and days after today cannot be toggled.
    pub clickable: bool,
    pub is_today: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct MonthSummary {
    pub current: i32,
    pub best: i32,
    pub rate: i32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarView {
    pub habit_id: Uuid,
    pub month: String,
    pub summary: MonthSummary,
    pub days: Vec<CalendarDay>,
}

/// Build the calendar for `month` from the completion dates inside it.
pub fn build_calendar(
    habit: &Habit,
    month: CalendarMonth,
    completed: &BTreeSet<NaiveDate>,
    today: NaiveDate,
) -> CalendarView {
    let created_on = habit.created_on();
    let window = month.window(created_on, today);
    let stats = compute_streak(window, |day| completed.contains(&day));

    let days = StreakWindow::new(month.first_day(), month.last_day())
        .days()
        .map(|date| CalendarDay {
            date,
            completed: completed.contains(&date),
            clickable: date >= created_on && date <= today,
            is_today: date == today,
        })
        .collect();

    CalendarView {
        habit_id: habit.id,
        month: month.to_string(),
        summary: MonthSummary {
            current: stats.current,
            best: stats.best,
            rate: stats.rate_percent(),
        },
        days,
    }
}
