use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};

use crate::models::habit::Habit;
use crate::models::streak::Streak;
use crate::streaks::calculator::{compute_streak, current_streak, StreakWindow};
use crate::streaks::ledger::HabitLedger;

/// How `longest_streak` is maintained when the ledger changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LongestPolicy {
    /// `longest = max(previous longest, current)`. Never decreases, even when
    /// historical completions are removed.
    #[default]
    RunningMax,
    /// Longest run over the whole history, rescanned on every mutation.
    Rescan,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown longest streak policy '{0}', expected 'running_max' or 'rescan'")]
pub struct UnknownPolicy(String);

impl FromStr for LongestPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "running_max" => Ok(Self::RunningMax),
            "rescan" => Ok(Self::Rescan),
            other => Err(UnknownPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for LongestPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunningMax => f.write_str("running_max"),
            Self::Rescan => f.write_str("rescan"),
        }
    }
}

/// Derive the new streak projection for `habit` from its ledger as of `now`.
pub fn recompute(
    habit: &Habit,
    ledger: &HabitLedger,
    previous: &Streak,
    now: DateTime<Utc>,
    policy: LongestPolicy,
) -> Streak {
    let window = StreakWindow::full_history(habit.created_on(), now.date_naive());
    let is_completed = |day: NaiveDate| ledger.exists(day);

    let (current, longest) = match policy {
        LongestPolicy::RunningMax => {
            let current = current_streak(window, is_completed);
            (current, previous.longest_streak.max(current))
        }
        LongestPolicy::Rescan => {
            let stats = compute_streak(window, is_completed);
            (stats.current, stats.best)
        }
    };

    Streak {
        habit_id: habit.id,
        current_streak: current,
        longest_streak: longest,
        last_completed_date: ledger.max_date(),
        updated_at: now,
    }
}
