//! Completion toggle protocol and direct ledger edits.
//!
//! Every mutation here follows the same shape: validate the day, change the
//! ledger, then recompute the streak projection from the changed ledger. A
//! failed validation or ledger operation leaves the ledger untouched, so a
//! store can apply a [`Mutation`] and the new [`Streak`] as one unit.

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::completion::Completion;
use crate::models::habit::Habit;
use crate::models::streak::Streak;
use crate::streaks::ledger::{HabitLedger, LedgerError};
use crate::streaks::projection::{recompute, LongestPolicy};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    #[error("{date} is before the habit was created on {created_on}")]
    BeforeCreation {
        date: NaiveDate,
        created_on: NaiveDate,
    },

    #[error("{date} is in the future")]
    InFuture { date: NaiveDate, today: NaiveDate },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// What happened to the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerChange {
    Inserted(Completion),
    Removed(Completion),
}

impl LedgerChange {
    pub fn completion(&self) -> &Completion {
        match self {
            Self::Inserted(c) | Self::Removed(c) => c,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// A ledger change together with the streak it produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub change: LedgerChange,
    pub streak: Streak,
}

/// Result of a toggle as returned to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleOutcome {
    pub habit_id: Uuid,
    pub date: NaiveDate,
    pub completed: bool,
    pub streak: Streak,
}

impl ToggleOutcome {
    pub fn from_mutation(habit_id: Uuid, date: NaiveDate, mutation: Mutation) -> Self {
        Self {
            habit_id,
            date,
            completed: mutation.change.is_insert(),
            streak: mutation.streak,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StreakEngine {
    policy: LongestPolicy,
}

impl StreakEngine {
    pub fn new(policy: LongestPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> LongestPolicy {
        self.policy
    }

    /// Flip ledger membership of `date`: remove it if present, insert it
    /// otherwise.
    pub fn toggle(
        &self,
        habit: &Habit,
        ledger: &mut HabitLedger,
        streak: &Streak,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Mutation, CompletionError> {
        if ledger.exists(date) {
            self.remove(habit, ledger, streak, date, now)
        } else {
            self.insert(habit, ledger, streak, date, now)
        }
    }

    pub fn insert(
        &self,
        habit: &Habit,
        ledger: &mut HabitLedger,
        streak: &Streak,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Mutation, CompletionError> {
        ensure_creditable(habit, date, now.date_naive())?;

        let completion = Completion::new(habit.id, date, now);
        ledger.insert(completion.clone())?;

        Ok(Mutation {
            change: LedgerChange::Inserted(completion),
            streak: recompute(habit, ledger, streak, now, self.policy),
        })
    }

    /// Removal is allowed for any recorded day, including ones that would no
    /// longer pass validation.
    pub fn remove(
        &self,
        habit: &Habit,
        ledger: &mut HabitLedger,
        streak: &Streak,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Mutation, CompletionError> {
        let removed = ledger.remove(date)?;

        Ok(Mutation {
            change: LedgerChange::Removed(removed),
            streak: recompute(habit, ledger, streak, now, self.policy),
        })
    }
}

fn ensure_creditable(habit: &Habit, date: NaiveDate, today: NaiveDate) -> Result<(), CompletionError> {
    let created_on = habit.created_on();
    if date < created_on {
        return Err(CompletionError::BeforeCreation { date, created_on });
    }
    if date > today {
        return Err(CompletionError::InFuture { date, today });
    }
    Ok(())
}
