//! Persistence port for users, habits, the completion ledger and the streak
//! projection.
//!
//! Implementations must make every ledger mutation and its streak write
//! observable as one unit per habit, and must scope every habit lookup to its
//! owner so foreign habits look exactly like missing ones.

use std::collections::BTreeSet;
use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::completion::Completion;
use crate::models::habit::{HabitChanges, HabitWithStreak, NewHabit};
use crate::models::streak::Streak;
use crate::models::user::{NewUser, User};
use crate::streaks::{CompletionError, LedgerError, Mutation, ToggleOutcome};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("habit not found")]
    HabitNotFound,

    #[error("completion not found")]
    CompletionNotFound,

    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait HabitStore: Send + Sync {
    /// Cheap reachability check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>>;

    /// Create a habit together with its zero-valued streak.
    async fn create_habit(
        &self,
        owner: Uuid,
        habit: NewHabit,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak>;

    async fn list_habits(&self, owner: Uuid) -> StoreResult<Vec<HabitWithStreak>>;

    async fn get_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<HabitWithStreak>;

    /// Habit, streak and completions (ascending by date) read as one
    /// consistent snapshot.
    async fn get_habit_detail(
        &self,
        owner: Uuid,
        habit_id: Uuid,
    ) -> StoreResult<(HabitWithStreak, Vec<Completion>)>;

    async fn update_habit(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        changes: HabitChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak>;

    /// Delete a habit with its completions and streak. Serialized against
    /// in-flight mutations on the same habit.
    async fn delete_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<()>;

    /// All completions of a habit, ascending by date.
    async fn list_completions(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<Vec<Completion>>;

    /// Completed days of a habit within `start..=end`.
    async fn completion_dates(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<BTreeSet<NaiveDate>>;

    /// Direct ledger insert. A day that is already recorded fails with
    /// `DuplicateCompletion`.
    async fn insert_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<(Completion, Streak)>;

    /// Direct ledger removal by completion id.
    async fn remove_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        completion_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Streak>;

    /// Flip completion of `date` and return the new state with the refreshed
    /// streak.
    async fn toggle_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<ToggleOutcome>;
}

/// Finish a toggle. A toggle whose insert lost a race against another writer
/// completing the same day reports the day as completed, with the streak
/// re-read from the store rather than the one computed by the failed attempt.
pub(crate) async fn settle_toggle<F, Fut>(
    result: StoreResult<Mutation>,
    habit_id: Uuid,
    date: NaiveDate,
    reread_streak: F,
) -> StoreResult<ToggleOutcome>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = StoreResult<Streak>>,
{
    match result {
        Ok(mutation) => Ok(ToggleOutcome::from_mutation(habit_id, date, mutation)),
        Err(StoreError::Completion(CompletionError::Ledger(LedgerError::DuplicateCompletion(_)))) => {
            tracing::warn!(habit_id = %habit_id, date = %date, "concurrent completion absorbed");
            Ok(ToggleOutcome {
                habit_id,
                date,
                completed: true,
                streak: reread_streak().await?,
            })
        }
        Err(err) => Err(err),
    }
}
