//! Postgres store.
//!
//! Ledger mutations run in one transaction that first takes a row lock on the
//! habit (`SELECT ... FOR UPDATE`). Toggles, direct edits and deletes of the
//! same habit therefore serialize, and the completion change plus the streak
//! write commit or roll back together.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::models::completion::Completion;
use crate::models::habit::{Habit, HabitChanges, HabitWithStreak, NewHabit};
use crate::models::streak::Streak;
use crate::models::user::{NewUser, User};
use crate::store::{settle_toggle, HabitStore, StoreError, StoreResult};
use crate::streaks::{
    CompletionError, HabitLedger, LedgerChange, LedgerError, Mutation, StreakEngine, ToggleOutcome,
};

const HABIT_WITH_STREAK: &str = r#"
    SELECT h.id, h.user_id, h.name, h.description, h.created_at, h.updated_at,
           s.current_streak, s.longest_streak, s.last_completed_date,
           s.updated_at AS streak_updated_at
    FROM habits h
    JOIN streaks s ON s.habit_id = h.id
"#;

#[derive(FromRow)]
struct HabitStreakRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    current_streak: i32,
    longest_streak: i32,
    last_completed_date: Option<NaiveDate>,
    streak_updated_at: DateTime<Utc>,
}

impl From<HabitStreakRow> for HabitWithStreak {
    fn from(row: HabitStreakRow) -> Self {
        Self {
            habit: Habit {
                id: row.id,
                user_id: row.user_id,
                name: row.name,
                description: row.description,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            streak: Streak {
                habit_id: row.id,
                current_streak: row.current_streak,
                longest_streak: row.longest_streak,
                last_completed_date: row.last_completed_date,
                updated_at: row.streak_updated_at,
            },
        }
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    engine: StreakEngine,
}

impl PgStore {
    pub fn new(pool: PgPool, engine: StreakEngine) -> Self {
        Self { pool, engine }
    }

    async fn fetch_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<HabitWithStreak> {
        let sql = format!("{HABIT_WITH_STREAK} WHERE h.id = $1 AND h.user_id = $2");
        sqlx::query_as::<_, HabitStreakRow>(&sql)
            .bind(habit_id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .map(Into::into)
            .ok_or(StoreError::HabitNotFound)
    }

    /// Open a transaction holding the habit row lock, with the habit's ledger
    /// and streak loaded, run `f` against them and persist what it produced.
    async fn mutate<F>(&self, owner: Uuid, habit_id: Uuid, f: F) -> StoreResult<Mutation>
    where
        F: FnOnce(&Habit, &mut HabitLedger, &Streak) -> StoreResult<Mutation> + Send,
    {
        let mut tx = self.pool.begin().await?;

        let (habit, streak) = lock_habit(&mut *tx, owner, habit_id).await?;
        let mut ledger = load_ledger(&mut *tx, habit_id).await?;

        let mutation = f(&habit, &mut ledger, &streak)?;
        apply_change(&mut *tx, &mutation.change).await?;
        write_streak(&mut *tx, &mutation.streak).await?;

        tx.commit().await?;
        Ok(mutation)
    }
}

async fn lock_habit(
    conn: &mut PgConnection,
    owner: Uuid,
    habit_id: Uuid,
) -> StoreResult<(Habit, Streak)> {
    let habit = sqlx::query_as::<_, Habit>(
        "SELECT * FROM habits WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(habit_id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(StoreError::HabitNotFound)?;

    let streak = sqlx::query_as::<_, Streak>("SELECT * FROM streaks WHERE habit_id = $1")
        .bind(habit_id)
        .fetch_one(&mut *conn)
        .await?;

    Ok((habit, streak))
}

async fn load_ledger(conn: &mut PgConnection, habit_id: Uuid) -> StoreResult<HabitLedger> {
    let completions = sqlx::query_as::<_, Completion>(
        "SELECT * FROM completions WHERE habit_id = $1 ORDER BY completed_date ASC",
    )
    .bind(habit_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(completions.into_iter().collect())
}

async fn apply_change(conn: &mut PgConnection, change: &LedgerChange) -> StoreResult<()> {
    match change {
        LedgerChange::Inserted(c) => {
            // The unique (habit_id, completed_date) index is the last line of
            // defence if a writer ever bypasses the row lock.
            let inserted = sqlx::query(
                r#"
                INSERT INTO completions (id, habit_id, completed_date, created_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (habit_id, completed_date) DO NOTHING
                "#,
            )
            .bind(c.id)
            .bind(c.habit_id)
            .bind(c.completed_date)
            .bind(c.created_at)
            .execute(&mut *conn)
            .await?
            .rows_affected();

            if inserted == 0 {
                return Err(CompletionError::from(LedgerError::DuplicateCompletion(c.completed_date)).into());
            }
        }
        LedgerChange::Removed(c) => {
            sqlx::query("DELETE FROM completions WHERE id = $1")
                .bind(c.id)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

async fn write_streak(conn: &mut PgConnection, streak: &Streak) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE streaks SET
            current_streak = $2,
            longest_streak = $3,
            last_completed_date = $4,
            updated_at = $5
        WHERE habit_id = $1
        "#,
    )
    .bind(streak.habit_id)
    .bind(streak.current_streak)
    .bind(streak.longest_streak)
    .bind(streak.last_completed_date)
    .bind(streak.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[async_trait]
impl HabitStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let result = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(StoreError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn create_habit(
        &self,
        owner: Uuid,
        habit: NewHabit,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak> {
        let mut tx = self.pool.begin().await?;

        let habit = sqlx::query_as::<_, Habit>(
            r#"
            INSERT INTO habits (id, user_id, name, description, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner)
        .bind(&habit.name)
        .bind(&habit.description)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let streak = sqlx::query_as::<_, Streak>(
            r#"
            INSERT INTO streaks (habit_id, current_streak, longest_streak, updated_at)
            VALUES ($1, 0, 0, $2)
            RETURNING *
            "#,
        )
        .bind(habit.id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(HabitWithStreak { habit, streak })
    }

    async fn list_habits(&self, owner: Uuid) -> StoreResult<Vec<HabitWithStreak>> {
        let sql = format!("{HABIT_WITH_STREAK} WHERE h.user_id = $1 ORDER BY h.created_at ASC, h.id ASC");
        let rows = sqlx::query_as::<_, HabitStreakRow>(&sql)
            .bind(owner)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<HabitWithStreak> {
        self.fetch_habit(owner, habit_id).await
    }

    async fn get_habit_detail(
        &self,
        owner: Uuid,
        habit_id: Uuid,
    ) -> StoreResult<(HabitWithStreak, Vec<Completion>)> {
        let mut tx = self.pool.begin().await?;

        // FOR SHARE waits out any in-flight mutation holding the row lock and
        // keeps new ones out until both reads are done.
        let sql = format!(
            "{HABIT_WITH_STREAK} WHERE h.id = $1 AND h.user_id = $2 FOR SHARE OF h"
        );
        let habit: HabitWithStreak = sqlx::query_as::<_, HabitStreakRow>(&sql)
            .bind(habit_id)
            .bind(owner)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::HabitNotFound)?
            .into();
        let completions: Vec<Completion> =
            load_ledger(&mut *tx, habit_id).await?.completions().cloned().collect();

        tx.commit().await?;
        Ok((habit, completions))
    }

    async fn update_habit(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        changes: HabitChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak> {
        let updated = sqlx::query(
            r#"
            UPDATE habits SET
                name = COALESCE($3, name),
                description = COALESCE($4, description),
                updated_at = $5
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(habit_id)
        .bind(owner)
        .bind(&changes.name)
        .bind(&changes.description)
        .bind(now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::HabitNotFound);
        }
        self.fetch_habit(owner, habit_id).await
    }

    async fn delete_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_habit(&mut *tx, owner, habit_id).await?;

        // completions and streaks go with it via ON DELETE CASCADE
        sqlx::query("DELETE FROM habits WHERE id = $1")
            .bind(habit_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(habit_id = %habit_id, "habit deleted");
        Ok(())
    }

    async fn list_completions(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<Vec<Completion>> {
        self.fetch_habit(owner, habit_id).await?;
        let completions = sqlx::query_as::<_, Completion>(
            "SELECT * FROM completions WHERE habit_id = $1 ORDER BY completed_date ASC",
        )
        .bind(habit_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(completions)
    }

    async fn completion_dates(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        self.fetch_habit(owner, habit_id).await?;
        let dates = sqlx::query_scalar::<_, NaiveDate>(
            r#"
            SELECT completed_date FROM completions
            WHERE habit_id = $1 AND completed_date BETWEEN $2 AND $3
            "#,
        )
        .bind(habit_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;
        Ok(dates.into_iter().collect())
    }

    async fn insert_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<(Completion, Streak)> {
        let engine = self.engine;
        let mutation = self
            .mutate(owner, habit_id, move |habit, ledger, streak| {
                Ok(engine.insert(habit, ledger, streak, date, now)?)
            })
            .await?;

        tracing::debug!(habit_id = %habit_id, date = %date, "completion inserted");
        Ok((mutation.change.completion().clone(), mutation.streak))
    }

    async fn remove_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        completion_id: Uuid,
        now: DateTime<Utc>,
    ) -> StoreResult<Streak> {
        let engine = self.engine;
        let mutation = self
            .mutate(owner, habit_id, move |habit, ledger, streak| {
                let date = ledger
                    .find_by_id(completion_id)
                    .map(|c| c.completed_date)
                    .ok_or(StoreError::CompletionNotFound)?;
                Ok(engine.remove(habit, ledger, streak, date, now)?)
            })
            .await?;

        tracing::debug!(habit_id = %habit_id, "completion removed");
        Ok(mutation.streak)
    }

    async fn toggle_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<ToggleOutcome> {
        let engine = self.engine;
        let result = self
            .mutate(owner, habit_id, move |habit, ledger, streak| {
                Ok(engine.toggle(habit, ledger, streak, date, now)?)
            })
            .await;

        if let Ok(mutation) = &result {
            tracing::debug!(
                habit_id = %habit_id,
                date = %date,
                completed = mutation.change.is_insert(),
                current_streak = mutation.streak.current_streak,
                "completion toggled"
            );
        }

        settle_toggle(result, habit_id, date, move || async move {
            self.fetch_habit(owner, habit_id).await.map(|h| h.streak)
        })
        .await
    }
}
