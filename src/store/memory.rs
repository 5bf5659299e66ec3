//! In-process store. All state sits behind one async mutex, so each call
//! (ledger change plus streak write) is atomic with respect to every other.
//! Used when no `DATABASE_URL` is configured and by the test suite.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::completion::Completion;
use crate::models::habit::{Habit, HabitChanges, HabitWithStreak, NewHabit};
use crate::models::streak::Streak;
use crate::models::user::{NewUser, User};
use crate::store::{HabitStore, StoreError, StoreResult};
use crate::streaks::{HabitLedger, LedgerChange, StreakEngine, ToggleOutcome};

#[derive(Clone, Default)]
pub struct MemoryStore {
    engine: StreakEngine,
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    habits: HashMap<Uuid, HabitRecord>,
}

struct HabitRecord {
    habit: Habit,
    ledger: HabitLedger,
    streak: Streak,
}

impl HabitRecord {
    fn snapshot(&self) -> HabitWithStreak {
        HabitWithStreak {
            habit: self.habit.clone(),
            streak: self.streak.clone(),
        }
    }
}

impl MemoryState {
    fn owned(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<&HabitRecord> {
        self.habits
            .get(&habit_id)
            .filter(|r| r.habit.user_id == owner)
            .ok_or(StoreError::HabitNotFound)
    }

    fn owned_mut(&mut self, owner: Uuid, habit_id: Uuid) -> StoreResult<&mut HabitRecord> {
        self.habits
            .get_mut(&habit_id)
            .filter(|r| r.habit.user_id == owner)
            .ok_or(StoreError::HabitNotFound)
    }
}

impl MemoryStore {
    pub fn new(engine: StreakEngine) -> Self {
        Self {
            engine,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser, now: DateTime<Utc>) -> StoreResult<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::EmailTaken);
        }

        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user(&self, user_id: Uuid) -> StoreResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.get(&user_id).cloned())
    }

    async fn create_habit(
        &self,
        owner: Uuid,
        habit: NewHabit,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak> {
        let habit = Habit {
            id: Uuid::new_v4(),
            user_id: owner,
            name: habit.name,
            description: habit.description,
            created_at: now,
            updated_at: now,
        };
        let record = HabitRecord {
            streak: Streak::zero(habit.id, now),
            habit,
            ledger: HabitLedger::new(),
        };
        let snapshot = record.snapshot();

        let mut state = self.state.lock().await;
        state.habits.insert(record.habit.id, record);
        Ok(snapshot)
    }

    async fn list_habits(&self, owner: Uuid) -> StoreResult<Vec<HabitWithStreak>> {
        let state = self.state.lock().await;
        let mut habits: Vec<_> = state
            .habits
            .values()
            .filter(|r| r.habit.user_id == owner)
            .map(HabitRecord::snapshot)
            .collect();
        habits.sort_by_key(|h| (h.habit.created_at, h.habit.id));
        Ok(habits)
    }

    async fn get_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<HabitWithStreak> {
        let state = self.state.lock().await;
        Ok(state.owned(owner, habit_id)?.snapshot())
    }

    async fn get_habit_detail(
        &self,
        owner: Uuid,
        habit_id: Uuid,
    ) -> StoreResult<(HabitWithStreak, Vec<Completion>)> {
        let state = self.state.lock().await;
        let record = state.owned(owner, habit_id)?;
        Ok((record.snapshot(), record.ledger.completions().cloned().collect()))
    }

    async fn update_habit(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        changes: HabitChanges,
        now: DateTime<Utc>,
    ) -> StoreResult<HabitWithStreak> {
        let mut state = self.state.lock().await;
        let record = state.owned_mut(owner, habit_id)?;
        if let Some(name) = changes.name {
            record.habit.name = name;
        }
        if let Some(description) = changes.description {
            record.habit.description = Some(description);
        }
        record.habit.updated_at = now;
        Ok(record.snapshot())
    }

    async fn delete_habit(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.owned(owner, habit_id)?;
        state.habits.remove(&habit_id);
        Ok(())
    }

    async fn list_completions(&self, owner: Uuid, habit_id: Uuid) -> StoreResult<Vec<Completion>> {
        let state = self.state.lock().await;
        Ok(state
            .owned(owner, habit_id)?
            .ledger
            .completions()
            .cloned()
            .collect())
    }

    async fn completion_dates(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> StoreResult<BTreeSet<NaiveDate>> {
        let state = self.state.lock().await;
        Ok(state
            .owned(owner, habit_id)?
            .ledger
            .dates_between(start, end)
            .collect())
    }

    async fn insert_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<(Completion, Streak)> {
        let mut state = self.state.lock().await;
        let record = state.owned_mut(owner, habit_id)?;

        let mutation = self
            .engine
            .insert(&record.habit, &mut record.ledger, &record.streak, date, now)?;
        record.streak = mutation.streak.clone();

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
        let mut state = self.state.lock().await;
        let record = state.owned_mut(owner, habit_id)?;
        let date = record
            .ledger
            .find_by_id(completion_id)
            .map(|c| c.completed_date)
            .ok_or(StoreError::CompletionNotFound)?;

        let mutation = self
            .engine
            .remove(&record.habit, &mut record.ledger, &record.streak, date, now)?;
        record.streak = mutation.streak.clone();

        tracing::debug!(habit_id = %habit_id, date = %date, "completion removed");
        Ok(mutation.streak)
    }

    async fn toggle_completion(
        &self,
        owner: Uuid,
        habit_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> StoreResult<ToggleOutcome> {
        let mut state = self.state.lock().await;
        let record = state.owned_mut(owner, habit_id)?;

        let mutation = self
            .engine
            .toggle(&record.habit, &mut record.ledger, &record.streak, date, now)?;
        record.streak = mutation.streak.clone();

        tracing::debug!(
            habit_id = %habit_id,
            date = %date,
            completed = matches!(mutation.change, LedgerChange::Inserted(_)),
            current_streak = mutation.streak.current_streak,
            "completion toggled"
        );
        Ok(ToggleOutcome::from_mutation(habit_id, date, mutation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaks::{CompletionError, LedgerError, LongestPolicy};
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, day, 10, 0, 0).unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    async fn store_with_habit() -> (MemoryStore, Uuid, Uuid) {
        let store = MemoryStore::new(StreakEngine::new(LongestPolicy::RunningMax));
        let owner = Uuid::new_v4();
        let habit = store
            .create_habit(
                owner,
                NewHabit {
                    name: "Meditate".into(),
                    description: None,
                },
                at(1),
            )
            .await
            .unwrap();
        (store, owner, habit.habit.id)
    }

    #[tokio::test]
    async fn test_new_habit_has_zero_streak() {
        let (store, owner, habit_id) = store_with_habit().await;
        let habit = store.get_habit(owner, habit_id).await.unwrap();
        assert_eq!(habit.streak, Streak::zero(habit_id, at(1)));
    }

    #[tokio::test]
    async fn test_habit_detail_is_one_snapshot() {
        let (store, owner, habit_id) = store_with_habit().await;
        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    store.toggle_completion(owner, habit_id, d(5), at(5)).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..50 {
            let (habit, completions) = store.get_habit_detail(owner, habit_id).await.unwrap();
            let done_today = completions.iter().any(|c| c.completed_date == d(5));
            assert_eq!(habit.streak.current_streak, i32::from(done_today));
            assert_eq!(
                habit.streak.last_completed_date,
                completions.last().map(|c| c.completed_date)
            );
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();

        let stranger = Uuid::new_v4();
        assert!(matches!(
            store.get_habit_detail(stranger, habit_id).await,
            Err(StoreError::HabitNotFound)
        ));
    }

    #[tokio::test]
    async fn test_foreign_habit_is_not_found() {
        let (store, _owner, habit_id) = store_with_habit().await;
        let stranger = Uuid::new_v4();

        let err = store.toggle_completion(stranger, habit_id, d(1), at(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::HabitNotFound));
        assert!(matches!(
            store.delete_habit(stranger, habit_id).await,
            Err(StoreError::HabitNotFound)
        ));
    }

    #[tokio::test]
    async fn test_toggle_updates_ledger_and_streak_together() {
        let (store, owner, habit_id) = store_with_habit().await;
        for day in 1..=3 {
            store.toggle_completion(owner, habit_id, d(day), at(day)).await.unwrap();
        }

        let habit = store.get_habit(owner, habit_id).await.unwrap();
        assert_eq!(habit.streak.current_streak, 3);
        assert_eq!(habit.streak.longest_streak, 3);
        assert_eq!(store.list_completions(owner, habit_id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_toggle_leaves_state_unchanged() {
        let (store, owner, habit_id) = store_with_habit().await;
        let before = store.get_habit(owner, habit_id).await.unwrap();

        let err = store.toggle_completion(owner, habit_id, d(9), at(2)).await.unwrap_err();
        assert!(matches!(err, StoreError::Completion(CompletionError::InFuture { .. })));

        assert_eq!(store.get_habit(owner, habit_id).await.unwrap(), before);
        assert!(store.list_completions(owner, habit_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_direct_insert_and_remove_recompute_streak() {
        let (store, owner, habit_id) = store_with_habit().await;
        let (completion, streak) = store.insert_completion(owner, habit_id, d(2), at(2)).await.unwrap();
        assert_eq!(streak.current_streak, 1);

        let dup = store.insert_completion(owner, habit_id, d(2), at(2)).await.unwrap_err();
        assert!(matches!(
            dup,
            StoreError::Completion(CompletionError::Ledger(LedgerError::DuplicateCompletion(_)))
        ));

        let streak = store.remove_completion(owner, habit_id, completion.id, at(2)).await.unwrap();
        assert_eq!(streak.current_streak, 0);
        assert_eq!(streak.last_completed_date, None);

        let missing = store.remove_completion(owner, habit_id, completion.id, at(2)).await.unwrap_err();
        assert!(matches!(missing, StoreError::CompletionNotFound));
    }

    #[tokio::test]
    async fn test_delete_cascades_and_blocks_later_toggles() {
        let (store, owner, habit_id) = store_with_habit().await;
        store.toggle_completion(owner, habit_id, d(1), at(1)).await.unwrap();

        store.delete_habit(owner, habit_id).await.unwrap();

        assert!(store.list_habits(owner).await.unwrap().is_empty());
        assert!(matches!(
            store.toggle_completion(owner, habit_id, d(1), at(1)).await,
            Err(StoreError::HabitNotFound)
        ));
        assert!(matches!(
            store.list_completions(owner, habit_id).await,
            Err(StoreError::HabitNotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_toggles_on_distinct_habits() {
        let store = MemoryStore::new(StreakEngine::default());
        let owner = Uuid::new_v4();
        let mut ids = Vec::new();
        for i in 0..8 {
            let habit = store
                .create_habit(
                    owner,
                    NewHabit {
                        name: format!("habit {i}"),
                        description: None,
                    },
                    at(1),
                )
                .await
                .unwrap();
            ids.push(habit.habit.id);
        }

        let tasks: Vec<_> = ids
            .iter()
            .map(|id| {
                let store = store.clone();
                let id = *id;
                tokio::spawn(async move { store.toggle_completion(owner, id, d(1), at(1)).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().completed);
        }

        for habit in store.list_habits(owner).await.unwrap() {
            assert_eq!(habit.streak.current_streak, 1);
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let store = MemoryStore::default();
        let user = NewUser {
            email: "ada@example.com".into(),
            password_hash: "hash".into(),
            name: "Ada".into(),
        };
        store.create_user(user.clone(), at(1)).await.unwrap();
        assert!(matches!(
            store.create_user(user, at(1)).await,
            Err(StoreError::EmailTaken)
        ));
        assert!(store.find_user_by_email("ada@example.com").await.unwrap().is_some());
    }
}
