use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::completion::Completion;
use crate::models::streak::{Streak, StreakView};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Habit {
    /// Calendar day the habit came into existence. Completions before this
    /// day are never creditable.
    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

#[derive(Debug, Clone)]
pub struct NewHabit {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HabitChanges {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A habit joined with its streak projection.
#[derive(Debug, Clone, PartialEq)]
pub struct HabitWithStreak {
    pub habit: Habit,
    pub streak: Streak,
}

#[derive(Debug, Serialize)]
pub struct HabitView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub streak: StreakView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completions: Option<Vec<Completion>>,
}

impl From<HabitWithStreak> for HabitView {
    fn from(h: HabitWithStreak) -> Self {
        Self {
            id: h.habit.id,
            name: h.habit.name,
            description: h.habit.description,
            created_at: h.habit.created_at,
            streak: h.streak.into(),
            completions: None,
        }
    }
}

impl HabitView {
    pub fn with_completions(mut self, completions: Vec<Completion>) -> Self {
        self.completions = Some(completions);
        self
    }
}
