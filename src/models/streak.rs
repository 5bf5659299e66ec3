use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Denormalized streak projection, one per habit. Only ever written by the
/// streak engine after a ledger mutation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Streak {
    pub habit_id: Uuid,
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_completed_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Streak {
    pub fn zero(habit_id: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            habit_id,
            current_streak: 0,
            longest_streak: 0,
            last_completed_date: None,
            updated_at: at,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreakView {
    pub current_streak: i32,
    pub longest_streak: i32,
    pub last_completed_date: Option<NaiveDate>,
}

impl From<Streak> for StreakView {
    fn from(s: Streak) -> Self {
        Self {
            current_streak: s.current_streak,
            longest_streak: s.longest_streak,
            last_completed_date: s.last_completed_date,
        }
    }
}
