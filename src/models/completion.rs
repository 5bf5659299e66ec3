use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A single "done on this day" fact. Absence of a row means "not done".
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq)]
pub struct Completion {
    pub id: Uuid,
    pub habit_id: Uuid,
    pub completed_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Completion {
    pub fn new(habit_id: Uuid, completed_date: NaiveDate, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            habit_id,
            completed_date,
            created_at,
        }
    }
}
