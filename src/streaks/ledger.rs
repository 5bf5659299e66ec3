use std::collections::BTreeMap;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::completion::Completion;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("already completed on {0}")]
    DuplicateCompletion(NaiveDate),

    #[error("no completion recorded on {0}")]
    NotFound(NaiveDate),
}

/// Completion facts for one habit, at most one per calendar day.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HabitLedger {
    entries: BTreeMap<NaiveDate, Completion>,
}

impl HabitLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, date: NaiveDate) -> bool {
        self.entries.contains_key(&date)
    }

    /// Record a completion. Fails rather than overwriting when the day is
    /// already recorded; callers decide whether that is a no-op.
    pub fn insert(&mut self, completion: Completion) -> Result<(), LedgerError> {
        let date = completion.completed_date;
        if self.entries.contains_key(&date) {
            return Err(LedgerError::DuplicateCompletion(date));
        }
        self.entries.insert(date, completion);
        Ok(())
    }

    pub fn remove(&mut self, date: NaiveDate) -> Result<Completion, LedgerError> {
        self.entries.remove(&date).ok_or(LedgerError::NotFound(date))
    }

    pub fn max_date(&self) -> Option<NaiveDate> {
        self.entries.keys().next_back().copied()
    }

    pub fn find_by_id(&self, id: Uuid) -> Option<&Completion> {
        self.entries.values().find(|c| c.id == id)
    }

    /// Completions in ascending date order.
    pub fn completions(&self) -> impl Iterator<Item = &Completion> {
        self.entries.values()
    }

    pub fn dates_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> impl Iterator<Item = NaiveDate> + '_ {
        let upper = if end < start { start } else { end };
        self.entries
            .range(start..=upper)
            .map(|(date, _)| *date)
            .filter(move |date| *date <= end)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<Completion> for HabitLedger {
    fn from_iter<I: IntoIterator<Item = Completion>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|c| (c.completed_date, c))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, day).unwrap()
    }

    fn completion(habit_id: Uuid, day: u32) -> Completion {
        Completion::new(habit_id, d(day), Utc.with_ymd_and_hms(2025, 7, day, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_insert_then_remove_clears_existence() {
        let habit_id = Uuid::new_v4();
        let mut ledger = HabitLedger::new();

        ledger.insert(completion(habit_id, 3)).unwrap();
        assert!(ledger.exists(d(3)));

        ledger.remove(d(3)).unwrap();
        assert!(!ledger.exists(d(3)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_duplicate_insert_is_rejected_and_keeps_original() {
        let habit_id = Uuid::new_v4();
        let mut ledger = HabitLedger::new();
        let first = completion(habit_id, 3);
        ledger.insert(first.clone()).unwrap();

        let err = ledger.insert(completion(habit_id, 3)).unwrap_err();
        assert_eq!(err, LedgerError::DuplicateCompletion(d(3)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.find_by_id(first.id), Some(&first));
    }

    #[test]
    fn test_remove_missing_reports_not_found() {
        let mut ledger = HabitLedger::new();
        assert_eq!(ledger.remove(d(9)), Err(LedgerError::NotFound(d(9))));
    }

    #[test]
    fn test_max_date_tracks_latest_completion() {
        let habit_id = Uuid::new_v4();
        let mut ledger: HabitLedger = [completion(habit_id, 5), completion(habit_id, 1)]
            .into_iter()
            .collect();
        assert_eq!(ledger.max_date(), Some(d(5)));

        ledger.remove(d(5)).unwrap();
        assert_eq!(ledger.max_date(), Some(d(1)));

        ledger.remove(d(1)).unwrap();
        assert_eq!(ledger.max_date(), None);
    }

    #[test]
    fn test_dates_between_is_inclusive_and_ordered() {
        let habit_id = Uuid::new_v4();
        let ledger: HabitLedger = [1, 4, 7, 10]
            .into_iter()
            .map(|day| completion(habit_id, day))
            .collect();

        let dates: Vec<_> = ledger.dates_between(d(4), d(10)).collect();
        assert_eq!(dates, vec![d(4), d(7), d(10)]);
        assert_eq!(ledger.dates_between(d(8), d(2)).count(), 0);
    }
}
