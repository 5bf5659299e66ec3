//! Streak and completion consistency engine.
//!
//! The ledger holds per-day completion facts, the calculator derives streaks
//! from them over a date window, the projection keeps the cached per-habit
//! streak in step with the ledger, and the toggle protocol is the single
//! mutation exposed to clients. Nothing in here performs I/O; the stores in
//! `crate::store` wrap these operations in whatever transaction they have.

pub mod calculator;
pub mod calendar;
pub mod ledger;
pub mod projection;
pub mod toggle;

pub use calendar::{build_calendar, CalendarMonth, CalendarView};
pub use ledger::{HabitLedger, LedgerError};
pub use projection::LongestPolicy;
pub use toggle::{CompletionError, LedgerChange, Mutation, StreakEngine, ToggleOutcome};
