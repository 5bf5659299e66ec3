pub mod completion;
pub mod habit;
pub mod streak;
pub mod user;
