//! Request/response contracts for the v1 API.
//!
//! Conventions:
//! - `*Request`  -> deserialized from client JSON body or query params
//! - `*Response` -> serialized to client JSON
//! - Field rules are expressed via `validator` derive macros
//! - Dates travel as ISO 8601 calendar dates (`YYYY-MM-DD`) and are parsed
//!   here, before anything reaches the ledger

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::streak::StreakView;
use crate::models::user::UserProfile;
use crate::streaks::ToggleOutcome;

// ============================================================================
// Auth
// ============================================================================

/// POST /api/v1/auth/signup
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(
        email(message = "Invalid email format"),
        length(max = 254, message = "Email too long")
    )]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

/// POST /api/v1/auth/login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Response for signup and login
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// GET /api/v1/auth/me
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: UserProfile,
}

// ============================================================================
// Habits
// ============================================================================

/// POST /api/v1/habits
#[derive(Debug, Deserialize, Validate)]
pub struct CreateHabitRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,
}

/// PUT /api/v1/habits/:id, partial update
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateHabitRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 2000, message = "Description must be under 2000 characters"))]
    pub description: Option<String>,
}

/// GET /api/v1/habits/:id/calendar
#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    /// `YYYY-MM`. Default: the current month.
    pub month: Option<String>,
}

// ============================================================================
// Completions
// ============================================================================

/// POST /api/v1/habits/:id/toggle_completion
#[derive(Debug, Default, Deserialize)]
pub struct ToggleRequest {
    /// Day to toggle. Default: today.
    pub date: Option<String>,
}

/// POST /api/v1/habits/:id/completions
#[derive(Debug, Deserialize)]
pub struct CreateCompletionRequest {
    pub completed_date: String,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub habit_id: Uuid,
    pub date: NaiveDate,
    pub completed: bool,
    pub streak: StreakView,
}

impl From<ToggleOutcome> for ToggleResponse {
    fn from(outcome: ToggleOutcome) -> Self {
        Self {
            habit_id: outcome.habit_id,
            date: outcome.date,
            completed: outcome.completed,
            streak: outcome.streak.into(),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_iso_date(raw: &str) -> AppResult<NaiveDate> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return Err(invalid_date(raw));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid_date(raw))
}

fn invalid_date(raw: &str) -> AppError {
    AppError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
}

/// Decode a toggle body. Only an empty body means "today"; anything else
/// must be a JSON object sent as `application/json`.
pub fn parse_toggle_request(content_type: Option<&str>, body: &[u8]) -> AppResult<ToggleRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ToggleRequest::default());
    }

    let is_json = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false);
    if !is_json {
        return Err(AppError::Validation(
            "Expected request with `Content-Type: application/json`".into(),
        ));
    }

    serde_json::from_slice(body)
        .map_err(|e| AppError::Validation(format!("Invalid toggle request: {}", e)))
}

pub fn validate_request<T: Validate>(body: &T) -> AppResult<()> {
    body.validate()
        .map_err(|e| AppError::Validation(e.to_string()))
}
