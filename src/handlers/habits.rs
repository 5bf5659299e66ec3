use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{validate_request, CalendarQuery, CreateHabitRequest, UpdateHabitRequest};
use crate::error::{AppError, AppResult};
use crate::models::habit::{HabitChanges, HabitView, NewHabit};
use crate::models::streak::StreakView;
use crate::streaks::{build_calendar, CalendarMonth, CalendarView};
use crate::AppState;

fn trimmed(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string())
}

pub async fn list_habits(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<Vec<HabitView>>> {
    let habits = state.store.list_habits(auth_user.id).await?;
    Ok(Json(habits.into_iter().map(HabitView::from).collect()))
}

pub async fn create_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(mut body): Json<CreateHabitRequest>,
) -> AppResult<(StatusCode, Json<HabitView>)> {
    body.name = body.name.trim().to_string();
    validate_request(&body)?;

    let habit = state
        .store
        .create_habit(
            auth_user.id,
            NewHabit {
                name: body.name,
                description: body.description,
            },
            state.now(),
        )
        .await?;

    tracing::info!(habit_id = %habit.habit.id, user_id = %auth_user.id, "Habit created");

    Ok((StatusCode::CREATED, Json(habit.into())))
}

pub async fn get_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<HabitView>> {
    let (habit, completions) = state.store.get_habit_detail(auth_user.id, habit_id).await?;

    Ok(Json(HabitView::from(habit).with_completions(completions)))
}

pub async fn update_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<UpdateHabitRequest>,
) -> AppResult<Json<HabitView>> {
    let body = UpdateHabitRequest {
        name: trimmed(body.name),
        description: body.description,
    };
    validate_request(&body)?;

    let habit = state
        .store
        .update_habit(
            auth_user.id,
            habit_id,
            HabitChanges {
                name: body.name,
                description: body.description,
            },
            state.now(),
        )
        .await?;

    Ok(Json(habit.into()))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.store.delete_habit(auth_user.id, habit_id).await?;
    tracing::info!(habit_id = %habit_id, user_id = %auth_user.id, "Habit deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Cached streak, as written by the last ledger mutation.
pub async fn get_streak(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<StreakView>> {
    let habit = state.store.get_habit(auth_user.id, habit_id).await?;
    Ok(Json(habit.streak.into()))
}

pub async fn get_calendar(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Query(query): Query<CalendarQuery>,
) -> AppResult<Json<CalendarView>> {
    let today = state.today();
    let month = match query.month.as_deref() {
        Some(raw) => raw
            .parse::<CalendarMonth>()
            .map_err(|e| AppError::Validation(e.to_string()))?,
        None => CalendarMonth::containing(today),
    };

    let habit = state.store.get_habit(auth_user.id, habit_id).await?;
    let completed = state
        .store
        .completion_dates(auth_user.id, habit_id, month.first_day(), month.last_day())
        .await?;

    Ok(Json(build_calendar(&habit.habit, month, &completed, today)))
}
