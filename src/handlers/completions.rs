use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    Extension, Json,
};
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::dto::{
    parse_iso_date, parse_toggle_request, CreateCompletionRequest, ToggleResponse,
};
use crate::error::AppResult;
use crate::models::completion::Completion;
use crate::AppState;

/// Flip completion of one day. An empty body toggles today.
pub async fn toggle_completion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ToggleResponse>> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let body = parse_toggle_request(content_type, &body)?;
    let date = match body.date {
        Some(raw) => parse_iso_date(&raw)?,
        None => state.today(),
    };

    let outcome = state
        .store
        .toggle_completion(auth_user.id, habit_id, date, state.now())
        .await?;

    tracing::info!(
        habit_id = %habit_id,
        date = %date,
        completed = outcome.completed,
        current_streak = outcome.streak.current_streak,
        "Completion toggled"
    );

    Ok(Json(outcome.into()))
}

pub async fn list_completions(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
) -> AppResult<Json<Vec<Completion>>> {
    let completions = state.store.list_completions(auth_user.id, habit_id).await?;
    Ok(Json(completions))
}

pub async fn create_completion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(habit_id): Path<Uuid>,
    Json(body): Json<CreateCompletionRequest>,
) -> AppResult<(StatusCode, Json<Completion>)> {
    let date = parse_iso_date(&body.completed_date)?;

    let (completion, streak) = state
        .store
        .insert_completion(auth_user.id, habit_id, date, state.now())
        .await?;

    tracing::info!(
        habit_id = %habit_id,
        date = %date,
        current_streak = streak.current_streak,
        "Completion recorded"
    );

    Ok((StatusCode::CREATED, Json(completion)))
}

pub async fn delete_completion(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path((habit_id, completion_id)): Path<(Uuid, Uuid)>,
) -> AppResult<StatusCode> {
    let streak = state
        .store
        .remove_completion(auth_user.id, habit_id, completion_id, state.now())
        .await?;

    tracing::info!(
        habit_id = %habit_id,
        completion_id = %completion_id,
        current_streak = streak.current_streak,
        "Completion removed"
    );

    Ok(StatusCode::NO_CONTENT)
}
