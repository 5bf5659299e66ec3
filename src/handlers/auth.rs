use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::auth::{
    jwt::create_token,
    middleware::AuthUser,
    password::{hash_password, verify_against_dummy, verify_password},
};
use crate::dto::{validate_request, AuthResponse, LoginRequest, MeResponse, SignupRequest};
use crate::error::{AppError, AppResult};
use crate::models::user::{NewUser, User};
use crate::AppState;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue(user: User, state: &AppState) -> AppResult<AuthResponse> {
    let token = create_token(user.id, &user.email, &state.config)?;
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

pub async fn signup(
    State(state): State<AppState>,
    Json(mut body): Json<SignupRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    body.email = normalize_email(&body.email);
    body.name = body.name.trim().to_string();
    validate_request(&body)?;

    let password_hash = hash_password(&body.password)?;
    let user = state
        .store
        .create_user(
            NewUser {
                email: body.email,
                password_hash,
                name: body.name,
            },
            state.now(),
        )
        .await?;

    tracing::info!(user_id = %user.id, "User signed up");

    Ok((StatusCode::CREATED, Json(issue(user, &state)?)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = normalize_email(&body.email);

    let Some(user) = state.store.find_user_by_email(&email).await? else {
        verify_against_dummy(&body.password);
        return Err(AppError::Unauthorized);
    };

    if !verify_password(&body.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Err(AppError::Unauthorized);
    }

    Ok(Json(issue(user, &state)?))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<MeResponse>> {
    // A valid token for a deleted account is treated like no token at all.
    let user = state
        .store
        .find_user(auth_user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(MeResponse { user: user.into() }))
}
