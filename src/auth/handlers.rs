use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
            ResetPasswordRequest, UserResponse,
        },
        jwt::{AuthUser, JwtKeys},
        services::{self, Session},
    },
    error::AuthError,
    extract::JsonBody,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", get(logout))
        .route("/auth/me", get(get_me))
        .route("/auth/forgotpassword", post(forgot_password))
        .route("/auth/resetpassword/:token", put(reset_password))
        .route("/auth/:id", delete(delete_user))
}

fn auth_response(session: Session) -> Json<AuthResponse> {
    Json(AuthResponse {
        success: true,
        token: session.token,
        user: session.user.into(),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let session = services::register(state.users.as_ref(), &keys, payload.into()).await?;
    Ok((StatusCode::CREATED, auth_response(session)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let session =
        services::login(state.users.as_ref(), &keys, &payload.email, &payload.password).await?;
    Ok(auth_response(session))
}

/// Tokens are stateless; the client discards its copy.
pub async fn logout() -> Json<MessageResponse> {
    Json(MessageResponse {
        success: true,
        message: Some("Logged out"),
    })
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UserResponse>, AuthError> {
    let user = services::current_user(state.users.as_ref(), user_id).await?;
    Ok(Json(UserResponse {
        success: true,
        user: user.into(),
    }))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AuthError> {
    services::delete_user(state.users.as_ref(), caller, id).await?;
    Ok(Json(MessageResponse {
        success: true,
        message: None,
    }))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AuthError> {
    services::forgot_password(
        state.users.as_ref(),
        state.reset_sender.as_ref(),
        &payload.email,
    )
    .await?;
    Ok(Json(MessageResponse {
        success: true,
        message: Some("If the account exists, a reset link has been sent"),
    }))
}

#[instrument(skip(state, token, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(token): Path<String>,
    JsonBody(payload): JsonBody<ResetPasswordRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let keys = JwtKeys::from_ref(&state);
    let session =
        services::reset_password(state.users.as_ref(), &keys, &token, payload.password).await?;
    Ok(auth_response(session))
}
