use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors surfaced by the credential lifecycle.
///
/// Authentication and reset-token failures carry fixed messages so a caller
/// cannot tell which part of the input was wrong.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("{0}")]
    Duplicate(String),

    #[error("Invalid credentials")]
    Authentication,

    #[error("Invalid or expired reset token")]
    ResetToken,

    #[error("Not allowed to access this resource")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation(vec![reason.into()])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Duplicate(_) => StatusCode::CONFLICT,
            AuthError::Authentication => StatusCode::UNAUTHORIZED,
            AuthError::ResetToken => StatusCode::BAD_REQUEST,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound(_) => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::Validation(reasons) => json!({
                "success": false,
                "error": self.to_string(),
                "errors": reasons,
            }),
            AuthError::Internal(e) => {
                error!(error = ?e, "internal error");
                json!({ "success": false, "error": "Internal server error" })
            }
            _ => json!({ "success": false, "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
