use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::AuthError;

/// [`axum::Json`] for request bodies, rejecting with the same JSON error
/// envelope as every other failure instead of axum's plain-text response.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match axum::Json::<T>::from_request(req, state).await {
            Ok(axum::Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => {
                debug!(error = %rejection, "rejected request body");
                let message = match rejection {
                    JsonRejection::MissingJsonContentType(_) => {
                        "Missing 'Content-Type: application/json' header".to_string()
                    }
                    JsonRejection::JsonSyntaxError(_) => "Malformed JSON body".to_string(),
                    JsonRejection::JsonDataError(e) => e.body_text(),
                    JsonRejection::BytesRejection(e) => e.body_text(),
                    other => {
                        warn!("unhandled JsonRejection: {other:?}");
                        "Invalid request body".to_string()
                    }
                };
                Err(AuthError::validation(message))
            }
        }
    }
}
