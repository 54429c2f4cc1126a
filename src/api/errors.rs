use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::dto::now_stamp;

/// Error envelope for request handlers.
///
/// The wire contract keeps HTTP 200 for every well-formed reply and carries
/// the outcome in the `status` field, so errors render as a JSON body rather
/// than a status code. Store failures are logged server-side and answered
/// with a generic message only.
#[derive(Debug)]
pub struct ApiFailure {
    message: String,
}

impl ApiFailure {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "status": "error",
            "message": self.message,
            "timestamp": now_stamp(),
        }));
        (StatusCode::OK, body).into_response()
    }
}

impl From<sqlx::Error> for ApiFailure {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!(error = %e, "store operation failed");
        Self::message("Server error processing request. Check server logs.")
    }
}
