use axum::{Json, http::StatusCode, response::IntoResponse, response::Response};
use tracing::error;

use courier_types::CourierError;
use courier_types::api::ErrorBody;

/// HTTP rendering of a [`CourierError`]: status plus `{"message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<CourierError> for ApiError {
    fn from(err: CourierError) -> Self {
        match err {
            CourierError::Unauthenticated(msg) => Self::new(StatusCode::UNAUTHORIZED, msg),
            CourierError::Forbidden(msg) => Self::new(StatusCode::FORBIDDEN, msg),
            CourierError::Validation(msg) => Self::bad_request(msg),
            CourierError::LookupMiss(_) => Self::new(StatusCode::NOT_FOUND, "User not found"),
            CourierError::Persistence(msg) => {
                error!("request failed in store: {}", msg);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { message: self.message })).into_response()
    }
}
