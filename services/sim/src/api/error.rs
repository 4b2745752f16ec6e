use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use converge_events::{ErrorBody, ErrorKind};

use crate::error::SimError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code: kind.code().to_string(),
                message: message.into(),
                field: None,
            },
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::InvalidRequest, message)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.body.field = Some(field.into());
        self
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        let kind = err.kind();
        let message = err.to_string();
        match err {
            SimError::Invalid { field, .. } => {
                Self::new(StatusCode::BAD_REQUEST, kind, message).with_field(field)
            }
            SimError::Exists(_) => Self::new(StatusCode::CONFLICT, kind, message),
            SimError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, kind, message),
            SimError::InvalidTransition(_) => Self::new(StatusCode::CONFLICT, kind, message),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
