use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::services::ServiceError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
    Info,
    Warning,
    Danger,
}

/// Body shape shared by every endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub status: Status,
    pub message: String,
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Marks a response produced by a failure nobody anticipated. Carries the
/// unsanitized error for the developer report.
#[derive(Clone, Debug)]
pub struct UnexpectedFailure(pub String);

fn envelope<T: Serialize>(code: StatusCode, status: Status, message: &str, data: T) -> Response {
    let body = Envelope {
        status,
        message: message.to_string(),
        data,
    };
    (code, Json(body)).into_response()
}

pub fn ok<T: Serialize>(message: &str, data: T) -> Response {
    envelope(StatusCode::OK, Status::Success, message, data)
}

pub fn created<T: Serialize>(message: &str, data: T) -> Response {
    envelope(StatusCode::CREATED, Status::Success, message, data)
}

pub fn page<T: Serialize>(message: &str, items: Vec<T>, total: u64) -> Response {
    ok(message, Page { items, total })
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (code, data): (StatusCode, Value) = match &self {
            ServiceError::BadRequest(_) => (StatusCode::BAD_REQUEST, Value::Null),
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, Value::Null),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, Value::Null),
            ServiceError::Conflict(_) => (StatusCode::CONFLICT, Value::Null),
            ServiceError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, json!({ "errors": errors }))
            }
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, Value::Null),
            ServiceError::Database(_) | ServiceError::Communication(_, _) => {
                (StatusCode::INTERNAL_SERVER_ERROR, Value::Null)
            }
        };

        if !self.is_unexpected() {
            if code.is_server_error() {
                log::error!("Request failed: {}", self);
            }
            return envelope(code, Status::Error, &self.to_string(), data);
        }

        log::error!("Unexpected failure: {}", self);
        let mut response = envelope(
            code,
            Status::Error,
            "Something went wrong, please try again later",
            data,
        );
        response
            .extensions_mut()
            .insert(UnexpectedFailure(self.to_string()));
        response
    }
}
