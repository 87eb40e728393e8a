//! Mapping of domain errors onto HTTP responses.

use std::time::Duration;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use brt_core::{ErrorKind, TicketError};

use super::middleware::{RATE_LIMIT_LIMIT_HEADER, RATE_LIMIT_REMAINING_HEADER};

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: &'static str,
}

/// Errors returned by API handlers and middleware.
#[derive(Debug)]
pub enum ApiError {
    Ticket(TicketError),
    Validation(String),
    /// Body or query that could not be parsed; keeps axum's status.
    BadRequest { status: StatusCode, message: String },
    Unauthorized,
    RateLimited { limit: u32, retry_after: Duration },
    Internal(String),
}

impl From<TicketError> for ApiError {
    fn from(err: TicketError) -> Self {
        ApiError::Ticket(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

fn body(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
            kind,
        }),
    )
        .into_response()
}

fn internal(detail: &str) -> Response {
    error!(error = %detail, "Request failed");
    body(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Ticket(err) => match err.kind() {
                ErrorKind::ValidationFailed => {
                    body(StatusCode::BAD_REQUEST, "validation_failed", err.to_string())
                }
                ErrorKind::NotFound => body(StatusCode::NOT_FOUND, "not_found", err.to_string()),
                ErrorKind::Forbidden => body(
                    StatusCode::FORBIDDEN,
                    "forbidden",
                    "You do not have access to this ticket",
                ),
                ErrorKind::Conflict => body(StatusCode::CONFLICT, err.reason(), err.to_string()),
                ErrorKind::Internal => internal(&err.to_string()),
            },
            ApiError::Validation(message) => {
                body(StatusCode::BAD_REQUEST, "validation_failed", message)
            }
            ApiError::BadRequest { status, message } => body(status, "invalid_request", message),
            ApiError::Unauthorized => body(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Authentication required",
            ),
            ApiError::RateLimited { limit, retry_after } => {
                let secs = retry_after.as_secs().max(1);
                let mut response = body(
                    StatusCode::TOO_MANY_REQUESTS,
                    "rate_limited",
                    format!("Too many attempts. Try again in {} seconds", secs),
                );
                let headers = response.headers_mut();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(secs));
                headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
                headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(0u32));
                response
            }
            ApiError::Internal(detail) => internal(&detail),
        }
    }
}
