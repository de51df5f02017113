use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

/// Rejection raised while normalizing a descriptor, before any network activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("Invalid method: {0}")]
    InvalidMethod(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelayErrorKind {
    MalformedUrl,
    ConnectionFailure,
    Timeout,
    BodySerializationFailure,
    InvalidHeader,
    /// Protocol-level fault after a connection was established.
    #[serde(rename = "UPSTREAM_ERROR")]
    Upstream,
    Cancelled,
}

impl RelayErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            RelayErrorKind::MalformedUrl => "MALFORMED_URL",
            RelayErrorKind::ConnectionFailure => "CONNECTION_FAILURE",
            RelayErrorKind::Timeout => "TIMEOUT",
            RelayErrorKind::BodySerializationFailure => "BODY_SERIALIZATION_FAILURE",
            RelayErrorKind::InvalidHeader => "INVALID_HEADER",
            RelayErrorKind::Upstream => "UPSTREAM_ERROR",
            RelayErrorKind::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RelayErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A relayed call that could not be completed.
///
/// `details` holds whatever upstream payload had arrived before the failure.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct RelayError {
    pub kind: RelayErrorKind,
    pub message: String,
    pub details: Option<Value>,
    pub duration_ms: u64,
}

impl RelayError {
    pub fn new(kind: RelayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            duration_ms: 0,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Relay(#[from] RelayError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, code, details) = match self {
            AppError::Normalize(NormalizeError::InvalidMethod(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_METHOD", None)
            }
            AppError::Relay(e) => {
                let status = match e.kind {
                    RelayErrorKind::MalformedUrl
                    | RelayErrorKind::BodySerializationFailure
                    | RelayErrorKind::InvalidHeader => StatusCode::BAD_REQUEST,
                    RelayErrorKind::ConnectionFailure
                    | RelayErrorKind::Upstream
                    | RelayErrorKind::Cancelled => StatusCode::BAD_GATEWAY,
                    RelayErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
                };
                (status, e.kind.code(), e.details)
            }
        };

        let body = Json(json!({
            "error": message,
            "kind": code,
            "details": details,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let invalid = AppError::from(NormalizeError::InvalidMethod("FETCH".into()));
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let timeout = AppError::from(RelayError::new(RelayErrorKind::Timeout, "timed out"));
        assert_eq!(timeout.into_response().status(), StatusCode::GATEWAY_TIMEOUT);

        let refused = AppError::from(RelayError::new(
            RelayErrorKind::ConnectionFailure,
            "refused",
        ));
        assert_eq!(refused.into_response().status(), StatusCode::BAD_GATEWAY);

        let url = AppError::from(RelayError::new(RelayErrorKind::MalformedUrl, "bad"));
        assert_eq!(url.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_kind_codes_match_serde() {
        for kind in [
            RelayErrorKind::MalformedUrl,
            RelayErrorKind::ConnectionFailure,
            RelayErrorKind::Timeout,
            RelayErrorKind::BodySerializationFailure,
            RelayErrorKind::InvalidHeader,
            RelayErrorKind::Upstream,
            RelayErrorKind::Cancelled,
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), kind.code());
        }
    }
}
