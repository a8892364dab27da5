use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use thiserror::Error as ThisError;
use tracing::error;

pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[derive(Debug, ThisError)]
pub enum ConsoleError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("{resource} with id '{id}' does not exist")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    #[error("duplicate entries: {}", .0.join(", "))]
    Duplicates(Vec<String>),

    #[error("request validation failed")]
    Validation(FieldErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("invalid keystore: {0}")]
    KeystoreFormat(String),

    #[error("keystore was tampered with, or password was incorrect")]
    KeystorePassword,

    #[error("cannot recover key '{alias}': wrong key password")]
    KeyPassword { alias: String },

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl ConsoleError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ConsoleError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ConsoleError::NotFound { .. } => StatusCode::NOT_FOUND,
            ConsoleError::Conflict(_) | ConsoleError::Duplicates(_) => StatusCode::CONFLICT,
            ConsoleError::Unauthorized => StatusCode::UNAUTHORIZED,
            // request or client could not be built from the given settings
            ConsoleError::Reqwest(e) if e.is_builder() => StatusCode::BAD_REQUEST,
            ConsoleError::Reqwest(_) => StatusCode::BAD_GATEWAY,
            ConsoleError::Database(_) | ConsoleError::Io(_) | ConsoleError::RactorError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ConsoleError::UrlParse(_)
            | ConsoleError::Json(_)
            | ConsoleError::Base64(_)
            | ConsoleError::Jwt(_)
            | ConsoleError::Validation(_)
            | ConsoleError::BadRequest(_)
            | ConsoleError::InvalidFilter(_)
            | ConsoleError::KeystoreFormat(_)
            | ConsoleError::KeystorePassword
            | ConsoleError::KeyPassword { .. }
            | ConsoleError::UnsupportedAlgorithm(_)
            | ConsoleError::Crypto(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Messages of this error followed by its `source()` chain.
    pub fn message_chain(&self) -> Vec<String> {
        let mut messages = vec![self.to_string()];
        let mut cause = self.source();
        while let Some(err) = cause {
            let msg = err.to_string();
            if messages.last() != Some(&msg) {
                messages.push(msg);
            }
            cause = err.source();
        }
        messages
    }
}

/// Whether an outbound call may succeed when simply tried again.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for ConsoleError {
    fn is_retryable(&self) -> bool {
        match self {
            ConsoleError::Reqwest(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }
}

/// Field name to validation messages, rendered as `inputFieldErrors`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> ConsoleResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ConsoleError::Validation(self))
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessagesBody {
    pub error_messages: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputFieldErrorsBody {
    pub input_field_errors: FieldErrors,
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        match self {
            ConsoleError::Validation(fields) => (
                status,
                Json(InputFieldErrorsBody {
                    input_field_errors: fields,
                }),
            )
                .into_response(),
            ConsoleError::Duplicates(entries) => {
                let mut error_messages = vec!["duplicate entries detected".to_string()];
                error_messages.extend(entries);
                (status, Json(ErrorMessagesBody { error_messages })).into_response()
            }
            err if status.is_server_error() => {
                error!(errors = ?err.message_chain(), "request failed");
                (
                    status,
                    Json(ErrorMessagesBody {
                        error_messages: vec!["An internal server error occurred.".to_string()],
                    }),
                )
                    .into_response()
            }
            err => (
                status,
                Json(ErrorMessagesBody {
                    error_messages: err.message_chain(),
                }),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(err: ConsoleError) -> (StatusCode, Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn validation_errors_render_field_map() {
        let mut fields = FieldErrors::new();
        fields.add("hostname", "must not be empty");
        fields.add("port", "must be between 1 and 65535");
        fields.add("port", "is required");
        let (status, body) = body_json(fields.into_result().unwrap_err()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["inputFieldErrors"]["hostname"][0], "must not be empty");
        assert_eq!(body["inputFieldErrors"]["port"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn outbound_errors_split_by_cause() {
        let builder = reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err();
        assert!(builder.is_builder());
        assert_eq!(
            ConsoleError::Reqwest(builder).status(),
            StatusCode::BAD_REQUEST
        );

        let refused = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap()
            .get("http://127.0.0.1:1/")
            .send()
            .await
            .unwrap_err();
        assert!(!refused.is_builder());
        assert_eq!(ConsoleError::Reqwest(refused).status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_json(ConsoleError::Database(SqlxError::PoolClosed)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body["errorMessages"][0],
            "An internal server error occurred."
        );
    }

    #[tokio::test]
    async fn client_errors_walk_cause_chain() {
        let json_err = serde_json::from_str::<Value>("{").unwrap_err();
        let (status, body) = body_json(ConsoleError::from(json_err)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let messages = body["errorMessages"].as_array().unwrap();
        assert!(messages[0].as_str().unwrap().starts_with("JSON error"));
    }

    #[test]
    fn only_network_failures_are_retried() {
        assert!(!ConsoleError::BadRequest("x".into()).is_retryable());
        assert!(!ConsoleError::Database(SqlxError::PoolClosed).is_retryable());
    }

    #[test]
    fn empty_field_errors_are_ok() {
        assert!(FieldErrors::new().into_result().is_ok());
    }
}
