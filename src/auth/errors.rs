use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::{db::DbError, users::StoreError};

/// Outcome of an auth use case that is not a success.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("User with this email already exists")]
    DuplicateEmail,

    /// Same message for unknown email and wrong password.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid or expired token")]
    Unauthenticated,

    #[error("User not found")]
    UserNotFound,

    #[error("database failure: {0}")]
    Store(#[from] DbError),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AuthError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Validation { .. } | AuthError::DuplicateEmail => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::Store(_) | AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateEmail => AuthError::DuplicateEmail,
            StoreError::Db(db) => AuthError::Store(db),
        }
    }
}

/// Unparseable or mistyped JSON bodies are a 400 on the `body` field.
impl From<JsonRejection> for AuthError {
    fn from(rejection: JsonRejection) -> Self {
        AuthError::validation("body", rejection.body_text())
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<&'static str>,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AuthError::Store(_) | AuthError::Internal(_) => {
                error!(error = %self, "request failed");
                ErrorBody {
                    message: "Internal server error".into(),
                    field: None,
                }
            }
            AuthError::Validation { field, message } => ErrorBody {
                message: message.clone(),
                field: Some(*field),
            },
            other => ErrorBody {
                message: other.to_string(),
                field: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
