//! Transport-agnostic error kinds and their HTTP rendering.
//!
//! One enum, one `IntoResponse` impl. 5xx variants never carry their source's
//! `Display` into the response body — only into the log line.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;

pub type Result<T, E = ApiError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation Error")]
    Validation { details: Vec<String> },

    #[error("{message}")]
    App { status: StatusCode, message: String },

    #[error("CSRF check failed: {code}")]
    Csrf { code: CsrfErrorCode },

    #[error("storage error")]
    Storage(#[source] anyhow::Error),

    #[error("broker error")]
    Broker(#[source] anyhow::Error),

    #[error("database error")]
    Database(#[source] anyhow::Error),
}

#[derive(Debug, Clone, Copy, strum_macros::Display)]
pub enum CsrfErrorCode {
    #[strum(serialize = "CSRF_COOKIE_MISSING")]
    CookieMissing,
    #[strum(serialize = "CSRF_HEADER_MISSING")]
    HeaderMissing,
    #[strum(serialize = "CSRF_TOKEN_MISMATCH")]
    TokenMismatch,
}

impl ApiError {
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::App {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::App {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(details: Vec<String>) -> Self {
        Self::Validation { details }
    }
}

#[derive(Serialize)]
struct ValidationBody {
    error: &'static str,
    details: Vec<String>,
}

#[derive(Serialize)]
struct AppBody {
    error: String,
}

#[derive(Serialize)]
struct CsrfBody {
    error: &'static str,
    code: String,
}

#[derive(Serialize)]
struct OpaqueBody {
    error: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation { details } => (
                StatusCode::BAD_REQUEST,
                Json(ValidationBody {
                    error: "Validation Error",
                    details,
                }),
            )
                .into_response(),
            Self::App { status, message } => {
                (status, Json(AppBody { error: message })).into_response()
            }
            Self::Csrf { code } => (
                StatusCode::FORBIDDEN,
                Json(CsrfBody {
                    error: "CSRF validation failed",
                    code: code.to_string(),
                }),
            )
                .into_response(),
            Self::Storage(source) => {
                tracing::error!(error = ?source, "storage error");
                internal_error()
            }
            Self::Broker(source) => {
                tracing::error!(error = ?source, "broker error");
                internal_error()
            }
            Self::Database(source) => {
                tracing::error!(error = ?source, "database error");
                internal_error()
            }
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(OpaqueBody {
            error: "Internal Server Error",
        }),
    )
        .into_response()
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.into())
    }
}
