//! Common `sqlx::Error` -> `ApiError` mapping used across the postgres implementation.

use crate::error::ApiError;

pub trait DbErrorHandler {
    fn into_api_error(self) -> ApiError;
}

impl DbErrorHandler for sqlx::Error {
    fn into_api_error(self) -> ApiError {
        ApiError::Database(anyhow::anyhow!(self))
    }
}
