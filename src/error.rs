use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

use crate::exchange_rate::Currency;

/// Failures of a single provider call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provider could not be reached, or the request timed out.
    #[error("transport failure: {0}")]
    Transport(reqwest::Error),

    /// The body was not JSON of either known shape, or lacked a rate.
    #[error("malformed provider response: {0}")]
    Decode(String),

    /// The provider reported a logical error (quota, bad key, ...).
    #[error("provider error {code}: {message}")]
    Provider { code: i64, message: String },
}

// The request URL carries the API key, so it never reaches Display.
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.without_url())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("no snapshot row after write")]
    MissingSnapshot,
}

/// A rate that cannot be inverted.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("cannot invert zero rate for {0}")]
pub struct DivisionFault(pub Currency);

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why the gate turned a caller away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFault {
    #[error("token missing")]
    Missing,

    #[error("token invalid")]
    Invalid,
}

/// Errors surfaced by HTTP handlers. Bodies never carry internal detail.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthFault),

    #[error("currency not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthFault::Missing) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthFault::Invalid) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Auth(AuthFault::Missing) => "Token not found",
            ApiError::Auth(AuthFault::Invalid) => "Invalid token",
            ApiError::NotFound => "Currency not found",
            ApiError::Store(err) => {
                log::error!("request failed: {}", err);
                "Internal server error"
            }
        };

        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
