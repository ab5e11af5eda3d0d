use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::codec::CodecError;

/// The session store's error type.
#[derive(Error, Debug)]
pub enum SessionError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// The connection pool could not be built.
    #[error("Pool creation error: {0}")]
    CreatePool(#[from] deadpool_postgres::CreatePoolError),

    /// A cookie token could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No record exists for the session key.
    #[error("Session not found")]
    NotFound,

    /// A column was missing from a row.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A session value could not be converted.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// The max-age puts the expiry beyond the representable date range.
    #[error("Max-age out of range: {0}")]
    MaxAgeOutOfRange(i64),
}

/// A `Result` type that uses `SessionError` as the error type.
pub type Result<T> = std::result::Result<T, SessionError>;

impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            SessionError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            SessionError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Database unavailable".to_string())
            }

            SessionError::CreatePool(ref e) => {
                tracing::error!("Pool creation error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            SessionError::Codec(ref e) => {
                tracing::warn!("Codec error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid session cookie".to_string())
            }

            SessionError::NotFound => {
                tracing::debug!("Session not found");
                (StatusCode::NOT_FOUND, "Session not found".to_string())
            }

            SessionError::MissingData(ref column) => {
                tracing::error!("Missing column in session row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            SessionError::Encoding(ref msg) => {
                tracing::error!("Encoding error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            SessionError::MaxAgeOutOfRange(age) => {
                tracing::error!("Session max-age out of range: {}", age);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error"}"#.to_string());

        (status, body).into_response()
    }
}
