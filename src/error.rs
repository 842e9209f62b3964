//! Errors surfaced to callers of the administrative and ingestion entry points.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

use crate::db::DbError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("persistence failure: {0}")]
    Persistence(DbError),
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => Error::NotFound,
            DbError::Conflict(what) => Error::Conflict(what),
            other => Error::Persistence(other),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Persistence(e) => {
                tracing::error!("Request failed on the store: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_fold_into_taxonomy() {
        assert!(matches!(Error::from(DbError::NotFound), Error::NotFound));
        assert!(matches!(
            Error::from(DbError::Conflict("dup".to_string())),
            Error::Conflict(_)
        ));
        assert!(matches!(
            Error::from(DbError::Migration("boom".to_string())),
            Error::Persistence(_)
        ));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(Error::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            Error::InvalidInput("x".to_string()).into_response().status(),
            StatusCode::BAD_REQUEST
        );
    }
}
