use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

use crate::users::repo::StoreError;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("This username already exists")]
    UsernameAlreadyExists,
    #[error("User does not exist.")]
    UserNotFound,
    #[error("{0}")]
    Validation(String),
    #[error("password hashing failed: {0}")]
    Hashing(anyhow::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<UserError> for (StatusCode, String) {
    fn from(e: UserError) -> Self {
        match e {
            UserError::UserNotFound => (StatusCode::NOT_FOUND, e.to_string()),
            UserError::UsernameAlreadyExists => (StatusCode::CONFLICT, e.to_string()),
            UserError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            UserError::Hashing(_) | UserError::Store(_) => {
                error!(error = %e, "user operation failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        }
    }
}
