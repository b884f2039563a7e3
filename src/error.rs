use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::users::repo::{StoreError, UniqueField};

/// Failures surfaced by the account operations.
///
/// Business-rule violations carry a client-safe message; `Unexpected` keeps
/// the underlying cause for the server log and answers with a generic 500.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("Email already exists")]
    DuplicateEmail,

    #[error("Roll number already exists")]
    DuplicateRollNo,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User doesn't exist")]
    NotFound,

    #[error("{0}")]
    Validation(String),

    #[error("Server error")]
    Unexpected(#[from] anyhow::Error),
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::DuplicateEmail
            | AccountError::DuplicateRollNo
            | AccountError::InvalidCredentials
            | AccountError::Validation(_) => StatusCode::BAD_REQUEST,
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Lookups by roll number answer store failures with 404.
    pub fn into_lookup_failure(self) -> Self {
        match self {
            AccountError::Unexpected(e) => {
                error!(error = %e, "store failure during roll number lookup");
                AccountError::NotFound
            }
            other => other,
        }
    }
}

impl From<StoreError> for AccountError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::Email) => AccountError::DuplicateEmail,
            StoreError::Conflict(UniqueField::RollNo) => AccountError::DuplicateRollNo,
            StoreError::Backend(e) => AccountError::Unexpected(e),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        if let AccountError::Unexpected(e) = &self {
            error!(error = ?e, "unexpected account failure");
        }
        let body = Json(json!({ "message": self.to_string() }));
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_error_hides_detail() {
        let err = AccountError::Unexpected(anyhow::anyhow!("connection refused on 10.0.0.7"));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Server error");
    }

    #[test]
    fn store_conflicts_map_to_duplicates() {
        let email: AccountError = StoreError::Conflict(UniqueField::Email).into();
        let roll: AccountError = StoreError::Conflict(UniqueField::RollNo).into();
        assert!(matches!(email, AccountError::DuplicateEmail));
        assert!(matches!(roll, AccountError::DuplicateRollNo));
        assert_eq!(email.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn lookup_failure_turns_store_errors_into_not_found() {
        let err = AccountError::Unexpected(anyhow::anyhow!("pool timed out")).into_lookup_failure();
        assert!(matches!(err, AccountError::NotFound));

        let err = AccountError::DuplicateEmail.into_lookup_failure();
        assert!(matches!(err, AccountError::DuplicateEmail));
    }
}
