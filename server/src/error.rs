//! # Server Error Type
//!
//! One error enum for everything a request handler can trip over, with a
//! single mapping onto HTTP status codes. Engine errors pass through and
//! are classified by their own kind; everything else is a server-side
//! concern (credentials, sessions, uniqueness claims, malformed input).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use vela_wallet::config::MIN_PASSWORD_LENGTH;
use vela_wallet::error::{ErrorKind, WalletError};
use vela_wallet::store::StoreError;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors surfaced by the HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The wallet engine rejected the operation. Status comes from the
    /// engine's own classification.
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// The storage layer failed outside an engine call.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Username or password did not check out. Deliberately does not say
    /// which.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// No valid session token accompanied the request.
    #[error("authentication required")]
    Unauthorized,

    /// The session is valid but the account is administratively blocked.
    #[error("account is blocked")]
    Blocked,

    /// The endpoint is reserved for operators.
    #[error("administrator access required")]
    AdminOnly,

    /// The desired username is already claimed.
    #[error("username is already taken")]
    UsernameTaken,

    /// The email address is already registered.
    #[error("email is already registered")]
    EmailTaken,

    /// The CPF is already registered.
    #[error("CPF is already registered")]
    CpfTaken,

    /// The username does not match the accepted shape.
    #[error("username must be 3-32 characters: lowercase letters, digits, '.', '_'")]
    InvalidUsername,

    /// The email address is not plausibly an email address.
    #[error("invalid email address")]
    InvalidEmail,

    /// The CPF is not eleven digits.
    #[error("CPF must have exactly 11 digits")]
    InvalidCpf,

    /// The password is too short to accept.
    #[error("password must have at least {MIN_PASSWORD_LENGTH} characters")]
    WeakPassword,

    /// A path or body id failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// No user goes by that name.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Password hashing or verification failed internally.
    #[error("password hashing failed: {0}")]
    PasswordHash(String),
}

impl ServerError {
    /// The HTTP status this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Wallet(err) => match err.kind() {
                ErrorKind::Validation | ErrorKind::Conflict => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Store(_) | ServerError::PasswordHash(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::InvalidCredentials | ServerError::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::Blocked | ServerError::AdminOnly => StatusCode::FORBIDDEN,
            ServerError::UsernameTaken
            | ServerError::EmailTaken
            | ServerError::CpfTaken
            | ServerError::InvalidUsername
            | ServerError::InvalidEmail
            | ServerError::InvalidCpf
            | ServerError::WeakPassword
            | ServerError::InvalidIdentifier(_) => StatusCode::BAD_REQUEST,
            ServerError::UserNotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

/// Generic error body returned by all endpoints on failure.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        } else {
            tracing::debug!(status = %status, error = %self, "request rejected");
        }
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use vela_wallet::account::AccountId;
    use vela_wallet::money::Amount;

    #[test]
    fn wallet_kinds_map_onto_http_statuses() {
        let validation = ServerError::Wallet(WalletError::InvalidAmount);
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let conflict = ServerError::Wallet(WalletError::InsufficientBalance {
            available: Amount::ZERO,
            requested: Amount::from_reais(1),
        });
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);

        let not_found = ServerError::Wallet(WalletError::AccountNotFound {
            id: AccountId::new(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let persistence = ServerError::Wallet(WalletError::Store(StoreError::Serialization(
            "bad bytes".into(),
        )));
        assert_eq!(persistence.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn auth_errors_map_onto_http_statuses() {
        assert_eq!(
            ServerError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ServerError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServerError::Blocked.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServerError::AdminOnly.status(), StatusCode::FORBIDDEN);
        assert_eq!(ServerError::UsernameTaken.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::UserNotFound("ghost".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn credentials_error_does_not_leak_which_half_failed() {
        let message = ServerError::InvalidCredentials.to_string();
        assert!(!message.contains("password only"));
        assert_eq!(message, "invalid username or password");
    }
}
