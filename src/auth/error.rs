//! Errors returned by the auth service to the HTTP boundary

use axum::http::StatusCode;

use super::database::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("username or email is required")]
    MissingIdentifier,

    #[error("{0}")]
    InvalidInput(String),

    #[error("password is incorrect")]
    InvalidCredentials,

    #[error("user not found")]
    NotFound,

    #[error("username or email already exists")]
    DuplicateIdentity,

    #[error("reset link is malformed")]
    MalformedLink,

    #[error("reset token is malformed")]
    MalformedToken,

    #[error("reset link does not belong to this account")]
    LinkIdentityMismatch,

    #[error("reset link is invalid or expired")]
    InvalidOrExpiredLink,

    #[error("email does not match the account")]
    EmailMismatch,

    #[error("invalid oauth state")]
    OAuthStateMismatch,

    #[error("failed code exchange: {0}")]
    OAuthExchangeFailed(String),

    #[error("failed getting user info: {0}")]
    ProfileFetchFailed(String),

    #[error("failed to send email: {0}")]
    DeliveryFailed(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingIdentifier
            | AuthError::InvalidInput(_)
            | AuthError::MalformedLink
            | AuthError::MalformedToken
            | AuthError::EmailMismatch => StatusCode::BAD_REQUEST,
            AuthError::InvalidCredentials
            | AuthError::InvalidOrExpiredLink
            | AuthError::OAuthStateMismatch => StatusCode::UNAUTHORIZED,
            AuthError::LinkIdentityMismatch => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::DuplicateIdentity => StatusCode::CONFLICT,
            AuthError::OAuthExchangeFailed(_) | AuthError::ProfileFetchFailed(_) => {
                StatusCode::BAD_GATEWAY
            }
            AuthError::DeliveryFailed(_) | AuthError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to clients
    pub fn public_message(&self) -> String {
        match self {
            AuthError::InternalError(_) => "internal server error".to_string(),
            AuthError::DeliveryFailed(_) => "failed to send email".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AuthError::NotFound,
            StoreError::Duplicate => AuthError::DuplicateIdentity,
            StoreError::Backend(msg) => AuthError::InternalError(msg),
        }
    }
}
