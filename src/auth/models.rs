//! Authentication data models

use serde::{Deserialize, Serialize};

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Row to insert on signup. `password_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// How a user is looked up in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserLookup {
    Username(String),
    Email(String),
    /// Both must match the same row.
    UsernameAndEmail { username: String, email: String },
}

impl UserLookup {
    /// Build a lookup from optional identifiers, treating empty strings as absent.
    pub fn from_identifiers(username: Option<&str>, email: Option<&str>) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty());
        let email = email.filter(|e| !e.is_empty());
        match (username, email) {
            (Some(username), Some(email)) => Some(UserLookup::UsernameAndEmail {
                username: username.to_string(),
                email: email.to_string(),
            }),
            (Some(username), None) => Some(UserLookup::Username(username.to_string())),
            (None, Some(email)) => Some(UserLookup::Email(email.to_string())),
            (None, None) => None,
        }
    }
}

/// What a token may be used for. Each consumer accepts exactly one purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Session,
    PasswordReset,
}

/// JWT claims
///
/// Session tokens carry `username` and `email`; reset tokens carry `email` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub email: String,
    pub purpose: TokenPurpose,
    pub exp: i64, // expiration timestamp (unix seconds)
}

impl Claims {
    /// Claims for a login session token.
    pub fn session(username: &str, email: &str, ttl: chrono::Duration) -> Self {
        Self {
            username: Some(username.to_string()),
            email: email.to_string(),
            purpose: TokenPurpose::Session,
            exp: (chrono::Utc::now() + ttl).timestamp(),
        }
    }

    /// Claims for a password reset token, bound to the account email.
    pub fn password_reset(email: &str, ttl: chrono::Duration) -> Self {
        Self {
            username: None,
            email: email.to_string(),
            purpose: TokenPurpose::PasswordReset,
            exp: (chrono::Utc::now() + ttl).timestamp(),
        }
    }
}

/// API request/response types
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResetPasswordRequest {
    /// Base64-encoded username, as it appears in the reset link.
    pub username: String,
    pub token: String,
    pub email: String,
    pub new_password: String,
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub user_info: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user_info: UserResponse,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Google OAuth callback query
#[derive(Debug, Default, Deserialize)]
pub struct OAuthCallback {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub state: String,
}

/// User info from the OAuth provider
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}
