//! Authentication module
//!
//! Provides the credential lifecycle:
//! - User signup and signin with Argon2 password hashes
//! - Google OAuth login with a state cookie against CSRF
//! - HS256 JWT session tokens
//! - Password reset via emailed, 15 minute links

pub mod database;
pub mod email;
pub mod error;
pub mod jwt;
pub mod models;
pub mod oauth;
pub mod password;
pub mod routes;
pub mod service;

pub use database::{SqliteUserStore, StoreError, UserStore};
pub use email::{LogMailer, MailError, MailSender, SmtpMailer};
pub use error::AuthError;
pub use jwt::{JwtConfig, JwtManager};
pub use models::*;
pub use oauth::{GoogleOAuth, GoogleOAuthConfig, OAuthProvider, OAuthStateGuard};
pub use routes::auth_router;
pub use service::{AuthService, ResetSettings};
