//! # Travail Auth
//!
//! Authentication backend: password accounts, Google login, JWT sessions and
//! an email password-reset flow.
//!
//! ## Features
//!
//! - **Accounts**: signup/signin with Argon2 password hashes in SQLite
//! - **Google OAuth**: consent redirect with a state cookie, account linking by email
//! - **Tokens**: HS256 JWTs, 72h sessions and 15 minute reset links
//! - **HTTP API**: axum router under `/api/auth`
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use travail_auth::{auth::SqliteUserStore, build_auth_service, config::AppConfig};
//!
//! # fn main() -> travail_auth::Result<()> {
//! let config = AppConfig::from_env()?;
//! let store = SqliteUserStore::new("data/travail.db")?;
//! let service = build_auth_service(&config, Arc::new(store))?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

// ============================================================================
// PUBLIC API MODULES
// ============================================================================

/// Credential lifecycle: hashing, tokens, OAuth, reset flow, HTTP routes
pub mod auth;

/// Startup configuration
pub mod config;

/// HTTP server
pub mod servers;

/// Logger setup
pub mod logging;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use auth::{AuthError, AuthService};
pub use servers::{ApiConfig, ApiServer};

use auth::{
    email::{mailer_from_config, MailError},
    oauth::OAuthError,
    GoogleOAuth, JwtManager, ResetSettings, UserStore,
};
use config::{AppConfig, ConfigError};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Startup errors. Any of these aborts the process.
#[derive(Debug, thiserror::Error)]
pub enum TravailError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("OAuth setup error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Mail setup error: {0}")]
    Mail(#[from] MailError),

    #[error("Logging error: {0}")]
    Logging(#[from] flexi_logger::FlexiLoggerError),

    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, TravailError>;

/// Wire the auth service from configuration and a user store.
pub fn build_auth_service(config: &AppConfig, store: Arc<dyn UserStore>) -> Result<AuthService> {
    if !config.google.is_configured() {
        log::warn!("GOOGLE_CLIENT_ID/GOOGLE_CLIENT_SECRET not set; Google login will fail");
    }
    let google = GoogleOAuth::new(&config.google)?;
    let mailer = mailer_from_config(config.smtp.as_ref())?;

    Ok(AuthService::new(
        store,
        JwtManager::new(config.jwt.clone()),
        Arc::new(google),
        mailer,
        ResetSettings {
            mail_from: config.mail_from.clone(),
            reset_link_base: config.reset_link_base.clone(),
        },
    ))
}

// ============================================================================
// LIBRARY VERSION INFO
// ============================================================================

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
