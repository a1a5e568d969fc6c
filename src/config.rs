//! Application configuration loaded once at startup.

use crate::auth::email::SmtpConfig;
use crate::auth::jwt::JwtConfig;
use crate::auth::oauth::GoogleOAuthConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Everything the auth service needs, passed explicitly to constructors.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt: JwtConfig,
    pub google: GoogleOAuthConfig,
    /// `None` means emails are only logged.
    pub smtp: Option<SmtpConfig>,
    /// Sender address for outgoing mail.
    pub mail_from: String,
    /// Prefix of reset links; `/<base64 username>/<token>` is appended.
    pub reset_link_base: String,
}

impl AppConfig {
    /// Read settings from the process environment (after `.env` is loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt = JwtConfig::from_env()?;
        let google = GoogleOAuthConfig::from_env();
        let smtp = SmtpConfig::from_env()?;
        let mail_from = std::env::var("TRAVAIL_EMAIL")
            .unwrap_or_else(|_| "no-reply@travail.local".to_string());
        let reset_link_base = std::env::var("RESET_PASSWORD_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api/auth/reset_password".to_string());

        Ok(Self {
            jwt,
            google,
            smtp,
            mail_from,
            reset_link_base: reset_link_base.trim_end_matches('/').to_string(),
        })
    }
}
