//! JWT token handling

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use super::models::Claims;
use crate::config::ConfigError;

/// Lifetime of a login session token.
pub const SESSION_TTL_HOURS: i64 = 72;

/// Lifetime of a password reset token.
pub const RESET_TTL_MINUTES: i64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    secret: String,
}

impl JwtConfig {
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::Missing("JWT_SECRET_KEY"));
        }
        Ok(Self { secret })
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let secret =
            std::env::var("JWT_SECRET_KEY").map_err(|_| ConfigError::Missing("JWT_SECRET_KEY"))?;
        Self::new(secret)
    }
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig").field("secret", &"<redacted>").finish()
    }
}

/// Issues and checks HS256 tokens with the process signing secret.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
        }
    }

    /// Sign the claims into a compact token
    pub fn issue(&self, claims: &Claims) -> Result<String, TokenError> {
        Ok(encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.encoding_key,
        )?)
    }

    /// True only when the signature matches and the token has not expired.
    pub fn verify(&self, token: &str) -> bool {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        match decode::<Claims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims.exp > chrono::Utc::now().timestamp(),
            Err(e) => {
                log::debug!("Token rejected: {}", e);
                false
            }
        }
    }

    /// Read claims without checking signature or expiry.
    ///
    /// The result is not authenticated: callers must also call [`JwtManager::verify`]
    /// on the same token before acting on it.
    pub fn decode_unverified(&self, token: &str) -> Result<Claims, TokenError> {
        let token_data = jsonwebtoken::dangerous::insecure_decode::<Claims>(token)?;
        Ok(token_data.claims)
    }
}
