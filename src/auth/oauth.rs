//! Google OAuth2 login and the anti-CSRF state guard

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use cookie::{
    time::{Duration as CookieDuration, OffsetDateTime},
    Cookie,
};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;
use std::time::Duration;

use super::models::OAuthProfile;

/// Cookie holding the state between the redirect and the callback.
pub const OAUTH_STATE_COOKIE: &str = "oauthstate";

const STATE_BYTES: usize = 16;
const STATE_TTL_MINUTES: i64 = 2;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("invalid OAuth endpoint: {0}")]
    Endpoint(#[from] oauth2::url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("code exchange failed: {0}")]
    Exchange(String),

    #[error("failed getting user info: {0}")]
    Profile(String),

    #[error("failed to generate state: {0}")]
    Random(#[from] getrandom::Error),
}

/// A freshly generated state and the `Set-Cookie` value that carries it.
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub value: String,
    pub cookie: String,
}

/// Issues and checks the OAuth `state` parameter.
pub struct OAuthStateGuard;

impl OAuthStateGuard {
    /// 16 random bytes, URL-safe base64, in an HttpOnly cookie valid for 2 minutes.
    pub fn generate_state() -> Result<OAuthState, OAuthError> {
        let mut bytes = [0u8; STATE_BYTES];
        getrandom::getrandom(&mut bytes)?;
        let value = URL_SAFE.encode(bytes);

        let ttl = CookieDuration::minutes(STATE_TTL_MINUTES);
        let cookie = Cookie::build((OAUTH_STATE_COOKIE, value.clone()))
            .http_only(true)
            .path("/")
            .max_age(ttl)
            .expires(OffsetDateTime::now_utc() + ttl)
            .build();

        Ok(OAuthState {
            value,
            cookie: cookie.to_string(),
        })
    }

    /// Exact match between the cookie and the callback's `state`.
    pub fn validate_state(cookie_value: Option<&str>, callback_state: &str) -> bool {
        match cookie_value {
            Some(expected) => !expected.is_empty() && expected == callback_state,
            None => false,
        }
    }

    /// `Set-Cookie` value that removes the state cookie.
    pub fn clear_cookie() -> String {
        Cookie::build((OAUTH_STATE_COOKIE, ""))
            .http_only(true)
            .path("/")
            .max_age(CookieDuration::ZERO)
            .build()
            .to_string()
    }
}

/// OAuth identity provider used by the login flow
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Consent page URL carrying `state`.
    fn auth_code_url(&self, state: &str) -> String;

    /// Trade the callback code for an access token.
    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError>;
}

/// Google OAuth client configuration
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

impl GoogleOAuthConfig {
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            client_secret: std::env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),
            redirect_url: std::env::var("GOOGLE_REDIRECT_URL")
                .unwrap_or_else(|_| "http://localhost:8080/api/auth/google/redirect".to_string()),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Google implementation of [`OAuthProvider`]
pub struct GoogleOAuth {
    client: GoogleClient,
    http_client: HttpClient,
}

impl GoogleOAuth {
    pub fn new(config: &GoogleOAuthConfig) -> Result<Self, OAuthError> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_client_secret(ClientSecret::new(config.client_secret.clone()))
            .set_auth_uri(AuthUrl::new(GOOGLE_AUTH_URL.to_string())?)
            .set_token_uri(TokenUrl::new(GOOGLE_TOKEN_URL.to_string())?)
            .set_redirect_uri(RedirectUrl::new(config.redirect_url.clone())?);

        // No redirects on the token endpoint
        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(HTTP_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            http_client,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleOAuth {
    fn auth_code_url(&self, state: &str) -> String {
        let (url, _csrf_token) = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_string()))
            .add_scope(Scope::new(
                "https://www.googleapis.com/auth/userinfo.email".to_string(),
            ))
            .add_scope(Scope::new(
                "https://www.googleapis.com/auth/userinfo.profile".to_string(),
            ))
            .url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
        let token = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(token.access_token().secret().to_string())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
        let response = self
            .http_client
            .get(GOOGLE_USERINFO_URL)
            .bearer_auth(access_token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| OAuthError::Profile(e.to_string()))?;

        response
            .json::<OAuthProfile>()
            .await
            .map_err(|e| OAuthError::Profile(format!("failed to parse user info: {}", e)))
    }
}
