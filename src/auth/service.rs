//! Signup, signin, Google login and the password reset flow

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine,
};
use std::sync::Arc;

use super::{
    database::{StoreError, UserStore},
    email::{render_reset_email, MailSender},
    error::AuthError,
    jwt::{JwtManager, RESET_TTL_MINUTES, SESSION_TTL_HOURS},
    models::*,
    oauth::{OAuthProvider, OAuthState, OAuthStateGuard},
    password::{hash_password, validate_password, verify_password},
};

const RESET_EMAIL_SUBJECT: &str = "Forgot Password";

/// Where reset emails come from and where their links point.
#[derive(Debug, Clone)]
pub struct ResetSettings {
    pub mail_from: String,
    pub reset_link_base: String,
}

/// Orchestrates every auth flow. Holds no per-request state.
pub struct AuthService {
    store: Arc<dyn UserStore>,
    jwt: JwtManager,
    oauth: Arc<dyn OAuthProvider>,
    mailer: Arc<dyn MailSender>,
    reset: ResetSettings,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        jwt: JwtManager,
        oauth: Arc<dyn OAuthProvider>,
        mailer: Arc<dyn MailSender>,
        reset: ResetSettings,
    ) -> Self {
        Self {
            store,
            jwt,
            oauth,
            mailer,
            reset,
        }
    }

    pub fn jwt(&self) -> &JwtManager {
        &self.jwt
    }

    pub fn sign_up(&self, req: SignUpRequest) -> Result<User, AuthError> {
        if req.username.is_empty() || req.email.is_empty() {
            return Err(AuthError::InvalidInput(
                "username and email are required".to_string(),
            ));
        }
        validate_password(&req.password).map_err(|e| AuthError::InvalidInput(e.to_string()))?;

        let password_hash = hash_password(&req.password).map_err(|e| {
            log::error!("Password hashing error: {}", e);
            AuthError::InternalError(e.to_string())
        })?;

        let user = self
            .store
            .create(NewUser {
                username: req.username,
                email: req.email,
                password_hash,
            })
            .map_err(|e| store_failure("create user", e))?;

        log::info!("User {} signed up (id {})", user.username, user.id);
        Ok(user)
    }

    /// Returns the user and a 72h session token.
    pub fn sign_in(&self, req: SignInRequest) -> Result<(User, String), AuthError> {
        let lookup =
            UserLookup::from_identifiers(req.username.as_deref(), req.email.as_deref())
                .ok_or(AuthError::MissingIdentifier)?;

        let user = self.find_user(&lookup)?;

        if !verify_password(&req.password, &user.password_hash) {
            log::info!("Rejected signin for {}: wrong password", user.username);
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.issue_session(&user)?;
        log::info!("User {} signed in", user.username);
        Ok((user, token))
    }

    /// Start Google login: consent URL plus the state to store in the cookie.
    pub fn initiate_oauth(&self) -> Result<(String, OAuthState), AuthError> {
        let state = OAuthStateGuard::generate_state().map_err(|e| {
            log::error!("OAuth state generation failed: {}", e);
            AuthError::InternalError(e.to_string())
        })?;
        let url = self.oauth.auth_code_url(&state.value);
        Ok((url, state))
    }

    /// Finish Google login, creating the local account on first use.
    pub async fn complete_oauth(
        &self,
        cookie_state: Option<&str>,
        callback_state: &str,
        code: &str,
    ) -> Result<(User, String), AuthError> {
        if !OAuthStateGuard::validate_state(cookie_state, callback_state) {
            log::warn!("OAuth callback rejected: state mismatch");
            return Err(AuthError::OAuthStateMismatch);
        }

        let access_token = self.oauth.exchange_code(code).await.map_err(|e| {
            log::error!("OAuth exchange error: {}", e);
            AuthError::OAuthExchangeFailed(e.to_string())
        })?;

        let profile = self.oauth.fetch_profile(&access_token).await.map_err(|e| {
            log::error!("OAuth profile error: {}", e);
            AuthError::ProfileFetchFailed(e.to_string())
        })?;
        if profile.email.is_empty() {
            return Err(AuthError::ProfileFetchFailed(
                "profile has no email".to_string(),
            ));
        }

        let user = match self.store.find(&UserLookup::Email(profile.email.clone())) {
            Ok(user) => user,
            Err(StoreError::NotFound) => {
                let username = oauth_username(&profile);
                log::info!("Creating account {} from Google login", username);
                self.sign_up(SignUpRequest {
                    username,
                    email: profile.email,
                    password: profile.id,
                })?
            }
            Err(e) => return Err(store_failure("find user", e)),
        };

        let token = self.issue_session(&user)?;
        Ok((user, token))
    }

    /// Email a 15 minute reset link to the account owner.
    pub async fn forgot_password(&self, req: ForgotPasswordRequest) -> Result<(), AuthError> {
        let user = self.find_user(&UserLookup::Email(req.email))?;

        let token = self
            .jwt
            .issue(&Claims::password_reset(
                &user.email,
                chrono::Duration::minutes(RESET_TTL_MINUTES),
            ))
            .map_err(|e| {
                log::error!("JWT creation error: {}", e);
                AuthError::InternalError(e.to_string())
            })?;

        let reset_url = format!(
            "{}/{}/{}",
            self.reset.reset_link_base,
            encode_username(&user.username),
            token
        );
        let body = render_reset_email(&user.username, &reset_url);

        self.mailer
            .send(&self.reset.mail_from, &user.email, RESET_EMAIL_SUBJECT, &body)
            .await
            .map_err(|e| {
                log::error!("Failed to send reset email to {}: {}", user.email, e);
                AuthError::DeliveryFailed(e.to_string())
            })?;

        log::info!("Reset link sent to {}", user.email);
        Ok(())
    }

    /// Check a reset link: the username must own the token's email, and the
    /// token must be a reset token with a valid signature that has not expired.
    pub fn verify_reset_link(&self, encoded_username: &str, token: &str) -> Result<User, AuthError> {
        let username = decode_username(encoded_username)?;

        let claims = self
            .jwt
            .decode_unverified(token)
            .map_err(|_| AuthError::MalformedToken)?;

        let purpose = claims.purpose;
        let user = self.find_user(&UserLookup::Email(claims.email))?;

        if user.username != username {
            log::warn!(
                "Reset link for {} presented with username {}",
                user.username,
                username
            );
            return Err(AuthError::LinkIdentityMismatch);
        }

        if purpose != TokenPurpose::PasswordReset {
            log::warn!("Reset link for {} carries a {:?} token", user.username, purpose);
            return Err(AuthError::InvalidOrExpiredLink);
        }

        if !self.jwt.verify(token) {
            log::warn!("Reset link for {} is invalid or expired", user.username);
            return Err(AuthError::InvalidOrExpiredLink);
        }

        Ok(user)
    }

    pub fn reset_password(&self, req: ResetPasswordRequest) -> Result<(), AuthError> {
        validate_password(&req.new_password)
            .map_err(|e| AuthError::InvalidInput(e.to_string()))?;

        let user = self.verify_reset_link(&req.username, &req.token)?;

        if req.email != user.email {
            return Err(AuthError::EmailMismatch);
        }

        let password_hash = hash_password(&req.new_password).map_err(|e| {
            log::error!("Password hashing error: {}", e);
            AuthError::InternalError(e.to_string())
        })?;

        self.store
            .update_password(user.id, &password_hash)
            .map_err(|e| {
                log::error!("Failed to update password for {}: {}", user.username, e);
                AuthError::InternalError(e.to_string())
            })?;

        log::info!("Password reset for {}", user.username);
        Ok(())
    }

    fn find_user(&self, lookup: &UserLookup) -> Result<User, AuthError> {
        self.store
            .find(lookup)
            .map_err(|e| store_failure("find user", e))
    }

    fn issue_session(&self, user: &User) -> Result<String, AuthError> {
        let claims = Claims::session(
            &user.username,
            &user.email,
            chrono::Duration::hours(SESSION_TTL_HOURS),
        );
        self.jwt.issue(&claims).map_err(|e| {
            log::error!("JWT creation error: {}", e);
            AuthError::InternalError(e.to_string())
        })
    }
}

fn store_failure(action: &str, e: StoreError) -> AuthError {
    if let StoreError::Backend(msg) = &e {
        log::error!("Database error ({}): {}", action, msg);
    }
    AuthError::from(e)
}

/// `{profile name}@{local part of email}`
fn oauth_username(profile: &OAuthProfile) -> String {
    let local_part = profile.email.split('@').next().unwrap_or_default();
    let name = if profile.name.is_empty() {
        "google"
    } else {
        profile.name.as_str()
    };
    format!("{}@{}", name, local_part)
}

/// Usernames travel in a URL path segment, so links use the URL-safe alphabet.
pub fn encode_username(username: &str) -> String {
    URL_SAFE.encode(username.as_bytes())
}

/// Accepts both the standard and the URL-safe alphabet.
pub fn decode_username(encoded: &str) -> Result<String, AuthError> {
    let bytes = STANDARD
        .decode(encoded)
        .or_else(|_| URL_SAFE.decode(encoded))
        .map_err(|_| AuthError::MalformedLink)?;
    String::from_utf8(bytes).map_err(|_| AuthError::MalformedLink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{
        database::SqliteUserStore,
        email::MailError,
        jwt::JwtConfig,
        oauth::OAuthError,
    };
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const SECRET: &str = "test-secret";

    struct FakeGoogle {
        profile: OAuthProfile,
        fail_exchange: bool,
        fail_profile: bool,
        exchange_calls: AtomicUsize,
    }

    impl FakeGoogle {
        fn new(email: &str, name: &str) -> Self {
            Self {
                profile: OAuthProfile {
                    id: "108234567890".to_string(),
                    email: email.to_string(),
                    name: name.to_string(),
                },
                fail_exchange: false,
                fail_profile: false,
                exchange_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl OAuthProvider for FakeGoogle {
        fn auth_code_url(&self, state: &str) -> String {
            format!("https://accounts.example/auth?state={}", state)
        }

        async fn exchange_code(&self, code: &str) -> Result<String, OAuthError> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_exchange {
                return Err(OAuthError::Exchange("invalid_grant".to_string()));
            }
            Ok(format!("access-{}", code))
        }

        async fn fetch_profile(&self, access_token: &str) -> Result<OAuthProfile, OAuthError> {
            assert!(access_token.starts_with("access-"));
            if self.fail_profile {
                return Err(OAuthError::Profile("401 Unauthorized".to_string()));
            }
            Ok(self.profile.clone())
        }
    }

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String, String)>>,
        fail: bool,
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(
            &self,
            from: &str,
            to: &str,
            subject: &str,
            html_body: &str,
        ) -> Result<(), MailError> {
            if self.fail {
                let bad: Result<lettre::message::Mailbox, _> = "not an address".parse();
                return Err(MailError::Address(bad.unwrap_err()));
            }
            self.sent.lock().unwrap().push((
                from.to_string(),
                to.to_string(),
                subject.to_string(),
                html_body.to_string(),
            ));
            Ok(())
        }
    }

    /// Delegates account creation; reads fail when `fail_reads` is set and
    /// password updates always fail.
    struct FailingStore {
        inner: SqliteUserStore,
        fail_reads: bool,
    }

    impl UserStore for FailingStore {
        fn create(&self, user: NewUser) -> Result<User, StoreError> {
            self.inner.create(user)
        }

        fn find(&self, lookup: &UserLookup) -> Result<User, StoreError> {
            if self.fail_reads {
                return Err(StoreError::Backend("database is locked".to_string()));
            }
            self.inner.find(lookup)
        }

        fn update_password(&self, _id: i64, _password_hash: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk I/O error".to_string()))
        }
    }

    fn service_with_store(store: FailingStore) -> AuthService {
        AuthService::new(
            Arc::new(store),
            JwtManager::new(JwtConfig::new(SECRET.to_string()).unwrap()),
            Arc::new(FakeGoogle::new("gina@gmail.com", "Gina")),
            Arc::new(RecordingMailer::default()),
            ResetSettings {
                mail_from: "noreply@travail.test".to_string(),
                reset_link_base: "http://localhost:3000/api/auth/reset_password".to_string(),
            },
        )
    }

    struct Harness {
        service: AuthService,
        google: Arc<FakeGoogle>,
        mailer: Arc<RecordingMailer>,
        store: SqliteUserStore,
    }

    fn harness_with(google: FakeGoogle, mailer: RecordingMailer) -> Harness {
        let store = SqliteUserStore::in_memory().unwrap();
        let google = Arc::new(google);
        let mailer = Arc::new(mailer);
        let service = AuthService::new(
            Arc::new(store.clone()),
            JwtManager::new(JwtConfig::new(SECRET.to_string()).unwrap()),
            google.clone(),
            mailer.clone(),
            ResetSettings {
                mail_from: "noreply@travail.test".to_string(),
                reset_link_base: "http://localhost:3000/api/auth/reset_password".to_string(),
            },
        );
        Harness {
            service,
            google,
            mailer,
            store,
        }
    }

    fn harness() -> Harness {
        harness_with(
            FakeGoogle::new("gina@gmail.com", "Gina"),
            RecordingMailer::default(),
        )
    }

    fn sign_up(service: &AuthService, username: &str, email: &str, password: &str) -> User {
        service
            .sign_up(SignUpRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
            .unwrap()
    }

    fn reset_token(email: &str) -> String {
        JwtManager::new(JwtConfig::new(SECRET.to_string()).unwrap())
            .issue(&Claims::password_reset(email, chrono::Duration::minutes(15)))
            .unwrap()
    }

    #[test]
    fn test_sign_up_stores_hash() {
        let h = harness();
        let user = sign_up(&h.service, "alice", "alice@x.com", "pw123");

        let stored = h
            .store
            .find(&UserLookup::Username("alice".to_string()))
            .unwrap();
        assert_eq!(stored.id, user.id);
        assert_ne!(stored.password_hash, "pw123");
        assert!(verify_password("pw123", &stored.password_hash));
    }

    #[test]
    fn test_sign_up_duplicate_email() {
        let h = harness();
        sign_up(&h.service, "alice", "alice@x.com", "pw123");

        let result = h.service.sign_up(SignUpRequest {
            username: "alice2".to_string(),
            email: "alice@x.com".to_string(),
            password: "pw123".to_string(),
        });
        assert_matches!(result, Err(AuthError::DuplicateIdentity));
    }

    #[test]
    fn test_sign_up_requires_password() {
        let h = harness();
        let result = h.service.sign_up(SignUpRequest {
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: String::new(),
        });
        assert_matches!(result, Err(AuthError::InvalidInput(_)));
    }

    #[test]
    fn test_sign_in_returns_token_with_identity() {
        let h = harness();
        sign_up(&h.service, "alice", "alice@x.com", "pw123");

        let (user, token) = h
            .service
            .sign_in(SignInRequest {
                username: Some("alice".to_string()),
                email: None,
                password: "pw123".to_string(),
            })
            .unwrap();
        assert_eq!(user.email, "alice@x.com");

        let jwt = h.service.jwt();
        assert!(jwt.verify(&token));
        let claims = jwt.decode_unverified(&token).unwrap();
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.email, "alice@x.com");
        let ttl = claims.exp - chrono::Utc::now().timestamp();
        assert!(ttl > 71 * 3600 && ttl <= 72 * 3600);
    }

    #[test]
    fn test_sign_in_by_email_and_both() {
        let h = harness();
        sign_up(&h.service, "alice", "alice@x.com", "pw123");
        sign_up(&h.service, "bob", "bob@x.com", "pw456");

        let by_email = h.service.sign_in(SignInRequest {
            username: None,
            email: Some("alice@x.com".to_string()),
            password: "pw123".to_string(),
        });
        assert!(by_email.is_ok());

        // Both identifiers must match the same account
        let crossed = h.service.sign_in(SignInRequest {
            username: Some("alice".to_string()),
            email: Some("bob@x.com".to_string()),
            password: "pw123".to_string(),
        });
        assert_matches!(crossed, Err(AuthError::NotFound));
    }

    #[test]
    fn test_sign_in_failures() {
        let h = harness();
        sign_up(&h.service, "alice", "alice@x.com", "pw123");

        let wrong_password = h.service.sign_in(SignInRequest {
            username: Some("alice".to_string()),
            email: None,
            password: "pw124".to_string(),
        });
        assert_matches!(wrong_password, Err(AuthError::InvalidCredentials));

        let unknown = h.service.sign_in(SignInRequest {
            username: Some("mallory".to_string()),
            email: None,
            password: "pw123".to_string(),
        });
        assert_matches!(unknown, Err(AuthError::NotFound));

        let missing = h.service.sign_in(SignInRequest {
            username: Some(String::new()),
            email: None,
            password: "pw123".to_string(),
        });
        assert_matches!(missing, Err(AuthError::MissingIdentifier));
    }

    #[test]
    fn test_initiate_oauth_puts_state_in_url() {
        let h = harness();
        let (url, state) = h.service.initiate_oauth().unwrap();
        assert!(url.ends_with(&state.value));
        assert!(state.cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn test_oauth_state_mismatch_never_exchanges() {
        let h = harness();

        let result = h
            .service
            .complete_oauth(Some("cookie-state"), "other-state", "code")
            .await;
        assert_matches!(result, Err(AuthError::OAuthStateMismatch));

        let missing_cookie = h.service.complete_oauth(None, "other-state", "code").await;
        assert_matches!(missing_cookie, Err(AuthError::OAuthStateMismatch));

        assert_eq!(h.google.exchange_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oauth_creates_account_on_first_login() {
        let h = harness();

        let (user, token) = h
            .service
            .complete_oauth(Some("s"), "s", "code")
            .await
            .unwrap();
        assert_eq!(user.username, "Gina@gina");
        assert_eq!(user.email, "gina@gmail.com");
        // The provider id only seeds the stored hash
        assert_ne!(user.password_hash, "108234567890");

        let claims = h.service.jwt().decode_unverified(&token).unwrap();
        assert!(h.service.jwt().verify(&token));
        assert_eq!(claims.email, "gina@gmail.com");
        assert_eq!(claims.username.as_deref(), Some("Gina@gina"));
    }

    #[tokio::test]
    async fn test_oauth_links_existing_account() {
        let h = harness();
        let existing = sign_up(&h.service, "gina", "gina@gmail.com", "pw123");

        let (user, token) = h
            .service
            .complete_oauth(Some("s"), "s", "code")
            .await
            .unwrap();
        assert_eq!(user.id, existing.id);

        let claims = h.service.jwt().decode_unverified(&token).unwrap();
        assert_eq!(claims.username.as_deref(), Some("gina"));
        // Password login still works after linking
        assert!(h
            .service
            .sign_in(SignInRequest {
                username: Some("gina".to_string()),
                email: None,
                password: "pw123".to_string(),
            })
            .is_ok());
    }

    #[tokio::test]
    async fn test_oauth_exchange_failure() {
        let mut google = FakeGoogle::new("gina@gmail.com", "Gina");
        google.fail_exchange = true;
        let h = harness_with(google, RecordingMailer::default());

        let result = h.service.complete_oauth(Some("s"), "s", "bad-code").await;
        assert_matches!(result, Err(AuthError::OAuthExchangeFailed(_)));
        assert_matches!(
            h.store.find(&UserLookup::Email("gina@gmail.com".to_string())),
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_oauth_profile_failure() {
        let mut google = FakeGoogle::new("gina@gmail.com", "Gina");
        google.fail_profile = true;
        let h = harness_with(google, RecordingMailer::default());

        let result = h.service.complete_oauth(Some("s"), "s", "code").await;
        assert_matches!(result, Err(AuthError::ProfileFetchFailed(_)));
        assert_eq!(h.google.exchange_calls.load(Ordering::SeqCst), 1);
        assert_matches!(
            h.store.find(&UserLookup::Email("gina@gmail.com".to_string())),
            Err(StoreError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_store_failures_are_internal_errors() {
        let service = service_with_store(FailingStore {
            inner: SqliteUserStore::in_memory().unwrap(),
            fail_reads: true,
        });

        let signin = service.sign_in(SignInRequest {
            username: Some("alice".to_string()),
            email: None,
            password: "pw123".to_string(),
        });
        assert_matches!(signin, Err(AuthError::InternalError(_)));

        let oauth = service.complete_oauth(Some("s"), "s", "code").await;
        assert_matches!(oauth, Err(AuthError::InternalError(_)));

        let reset = service.reset_password(ResetPasswordRequest {
            username: "am9obg==".to_string(),
            token: reset_token("john@x.com"),
            email: "john@x.com".to_string(),
            new_password: "new-secret".to_string(),
        });
        assert_matches!(reset, Err(AuthError::InternalError(_)));
    }

    #[test]
    fn test_reset_password_update_failure_is_internal_error() {
        let service = service_with_store(FailingStore {
            inner: SqliteUserStore::in_memory().unwrap(),
            fail_reads: false,
        });
        sign_up(&service, "john", "john@x.com", "pw123");

        let result = service.reset_password(ResetPasswordRequest {
            username: "am9obg==".to_string(),
            token: reset_token("john@x.com"),
            email: "john@x.com".to_string(),
            new_password: "new-secret".to_string(),
        });
        assert_matches!(result, Err(AuthError::InternalError(_)));
    }

    #[tokio::test]
    async fn test_forgot_password_sends_reset_link() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");

        h.service
            .forgot_password(ForgotPasswordRequest {
                email: "john@x.com".to_string(),
            })
            .await
            .unwrap();

        let sent = h.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (from, to, subject, body) = &sent[0];
        assert_eq!(from, "noreply@travail.test");
        assert_eq!(to, "john@x.com");
        assert_eq!(subject, "Forgot Password");

        let prefix = "http://localhost:3000/api/auth/reset_password/am9obg==/";
        let start = body.find(prefix).expect("reset url in body") + prefix.len();
        let token: String = body[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect();

        let claims = h.service.jwt().decode_unverified(&token).unwrap();
        assert_eq!(claims.email, "john@x.com");
        assert_eq!(claims.username, None);
        let ttl = claims.exp - chrono::Utc::now().timestamp();
        assert!(ttl > 14 * 60 && ttl <= 15 * 60);

        let user = h.service.verify_reset_link("am9obg==", &token).unwrap();
        assert_eq!(user.username, "john");
    }

    #[tokio::test]
    async fn test_forgot_password_failures() {
        let h = harness_with(
            FakeGoogle::new("gina@gmail.com", "Gina"),
            RecordingMailer {
                fail: true,
                ..Default::default()
            },
        );
        sign_up(&h.service, "john", "john@x.com", "pw123");

        let unknown = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "nobody@x.com".to_string(),
            })
            .await;
        assert_matches!(unknown, Err(AuthError::NotFound));

        let undeliverable = h
            .service
            .forgot_password(ForgotPasswordRequest {
                email: "john@x.com".to_string(),
            })
            .await;
        assert_matches!(undeliverable, Err(AuthError::DeliveryFailed(_)));
    }

    #[test]
    fn test_verify_reset_link_identity_mismatch() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");
        sign_up(&h.service, "mary", "mary@x.com", "pw123");

        // "am9obg==" is "john", but the token belongs to mary
        let token = reset_token("mary@x.com");
        let result = h.service.verify_reset_link("am9obg==", &token);
        assert_matches!(result, Err(AuthError::LinkIdentityMismatch));
    }

    #[test]
    fn test_verify_reset_link_malformed() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");
        let token = reset_token("john@x.com");

        assert_matches!(
            h.service.verify_reset_link("%%%not-base64", &token),
            Err(AuthError::MalformedLink)
        );
        assert_matches!(
            h.service.verify_reset_link("am9obg==", "garbage"),
            Err(AuthError::MalformedToken)
        );

        let stranger = reset_token("stranger@x.com");
        assert_matches!(
            h.service.verify_reset_link("am9obg==", &stranger),
            Err(AuthError::NotFound)
        );
    }

    #[test]
    fn test_verify_reset_link_expired_or_forged() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");

        let expired = JwtManager::new(JwtConfig::new(SECRET.to_string()).unwrap())
            .issue(&Claims {
                username: None,
                email: "john@x.com".to_string(),
                purpose: TokenPurpose::PasswordReset,
                exp: chrono::Utc::now().timestamp() - 60,
            })
            .unwrap();
        assert_matches!(
            h.service.verify_reset_link("am9obg==", &expired),
            Err(AuthError::InvalidOrExpiredLink)
        );

        let forged = JwtManager::new(JwtConfig::new("attacker-secret".to_string()).unwrap())
            .issue(&Claims::password_reset("john@x.com", chrono::Duration::minutes(15)))
            .unwrap();
        assert_matches!(
            h.service.verify_reset_link("am9obg==", &forged),
            Err(AuthError::InvalidOrExpiredLink)
        );
    }

    #[test]
    fn test_reset_password_success() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");

        h.service
            .reset_password(ResetPasswordRequest {
                username: "am9obg==".to_string(),
                token: reset_token("john@x.com"),
                email: "john@x.com".to_string(),
                new_password: "new-secret".to_string(),
            })
            .unwrap();

        let old = h.service.sign_in(SignInRequest {
            username: Some("john".to_string()),
            email: None,
            password: "pw123".to_string(),
        });
        assert_matches!(old, Err(AuthError::InvalidCredentials));

        let new = h.service.sign_in(SignInRequest {
            username: Some("john".to_string()),
            email: None,
            password: "new-secret".to_string(),
        });
        assert!(new.is_ok());
    }

    #[test]
    fn test_reset_password_rejects_each_wrong_part() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");
        sign_up(&h.service, "mary", "mary@x.com", "pw123");

        let request = |username: &str, token: String, email: &str| ResetPasswordRequest {
            username: username.to_string(),
            token,
            email: email.to_string(),
            new_password: "new-secret".to_string(),
        };

        // Username of another account
        let result = h.service.reset_password(request(
            &encode_username("mary"),
            reset_token("john@x.com"),
            "john@x.com",
        ));
        assert_matches!(result, Err(AuthError::LinkIdentityMismatch));

        // Token signed with another key
        let forged = JwtManager::new(JwtConfig::new("attacker-secret".to_string()).unwrap())
            .issue(&Claims::password_reset("john@x.com", chrono::Duration::minutes(15)))
            .unwrap();
        let result = h
            .service
            .reset_password(request("am9obg==", forged, "john@x.com"));
        assert_matches!(result, Err(AuthError::InvalidOrExpiredLink));

        // Request email differs from the account email
        let result = h.service.reset_password(request(
            "am9obg==",
            reset_token("john@x.com"),
            "mary@x.com",
        ));
        assert_matches!(result, Err(AuthError::EmailMismatch));

        // Nothing changed
        assert!(h
            .service
            .sign_in(SignInRequest {
                username: Some("john".to_string()),
                email: None,
                password: "pw123".to_string(),
            })
            .is_ok());
    }

    #[test]
    fn test_session_token_is_not_a_reset_token() {
        let h = harness();
        sign_up(&h.service, "john", "john@x.com", "pw123");
        let (_, session) = h
            .service
            .sign_in(SignInRequest {
                username: Some("john".to_string()),
                email: None,
                password: "pw123".to_string(),
            })
            .unwrap();

        assert_matches!(
            h.service.verify_reset_link("am9obg==", &session),
            Err(AuthError::InvalidOrExpiredLink)
        );

        let result = h.service.reset_password(ResetPasswordRequest {
            username: "am9obg==".to_string(),
            token: session,
            email: "john@x.com".to_string(),
            new_password: "hijacked".to_string(),
        });
        assert_matches!(result, Err(AuthError::InvalidOrExpiredLink));
        assert!(h
            .service
            .sign_in(SignInRequest {
                username: Some("john".to_string()),
                email: None,
                password: "pw123".to_string(),
            })
            .is_ok());
    }

    #[test]
    fn test_username_encoding() {
        assert_eq!(encode_username("john"), "am9obg==");
        assert_eq!(decode_username("am9obg==").unwrap(), "john");
        // Standard-alphabet links from older emails still decode
        assert_eq!(decode_username("Pz8/").unwrap(), "???");
        assert_eq!(decode_username(&encode_username("???")).unwrap(), "???");
        assert_matches!(decode_username("/w=="), Err(AuthError::MalformedLink));
    }
}
