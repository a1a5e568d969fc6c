//! Authentication REST API routes

use axum::{
    extract::{rejection::JsonRejection, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use super::{
    error::AuthError,
    models::*,
    oauth::{OAuthStateGuard, OAUTH_STATE_COOKIE},
    service::AuthService,
};

/// Response envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct BaseResponse<T: Serialize> {
    pub status: &'static str,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorResponse>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error_message: String,
}

impl<T: Serialize> BaseResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: "success",
            data: Some(data),
            error: None,
        }
    }
}

impl BaseResponse<()> {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: "failed",
            data: None,
            error: Some(ErrorResponse {
                error_message: message.into(),
            }),
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(BaseResponse::failed(message))).into_response()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_response(self.status(), &self.public_message())
    }
}

fn message(text: &str) -> Json<BaseResponse<MessageResponse>> {
    Json(BaseResponse::success(MessageResponse {
        message: text.to_string(),
    }))
}

/// Create auth router, mounted under `/api/auth`
pub fn auth_router(state: Arc<AuthService>) -> Router {
    let protected = Router::new()
        .route("/me", get(current_claims))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        // Password auth
        .route("/signup", post(sign_up))
        .route("/signin", post(sign_in))
        // Google OAuth
        .route("/google/signin", get(google_sign_in))
        .route("/google/redirect", get(google_redirect))
        // Password reset
        .route("/forgot_password", post(forgot_password))
        .route("/reset_password/{username}/{token}", get(verify_reset_link))
        .route("/reset_password", patch(reset_password))
        .merge(protected)
        .with_state(state)
}

/// POST /api/auth/signup
async fn sign_up(
    State(state): State<Arc<AuthService>>,
    payload: Result<Json<SignUpRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(req) = payload.map_err(bad_body)?;
    let user = state.sign_up(req)?;

    Ok(Json(BaseResponse::success(SignUpResponse {
        user_info: UserResponse::from(&user),
    }))
    .into_response())
}

/// POST /api/auth/signin
async fn sign_in(
    State(state): State<Arc<AuthService>>,
    payload: Result<Json<SignInRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(req) = payload.map_err(bad_body)?;
    let (user, token) = state.sign_in(req)?;

    Ok(Json(BaseResponse::success(AuthResponse {
        access_token: token,
        user_info: UserResponse::from(&user),
    }))
    .into_response())
}

/// GET /api/auth/google/signin - Redirect to Google with a fresh state cookie
async fn google_sign_in(State(state): State<Arc<AuthService>>) -> Result<Response, AuthError> {
    let (url, oauth_state) = state.initiate_oauth()?;

    Ok((
        [(header::SET_COOKIE, oauth_state.cookie)],
        Redirect::temporary(&url),
    )
        .into_response())
}

/// GET /api/auth/google/redirect - OAuth callback
async fn google_redirect(
    State(state): State<Arc<AuthService>>,
    headers: HeaderMap,
    Query(callback): Query<OAuthCallback>,
) -> Response {
    let cookie_state = read_cookie(&headers, OAUTH_STATE_COOKIE);
    // The state is single use whatever the outcome
    let clear = [(header::SET_COOKIE, OAuthStateGuard::clear_cookie())];

    match state
        .complete_oauth(cookie_state.as_deref(), &callback.state, &callback.code)
        .await
    {
        Ok((user, token)) => (
            clear,
            Json(BaseResponse::success(AuthResponse {
                access_token: token,
                user_info: UserResponse::from(&user),
            })),
        )
            .into_response(),
        Err(AuthError::OAuthStateMismatch) => (clear, Redirect::temporary("/")).into_response(),
        Err(e) => (clear, e).into_response(),
    }
}

/// POST /api/auth/forgot_password
async fn forgot_password(
    State(state): State<Arc<AuthService>>,
    payload: Result<Json<ForgotPasswordRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(req) = payload.map_err(bad_body)?;
    state.forgot_password(req).await?;

    Ok(message("reset password link has been sent to your email").into_response())
}

/// GET /api/auth/reset_password/{username}/{token} - Check a reset link before showing the form
async fn verify_reset_link(
    State(state): State<Arc<AuthService>>,
    Path((username, token)): Path<(String, String)>,
) -> Result<Response, AuthError> {
    state.verify_reset_link(&username, &token)?;
    Ok(message("reset link is valid").into_response())
}

/// PATCH /api/auth/reset_password
async fn reset_password(
    State(state): State<Arc<AuthService>>,
    payload: Result<Json<ResetPasswordRequest>, JsonRejection>,
) -> Result<Response, AuthError> {
    let Json(req) = payload.map_err(bad_body)?;
    state.reset_password(req)?;

    Ok(message("password has been reset").into_response())
}

/// GET /api/auth/me - Claims of the presented bearer token
async fn current_claims(Extension(claims): Extension<Claims>) -> Json<BaseResponse<Claims>> {
    Json(BaseResponse::success(claims))
}

/// Rejects requests without a valid session bearer token; on success the
/// token's claims are attached as a request extension.
pub async fn require_auth(
    State(state): State<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    {
        Some(value) if !value.is_empty() => value.replace("Bearer ", ""),
        _ => return error_response(StatusCode::UNAUTHORIZED, "missing authorization header"),
    };

    if token.split('.').count() != 3 {
        return error_response(StatusCode::UNAUTHORIZED, "Token is not JWT");
    }

    let jwt = state.jwt();
    if !jwt.verify(&token) {
        return error_response(StatusCode::UNAUTHORIZED, "Token is invalid");
    }
    // Signature and expiry were checked just above
    let claims = match jwt.decode_unverified(&token) {
        Ok(claims) if claims.purpose == TokenPurpose::Session => claims,
        Ok(claims) => {
            log::warn!("Bearer rejected: {:?} token for {}", claims.purpose, claims.email);
            return error_response(StatusCode::UNAUTHORIZED, "Token is invalid");
        }
        Err(_) => return error_response(StatusCode::UNAUTHORIZED, "Token is invalid"),
    };

    request.extensions_mut().insert(claims);
    next.run(request).await
}

fn bad_body(rejection: JsonRejection) -> AuthError {
    AuthError::InvalidInput(rejection.body_text())
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| cookie::Cookie::parse(pair.trim()).ok())
        .find(|cookie| cookie.name() == name)
        .map(|cookie| cookie.value().to_string())
}
