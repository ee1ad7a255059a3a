//! Auth API endpoints
//!
//! - POST /register - Register a new user
//! - POST /login - Login and get tokens
//! - POST /logout - Logout (invalidate refresh token)
//! - GET|POST /refresh - Rotate the refresh token and get a new pair
//! - GET /me - Get current user info
//! - PATCH /me/username - Rename the current user
//! - PATCH /me/password - Change password (signs the user out)
//!
//! The refresh token only ever travels in the `refresh_token` HttpOnly cookie.

use axum::{
    Json, Router,
    extract::{FromRef, OriginalUri, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::api_error::{ApiError, ApiJson, ErrorResponse, ResultExt};
use crate::core::auth::extractor::CurrentUser;
use crate::core::auth::jwt::TokenService;
use crate::core::auth::service::{
    AuthError, AuthResponse, AuthService, LoginRequest, RegisterRequest,
};
use crate::core::db::models::UserResponse;

/// Name of the cookie carrying the refresh token
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Auth API state containing the auth service
#[derive(Clone)]
pub struct AuthApiState {
    pub auth_service: AuthService,
}

impl FromRef<Arc<AuthApiState>> for TokenService {
    fn from_ref(state: &Arc<AuthApiState>) -> Self {
        state.auth_service.token_service().clone()
    }
}

impl ApiError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            AuthError::UserExists => StatusCode::CONFLICT,
            AuthError::WrongPassword
            | AuthError::TokenExpired
            | AuthError::InvalidToken
            | AuthError::UnexpectedSigningMethod
            | AuthError::TokenNotFound
            | AuthError::MissingBearer
            | AuthError::MissingRefreshCookie => StatusCode::UNAUTHORIZED,
            AuthError::UserNotFound => StatusCode::NOT_FOUND,
            AuthError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AuthError::JwtSigning(_) | AuthError::Storage { .. } | AuthError::Password(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Request for changing username
#[derive(Debug, Deserialize)]
pub struct ChangeUsernameRequest {
    pub username: String,
}

/// Request for changing password
#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/refresh", get(refresh_handler).post(refresh_handler))
        .route("/me", get(me_handler))
        .route("/me/username", patch(change_username_handler))
        .route("/me/password", patch(change_password_handler))
        .with_state(state)
}

fn refresh_cookie(value: String, days: i64) -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, value))
        .http_only(true)
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(days))
        .build()
}

fn expired_refresh_cookie() -> Cookie<'static> {
    Cookie::build((REFRESH_TOKEN_COOKIE, ""))
        .http_only(true)
        .path("/")
        .max_age(time::Duration::seconds(-1))
        .build()
}

/// Put the refresh token in its cookie and the rest in the body
fn with_cookie(
    state: &AuthApiState,
    jar: CookieJar,
    response: AuthResponse,
) -> (CookieJar, Json<AuthResponse>) {
    let days = state
        .auth_service
        .token_service()
        .refresh_token_expiration_days();
    let jar = jar.add(refresh_cookie(response.refresh_token.clone(), days));

    (jar, Json(response))
}

fn refresh_token_from(jar: &CookieJar) -> Result<String, AuthError> {
    jar.get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
        .ok_or(AuthError::MissingRefreshCookie)
}

/// POST /register
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    tracing::info!("Registration attempt for username: {}", request.username);

    let response = state.auth_service.register(request).await.at(&uri)?;

    Ok((StatusCode::CREATED, with_cookie(&state, jar, response)))
}

/// POST /login
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    tracing::info!("Login attempt for username: {}", request.username);

    let response = state.auth_service.login(request).await.at(&uri)?;

    Ok(with_cookie(&state, jar, response))
}

/// POST /logout
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
) -> Result<impl IntoResponse, ErrorResponse> {
    tracing::info!("Logout request");

    let refresh_token = refresh_token_from(&jar).at(&uri)?;
    state.auth_service.logout(&refresh_token).await.at(&uri)?;

    Ok((StatusCode::NO_CONTENT, jar.add(expired_refresh_cookie())))
}

/// GET|POST /refresh
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    jar: CookieJar,
) -> Result<impl IntoResponse, ErrorResponse> {
    tracing::debug!("Token refresh request");

    let refresh_token = refresh_token_from(&jar).at(&uri)?;
    let response = state.auth_service.refresh(&refresh_token).await.at(&uri)?;

    Ok(with_cookie(&state, jar, response))
}

/// GET /me
async fn me_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
) -> Result<Json<UserResponse>, ErrorResponse> {
    let profile = state.auth_service.current_user(user.id).await.at(&uri)?;

    Ok(Json(profile))
}

/// PATCH /me/username
async fn change_username_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
    ApiJson(request): ApiJson<ChangeUsernameRequest>,
) -> Result<Json<UserResponse>, ErrorResponse> {
    let profile = state
        .auth_service
        .change_username(user.id, &request.username)
        .await
        .at(&uri)?;

    Ok(Json(profile))
}

/// PATCH /me/password
async fn change_password_handler(
    State(state): State<Arc<AuthApiState>>,
    OriginalUri(uri): OriginalUri,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    ApiJson(request): ApiJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ErrorResponse> {
    state
        .auth_service
        .change_password(user.id, &request.current_password, &request.new_password)
        .await
        .at(&uri)?;

    Ok((StatusCode::NO_CONTENT, jar.add(expired_refresh_cookie())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, Response, header},
    };
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::core::auth::jwt::JwtConfig;
    use crate::core::auth::password::{MIN_COST, PasswordHasher};
    use crate::core::db::repositories::{MemoryTokenStore, MemoryUserStore};

    fn app() -> Router {
        let auth_service = AuthService::new(
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryTokenStore::new()),
            TokenService::new(JwtConfig::new("access-secret", "refresh-secret")),
            PasswordHasher::new(MIN_COST),
        );

        auth_api_router(AuthApiState { auth_service })
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn cookie_request(method: &str, uri: &str, refresh_token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::COOKIE, format!("{REFRESH_TOKEN_COOKIE}={refresh_token}"))
            .body(Body::empty())
            .unwrap()
    }

    fn bearer_request(
        method: &str,
        uri: &str,
        access_token: &str,
        body: Option<Value>,
    ) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {access_token}"));

        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    fn set_cookie(response: &Response<Body>) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .expect("set-cookie header")
            .to_str()
            .unwrap()
            .to_string()
    }

    fn cookie_value(set_cookie: &str) -> String {
        set_cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("refresh_token="))
            .expect("refresh_token cookie")
            .to_string()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn register(app: &Router, username: &str) -> (String, String) {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/register",
                json!({"username": username, "password": "pw1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let refresh = cookie_value(&set_cookie(&response));
        let body = body_json(response).await;
        let access = body["access_token"].as_str().unwrap().to_string();

        (access, refresh)
    }

    // ========================================================================
    // Register / Login
    // ========================================================================

    #[tokio::test]
    async fn test_register_sets_cookie_and_hides_refresh_token() {
        let app = app();

        let response = app
            .oneshot(json_request(
                "POST",
                "/register",
                json!({"username": "alice", "password": "pw1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("refresh_token="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Max-Age=2592000"));

        let body = body_json(response).await;
        assert_eq!(body["user"]["username"], "alice");
        assert!(body["access_token"].is_string());
        assert!(body.get("refresh_token").is_none());
    }

    #[tokio::test]
    async fn test_register_duplicate_is_conflict() {
        let app = app();
        register(&app, "alice").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/register",
                json!({"username": "alice", "password": "other"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["status_code"], 409);
        assert_eq!(body["message"], "user already exists");
        assert_eq!(body["url"], "/register");
    }

    #[tokio::test]
    async fn test_malformed_body_uses_error_envelope() {
        let app = app();

        let response = app
            .oneshot(json_request("POST", "/login", json!({"username": "alice"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["status_code"], 400);
        assert_eq!(body["url"], "/login");
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let app = app();
        register(&app, "alice").await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/login",
                json!({"username": "alice", "password": "wrong"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["message"], "wrong password");
    }

    #[tokio::test]
    async fn test_login_unknown_user_is_not_found() {
        let response = app()
            .oneshot(json_request(
                "POST",
                "/login",
                json!({"username": "ghost", "password": "pw1"}),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    // ========================================================================
    // Refresh / Logout
    // ========================================================================

    #[tokio::test]
    async fn test_refresh_rotates_cookie() {
        let app = app();
        let (_, refresh) = register(&app, "bob").await;

        let response = app
            .clone()
            .oneshot(cookie_request("GET", "/refresh", &refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let rotated = cookie_value(&set_cookie(&response));
        assert_ne!(rotated, refresh);

        let replay = app
            .oneshot(cookie_request("POST", "/refresh", &refresh))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(replay).await["message"], "refresh token not found");
    }

    #[tokio::test]
    async fn test_refresh_without_cookie() {
        let response = app()
            .oneshot(Request::get("/refresh").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie_and_revokes() {
        let app = app();
        let (_, refresh) = register(&app, "carol").await;

        let response = app
            .clone()
            .oneshot(cookie_request("POST", "/logout", &refresh))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(set_cookie(&response).contains("Max-Age=-1"));

        let after = app
            .oneshot(cookie_request("GET", "/refresh", &refresh))
            .await
            .unwrap();
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_logout_without_cookie() {
        let response = app()
            .oneshot(Request::post("/logout").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    // ========================================================================
    // Current user
    // ========================================================================

    #[tokio::test]
    async fn test_me_requires_bearer() {
        let response = app()
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "missing bearer token");
        assert_eq!(body["url"], "/me");
    }

    #[tokio::test]
    async fn test_me_returns_profile() {
        let app = app();
        let (access, _) = register(&app, "dave").await;

        let response = app
            .oneshot(bearer_request("GET", "/me", &access, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "dave");
        assert!(body.get("password_hash").is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_an_access_token() {
        let app = app();
        let (_, refresh) = register(&app, "erin").await;

        let response = app
            .oneshot(bearer_request("GET", "/me", &refresh, None))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_change_username() {
        let app = app();
        let (access, _) = register(&app, "frank").await;

        let response = app
            .oneshot(bearer_request(
                "PATCH",
                "/me/username",
                &access,
                Some(json!({"username": "francis"})),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["username"], "francis");
    }

    #[tokio::test]
    async fn test_change_password_revokes_refresh_token() {
        let app = app();
        let (access, refresh) = register(&app, "grace").await;

        let response = app
            .clone()
            .oneshot(bearer_request(
                "PATCH",
                "/me/password",
                &access,
                Some(json!({"current_password": "pw1", "new_password": "pw2"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let after = app
            .oneshot(cookie_request("GET", "/refresh", &refresh))
            .await
            .unwrap();
        assert_eq!(after.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(AuthError::UserExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(AuthError::UserNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::TokenNotFound.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::UnexpectedSigningMethod.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::JwtSigning("x".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthError::InvalidInput("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
