//! Application assembly
//!
//! Wires the stores into the services, merges the routers and applies the
//! shared layers. `main` only loads configuration and serves the result.

use std::sync::Arc;

use axum::{
    Router,
    extract::{OriginalUri, State},
    http::{HeaderValue, Method, StatusCode, header},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::core::api_error::ErrorResponse;
use crate::core::auth::{AuthApiState, AuthService, PasswordHasher, TokenService, auth_api_router};
use crate::core::channels::{ChannelApiState, channel_api_router};
use crate::core::config::Config;
use crate::core::db::{
    ChannelRepository, ChannelStore, MemoryChannelStore, MemoryTokenStore, MemoryUserStore,
    PgPool, TokenRepository, TokenStore, UserRepository, UserStore, health_check,
};

/// The persistence backends the services run on
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub channels: Arc<dyn ChannelStore>,
    pool: Option<PgPool>,
}

impl Stores {
    /// PostgreSQL-backed stores sharing one pool
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(UserRepository::new(pool.clone())),
            tokens: Arc::new(TokenRepository::new(pool.clone())),
            channels: Arc::new(ChannelRepository::new(pool.clone())),
            pool: Some(pool),
        }
    }

    /// Process-local stores; everything is lost on restart
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(MemoryUserStore::new()),
            tokens: Arc::new(MemoryTokenStore::new()),
            channels: Arc::new(MemoryChannelStore::new()),
            pool: None,
        }
    }
}

/// GET /health
async fn health_handler(State(pool): State<Option<PgPool>>) -> (StatusCode, &'static str) {
    let Some(pool) = pool else {
        return (StatusCode::OK, "ok");
    };

    match health_check(&pool).await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!("Database health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "database unavailable")
        }
    }
}

/// Unmatched routes
async fn not_found_handler(OriginalUri(uri): OriginalUri) -> ErrorResponse {
    ErrorResponse::with_status(StatusCode::NOT_FOUND, "route not found", &uri)
}

/// `TimeoutLayer` answers with a bare 408; give it the error envelope
async fn timeout_envelope(OriginalUri(uri): OriginalUri, response: Response) -> Response {
    let bare_timeout = response.status() == StatusCode::REQUEST_TIMEOUT
        && !response.headers().contains_key(header::CONTENT_TYPE);
    if !bare_timeout {
        return response;
    }

    tracing::warn!(url = %uri, "Request timed out");
    ErrorResponse::with_status(StatusCode::REQUEST_TIMEOUT, "request timed out", &uri)
        .into_response()
}

fn cors_layer(config: &Config) -> CorsLayer {
    // No configured origin: same-origin only
    let Some(origin) = config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<HeaderValue>().ok())
    else {
        return CorsLayer::new();
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the full application router
pub fn build_router(config: &Config, stores: Stores, token_service: TokenService) -> Router {
    let auth_service = AuthService::new(
        stores.users.clone(),
        stores.tokens.clone(),
        token_service.clone(),
        PasswordHasher::new(config.bcrypt_cost),
    );

    let health = Router::new()
        .route("/health", get(health_handler))
        .with_state(stores.pool.clone());

    let routes = Router::new()
        .merge(auth_api_router(AuthApiState { auth_service }))
        .merge(channel_api_router(ChannelApiState {
            channels: stores.channels,
            token_service,
        }))
        .merge(health);

    with_layers(routes, config)
}

/// Fallback, deadline, CORS and tracing shared by every route
fn with_layers(routes: Router, config: &Config) -> Router {
    routes
        .fallback(not_found_handler)
        .layer(TimeoutLayer::new(config.request_timeout()))
        .layer(map_response(timeout_envelope))
        .layer(cors_layer(config))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::core::auth::JwtConfig;

    fn app(config: &Config) -> Router {
        let tokens = TokenService::new(JwtConfig::new("access-secret", "refresh-secret"));
        build_router(config, Stores::in_memory(), tokens)
    }

    #[tokio::test]
    async fn test_health_without_database() {
        let response = app(&Config::default())
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_routers_are_merged() {
        let app = app(&Config::default());

        let channels = app
            .clone()
            .oneshot(Request::get("/channels").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let me = app
            .oneshot(Request::get("/me").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(channels.status(), StatusCode::OK);
        assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
    }

    async fn json_body(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_route_uses_error_envelope() {
        let response = app(&Config::default())
            .oneshot(Request::get("/nowhere?x=1").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await;
        assert_eq!(body["status_code"], 404);
        assert_eq!(body["message"], "route not found");
        assert_eq!(body["url"], "/nowhere?x=1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_uses_error_envelope() {
        let config = Config {
            request_timeout_secs: 1,
            ..Config::default()
        };
        let slow = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                "done"
            }),
        );

        let response = with_layers(slow, &config)
            .oneshot(Request::get("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = json_body(response).await;
        assert_eq!(body["status_code"], 408);
        assert_eq!(body["url"], "/slow");
    }

    #[tokio::test]
    async fn test_cors_allows_configured_origin_with_credentials() {
        let config = Config {
            cors_origin: Some("http://localhost:5173".to_string()),
            ..Config::default()
        };

        let response = app(&config)
            .oneshot(
                Request::get("/channels")
                    .header(header::ORIGIN, "http://localhost:5173")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
            "true"
        );
    }
}
