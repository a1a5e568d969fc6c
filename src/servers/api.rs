use axum::{
    http::{header, Method},
    response::Json,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::{auth_router, routes::BaseResponse, AuthService, MessageResponse};

// Configuration pour le serveur HTTP
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// HTTP server exposing `/ping` and the `/api/auth` routes
pub struct ApiServer {
    config: ApiConfig,
    auth: Arc<AuthService>,
}

impl ApiServer {
    pub fn new(config: ApiConfig, auth: Arc<AuthService>) -> Self {
        Self { config, auth }
    }

    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.create_router();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let listener = TcpListener::bind(addr).await?;

        log::info!("API server listening on http://{}", addr);

        axum::serve(listener, app).await?;
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/ping", get(ping))
            .nest("/api/auth", auth_router(self.auth.clone()))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([
                        Method::GET,
                        Method::POST,
                        Method::PUT,
                        Method::PATCH,
                        Method::DELETE,
                        Method::HEAD,
                        Method::OPTIONS,
                    ])
                    .allow_headers([
                        header::AUTHORIZATION,
                        header::ORIGIN,
                        header::CONTENT_LENGTH,
                        header::CONTENT_TYPE,
                    ])
                    .max_age(Duration::from_secs(12 * 3600)),
            )
    }
}

async fn ping() -> Json<BaseResponse<MessageResponse>> {
    Json(BaseResponse::success(MessageResponse {
        message: "Pong!".to_string(),
    }))
}
