//! HTTP server setup and configuration.

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::handlers;
use crate::config::Config;
use crate::credentials::{AzureClientCredentials, NoIdentityConfigured, TokenCache};
use crate::router::Router as ModelRouter;

/// Correlation id assigned to every request as it enters the app.
#[derive(Debug, Clone)]
pub struct RequestId(pub Uuid);

/// Shared application state.
///
/// Constructed once at startup and cloned per request; every field is either
/// immutable after load or internally synchronized ([`TokenCache`]).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<ModelRouter>,
    pub tokens: Arc<TokenCache>,
    pub http_client: Client,
}

async fn assign_request_id(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(RequestId(Uuid::new_v4()));
    next.run(request).await
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(handlers::messages))
        // modelgate extensions
        .route("/health", get(handlers::health))
        .route("/providers", get(handlers::list_providers))
        // State and middleware
        .with_state(state)
        .layer(middleware::from_fn(assign_request_id))
        .layer(TraceLayer::new_for_http())
}

/// Run the HTTP server.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    config.export_env();

    let tokens = if config.has_cloud_identity_provider() {
        Arc::new(TokenCache::new(AzureClientCredentials::from_env()?))
    } else {
        Arc::new(TokenCache::new(NoIdentityConfigured))
    };

    let http_client = Client::builder()
        .timeout(Duration::from_secs(120))
        .connect_timeout(Duration::from_secs(10))
        .build()?;

    let state = AppState {
        router: Arc::new(ModelRouter::new(config.clone())),
        tokens,
        http_client,
        config: config.clone(),
    };

    let app = create_router(state);

    let listen_addr = config.listen();
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting modelgate proxy server");

    axum::serve(listener, app).await?;

    Ok(())
}
