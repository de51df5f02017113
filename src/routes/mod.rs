pub mod health;
pub mod proxy;

use crate::config::Config;
use crate::relay::{HttpRelayService, Normalizer, RelayService};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Inbound descriptors larger than this are rejected before parsing.
const MAX_DESCRIPTOR_BYTES: usize = 10 * 1024 * 1024;

/// State shared by all handlers.
pub struct AppState {
    pub config: Config,
    pub normalizer: Normalizer,
    pub relay: Arc<dyn RelayService>,
}

impl AppState {
    pub fn new(config: Config, relay: Arc<dyn RelayService>) -> Self {
        Self {
            normalizer: Normalizer::new(config.user_agent.clone()),
            config,
            relay,
        }
    }

    /// State backed by the real executor, configured from `config`.
    pub fn from_config(config: Config) -> Self {
        let relay = HttpRelayService::arc(config.redirect_policy());
        Self::new(config, relay)
    }
}

/// Builds the router with permissive CORS, since browsers are the callers.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/proxy", post(proxy::proxy_request))
        .layer(DefaultBodyLimit::max(MAX_DESCRIPTOR_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
