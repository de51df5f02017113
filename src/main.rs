use request_relay::{app, AppState, Config};
use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_relay=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        timeout_ms = config.request_timeout.as_millis() as u64,
        follow_redirects = config.follow_redirects,
        "Starting request relay"
    );

    let state = Arc::new(AppState::from_config(config.clone()));
    let router = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");

    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Proxy endpoint: POST /api/proxy");
    axum::serve(listener, router).await.expect("server error");
}
