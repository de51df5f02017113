use axum::{extract::State, Json};
use std::sync::Arc;
use std::time::Duration;

use super::AppState;
use crate::error::AppError;
use crate::relay::{RequestDescriptor, ResponseEnvelope};

pub async fn proxy_request(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RequestDescriptor>,
) -> Result<Json<ResponseEnvelope>, AppError> {
    tracing::debug!(
        method = %request.method,
        url = %request.url,
        "Relaying request"
    );

    let timeout = request
        .timeout
        .map(Duration::from_millis)
        .unwrap_or(state.config.request_timeout);

    let descriptor = state.normalizer.normalize(request).map_err(|e| {
        tracing::warn!(error = %e, "Rejected request");
        e
    })?;

    let envelope = state.relay.relay(descriptor, timeout).await?;
    Ok(Json(envelope))
}
