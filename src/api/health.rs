use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use crate::api::AppState;
use crate::payments::context::RequestContext;

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
    pub gateway: String,
    pub gateway_type: String,
    pub gateway_healthy: bool,
}

pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let version = env!("CARGO_PKG_VERSION").to_string();

    let gateway = state.engine.gateway();
    let gateway_healthy = gateway.is_healthy(&RequestContext::background()).await;

    let response = HealthResponse {
        status: if gateway_healthy { "healthy" } else { "degraded" }.to_string(),
        version,
        environment: state.environment.to_string(),
        gateway: gateway.name().to_string(),
        gateway_type: gateway.gateway_type().to_string(),
        gateway_healthy,
    };

    let status = if gateway_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}
