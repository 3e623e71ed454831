//! HTTP endpoints for operators: Prometheus scrape and health

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::factory::TransportFactory;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub factory: Arc<TransportFactory>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub ice_servers: usize,
    pub udp_port_min: u16,
    pub udp_port_max: u16,
    pub interfaces: Vec<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }

    match String::from_utf8(buffer) {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            tracing::error!("Metrics are not valid UTF-8: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let network = state.factory.network();

    Json(HealthResponse {
        status: "ok",
        ice_servers: state.factory.ice_servers().len(),
        udp_port_min: network.udp.min,
        udp_port_max: network.udp.max,
        interfaces: network.interfaces.clone(),
    })
}
