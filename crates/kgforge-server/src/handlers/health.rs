use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::info;

use kgforge_core::api_types::HealthResponse;
use kgforge_core::GraphStore;

use crate::state::AppState;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    info!("Health check requested");

    let (graph_connected, node_count, relationship_count) = if state.graph.is_connected() {
        match state.graph.node_count().await {
            Ok(nc) => {
                let rc = state.graph.relationship_count().await.unwrap_or(0);
                (true, nc, rc)
            }
            Err(e) => {
                tracing::warn!("Neo4j connectivity check failed: {e}");
                (false, 0, 0)
            }
        }
    } else {
        (false, 0, 0)
    };

    let status = if graph_connected { "ok" } else { "degraded" };

    let response = HealthResponse {
        status: status.to_string(),
        version: VERSION.to_string(),
        graph_connected,
        node_count,
        relationship_count,
    };

    (StatusCode::OK, Json(response))
}
