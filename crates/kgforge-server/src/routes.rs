use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn create_router() -> Router<AppState> {
    Router::new()
        // Health
        .route("/api/health", get(handlers::health::health_check))
        // Jobs
        .route("/api/jobs/documents", post(handlers::jobs::trigger_document))
        .route("/api/jobs/datasets", post(handlers::jobs::trigger_dataset))
        .route("/api/jobs/{kind}/{id}", get(handlers::jobs::job_status))
        // Graph
        .route("/api/graph/stats", get(handlers::graph::graph_stats))
        .route("/api/graph/provenance", get(handlers::graph::provenance_subgraph))
}
