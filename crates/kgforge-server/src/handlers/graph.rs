use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{error, info};

use kgforge_core::api_types::{GraphStatsResponse, ProvenanceQuery, SubgraphResponse};
use kgforge_core::{GraphStore, KgError};

use super::error_response;
use crate::state::AppState;

pub async fn graph_stats(State(state): State<AppState>) -> impl IntoResponse {
    info!("Fetching graph statistics");
    let graph = state.graph_store();

    let node_count = match graph.node_count().await {
        Ok(count) => count,
        Err(e) => {
            error!("Failed to get node count: {e}");
            return error_response("Failed to get node count", &e);
        }
    };

    let relationship_count = match graph.relationship_count().await {
        Ok(count) => count,
        Err(e) => {
            error!("Failed to get relationship count: {e}");
            return error_response("Failed to get relationship count", &e);
        }
    };

    let provenance = match graph.provenance_ids().await {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to list provenance ids: {e}");
            return error_response("Failed to list provenance ids", &e);
        }
    };

    let response = GraphStatsResponse {
        node_count,
        relationship_count,
        provenance,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Relationships carrying the requested provenance tags, with their endpoints.
pub async fn provenance_subgraph(
    State(state): State<AppState>,
    Query(query): Query<ProvenanceQuery>,
) -> impl IntoResponse {
    let docx_id = query.docx_id.as_deref().filter(|s| !s.is_empty());
    let csv_id = query.csv_id.as_deref().filter(|s| !s.is_empty());
    info!(?docx_id, ?csv_id, "Fetching provenance subgraph");

    if docx_id.is_none() && csv_id.is_none() {
        return error_response(
            "Invalid query",
            &KgError::Input("docx_id or csv_id is required".into()),
        );
    }

    match state.graph_store().subgraph_by_provenance(docx_id, csv_id).await {
        Ok(subgraph) => (StatusCode::OK, Json(SubgraphResponse { subgraph })).into_response(),
        Err(e) => {
            error!("Failed to fetch provenance subgraph: {e}");
            error_response("Failed to fetch provenance subgraph", &e)
        }
    }
}
