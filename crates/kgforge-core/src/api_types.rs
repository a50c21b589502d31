use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{ProvenanceIds, Subgraph};
use crate::job::{JobKind, JobState, TriggerOutcome};

// --- Health ---

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub graph_connected: bool,
    pub node_count: u64,
    pub relationship_count: u64,
}

// --- Jobs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerJobRequest {
    pub id: String,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerJobResponse {
    pub kind: JobKind,
    pub id: String,
    #[serde(flatten)]
    pub outcome: TriggerOutcome,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    pub kind: JobKind,
    pub id: String,
    pub state: JobState,
    pub error: bool,
    pub updated_at: DateTime<Utc>,
}

// --- Graph ---

#[derive(Debug, Serialize, Deserialize)]
pub struct GraphStatsResponse {
    pub node_count: u64,
    pub relationship_count: u64,
    #[serde(flatten)]
    pub provenance: ProvenanceIds,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ProvenanceQuery {
    pub docx_id: Option<String>,
    pub csv_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubgraphResponse {
    #[serde(flatten)]
    pub subgraph: Subgraph,
}
