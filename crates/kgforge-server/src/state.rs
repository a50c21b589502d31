use std::sync::Arc;

use kgforge_core::{GraphStore, JobStatusStore};
use kgforge_graph::Neo4jGraphStore;
use kgforge_jobs::JobOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub graph: Arc<Neo4jGraphStore>,
    pub orchestrator: JobOrchestrator,
}

impl AppState {
    pub fn graph_store(&self) -> &Arc<dyn GraphStore> {
        self.orchestrator.graph()
    }

    pub fn status(&self) -> &Arc<dyn JobStatusStore> {
        self.orchestrator.status_store()
    }
}
