use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use kgforge_core::{EntityCatalogSource, ExtractionEndpoint, GraphStore, JobStatusStore, RelationSchemaSource};
use kgforge_extraction::{ChatCompletionsClient, JsonCatalogFile};
use kgforge_graph::Neo4jGraphStore;
use kgforge_jobs::{InMemoryJobStatusStore, JobOrchestrator};

mod handlers;
mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kgforge=info".parse()?))
        .init();

    let config = kgforge_core::AppConfig::from_env()?;
    let host = config.server_host.clone();
    let port = config.server_port;

    let graph = Arc::new(Neo4jGraphStore::new(&config).await);
    if graph.is_connected() {
        if let Err(e) = graph.ensure_indexes().await {
            tracing::warn!("Failed to ensure Neo4j indexes: {e}");
        }
    }

    let catalog = Arc::new(JsonCatalogFile::new(
        &config.entity_catalog_path,
        &config.relation_schema_path,
    ));
    let endpoint = Arc::new(ChatCompletionsClient::new(&config.llm)?);
    tracing::info!(endpoint = %endpoint.endpoint(), model = %config.llm.model, "Using extraction endpoint");

    let orchestrator = JobOrchestrator::new(
        config.pipeline.clone(),
        catalog.clone() as Arc<dyn EntityCatalogSource>,
        catalog as Arc<dyn RelationSchemaSource>,
        endpoint as Arc<dyn ExtractionEndpoint>,
        graph.clone() as Arc<dyn GraphStore>,
        Arc::new(InMemoryJobStatusStore::new()) as Arc<dyn JobStatusStore>,
    )?;

    let state = AppState {
        graph,
        orchestrator,
    };

    let app = routes::create_router()
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("{host}:{port}");
    tracing::info!("kgforge server listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
