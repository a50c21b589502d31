use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use kgforge_core::document::{EntityCatalog, EntityInfo, RelationSchema, RelationSchemaEntry};
use kgforge_core::error::{KgError, Result};
use kgforge_core::extraction::{EntityCatalogSource, RelationSchemaSource};

/// A fixed catalog and schema held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    catalog: EntityCatalog,
    schema: RelationSchema,
}

impl StaticCatalog {
    pub fn new(catalog: EntityCatalog, schema: RelationSchema) -> Self {
        Self { catalog, schema }
    }
}

#[async_trait]
impl EntityCatalogSource for StaticCatalog {
    async fn load_catalog(&self) -> Result<EntityCatalog> {
        Ok(self.catalog.clone())
    }
}

#[async_trait]
impl RelationSchemaSource for StaticCatalog {
    async fn load_schema(&self) -> Result<RelationSchema> {
        Ok(self.schema.clone())
    }
}

/// Reads the entity catalog and relation schema from JSON files on every load.
///
/// Entities are `[{"entity_name": ...}]`; relations are
/// `[{"relation_name": ..., "start_node_type": ..., "end_node_type": ...}]`.
#[derive(Debug, Clone)]
pub struct JsonCatalogFile {
    entities_path: PathBuf,
    relations_path: PathBuf,
}

impl JsonCatalogFile {
    pub fn new(entities_path: impl Into<PathBuf>, relations_path: impl Into<PathBuf>) -> Self {
        Self {
            entities_path: entities_path.into(),
            relations_path: relations_path.into(),
        }
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| KgError::Catalog(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| KgError::Catalog(format!("Failed to parse {}: {e}", path.display())))
}

#[async_trait]
impl EntityCatalogSource for JsonCatalogFile {
    async fn load_catalog(&self) -> Result<EntityCatalog> {
        let records: Vec<EntityInfo> = read_json(&self.entities_path).await?;
        let catalog = EntityCatalog::new(records.into_iter().map(|r| r.entity_name));
        tracing::debug!(
            path = %self.entities_path.display(),
            entities = catalog.len(),
            "Loaded entity catalog"
        );
        Ok(catalog)
    }
}

#[async_trait]
impl RelationSchemaSource for JsonCatalogFile {
    async fn load_schema(&self) -> Result<RelationSchema> {
        let entries: Vec<RelationSchemaEntry> = read_json(&self.relations_path).await?;
        tracing::debug!(
            path = %self.relations_path.display(),
            relations = entries.len(),
            "Loaded relation schema"
        );
        Ok(RelationSchema::new(entries))
    }
}
