use async_trait::async_trait;
use neo4rs::{query, Graph, Node, Query, Relation, Row};
use std::future::Future;

use kgforge_core::config::AppConfig;
use kgforge_core::error::{KgError, Result};
use kgforge_core::graph::{
    FactMerge, FactReceipt, GraphNode, GraphRelationship, GraphStore, NodeKey, ProvenanceIds,
    RelationshipMerge, RelationshipMergePolicy, RelationshipProps, Subgraph,
};

/// Timeout for all Neo4j operations (seconds).
const NEO4J_TIMEOUT_SECS: u64 = 30;

const INDEXES: &[&str] = &[
    "CREATE INDEX entity_name IF NOT EXISTS FOR (n:Entity) ON (n.name)",
    "CREATE INDEX entity_docx_id IF NOT EXISTS FOR (n:Entity) ON (n.docx_id)",
    "CREATE INDEX entity_csv_id IF NOT EXISTS FOR (n:Entity) ON (n.csv_id)",
    "CREATE INDEX relationship_docx_id IF NOT EXISTS FOR ()-[r:RELATIONSHIP]-() ON (r.docx_id)",
    "CREATE INDEX relationship_csv_id IF NOT EXISTS FOR ()-[r:RELATIONSHIP]-() ON (r.csv_id)",
];

/// At most one `:Entity` per full node key, including under concurrent merges.
const ENTITY_KEY_CONSTRAINT: &str = "CREATE CONSTRAINT entity_key IF NOT EXISTS FOR (n:Entity) \
     REQUIRE (n.name, n.type, n.major_classification, n.minor_classification, n.docx_id, n.csv_id) IS UNIQUE";

/// Graph store backed by Neo4j. Nodes are `:Entity`, edges `:RELATIONSHIP`,
/// and every merge is a single Cypher `MERGE` on the full key.
pub struct Neo4jGraphStore {
    graph: Option<Graph>,
}

impl Neo4jGraphStore {
    pub async fn new(config: &AppConfig) -> Self {
        match Graph::new(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password).await {
            Ok(graph) => {
                tracing::info!(uri = %config.neo4j_uri, "Connected to Neo4j");
                Self { graph: Some(graph) }
            }
            Err(e) => {
                tracing::warn!(uri = %config.neo4j_uri, error = %e, "Failed to connect to Neo4j, running in degraded mode");
                Self { graph: None }
            }
        }
    }

    fn graph(&self) -> Result<&Graph> {
        self.graph.as_ref().ok_or_else(|| KgError::Graph("Neo4j not connected".into()))
    }

    pub fn is_connected(&self) -> bool {
        self.graph.is_some()
    }

    /// Create the lookup indexes used by merges and provenance queries.
    pub async fn ensure_indexes(&self) -> Result<()> {
        let graph = self.graph()?;
        for statement in INDEXES {
            timed(graph.run(query(statement)))
                .await?
                .map_err(|e| KgError::Graph(format!("Failed to create index: {e}")))?;
        }
        tracing::info!(indexes = INDEXES.len(), "Ensured Neo4j indexes");

        // Older servers reject composite uniqueness; merges still work without it.
        match timed(graph.run(query(ENTITY_KEY_CONSTRAINT))).await? {
            Ok(()) => tracing::info!("Ensured entity key constraint"),
            Err(e) => tracing::warn!(error = %e, "Entity key constraint unavailable, duplicate nodes possible under concurrent runs"),
        }
        Ok(())
    }

    /// Run a query and return its first row, if any.
    async fn first_row(&self, q: Query, what: &str) -> Result<Option<Row>> {
        let mut stream = timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to {what}: {e}")))?;
        stream
            .next()
            .await
            .map_err(|e| KgError::Graph(format!("Failed to {what}: {e}")))
    }

    async fn count(&self, cypher: &str, what: &str) -> Result<u64> {
        match self.first_row(query(cypher), what).await? {
            Some(row) => {
                let count: i64 = row
                    .get("cnt")
                    .map_err(|e| KgError::Graph(format!("Failed to get count: {e}")))?;
                Ok(count.max(0) as u64)
            }
            None => Ok(0),
        }
    }
}

/// Wrap any async operation with a timeout, converting timeout to KgError::Graph.
async fn timed<T, F: Future<Output = T>>(op: F) -> std::result::Result<T, KgError> {
    tokio::time::timeout(std::time::Duration::from_secs(NEO4J_TIMEOUT_SECS), op)
        .await
        .map_err(|_| {
            tracing::warn!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS);
            KgError::Graph(format!("Neo4j operation timed out after {}s", NEO4J_TIMEOUT_SECS))
        })
}

const NODE_KEY_PROPS: &str = "name: $name, type: $type, major_classification: $major, \
                              minor_classification: $minor, docx_id: $docx_id, csv_id: $csv_id";

/// The `MERGE` clause for an edge from `a` to `b` under the given policy.
pub(crate) fn relationship_merge_clause(policy: RelationshipMergePolicy) -> &'static str {
    match policy {
        RelationshipMergePolicy::PerRun => {
            "MERGE (a)-[r:RELATIONSHIP {name: $rel_name, type: $rel_type, docx_id: $docx_id, \
             csv_id: $csv_id, created_at: $created_at}]->(b)"
        }
        RelationshipMergePolicy::Idempotent => {
            "MERGE (a)-[r:RELATIONSHIP {name: $rel_name, type: $rel_type, docx_id: $docx_id, \
             csv_id: $csv_id}]->(b) ON CREATE SET r.created_at = $created_at"
        }
    }
}

pub(crate) fn fact_cypher(policy: RelationshipMergePolicy) -> String {
    format!(
        "MERGE (a:Entity {{name: $head, type: $head_type, major_classification: $head_major, \
         minor_classification: $head_minor, docx_id: $head_docx_id, csv_id: $head_csv_id}}) \
         MERGE (b:Entity {{name: $tail, type: $tail_type, major_classification: $tail_major, \
         minor_classification: $tail_minor, docx_id: $tail_docx_id, csv_id: $tail_csv_id}}) \
         {} \
         RETURN id(a) AS head_id, id(b) AS tail_id, id(r) AS rel_id",
        relationship_merge_clause(policy)
    )
}

fn with_rel_props(q: Query, props: &RelationshipProps) -> Query {
    q.param("rel_name", props.name.clone())
        .param("rel_type", props.rel_type.clone())
        .param("docx_id", props.docx_id.clone())
        .param("csv_id", props.csv_id.clone())
        .param("created_at", props.created_at.clone())
}

fn node_to_graph_node(node: &Node) -> GraphNode {
    GraphNode {
        id: node.id(),
        name: node.get::<String>("name").unwrap_or_default(),
        node_type: node.get::<String>("type").unwrap_or_default(),
        major_classification: node.get::<String>("major_classification").unwrap_or_default(),
        minor_classification: node.get::<String>("minor_classification").unwrap_or_default(),
        docx_id: node.get::<String>("docx_id").unwrap_or_default(),
        csv_id: node.get::<String>("csv_id").unwrap_or_default(),
    }
}

fn relation_to_graph_relationship(rel: &Relation) -> GraphRelationship {
    GraphRelationship {
        id: rel.id(),
        start_id: rel.start_node_id(),
        end_id: rel.end_node_id(),
        name: rel.get::<String>("name").unwrap_or_default(),
        rel_type: rel.get::<String>("type").unwrap_or_default(),
        docx_id: rel.get::<String>("docx_id").unwrap_or_default(),
        csv_id: rel.get::<String>("csv_id").unwrap_or_default(),
        created_at: rel.get::<String>("created_at").unwrap_or_default(),
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn merge_node(&self, key: &NodeKey) -> Result<i64> {
        let cypher = format!("MERGE (n:Entity {{{NODE_KEY_PROPS}}}) RETURN id(n) AS id");
        let q = query(&cypher)
            .param("name", key.name.clone())
            .param("type", key.node_type.clone())
            .param("major", key.major_classification.clone())
            .param("minor", key.minor_classification.clone())
            .param("docx_id", key.docx_id.clone())
            .param("csv_id", key.csv_id.clone());

        let row = self
            .first_row(q, "merge node")
            .await?
            .ok_or_else(|| KgError::Graph(format!("Merge of node '{}' returned no row", key.name)))?;
        row.get("id")
            .map_err(|e| KgError::Graph(format!("Failed to read node id: {e}")))
    }

    async fn merge_relationship(&self, rel: &RelationshipMerge) -> Result<i64> {
        let cypher = format!(
            "MATCH (a:Entity) WHERE id(a) = $start_id \
             MATCH (b:Entity) WHERE id(b) = $end_id \
             {} RETURN id(r) AS id",
            relationship_merge_clause(rel.policy)
        );
        let q = with_rel_props(
            query(&cypher)
                .param("start_id", rel.start_id)
                .param("end_id", rel.end_id),
            &rel.props,
        );

        let row = self.first_row(q, "merge relationship").await?.ok_or_else(|| {
            KgError::NotFound(format!(
                "Relationship endpoints {} -> {} not found",
                rel.start_id, rel.end_id
            ))
        })?;
        row.get("id")
            .map_err(|e| KgError::Graph(format!("Failed to read relationship id: {e}")))
    }

    async fn merge_fact(&self, fact: &FactMerge) -> Result<FactReceipt> {
        let cypher = fact_cypher(fact.policy);
        let q = with_rel_props(
            query(&cypher)
                .param("head", fact.head.name.clone())
                .param("head_type", fact.head.node_type.clone())
                .param("head_major", fact.head.major_classification.clone())
                .param("head_minor", fact.head.minor_classification.clone())
                .param("head_docx_id", fact.head.docx_id.clone())
                .param("head_csv_id", fact.head.csv_id.clone())
                .param("tail", fact.tail.name.clone())
                .param("tail_type", fact.tail.node_type.clone())
                .param("tail_major", fact.tail.major_classification.clone())
                .param("tail_minor", fact.tail.minor_classification.clone())
                .param("tail_docx_id", fact.tail.docx_id.clone())
                .param("tail_csv_id", fact.tail.csv_id.clone()),
            &fact.props,
        );

        let row = self.first_row(q, "merge fact").await?.ok_or_else(|| {
            KgError::Graph(format!(
                "Merge of fact {} -[{}]-> {} returned no row",
                fact.head.name, fact.props.name, fact.tail.name
            ))
        })?;
        let read = |column: &str| -> Result<i64> {
            row.get(column)
                .map_err(|e| KgError::Graph(format!("Failed to read {column}: {e}")))
        };

        let receipt = FactReceipt {
            head_id: read("head_id")?,
            tail_id: read("tail_id")?,
            relationship_id: read("rel_id")?,
        };

        tracing::debug!(
            head = %fact.head.name,
            relation = %fact.props.name,
            tail = %fact.tail.name,
            rel_id = receipt.relationship_id,
            "Merged fact"
        );
        Ok(receipt)
    }

    async fn get_node(&self, id: i64) -> Result<Option<GraphNode>> {
        let q = query("MATCH (n:Entity) WHERE id(n) = $id RETURN n").param("id", id);
        match self.first_row(q, "query node").await? {
            Some(row) => {
                let node: Node = row
                    .get("n")
                    .map_err(|e| KgError::Graph(format!("Failed to deserialize node: {e}")))?;
                Ok(Some(node_to_graph_node(&node)))
            }
            None => Ok(None),
        }
    }

    async fn delete_node(&self, id: i64) -> Result<bool> {
        let q = query("MATCH (n:Entity) WHERE id(n) = $id DETACH DELETE n RETURN count(*) AS cnt")
            .param("id", id);
        let deleted = match self.first_row(q, "delete node").await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        tracing::info!(node_id = id, deleted = deleted > 0, "Deleted node and its relationships");
        Ok(deleted > 0)
    }

    async fn delete_relationship(&self, id: i64) -> Result<bool> {
        let q = query("MATCH ()-[r:RELATIONSHIP]->() WHERE id(r) = $id DELETE r RETURN count(*) AS cnt")
            .param("id", id);
        let deleted = match self.first_row(q, "delete relationship").await? {
            Some(row) => row.get::<i64>("cnt").unwrap_or(0),
            None => 0,
        };
        tracing::info!(rel_id = id, deleted = deleted > 0, "Deleted relationship");
        Ok(deleted > 0)
    }

    async fn node_count(&self) -> Result<u64> {
        self.count("MATCH (n:Entity) RETURN count(n) AS cnt", "count nodes")
            .await
    }

    async fn relationship_count(&self) -> Result<u64> {
        self.count(
            "MATCH ()-[r:RELATIONSHIP]->() RETURN count(r) AS cnt",
            "count relationships",
        )
        .await
    }

    async fn provenance_ids(&self) -> Result<ProvenanceIds> {
        let q = query(
            "MATCH ()-[r:RELATIONSHIP]->() \
             RETURN collect(DISTINCT r.docx_id) AS docx_ids, collect(DISTINCT r.csv_id) AS csv_ids",
        );
        let Some(row) = self.first_row(q, "collect provenance ids").await? else {
            return Ok(ProvenanceIds::default());
        };

        let clean = |mut ids: Vec<String>| {
            ids.retain(|id| !id.is_empty());
            ids.sort();
            ids
        };
        Ok(ProvenanceIds {
            docx_ids: clean(row.get("docx_ids").unwrap_or_default()),
            csv_ids: clean(row.get("csv_ids").unwrap_or_default()),
        })
    }

    async fn subgraph_by_provenance(
        &self,
        docx_id: Option<&str>,
        csv_id: Option<&str>,
    ) -> Result<Subgraph> {
        let q = query(
            "MATCH (a:Entity)-[r:RELATIONSHIP]->(b:Entity) \
             WHERE (NOT $by_docx OR r.docx_id = $docx_id) AND (NOT $by_csv OR r.csv_id = $csv_id) \
             RETURN a, r, b",
        )
        .param("by_docx", docx_id.is_some())
        .param("docx_id", docx_id.unwrap_or_default().to_string())
        .param("by_csv", csv_id.is_some())
        .param("csv_id", csv_id.unwrap_or_default().to_string());

        let mut stream = timed(self.graph()?.execute(q))
            .await?
            .map_err(|e| KgError::Graph(format!("Failed to query subgraph: {e}")))?;

        let mut subgraph = Subgraph::default();
        let mut seen_nodes = std::collections::HashSet::new();

        while let Some(row) = stream
            .next()
            .await
            .map_err(|e| KgError::Graph(format!("Error reading subgraph: {e}")))?
        {
            for column in ["a", "b"] {
                match row.get::<Node>(column) {
                    Ok(node) => {
                        if seen_nodes.insert(node.id()) {
                            subgraph.nodes.push(node_to_graph_node(&node));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Skipping malformed node"),
                }
            }
            match row.get::<Relation>("r") {
                Ok(rel) => subgraph.relationships.push(relation_to_graph_relationship(&rel)),
                Err(e) => tracing::warn!(error = %e, "Skipping malformed relationship"),
            }
        }

        tracing::debug!(
            docx_id = ?docx_id,
            csv_id = ?csv_id,
            nodes = subgraph.nodes.len(),
            relationships = subgraph.relationships.len(),
            "Fetched provenance subgraph"
        );
        Ok(subgraph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_constraint_covers_full_node_key() {
        assert!(ENTITY_KEY_CONSTRAINT.contains("FOR (n:Entity)"));
        assert!(ENTITY_KEY_CONSTRAINT.ends_with("IS UNIQUE"));
        for field in [
            "n.name",
            "n.type",
            "n.major_classification",
            "n.minor_classification",
            "n.docx_id",
            "n.csv_id",
        ] {
            assert!(ENTITY_KEY_CONSTRAINT.contains(field), "{field}");
        }
    }

    #[test]
    fn per_run_keys_on_created_at() {
        let clause = relationship_merge_clause(RelationshipMergePolicy::PerRun);
        assert!(clause.contains("created_at: $created_at}"));
        assert!(!clause.contains("ON CREATE"));
    }

    #[test]
    fn idempotent_sets_created_at_only_on_create() {
        let clause = relationship_merge_clause(RelationshipMergePolicy::Idempotent);
        assert!(!clause.contains("created_at: $created_at"));
        assert!(clause.ends_with("ON CREATE SET r.created_at = $created_at"));
    }

    #[test]
    fn fact_merges_both_nodes_on_full_key() {
        let cypher = fact_cypher(RelationshipMergePolicy::PerRun);
        for prop in ["name: $head", "type: $head_type", "major_classification: $head_major",
                     "minor_classification: $head_minor", "docx_id: $head_docx_id", "csv_id: $head_csv_id",
                     "name: $tail", "csv_id: $tail_csv_id"] {
            assert!(cypher.contains(prop), "missing {prop}");
        }
        assert!(cypher.contains("RETURN id(a) AS head_id, id(b) AS tail_id, id(r) AS rel_id"));
    }

    #[test]
    fn node_merge_uses_all_six_key_fields() {
        for field in ["name", "type", "major_classification", "minor_classification", "docx_id", "csv_id"] {
            assert!(NODE_KEY_PROPS.contains(&format!("{field}: $")));
        }
    }
}
