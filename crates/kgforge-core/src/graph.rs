use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{KgError, Result};
use crate::triple::normalize_field;

/// The identity of a node in the store. Two nodes are the same entity iff all
/// six fields are equal; every field is normalized before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey {
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub major_classification: String,
    pub minor_classification: String,
    pub docx_id: String,
    pub csv_id: String,
}

impl NodeKey {
    pub fn new(
        name: &str,
        node_type: &str,
        major_classification: &str,
        minor_classification: &str,
        docx_id: &str,
        csv_id: &str,
    ) -> Self {
        Self {
            name: normalize_field(name).to_string(),
            node_type: normalize_field(node_type).to_string(),
            major_classification: normalize_field(major_classification).to_string(),
            minor_classification: normalize_field(minor_classification).to_string(),
            docx_id: normalize_field(docx_id).to_string(),
            csv_id: normalize_field(csv_id).to_string(),
        }
    }
}

/// Whether `created_at` takes part in the relationship merge key.
///
/// `PerRun` (the default) keys on it, so re-ingesting the same content later
/// adds a new edge. `Idempotent` keys only on
/// `(start, end, name, type, docx_id, csv_id)` and stamps `created_at` on create.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipMergePolicy {
    #[default]
    PerRun,
    Idempotent,
}

impl fmt::Display for RelationshipMergePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerRun => f.write_str("per_run"),
            Self::Idempotent => f.write_str("idempotent"),
        }
    }
}

impl FromStr for RelationshipMergePolicy {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "per_run" | "per-run" => Ok(Self::PerRun),
            "idempotent" => Ok(Self::Idempotent),
            other => Err(KgError::Config(format!(
                "unknown relationship merge policy '{other}' (expected per_run or idempotent)"
            ))),
        }
    }
}

/// Properties carried by a relationship edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipProps {
    pub name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub docx_id: String,
    pub csv_id: String,
    pub created_at: String,
}

/// Conditional-create of an edge between two existing nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipMerge {
    pub start_id: i64,
    pub end_id: i64,
    pub props: RelationshipProps,
    pub policy: RelationshipMergePolicy,
}

/// One fact as graph mutations: head node, tail node, and the edge between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactMerge {
    pub head: NodeKey,
    pub tail: NodeKey,
    pub props: RelationshipProps,
    pub policy: RelationshipMergePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactReceipt {
    pub head_id: i64,
    pub tail_id: i64,
    pub relationship_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub major_classification: String,
    pub minor_classification: String,
    pub docx_id: String,
    pub csv_id: String,
}

impl GraphNode {
    pub fn from_key(id: i64, key: &NodeKey) -> Self {
        Self {
            id,
            name: key.name.clone(),
            node_type: key.node_type.clone(),
            major_classification: key.major_classification.clone(),
            minor_classification: key.minor_classification.clone(),
            docx_id: key.docx_id.clone(),
            csv_id: key.csv_id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRelationship {
    pub id: i64,
    pub start_id: i64,
    pub end_id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    pub docx_id: String,
    pub csv_id: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subgraph {
    pub nodes: Vec<GraphNode>,
    pub relationships: Vec<GraphRelationship>,
}

/// Distinct provenance ids found on relationships.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceIds {
    pub docx_ids: Vec<String>,
    pub csv_ids: Vec<String>,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Create the node if no node with an equal key exists; return its id either way.
    async fn merge_node(&self, key: &NodeKey) -> Result<i64>;

    /// Create the edge if no edge with an equal key exists; return its id either way.
    async fn merge_relationship(&self, rel: &RelationshipMerge) -> Result<i64>;

    /// Merge both endpoints and the edge. Stores that can do this in one
    /// round trip should override it.
    async fn merge_fact(&self, fact: &FactMerge) -> Result<FactReceipt> {
        let head_id = self.merge_node(&fact.head).await?;
        let tail_id = self.merge_node(&fact.tail).await?;
        let relationship_id = self
            .merge_relationship(&RelationshipMerge {
                start_id: head_id,
                end_id: tail_id,
                props: fact.props.clone(),
                policy: fact.policy,
            })
            .await?;
        Ok(FactReceipt {
            head_id,
            tail_id,
            relationship_id,
        })
    }

    async fn get_node(&self, id: i64) -> Result<Option<GraphNode>>;

    /// Delete a node together with its relationships.
    async fn delete_node(&self, id: i64) -> Result<bool>;

    async fn delete_relationship(&self, id: i64) -> Result<bool>;

    async fn node_count(&self) -> Result<u64>;

    async fn relationship_count(&self) -> Result<u64>;

    async fn provenance_ids(&self) -> Result<ProvenanceIds>;

    /// Nodes and edges connected by relationships carrying the given provenance.
    /// `None` filters are ignored.
    async fn subgraph_by_provenance(
        &self,
        docx_id: Option<&str>,
        csv_id: Option<&str>,
    ) -> Result<Subgraph>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_key_normalizes_missing_values() {
        let a = NodeKey::new("大渡河", "河流", "NaN", "", "1", "1_csv");
        let b = NodeKey::new("大渡河", "河流", "", "None", "1", "1_csv");
        assert_eq!(a, b);
        assert_eq!(a.major_classification, "");
    }

    #[test]
    fn node_key_distinguishes_absent_from_present() {
        let a = NodeKey::new("大渡河", "河流", "", "", "1", "1_csv");
        let b = NodeKey::new("大渡河", "河流", "水系", "", "1", "1_csv");
        assert_ne!(a, b);
    }

    #[test]
    fn merge_policy_parses() {
        assert_eq!(
            "per_run".parse::<RelationshipMergePolicy>().unwrap(),
            RelationshipMergePolicy::PerRun
        );
        assert_eq!(
            "Idempotent".parse::<RelationshipMergePolicy>().unwrap(),
            RelationshipMergePolicy::Idempotent
        );
        assert!("sometimes".parse::<RelationshipMergePolicy>().is_err());
    }
}
