use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use kgforge_core::error::{KgError, Result};
use kgforge_core::graph::{
    FactMerge, FactReceipt, GraphNode, GraphRelationship, GraphStore, NodeKey, ProvenanceIds,
    RelationshipMerge, RelationshipMergePolicy, Subgraph,
};

#[derive(Debug, Default)]
struct GraphState {
    next_id: i64,
    nodes: BTreeMap<i64, GraphNode>,
    node_index: HashMap<NodeKey, i64>,
    relationships: BTreeMap<i64, GraphRelationship>,
}

impl GraphState {
    fn allocate(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn merge_node(&mut self, key: &NodeKey) -> i64 {
        if let Some(id) = self.node_index.get(key) {
            return *id;
        }
        let id = self.allocate();
        self.nodes.insert(id, GraphNode::from_key(id, key));
        self.node_index.insert(key.clone(), id);
        id
    }

    fn merge_relationship(&mut self, rel: &RelationshipMerge) -> Result<i64> {
        for endpoint in [rel.start_id, rel.end_id] {
            if !self.nodes.contains_key(&endpoint) {
                return Err(KgError::NotFound(format!("Node {endpoint} not found")));
            }
        }

        let props = &rel.props;
        let existing = self.relationships.values().find(|r| {
            r.start_id == rel.start_id
                && r.end_id == rel.end_id
                && r.name == props.name
                && r.rel_type == props.rel_type
                && r.docx_id == props.docx_id
                && r.csv_id == props.csv_id
                && (rel.policy == RelationshipMergePolicy::Idempotent || r.created_at == props.created_at)
        });
        if let Some(r) = existing {
            return Ok(r.id);
        }

        let id = self.allocate();
        self.relationships.insert(
            id,
            GraphRelationship {
                id,
                start_id: rel.start_id,
                end_id: rel.end_id,
                name: props.name.clone(),
                rel_type: props.rel_type.clone(),
                docx_id: props.docx_id.clone(),
                csv_id: props.csv_id.clone(),
                created_at: props.created_at.clone(),
            },
        );
        Ok(id)
    }
}

/// Graph store held in process memory.
///
/// Every merge runs under one write lock, so concurrent merges of the same
/// key resolve to a single node or edge.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All nodes, ordered by id.
    pub async fn nodes(&self) -> Vec<GraphNode> {
        self.state.read().await.nodes.values().cloned().collect()
    }

    /// All relationships, ordered by id.
    pub async fn relationships(&self) -> Vec<GraphRelationship> {
        self.state.read().await.relationships.values().cloned().collect()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn merge_node(&self, key: &NodeKey) -> Result<i64> {
        Ok(self.state.write().await.merge_node(key))
    }

    async fn merge_relationship(&self, rel: &RelationshipMerge) -> Result<i64> {
        self.state.write().await.merge_relationship(rel)
    }

    async fn merge_fact(&self, fact: &FactMerge) -> Result<FactReceipt> {
        let mut state = self.state.write().await;
        let head_id = state.merge_node(&fact.head);
        let tail_id = state.merge_node(&fact.tail);
        let relationship_id = state.merge_relationship(&RelationshipMerge {
            start_id: head_id,
            end_id: tail_id,
            props: fact.props.clone(),
            policy: fact.policy,
        })?;
        Ok(FactReceipt {
            head_id,
            tail_id,
            relationship_id,
        })
    }

    async fn get_node(&self, id: i64) -> Result<Option<GraphNode>> {
        Ok(self.state.read().await.nodes.get(&id).cloned())
    }

    async fn delete_node(&self, id: i64) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(node) = state.nodes.remove(&id) else {
            return Ok(false);
        };
        let key = NodeKey {
            name: node.name,
            node_type: node.node_type,
            major_classification: node.major_classification,
            minor_classification: node.minor_classification,
            docx_id: node.docx_id,
            csv_id: node.csv_id,
        };
        state.node_index.remove(&key);
        state
            .relationships
            .retain(|_, r| r.start_id != id && r.end_id != id);
        Ok(true)
    }

    async fn delete_relationship(&self, id: i64) -> Result<bool> {
        Ok(self.state.write().await.relationships.remove(&id).is_some())
    }

    async fn node_count(&self) -> Result<u64> {
        Ok(self.state.read().await.nodes.len() as u64)
    }

    async fn relationship_count(&self) -> Result<u64> {
        Ok(self.state.read().await.relationships.len() as u64)
    }

    async fn provenance_ids(&self) -> Result<ProvenanceIds> {
        let state = self.state.read().await;
        let mut docx_ids = BTreeSet::new();
        let mut csv_ids = BTreeSet::new();
        for r in state.relationships.values() {
            if !r.docx_id.is_empty() {
                docx_ids.insert(r.docx_id.clone());
            }
            if !r.csv_id.is_empty() {
                csv_ids.insert(r.csv_id.clone());
            }
        }
        Ok(ProvenanceIds {
            docx_ids: docx_ids.into_iter().collect(),
            csv_ids: csv_ids.into_iter().collect(),
        })
    }

    async fn subgraph_by_provenance(
        &self,
        docx_id: Option<&str>,
        csv_id: Option<&str>,
    ) -> Result<Subgraph> {
        let state = self.state.read().await;
        let mut subgraph = Subgraph::default();
        let mut seen = HashSet::new();

        for r in state.relationships.values() {
            if docx_id.is_some_and(|d| r.docx_id != d) || csv_id.is_some_and(|c| r.csv_id != c) {
                continue;
            }
            for node_id in [r.start_id, r.end_id] {
                if seen.insert(node_id) {
                    if let Some(node) = state.nodes.get(&node_id) {
                        subgraph.nodes.push(node.clone());
                    }
                }
            }
            subgraph.relationships.push(r.clone());
        }
        Ok(subgraph)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kgforge_core::graph::RelationshipProps;

    use super::*;

    fn key(name: &str, node_type: &str) -> NodeKey {
        NodeKey::new(name, node_type, "", "", "1", "1_csv")
    }

    fn fact(created_at: &str, policy: RelationshipMergePolicy) -> FactMerge {
        FactMerge {
            head: key("大渡河", "河流"),
            tail: key("四川", "位置"),
            props: RelationshipProps {
                name: "位于".into(),
                rel_type: String::new(),
                docx_id: "1".into(),
                csv_id: "1_csv".into(),
                created_at: created_at.into(),
            },
            policy,
        }
    }

    #[tokio::test]
    async fn equal_keys_merge_into_one_node() {
        let store = InMemoryGraphStore::new();
        let a = store.merge_node(&key("大渡河", "河流")).await.unwrap();
        let b = store.merge_node(&NodeKey::new("大渡河", "河流", "NaN", "None", "1", "1_csv")).await.unwrap();
        let c = store.merge_node(&key("大渡河", "位置")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.node_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn concurrent_merges_of_one_key_yield_one_node() {
        let store = Arc::new(InMemoryGraphStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.merge_node(&key("大渡河", "河流")).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn per_run_policy_adds_an_edge_per_timestamp() {
        let store = InMemoryGraphStore::new();
        store.merge_fact(&fact("t1", RelationshipMergePolicy::PerRun)).await.unwrap();
        store.merge_fact(&fact("t1", RelationshipMergePolicy::PerRun)).await.unwrap();
        store.merge_fact(&fact("t2", RelationshipMergePolicy::PerRun)).await.unwrap();
        assert_eq!(store.node_count().await.unwrap(), 2);
        assert_eq!(store.relationship_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn idempotent_policy_reuses_the_edge() {
        let store = InMemoryGraphStore::new();
        let first = store.merge_fact(&fact("t1", RelationshipMergePolicy::Idempotent)).await.unwrap();
        let second = store.merge_fact(&fact("t2", RelationshipMergePolicy::Idempotent)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.relationship_count().await.unwrap(), 1);
        assert_eq!(store.relationships().await[0].created_at, "t1");
    }

    #[tokio::test]
    async fn relationship_needs_existing_endpoints() {
        let store = InMemoryGraphStore::new();
        let err = store
            .merge_relationship(&RelationshipMerge {
                start_id: 7,
                end_id: 8,
                props: fact("t", RelationshipMergePolicy::PerRun).props,
                policy: RelationshipMergePolicy::PerRun,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, KgError::NotFound(_)));
    }

    #[tokio::test]
    async fn delete_node_detaches_relationships() {
        let store = InMemoryGraphStore::new();
        let receipt = store.merge_fact(&fact("t1", RelationshipMergePolicy::PerRun)).await.unwrap();
        assert!(store.delete_node(receipt.head_id).await.unwrap());
        assert!(!store.delete_node(receipt.head_id).await.unwrap());
        assert_eq!(store.relationship_count().await.unwrap(), 0);
        assert!(store.get_node(receipt.tail_id).await.unwrap().is_some());

        // The key is free again after deletion.
        let again = store.merge_node(&key("大渡河", "河流")).await.unwrap();
        assert_ne!(again, receipt.head_id);
    }

    #[tokio::test]
    async fn provenance_queries() {
        let store = InMemoryGraphStore::new();
        store.merge_fact(&fact("t1", RelationshipMergePolicy::PerRun)).await.unwrap();

        let mut other = fact("t1", RelationshipMergePolicy::PerRun);
        other.head = NodeKey::new("雅砻江", "河流", "", "", "", "9");
        other.tail = NodeKey::new("四川", "位置", "", "", "", "9");
        other.props.docx_id = String::new();
        other.props.csv_id = "9".into();
        store.merge_fact(&other).await.unwrap();

        let ids = store.provenance_ids().await.unwrap();
        assert_eq!(ids.docx_ids, vec!["1".to_string()]);
        assert_eq!(ids.csv_ids, vec!["1_csv".to_string(), "9".to_string()]);

        let sub = store.subgraph_by_provenance(None, Some("9")).await.unwrap();
        assert_eq!(sub.relationships.len(), 1);
        assert_eq!(sub.nodes.len(), 2);
        assert!(sub.nodes.iter().any(|n| n.name == "雅砻江"));

        let all = store.subgraph_by_provenance(None, None).await.unwrap();
        assert_eq!(all.relationships.len(), 2);
    }
}
