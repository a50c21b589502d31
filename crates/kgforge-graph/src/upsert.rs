use std::sync::Arc;

use chrono::{DateTime, Utc};

use kgforge_core::error::Result;
use kgforge_core::graph::{FactMerge, GraphStore, NodeKey, RelationshipMergePolicy, RelationshipProps};
use kgforge_core::triple::{normalize_field, CandidateTriple, Provenance};

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    pub facts_merged: usize,
}

/// Turns candidate triples into keyed node and edge merges on a graph store.
///
/// Every field is normalized before it becomes part of a key, so NA-like
/// values and empty cells name the same node. Triples may arrive in any order
/// and with duplicates; node collapsing happens in the store's merge.
pub struct GraphUpsertEngine {
    store: Arc<dyn GraphStore>,
    policy: RelationshipMergePolicy,
    clock: Clock,
}

impl GraphUpsertEngine {
    pub fn new(store: Arc<dyn GraphStore>, policy: RelationshipMergePolicy) -> Self {
        Self {
            store,
            policy,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replace the `created_at` source.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn policy(&self) -> RelationshipMergePolicy {
        self.policy
    }

    /// The graph mutations for one triple.
    pub fn fact_for(&self, triple: &CandidateTriple, provenance: &Provenance, created_at: &str) -> FactMerge {
        let docx_id = provenance.docx_key();
        let csv_id = provenance.csv_key();
        FactMerge {
            head: NodeKey::new(
                &triple.head,
                &triple.head_type,
                &triple.head_major_classification,
                &triple.head_minor_classification,
                docx_id,
                csv_id,
            ),
            tail: NodeKey::new(
                &triple.tail,
                &triple.tail_type,
                &triple.tail_major_classification,
                &triple.tail_minor_classification,
                docx_id,
                csv_id,
            ),
            props: RelationshipProps {
                name: normalize_field(&triple.relation).to_string(),
                rel_type: normalize_field(&triple.relation_type).to_string(),
                docx_id: docx_id.to_string(),
                csv_id: csv_id.to_string(),
                created_at: created_at.to_string(),
            },
            policy: self.policy,
        }
    }

    /// Merge every triple in order. The first store error stops the run;
    /// facts merged before it stay committed.
    pub async fn upsert(&self, triples: &[CandidateTriple], provenance: &Provenance) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for triple in triples {
            let created_at = (self.clock)().to_rfc3339();
            let fact = self.fact_for(triple, provenance, &created_at);
            self.store.merge_fact(&fact).await?;
            summary.facts_merged += 1;
        }

        tracing::info!(
            facts = summary.facts_merged,
            docx_id = %provenance.docx_key(),
            csv_id = %provenance.csv_key(),
            policy = %self.policy,
            "Merged triples into graph"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::memory::InMemoryGraphStore;

    use super::*;

    fn fixed_clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn engine(store: Arc<InMemoryGraphStore>, policy: RelationshipMergePolicy) -> GraphUpsertEngine {
        GraphUpsertEngine::new(store, policy).with_clock(fixed_clock)
    }

    #[test]
    fn document_provenance_tags_nodes_and_edge() {
        let engine = engine(Arc::new(InMemoryGraphStore::new()), RelationshipMergePolicy::PerRun);
        let triple = CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置");
        let fact = engine.fact_for(&triple, &Provenance::for_document("12"), "now");
        assert_eq!(fact.head.docx_id, "12");
        assert_eq!(fact.tail.csv_id, "12_csv");
        assert_eq!(fact.props.name, "位于");
        assert_eq!(fact.props.rel_type, "");
        assert_eq!(fact.props.created_at, "now");
    }

    #[test]
    fn missing_values_normalize_before_keying() {
        let engine = engine(Arc::new(InMemoryGraphStore::new()), RelationshipMergePolicy::PerRun);
        let mut triple = CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置");
        triple.head_major_classification = "NaN".into();
        triple.relation_type = "nan".into();
        let fact = engine.fact_for(&triple, &Provenance::for_dataset("3"), "now");
        assert_eq!(fact.head.major_classification, "");
        assert_eq!(fact.head.docx_id, "");
        assert_eq!(fact.head.csv_id, "3");
        assert_eq!(fact.props.rel_type, "");
    }

    #[tokio::test]
    async fn same_head_key_yields_one_node() {
        let store = Arc::new(InMemoryGraphStore::new());
        let engine = engine(store.clone(), RelationshipMergePolicy::PerRun);
        let triples = vec![
            CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置"),
            CandidateTriple::new("大渡河", "流经", "雅安", "河流", "位置"),
        ];
        let summary = engine.upsert(&triples, &Provenance::for_document("1")).await.unwrap();
        assert_eq!(summary.facts_merged, 2);
        assert_eq!(store.node_count().await.unwrap(), 3);
        assert_eq!(store.relationship_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn duplicates_in_one_run_collapse_with_a_fixed_clock() {
        let store = Arc::new(InMemoryGraphStore::new());
        let engine = engine(store.clone(), RelationshipMergePolicy::PerRun);
        let triple = CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置");
        engine
            .upsert(&[triple.clone(), triple], &Provenance::for_document("1"))
            .await
            .unwrap();
        assert_eq!(store.relationship_count().await.unwrap(), 1);
        assert_eq!(store.relationships().await[0].created_at, fixed_clock().to_rfc3339());
    }

    #[tokio::test]
    async fn rerun_adds_edges_only_under_per_run() {
        let triple = CandidateTriple::new("大渡河", "位于", "四川", "河流", "位置");
        let provenance = Provenance::for_document("1");

        for (policy, expected) in [
            (RelationshipMergePolicy::PerRun, 2),
            (RelationshipMergePolicy::Idempotent, 1),
        ] {
            let store = Arc::new(InMemoryGraphStore::new());
            let first = GraphUpsertEngine::new(store.clone(), policy).with_clock(fixed_clock);
            first.upsert(std::slice::from_ref(&triple), &provenance).await.unwrap();

            let later = GraphUpsertEngine::new(store.clone(), policy)
                .with_clock(|| fixed_clock() + chrono::Duration::hours(1));
            later.upsert(std::slice::from_ref(&triple), &provenance).await.unwrap();

            assert_eq!(store.node_count().await.unwrap(), 2);
            assert_eq!(store.relationship_count().await.unwrap(), expected, "{policy}");
        }
    }
}
