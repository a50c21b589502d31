use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{error, info, warn};
use uuid::Uuid;

use kgforge_core::config::PipelineConfig;
use kgforge_core::error::{KgError, Result};
use kgforge_core::extraction::{EntityCatalogSource, ExtractionEndpoint, RelationSchemaSource};
use kgforge_core::graph::GraphStore;
use kgforge_core::job::{
    JobKind, JobSpec, JobState, JobStatusStore, JobUnit, RunSummary, TriggerOutcome,
};
use kgforge_core::triple::Provenance;
use kgforge_extraction::{
    read_document, tabular, EntityFilter, PromptBuilder, Segmenter, TripleExtractor,
    TripleParser,
};
use kgforge_graph::GraphUpsertEngine;

use crate::artifacts::ArtifactWriter;

/// Persists the state of one run, refusing any move the job kind does not allow.
struct StateTracker {
    unit: JobUnit,
    run_id: String,
    current: JobState,
    status: Arc<dyn JobStatusStore>,
}

impl StateTracker {
    async fn start(unit: &JobUnit, run_id: &str, status: Arc<dyn JobStatusStore>) -> Result<Self> {
        status.set_status(unit, JobState::Uploaded).await?;
        info!(job_id = %unit, run_id, state = %JobState::Uploaded, "Job state changed");
        Ok(Self {
            unit: unit.clone(),
            run_id: run_id.to_string(),
            current: JobState::Uploaded,
            status,
        })
    }

    async fn advance(&mut self, next: JobState) -> Result<()> {
        if !self.current.can_transition_to(next, self.unit.kind) {
            return Err(KgError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        self.status.set_status(&self.unit, next).await?;
        self.current = next;
        info!(job_id = %self.unit, run_id = %self.run_id, state = %next, "Job state changed");
        Ok(())
    }

    /// Record `Error` unless the run already reached a terminal state.
    async fn fail(&mut self, cause: &KgError) {
        error!(
            job_id = %self.unit,
            run_id = %self.run_id,
            state = %self.current,
            error = %cause,
            "Job failed"
        );
        if self.current.is_terminal() {
            return;
        }
        match self.status.set_status(&self.unit, JobState::Error).await {
            Ok(()) => self.current = JobState::Error,
            Err(e) => error!(job_id = %self.unit, error = %e, "Failed to record job error state"),
        }
    }
}

type ActiveSet = Arc<Mutex<HashSet<JobUnit>>>;

/// Marks a unit as running until dropped, including when the run panics.
struct ActiveUnit {
    active: ActiveSet,
    unit: JobUnit,
}

impl ActiveUnit {
    fn claim(active: &ActiveSet, unit: &JobUnit) -> Option<Self> {
        let mut set = active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(unit.clone()) {
            return None;
        }
        Some(Self {
            active: active.clone(),
            unit: unit.clone(),
        })
    }
}

impl Drop for ActiveUnit {
    fn drop(&mut self) {
        let mut set = self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.unit);
    }
}

/// Drives ingestion units through their stage sequence.
///
/// Each unit runs as one task; work inside a task is sequential. A stage's
/// state is persisted before the stage starts, and the first fatal error moves
/// the unit to `Error` without undoing graph writes already made.
#[derive(Clone)]
pub struct JobOrchestrator {
    config: PipelineConfig,
    catalog: Arc<dyn EntityCatalogSource>,
    schema: Arc<dyn RelationSchemaSource>,
    endpoint: Arc<dyn ExtractionEndpoint>,
    graph: Arc<dyn GraphStore>,
    status: Arc<dyn JobStatusStore>,
    active: ActiveSet,
}

impl JobOrchestrator {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<dyn EntityCatalogSource>,
        schema: Arc<dyn RelationSchemaSource>,
        endpoint: Arc<dyn ExtractionEndpoint>,
        graph: Arc<dyn GraphStore>,
        status: Arc<dyn JobStatusStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            catalog,
            schema,
            endpoint,
            graph,
            status,
            active: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    pub fn status_store(&self) -> &Arc<dyn JobStatusStore> {
        &self.status
    }

    pub fn graph(&self) -> &Arc<dyn GraphStore> {
        &self.graph
    }

    /// Start a background run for the unit unless it is finished or already running.
    pub async fn trigger(&self, job: JobSpec) -> Result<TriggerOutcome> {
        let unit = job.unit.clone();
        let current = self.status.get_status(&unit).await?.map(|s| s.state);

        if current == Some(JobState::Completed) {
            info!(job_id = %unit, "Job already completed, trigger ignored");
            return Ok(TriggerOutcome::AlreadyCompleted);
        }
        let Some(guard) = ActiveUnit::claim(&self.active, &unit) else {
            let state = current.unwrap_or(JobState::Uploaded);
            info!(job_id = %unit, state = %state, "Job already running, trigger ignored");
            return Ok(TriggerOutcome::AlreadyRunning { state });
        };

        let run_id = Uuid::new_v4().to_string();
        let this = self.clone();
        let task_run_id = run_id.clone();

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = this.execute(&job, task_run_id.clone()).await {
                warn!(job_id = %job.unit, run_id = %task_run_id, error = %e, "Background job ended with error");
            }
        });

        info!(job_id = %unit, run_id = %run_id, "Job started");
        Ok(TriggerOutcome::Started { run_id })
    }

    /// Run the unit to completion on the current task.
    ///
    /// A unit that already completed is refused, as is one that is running
    /// elsewhere; a unit in `Error` starts over.
    pub async fn run(&self, job: &JobSpec) -> Result<RunSummary> {
        let _guard = ActiveUnit::claim(&self.active, &job.unit)
            .ok_or_else(|| KgError::Busy(job.unit.to_string()))?;
        self.execute(job, Uuid::new_v4().to_string()).await
    }

    pub fn is_running(&self, unit: &JobUnit) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(unit)
    }

    async fn execute(&self, job: &JobSpec, run_id: String) -> Result<RunSummary> {
        let previous = match self.status.get_status(&job.unit).await {
            Ok(previous) => previous,
            Err(e) => return Err(self.fail_unstarted(&job.unit, &run_id, e).await),
        };
        if previous.is_some_and(|s| s.state == JobState::Completed) {
            return Err(KgError::InvalidTransition {
                from: JobState::Completed,
                to: JobState::Uploaded,
            });
        }

        let mut tracker = match StateTracker::start(&job.unit, &run_id, self.status.clone()).await {
            Ok(tracker) => tracker,
            Err(e) => return Err(self.fail_unstarted(&job.unit, &run_id, e).await),
        };
        let mut summary = RunSummary {
            run_id,
            unit: Some(job.unit.clone()),
            ..Default::default()
        };

        let result = match job.unit.kind {
            JobKind::Document => self.run_document(&mut tracker, &job.path, &mut summary).await,
            JobKind::Dataset => self.run_dataset(&mut tracker, &job.path, &mut summary).await,
        };

        match result {
            Ok(()) => {
                info!(
                    job_id = %job.unit,
                    run_id = %summary.run_id,
                    prompts = summary.prompt_units,
                    batches = summary.batches,
                    failed_batches = summary.failed_batches,
                    triples = summary.triples_parsed,
                    facts = summary.facts_merged,
                    "Job completed"
                );
                Ok(summary)
            }
            Err(e) => {
                tracker.fail(&e).await;
                Err(e)
            }
        }
    }

    /// Log a failure that happened before `Uploaded` was recorded and try to
    /// leave the unit in `Error`.
    async fn fail_unstarted(&self, unit: &JobUnit, run_id: &str, cause: KgError) -> KgError {
        error!(job_id = %unit, run_id, error = %cause, "Job failed before start");
        if let Err(e) = self.status.set_status(unit, JobState::Error).await {
            error!(job_id = %unit, error = %e, "Failed to record job error state");
        }
        cause
    }

    fn artifacts(&self) -> Option<ArtifactWriter> {
        self.config.artifacts_dir.as_ref().map(ArtifactWriter::new)
    }

    async fn run_document(
        &self,
        tracker: &mut StateTracker,
        path: &Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let unit = tracker.unit.clone();
        let artifacts = self.artifacts();
        let text = read_document(path).await?;

        // Splitting: segment, then keep sentences that mention known entities.
        tracker.advance(JobState::SplittingDocument).await?;
        let segmenter = Segmenter::new(self.config.max_chunk_chars);
        let chunks = segmenter.segment(&text);
        let sentences = segmenter.sentences(&chunks);
        let catalog = self.catalog.load_catalog().await?;
        let prompts = EntityFilter::new(&catalog).filter(&sentences);
        summary.chunks = chunks.len();
        summary.sentences = sentences.len();
        summary.prompt_units = prompts.len();
        info!(
            job_id = %unit,
            chunks = chunks.len(),
            sentences = sentences.len(),
            entities = catalog.len(),
            prompts = prompts.len(),
            "Document split and filtered"
        );
        if let Some(writer) = &artifacts {
            writer.write_prompts(&unit, &prompts).await?;
        }

        tracker.advance(JobState::GeneratingTriples).await?;
        let schema = self.schema.load_schema().await?;
        if schema.is_empty() {
            warn!(job_id = %unit, "Relation schema is empty");
        }
        let builder = PromptBuilder::new(&schema);
        let extractor = TripleExtractor::new(self.endpoint.clone(), self.config.batch_size);
        let report = extractor.extract(&builder, &prompts).await?;
        summary.batches = report.batches;
        summary.failed_batches = report.failed_batches;
        summary.raw_responses = report.responses.len();
        if let Some(writer) = &artifacts {
            writer.write_responses(&unit, &report.responses).await?;
        }

        tracker.advance(JobState::ProcessingTriples).await?;
        let parser = TripleParser::new(self.config.triple_validation, schema);
        let outcome = parser.parse(&report.responses);
        summary.triples_parsed = outcome.triples.len();
        summary.triples_rejected = outcome.rejected;
        info!(
            job_id = %unit,
            records = outcome.records,
            sentinels = outcome.sentinels,
            rejected = outcome.rejected,
            unmatched = outcome.unmatched_responses,
            triples = outcome.triples.len(),
            "Responses parsed"
        );
        if let Some(writer) = &artifacts {
            writer.write_triples(&unit, &outcome.triples).await?;
        }

        tracker.advance(JobState::GeneratingKnowledgeGraph).await?;
        let engine = GraphUpsertEngine::new(self.graph.clone(), self.config.relationship_merge);
        let merged = engine
            .upsert(&outcome.triples, &Provenance::for_document(&unit.id))
            .await?;
        summary.facts_merged = merged.facts_merged;

        tracker.advance(JobState::Completed).await
    }

    async fn run_dataset(
        &self,
        tracker: &mut StateTracker,
        path: &Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let unit = tracker.unit.clone();
        let triples = tabular::read_triples_file(path).await?;
        summary.triples_parsed = triples.len();

        tracker.advance(JobState::Generating).await?;
        let engine = GraphUpsertEngine::new(self.graph.clone(), self.config.relationship_merge);
        let merged = engine
            .upsert(&triples, &Provenance::for_dataset(&unit.id))
            .await?;
        summary.facts_merged = merged.facts_merged;

        tracker.advance(JobState::Completed).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use kgforge_core::document::{EntityCatalog, RelationSchema, RelationSchemaEntry};
    use kgforge_core::extraction::ChatMessage;
    use kgforge_core::graph::{
        FactMerge, FactReceipt, GraphNode, NodeKey, ProvenanceIds, RelationshipMerge, Subgraph,
    };
    use kgforge_extraction::StaticCatalog;
    use kgforge_graph::InMemoryGraphStore;

    use super::*;
    use crate::status::InMemoryJobStatusStore;

    const REPLY: &str = "<Triples><Triple><Head>大渡河</Head><Relation>位于</Relation><Tail>四川</Tail>\
                         <start_node_Type>河流</start_node_Type><end_node_Type>位置</end_node_Type></Triple></Triples>";

    struct FixedReply(&'static str, AtomicUsize);

    #[async_trait]
    impl ExtractionEndpoint for FixedReply {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<Option<String>> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(Some(self.0.to_string()))
        }
    }

    /// Fails every fact merge; everything else is delegated to memory.
    struct BrokenGraph(InMemoryGraphStore);

    #[async_trait]
    impl GraphStore for BrokenGraph {
        async fn merge_node(&self, key: &NodeKey) -> Result<i64> {
            self.0.merge_node(key).await
        }
        async fn merge_relationship(&self, rel: &RelationshipMerge) -> Result<i64> {
            self.0.merge_relationship(rel).await
        }
        async fn merge_fact(&self, _fact: &FactMerge) -> Result<FactReceipt> {
            Err(KgError::Graph("connection reset".into()))
        }
        async fn get_node(&self, id: i64) -> Result<Option<GraphNode>> {
            self.0.get_node(id).await
        }
        async fn delete_node(&self, id: i64) -> Result<bool> {
            self.0.delete_node(id).await
        }
        async fn delete_relationship(&self, id: i64) -> Result<bool> {
            self.0.delete_relationship(id).await
        }
        async fn node_count(&self) -> Result<u64> {
            self.0.node_count().await
        }
        async fn relationship_count(&self) -> Result<u64> {
            self.0.relationship_count().await
        }
        async fn provenance_ids(&self) -> Result<ProvenanceIds> {
            self.0.provenance_ids().await
        }
        async fn subgraph_by_provenance(&self, d: Option<&str>, c: Option<&str>) -> Result<Subgraph> {
            self.0.subgraph_by_provenance(d, c).await
        }
    }

    /// Blocks inside the extraction call until released.
    #[derive(Default)]
    struct GatedReply {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl ExtractionEndpoint for GatedReply {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<Option<String>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Some(REPLY.to_string()))
        }
    }

    struct PanickingReply;

    #[async_trait]
    impl ExtractionEndpoint for PanickingReply {
        async fn complete(&self, _messages: &[ChatMessage]) -> Result<Option<String>> {
            panic!("endpoint blew up");
        }
    }

    async fn wait_until_idle(orchestrator: &JobOrchestrator, unit: &JobUnit) {
        for _ in 0..200 {
            if !orchestrator.is_running(unit) {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("{unit} still running");
    }

    struct Harness {
        orchestrator: JobOrchestrator,
        status: Arc<InMemoryJobStatusStore>,
        endpoint: Arc<FixedReply>,
        _dir: tempfile::TempDir,
        document: std::path::PathBuf,
    }

    fn harness(graph: Arc<dyn GraphStore>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let document = dir.path().join("doc.txt");
        std::fs::write(&document, "大渡河属于多开发主体的典型河流。\n\n这一句不提任何实体。").unwrap();

        let catalog = Arc::new(StaticCatalog::new(
            EntityCatalog::new(["大渡河"]),
            RelationSchema::new(vec![RelationSchemaEntry::new("位于", "河流", "位置")]),
        ));
        let status = Arc::new(InMemoryJobStatusStore::new());
        let endpoint = Arc::new(FixedReply(REPLY, AtomicUsize::new(0)));
        let orchestrator = JobOrchestrator::new(
            PipelineConfig::default(),
            catalog.clone(),
            catalog,
            endpoint.clone(),
            graph,
            status.clone(),
        )
        .unwrap();

        Harness {
            orchestrator,
            status,
            endpoint,
            _dir: dir,
            document,
        }
    }

    #[tokio::test]
    async fn document_run_walks_every_stage() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let h = harness(graph.clone());
        let job = JobSpec::document("1", &h.document);

        let summary = h.orchestrator.run(&job).await.unwrap();
        assert_eq!(summary.sentences, 2);
        assert_eq!(summary.prompt_units, 1);
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.facts_merged, 1);
        assert_eq!(h.endpoint.1.load(Ordering::SeqCst), 1);

        assert_eq!(
            h.status.history(&job.unit).await,
            JobKind::Document.stages().to_vec()
        );
        assert_eq!(graph.node_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn missing_input_goes_straight_to_error() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let job = JobSpec::document("2", h.document.with_file_name("absent.txt"));

        let err = h.orchestrator.run(&job).await.unwrap_err();
        assert!(matches!(err, KgError::Input(_)));
        assert_eq!(
            h.status.history(&job.unit).await,
            vec![JobState::Uploaded, JobState::Error]
        );
        assert_eq!(h.endpoint.1.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn graph_failure_stops_before_completed() {
        let h = harness(Arc::new(BrokenGraph(InMemoryGraphStore::new())));
        let job = JobSpec::document("3", &h.document);

        let err = h.orchestrator.run(&job).await.unwrap_err();
        assert!(matches!(err, KgError::Graph(_)));
        let history = h.status.history(&job.unit).await;
        assert_eq!(history.last(), Some(&JobState::Error));
        assert!(!history.contains(&JobState::Completed));
        assert_eq!(history[history.len() - 2], JobState::GeneratingKnowledgeGraph);
    }

    #[tokio::test]
    async fn completed_unit_is_not_rerun() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let job = JobSpec::document("4", &h.document);
        h.orchestrator.run(&job).await.unwrap();

        let outcome = h.orchestrator.trigger(job.clone()).await.unwrap();
        assert_eq!(outcome, TriggerOutcome::AlreadyCompleted);
        assert!(matches!(
            h.orchestrator.run(&job).await,
            Err(KgError::InvalidTransition { from: JobState::Completed, .. })
        ));
        assert_eq!(h.endpoint.1.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errored_unit_can_be_run_again() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let missing = JobSpec::document("5", h.document.with_file_name("absent.txt"));
        h.orchestrator.run(&missing).await.unwrap_err();

        let retry = JobSpec::document("5", &h.document);
        h.orchestrator.run(&retry).await.unwrap();
        let status = h.status.get_status(&retry.unit).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn trigger_runs_in_background() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let job = JobSpec::document("6", &h.document);

        let outcome = h.orchestrator.trigger(job.clone()).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Started { .. }));

        for _ in 0..200 {
            let state = h.status.get_status(&job.unit).await.unwrap().map(|s| s.state);
            if state.is_some_and(JobState::is_terminal) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let status = h.status.get_status(&job.unit).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn run_is_refused_while_trigger_holds_the_unit() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let gate = Arc::new(GatedReply::default());
        let orchestrator = JobOrchestrator {
            endpoint: gate.clone(),
            ..h.orchestrator.clone()
        };
        let job = JobSpec::document("10", &h.document);

        let outcome = orchestrator.trigger(job.clone()).await.unwrap();
        assert!(matches!(outcome, TriggerOutcome::Started { .. }));
        gate.entered.notified().await;
        assert!(orchestrator.is_running(&job.unit));

        assert!(matches!(orchestrator.run(&job).await, Err(KgError::Busy(_))));
        assert_eq!(
            orchestrator.trigger(job.clone()).await.unwrap(),
            TriggerOutcome::AlreadyRunning {
                state: JobState::GeneratingTriples
            }
        );

        gate.release.notify_one();
        wait_until_idle(&orchestrator, &job.unit).await;
        let status = h.status.get_status(&job.unit).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn panicked_run_releases_the_unit() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let orchestrator = JobOrchestrator {
            endpoint: Arc::new(PanickingReply),
            ..h.orchestrator.clone()
        };
        let job = JobSpec::document("11", &h.document);

        let first = orchestrator.trigger(job.clone()).await.unwrap();
        assert!(matches!(first, TriggerOutcome::Started { .. }));
        wait_until_idle(&orchestrator, &job.unit).await;

        // The stuck state is not terminal, so the unit can be started again.
        let status = h.status.get_status(&job.unit).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::GeneratingTriples);
        let again = h.orchestrator.trigger(job.clone()).await.unwrap();
        assert!(matches!(again, TriggerOutcome::Started { .. }));
        wait_until_idle(&h.orchestrator, &job.unit).await;
        let status = h.status.get_status(&job.unit).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Completed);
    }

    #[tokio::test]
    async fn dataset_run_uses_short_path() {
        let graph = Arc::new(InMemoryGraphStore::new());
        let h = harness(graph.clone());
        let csv = h.document.with_file_name("triples.csv");
        std::fs::write(
            &csv,
            "Head,Relation,Tail,Head Type,Tail Type,Head Major Classification,Head Minor Classification,\
             Tail Major Classification,Tail Minor Classification,Relation Type\n\
             大渡河,位于,四川,河流,位置,水系,NaN,,,地理\n",
        )
        .unwrap();
        let job = JobSpec::dataset("9", &csv);

        let summary = h.orchestrator.run(&job).await.unwrap();
        assert_eq!(summary.facts_merged, 1);
        assert_eq!(
            h.status.history(&job.unit).await,
            vec![JobState::Uploaded, JobState::Generating, JobState::Completed]
        );

        let rels = graph.relationships().await;
        assert_eq!(rels[0].docx_id, "");
        assert_eq!(rels[0].csv_id, "9");
        assert_eq!(rels[0].rel_type, "地理");
        let head = graph.get_node(rels[0].start_id).await.unwrap().unwrap();
        assert_eq!(head.major_classification, "水系");
        assert_eq!(head.minor_classification, "");
    }

    #[tokio::test]
    async fn artifacts_are_written_when_configured() {
        let h = harness(Arc::new(InMemoryGraphStore::new()));
        let out = h.document.with_file_name("artifacts");
        let mut config = PipelineConfig::default();
        config.artifacts_dir = Some(out.clone());
        let orchestrator = JobOrchestrator { config, ..h.orchestrator.clone() };

        orchestrator.run(&JobSpec::document("8", &h.document)).await.unwrap();
        for suffix in ["prompts.json", "responses.json", "triples.csv"] {
            assert!(out.join(format!("document_8_{suffix}")).exists(), "{suffix}");
        }
    }
}
