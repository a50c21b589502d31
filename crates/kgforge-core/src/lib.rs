pub mod api_types;
pub mod config;
pub mod document;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod job;
pub mod triple;

pub use config::{AppConfig, LlmConfig, PipelineConfig, TripleValidation};
pub use document::{
    Chunk, EntityCatalog, EntityInfo, PromptUnit, RelationSchema, RelationSchemaEntry, Sentence,
};
pub use error::{KgError, Result};
pub use extraction::{
    ChatMessage, ChatRole, EntityCatalogSource, ExtractionEndpoint, RelationSchemaSource,
};
pub use graph::{
    FactMerge, FactReceipt, GraphNode, GraphRelationship, GraphStore, NodeKey, ProvenanceIds,
    RelationshipMerge, RelationshipMergePolicy, RelationshipProps, Subgraph,
};
pub use job::{
    JobKind, JobSpec, JobState, JobStatus, JobStatusStore, JobUnit, RunSummary, TriggerOutcome,
};
pub use triple::{normalize_field, CandidateTriple, Provenance, RawResponse, NONE_SENTINEL};
