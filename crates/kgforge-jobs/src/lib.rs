pub mod artifacts;
pub mod orchestrator;
pub mod status;

pub use artifacts::ArtifactWriter;
pub use orchestrator::JobOrchestrator;
pub use status::InMemoryJobStatusStore;
