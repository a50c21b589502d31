use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{KgError, Result};

/// What kind of ingestion unit a job processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Free text run through segmentation and model extraction.
    Document,
    /// A pre-structured triple file merged directly.
    Dataset,
}

impl JobKind {
    /// The non-terminal states a successful run passes through, in order,
    /// ending with `Completed`.
    pub fn stages(self) -> &'static [JobState] {
        match self {
            JobKind::Document => &[
                JobState::Uploaded,
                JobState::SplittingDocument,
                JobState::GeneratingTriples,
                JobState::ProcessingTriples,
                JobState::GeneratingKnowledgeGraph,
                JobState::Completed,
            ],
            JobKind::Dataset => &[JobState::Uploaded, JobState::Generating, JobState::Completed],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Document => "document",
            JobKind::Dataset => "dataset",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = KgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "document" | "documents" => Ok(JobKind::Document),
            "dataset" | "datasets" => Ok(JobKind::Dataset),
            other => Err(KgError::NotFound(format!("job kind '{other}'"))),
        }
    }
}

/// Identity of one ingestion unit. Documents and datasets have separate id spaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobUnit {
    pub kind: JobKind,
    pub id: String,
}

impl JobUnit {
    pub fn document(id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Document,
            id: id.into(),
        }
    }

    pub fn dataset(id: impl Into<String>) -> Self {
        Self {
            kind: JobKind::Dataset,
            id: id.into(),
        }
    }
}

impl fmt::Display for JobUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// A job to run: the unit plus the already-persisted file it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub unit: JobUnit,
    pub path: PathBuf,
}

impl JobSpec {
    pub fn document(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            unit: JobUnit::document(id),
            path: path.into(),
        }
    }

    pub fn dataset(id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            unit: JobUnit::dataset(id),
            path: path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Uploaded,
    #[serde(rename = "Splitting_Document")]
    SplittingDocument,
    #[serde(rename = "Generating_Triples")]
    GeneratingTriples,
    #[serde(rename = "Processing_Triples")]
    ProcessingTriples,
    #[serde(rename = "Generating_KnowledgeGraph")]
    GeneratingKnowledgeGraph,
    Generating,
    Completed,
    Error,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Uploaded => "Uploaded",
            JobState::SplittingDocument => "Splitting_Document",
            JobState::GeneratingTriples => "Generating_Triples",
            JobState::ProcessingTriples => "Processing_Triples",
            JobState::GeneratingKnowledgeGraph => "Generating_KnowledgeGraph",
            JobState::Generating => "Generating",
            JobState::Completed => "Completed",
            JobState::Error => "Error",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    /// Forward-only transition check for one job kind.
    ///
    /// A state may only advance to a later stage of the same kind's sequence.
    /// `Error` is reachable from every non-terminal state; nothing leaves a
    /// terminal state.
    pub fn can_transition_to(self, next: JobState, kind: JobKind) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == JobState::Error {
            return true;
        }
        let stages = kind.stages();
        match (
            stages.iter().position(|s| *s == self),
            stages.iter().position(|s| *s == next),
        ) {
            (Some(from), Some(to)) => to > from,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The persisted record for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub unit: JobUnit,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn is_error(&self) -> bool {
        self.state == JobState::Error
    }
}

/// Result of asking the orchestrator to ingest a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started { run_id: String },
    AlreadyRunning { state: JobState },
    AlreadyCompleted,
}

/// Counts reported by a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub unit: Option<JobUnit>,
    pub chunks: usize,
    pub sentences: usize,
    pub prompt_units: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub raw_responses: usize,
    pub triples_parsed: usize,
    pub triples_rejected: usize,
    pub facts_merged: usize,
}

#[async_trait]
pub trait JobStatusStore: Send + Sync {
    async fn set_status(&self, unit: &JobUnit, state: JobState) -> Result<()>;
    async fn get_status(&self, unit: &JobUnit) -> Result<Option<JobStatus>>;
}
