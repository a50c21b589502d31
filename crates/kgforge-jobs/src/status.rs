use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use kgforge_core::error::Result;
use kgforge_core::job::{JobState, JobStatus, JobStatusStore, JobUnit};

#[derive(Debug, Default)]
struct StatusBook {
    current: HashMap<JobUnit, JobStatus>,
    history: HashMap<JobUnit, Vec<JobState>>,
}

/// Job status kept in process memory, with the ordered list of every state
/// each unit has been put in.
#[derive(Debug, Default)]
pub struct InMemoryJobStatusStore {
    book: RwLock<StatusBook>,
}

impl InMemoryJobStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn history(&self, unit: &JobUnit) -> Vec<JobState> {
        self.book
            .read()
            .await
            .history
            .get(unit)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl JobStatusStore for InMemoryJobStatusStore {
    async fn set_status(&self, unit: &JobUnit, state: JobState) -> Result<()> {
        let mut book = self.book.write().await;
        book.current.insert(
            unit.clone(),
            JobStatus {
                unit: unit.clone(),
                state,
                updated_at: Utc::now(),
            },
        );
        book.history.entry(unit.clone()).or_default().push(state);
        Ok(())
    }

    async fn get_status(&self, unit: &JobUnit) -> Result<Option<JobStatus>> {
        Ok(self.book.read().await.current.get(unit).cloned())
    }
}
