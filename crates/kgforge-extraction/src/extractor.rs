use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kgforge_core::document::PromptUnit;
use kgforge_core::error::Result;
use kgforge_core::extraction::ExtractionEndpoint;
use kgforge_core::triple::RawResponse;

use crate::prompt::PromptBuilder;

/// Replies collected for one run, one per answered batch, in batch order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub responses: Vec<RawResponse>,
    pub batches: usize,
    pub failed_batches: usize,
}

/// Sends prompt units to the extraction endpoint in fixed-size batches,
/// one call at a time.
pub struct TripleExtractor {
    endpoint: Arc<dyn ExtractionEndpoint>,
    batch_size: usize,
}

impl TripleExtractor {
    pub fn new(endpoint: Arc<dyn ExtractionEndpoint>, batch_size: usize) -> Self {
        Self {
            endpoint,
            batch_size: batch_size.max(1),
        }
    }

    /// Run every batch in order. A call that returns no text or fails with an
    /// extraction error is counted and skipped; any other error ends the run.
    pub async fn extract(&self, builder: &PromptBuilder, units: &[PromptUnit]) -> Result<BatchReport> {
        let mut report = BatchReport::default();

        for (batch_index, batch) in units.chunks(self.batch_size).enumerate() {
            report.batches += 1;
            let messages = builder.messages(batch)?;
            let prompt_ids: Vec<String> = batch.iter().map(|u| u.id.clone()).collect();

            match self.endpoint.complete(&messages).await {
                Ok(Some(text)) => {
                    tracing::debug!(
                        batch = batch_index,
                        prompts = batch.len(),
                        response_len = text.len(),
                        "Batch answered"
                    );
                    report.responses.push(RawResponse {
                        batch_index,
                        prompt_ids,
                        head_candidates: head_candidates(batch),
                        text,
                    });
                }
                Ok(None) => {
                    report.failed_batches += 1;
                    tracing::warn!(batch = batch_index, prompts = ?prompt_ids, "Empty reply, batch skipped");
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(batch = batch_index, error = %e, "Extraction call failed fatally");
                    return Err(e);
                }
                Err(e) => {
                    report.failed_batches += 1;
                    tracing::warn!(
                        batch = batch_index,
                        prompts = ?prompt_ids,
                        error = %e,
                        "Extraction call failed, batch skipped"
                    );
                }
            }
        }

        tracing::info!(
            batches = report.batches,
            failed = report.failed_batches,
            responses = report.responses.len(),
            "Extraction batches finished"
        );
        Ok(report)
    }
}

fn head_candidates(batch: &[PromptUnit]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in batch.iter().flat_map(PromptUnit::entity_names) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
