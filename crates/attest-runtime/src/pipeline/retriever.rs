//! Evidence retrieval.
//!
//! For each claim, asks the evidence store for the most relevant context
//! passages. "No evidence" is a valid outcome that the verifier turns
//! into an Unknown verdict; only a backend failure is an error, and even
//! that degrades the affected claim rather than the job.

use attest_core::{Claim, Evidence};
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::store::{EvidenceStore, StoreError};

/// Errors from evidence retrieval. Non-fatal: the orchestrator degrades
/// the affected claim to empty evidence.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("evidence search failed: {0}")]
    Backend(#[from] StoreError),
}

/// Per-claim evidence retriever.
#[derive(Debug, Clone)]
pub struct EvidenceRetriever {
    config: RetrievalConfig,
}

impl EvidenceRetriever {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    /// Retrieve up to `top_k` passages for a claim, sorted by descending
    /// relevance, dropping anything under the relevance threshold.
    pub async fn retrieve(
        &self,
        claim: &Claim,
        store: &dyn EvidenceStore,
    ) -> Result<Vec<Evidence>, RetrievalError> {
        let hits = store
            .search(&claim.text, self.config.top_k, self.config.score_threshold)
            .await?;

        tracing::debug!(
            claim = %claim.text,
            hits = hits.len(),
            "retrieved evidence"
        );

        Ok(hits
            .into_iter()
            .map(|p| Evidence {
                text: p.text,
                relevance_score: p.score,
                source_doc_index: p.doc_index,
            })
            .collect())
    }
}
