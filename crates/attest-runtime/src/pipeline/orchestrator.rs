//! Audit orchestration.
//!
//! Runs the four stages in order over an exclusively-owned record.
//!
//! # Execution Flow
//! 1. Decompose the response into claims (job-fatal on failure)
//! 2. Retrieve evidence for every claim, concurrent across claims and
//!    bounded by the per-job fan-out limit, order-preserving
//! 3. Verify every claim against its evidence under the same fan-out
//!    discipline, with a join barrier before scoring so every
//!    verification is in hand
//! 4. Aggregate the score (deterministic, in `attest-core`)
//!
//! A failure retrieving or verifying one claim degrades that claim, not
//! the job; only decomposition failure and every claim failing its
//! backend calls are job-fatal. Cancellation is cooperative: the flag is
//! checked before each stage starts, never mid-stage.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use attest_core::{
    aggregate, quality_degraded, AuditJob, AuditRecord, Claim, ClaimVerification, Evidence,
    StageName, VerificationStatus,
};
use futures::{stream, StreamExt};

use crate::config::{RuntimeConfig, VerificationConfig};
use crate::pipeline::{ClaimDecomposer, ClaimVerifier, EvidenceRetriever};
use crate::providers::LlmProvider;
use crate::retry::RetryPolicy;
use crate::store::{EvidenceStore, LexicalIndex};

/// Cooperative cancellation flag shared between a submitter and the
/// worker executing the job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. The current stage finishes; no further
    /// stage starts.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The four-stage audit pipeline over one job.
///
/// Sole mutator of the in-flight [`AuditRecord`].
pub struct AuditOrchestrator {
    decomposer: ClaimDecomposer,
    retriever: EvidenceRetriever,
    verifier: ClaimVerifier,
    verification: VerificationConfig,
    store: Option<Arc<dyn EvidenceStore>>,
}

impl AuditOrchestrator {
    /// Build an orchestrator from a provider and runtime configuration.
    pub fn new(provider: Arc<dyn LlmProvider>, config: &RuntimeConfig) -> Self {
        let retry = RetryPolicy::new(config.provider.retry_backoff);

        Self {
            decomposer: ClaimDecomposer::new(
                provider.clone(),
                config.provider.completion_config(1024),
                retry,
            ),
            verifier: ClaimVerifier::new(
                provider,
                config.provider.completion_config(512),
                retry,
            ),
            retriever: EvidenceRetriever::new(config.retrieval.clone()),
            verification: config.verification.clone(),
            store: None,
        }
    }

    /// Use an external evidence store instead of the per-job lexical
    /// index over the submitted context documents.
    pub fn with_store(mut self, store: Arc<dyn EvidenceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Run a job to `Scored` or `Failed`. Never panics on pipeline
    /// errors; every failure path lands in the returned record.
    pub async fn run(&self, job: &AuditJob, cancel: &CancelFlag) -> AuditRecord {
        let mut record = AuditRecord::start(job);
        tracing::info!(job_id = %job.job_id, "starting audit");

        // Stage 1: decompose
        if self.cancelled(&mut record, StageName::Decompose, cancel) {
            return record;
        }
        let claims = match self.decomposer.decompose(&job.response).await {
            Ok(claims) => claims,
            Err(err) => {
                let _ = record.failed(StageName::Decompose, err.to_string());
                return record;
            }
        };
        record
            .decomposed(claims.clone())
            .expect("stage order is fixed");

        // Stage 2: retrieve
        if self.cancelled(&mut record, StageName::Retrieve, cancel) {
            return record;
        }
        let index = LexicalIndex::build(&job.context_docs);
        let store: &dyn EvidenceStore = match &self.store {
            Some(external) => external.as_ref(),
            None => &index,
        };
        let fan_out = self.verification.claim_concurrency.max(1);

        let retrievals: Vec<(Vec<Evidence>, bool)> = stream::iter(claims.clone())
            .map(|claim| async move { self.retrieve_one(&claim, store).await })
            .buffered(fan_out)
            .collect()
            .await;
        record.retrieved().expect("stage order is fixed");

        // Stage 3: verify, with a join barrier before scoring
        if self.cancelled(&mut record, StageName::Verify, cancel) {
            return record;
        }
        let outcomes: Vec<(ClaimVerification, bool)> =
            stream::iter(claims.into_iter().zip(retrievals))
                .map(|(claim, (evidence, retrieval_failed))| {
                    self.verify_one(claim, evidence, retrieval_failed)
                })
                .buffered(fan_out)
                .collect()
                .await;

        let total = outcomes.len();
        let errored = outcomes.iter().filter(|(_, failed)| *failed).count();
        if total > 0 && errored == total {
            let _ = record.failed(
                StageName::Verify,
                "all retrieval and verification calls failed",
            );
            return record;
        }

        let verifications: Vec<ClaimVerification> =
            outcomes.into_iter().map(|(v, _)| v).collect();
        let degraded = quality_degraded(
            &verifications,
            self.verification.degraded_min_unknown,
            self.verification.degraded_max_claims,
        );
        record
            .verified(verifications, degraded)
            .expect("verifications are claim-aligned");

        // Stage 4: score
        if self.cancelled(&mut record, StageName::Score, cancel) {
            return record;
        }
        let summary = aggregate(&record.verifications);
        tracing::info!(
            job_id = %job.job_id,
            score = summary.faithfulness_score,
            hallucination = summary.hallucination_detected,
            degraded,
            "audit complete"
        );
        record
            .scored(
                summary.faithfulness_score,
                summary.hallucination_detected,
                summary.reasoning_trace,
            )
            .expect("stage order is fixed");

        record
    }

    async fn retrieve_one(
        &self,
        claim: &Claim,
        store: &dyn EvidenceStore,
    ) -> (Vec<Evidence>, bool) {
        match self.retriever.retrieve(claim, store).await {
            Ok(evidence) => (evidence, false),
            Err(err) => {
                tracing::warn!(claim = %claim.text, error = %err, "retrieval failed, claim degrades to empty evidence");
                (Vec::new(), true)
            }
        }
    }

    async fn verify_one(
        &self,
        claim: Claim,
        evidence: Vec<Evidence>,
        retrieval_failed: bool,
    ) -> (ClaimVerification, bool) {
        match self.verifier.verify(claim.clone(), evidence.clone()).await {
            Ok(verification) => (verification, retrieval_failed),
            Err(err) => {
                tracing::warn!(claim = %claim.text, error = %err, "verification failed, claim degrades to unknown");
                let verification = ClaimVerification {
                    claim,
                    status: VerificationStatus::Unknown,
                    confidence: 0.0,
                    evidence,
                };
                (verification, true)
            }
        }
    }

    fn cancelled(
        &self,
        record: &mut AuditRecord,
        stage: StageName,
        cancel: &CancelFlag,
    ) -> bool {
        if cancel.is_cancelled() {
            let _ = record.failed(stage, format!("cancelled before {stage} stage"));
            true
        } else {
            false
        }
    }
}
