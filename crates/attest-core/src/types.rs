//! Core data types for faithfulness audits.
//!
//! These types flow through the whole pipeline: an [`AuditJob`] goes in,
//! [`Claim`]s and [`Evidence`] are produced along the way, and
//! [`ClaimVerification`]s come out the far end for scoring.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One end-to-end audit request.
///
/// Immutable once submitted. `job_id` doubles as the idempotency key:
/// a second submission with the same id while the first is in flight
/// is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditJob {
    /// Unique identifier, supplied by the submitter
    pub job_id: Uuid,

    /// The question the user asked
    pub query: String,

    /// The LLM response to audit
    pub response: String,

    /// Context documents the response should be grounded in
    pub context_docs: Vec<String>,
}

impl AuditJob {
    /// Create a job with a fresh random id.
    pub fn new(
        query: impl Into<String>,
        response: impl Into<String>,
        context_docs: Vec<String>,
    ) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            query: query.into(),
            response: response.into(),
            context_docs,
        }
    }

    /// Create a job with a caller-chosen id (idempotency key).
    pub fn with_id(
        job_id: Uuid,
        query: impl Into<String>,
        response: impl Into<String>,
        context_docs: Vec<String>,
    ) -> Self {
        Self {
            job_id,
            query: query.into(),
            response: response.into(),
            context_docs,
        }
    }
}

/// Byte offsets of a claim's origin within the response text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: usize,
    pub end: usize,
}

/// An atomic, independently verifiable factual assertion extracted from
/// an LLM response.
///
/// Claims are produced only by the decomposer and keep the order of first
/// appearance in the response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    /// The claim text, preserving the response's original wording
    pub text: String,

    /// Where in the response this claim came from, when it can be located
    /// verbatim
    pub source_span: Option<SourceSpan>,
}

impl Claim {
    /// Create a claim, locating its span in the response if the text
    /// appears verbatim.
    pub fn locate(text: impl Into<String>, response: &str) -> Self {
        let text = text.into();
        let source_span = response.find(&text).map(|start| SourceSpan {
            start,
            end: start + text.len(),
        });
        Self { text, source_span }
    }
}

/// A context passage judged relevant to a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    /// The passage text
    pub text: String,

    /// Relevance to the claim, in [0, 1]
    pub relevance_score: f64,

    /// Index of the source document in the job's `context_docs`
    pub source_doc_index: usize,
}

/// Outcome of verifying one claim against its evidence.
///
/// Serialized in SCREAMING_SNAKE_CASE to match the wire format consumed
/// by downstream dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// The evidence entails the claim
    Supported,

    /// The evidence contradicts the claim, or contains no support for it
    Unsupported,

    /// Part of a compound claim is supported
    PartiallySupported,

    /// No evidence was available, or verification could not run
    Unknown,
}

/// Verification result for a single claim. One per claim, immutable after
/// creation, index-aligned with the record's claim list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimVerification {
    /// The claim that was verified
    pub claim: Claim,

    /// Verification outcome
    pub status: VerificationStatus,

    /// Confidence in the outcome, in [0, 1]
    pub confidence: f64,

    /// Evidence consulted, ordered by descending relevance
    pub evidence: Vec<Evidence>,
}

impl ClaimVerification {
    /// A verification for a claim that had no usable evidence or whose
    /// verification could not run.
    pub fn unknown(claim: Claim) -> Self {
        Self {
            claim,
            status: VerificationStatus::Unknown,
            confidence: 0.0,
            evidence: Vec::new(),
        }
    }
}
