//! Audit record lifecycle.
//!
//! An [`AuditRecord`] is exclusively owned by the worker executing it.
//! It moves forward through [`AuditPhase`]s as pipeline stages complete;
//! transition guards reject anything that would move it backwards or past
//! a terminal phase. After `Scored` or `Failed` the record is shared
//! immutably with subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{AuditJob, Claim, ClaimVerification};

/// Pipeline stages, used to attribute failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Decompose,
    Retrieve,
    Verify,
    Score,

    /// Failure outside the pipeline proper: a worker crash, or
    /// cancellation before a worker picked the job up
    Dispatch,
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageName::Decompose => write!(f, "decompose"),
            StageName::Retrieve => write!(f, "retrieve"),
            StageName::Verify => write!(f, "verify"),
            StageName::Score => write!(f, "score"),
            StageName::Dispatch => write!(f, "dispatch"),
        }
    }
}

/// Lifecycle phase of an audit record.
///
/// `Pending → Decomposed → Retrieved → Verified → Scored`, with `Failed`
/// reachable from any non-terminal phase. No backward transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditPhase {
    Pending,
    Decomposed,
    Retrieved,
    Verified,
    Scored,
    Failed,
}

impl AuditPhase {
    /// Whether this phase ends the record's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuditPhase::Scored | AuditPhase::Failed)
    }

    fn successor(&self) -> Option<AuditPhase> {
        match self {
            AuditPhase::Pending => Some(AuditPhase::Decomposed),
            AuditPhase::Decomposed => Some(AuditPhase::Retrieved),
            AuditPhase::Retrieved => Some(AuditPhase::Verified),
            AuditPhase::Verified => Some(AuditPhase::Scored),
            AuditPhase::Scored | AuditPhase::Failed => None,
        }
    }
}

/// Why and where an audit failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFailure {
    /// The stage that failed
    pub stage: StageName,

    /// Human-readable reason
    pub reason: String,
}

/// Errors from illegal record transitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("cannot move from {from:?} to {to:?}")]
    Illegal { from: AuditPhase, to: AuditPhase },

    #[error("record is already terminal in {0:?}")]
    AlreadyTerminal(AuditPhase),

    #[error("{claims} claims but {verifications} verifications")]
    LengthMismatch { claims: usize, verifications: usize },
}

/// The full result of one audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Id of the job this record answers
    pub job_id: Uuid,

    /// The original user query
    pub query: String,

    /// The LLM response that was audited
    pub response: String,

    /// Claims extracted from the response, in order of first appearance
    pub claims: Vec<Claim>,

    /// Verification results, index-aligned with `claims`
    pub verifications: Vec<ClaimVerification>,

    /// Fraction of claims supported by evidence; defined once `Scored`
    pub faithfulness_score: Option<f64>,

    /// Whether any unsupported or partially supported claim was found
    pub hallucination_detected: bool,

    /// Deterministic human-readable rendering of the findings
    pub reasoning_trace: String,

    /// Set when too many claims could not be verified at all
    pub degraded: bool,

    /// Current lifecycle phase
    pub phase: AuditPhase,

    /// Populated iff `phase == Failed`
    pub failure: Option<AuditFailure>,

    /// When the worker started this audit
    pub created_at: DateTime<Utc>,

    /// When the record became terminal
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    /// Start a record for a job. Phase begins at `Pending`.
    pub fn start(job: &AuditJob) -> Self {
        Self {
            job_id: job.job_id,
            query: job.query.clone(),
            response: job.response.clone(),
            claims: Vec::new(),
            verifications: Vec::new(),
            faithfulness_score: None,
            hallucination_detected: false,
            reasoning_trace: String::new(),
            degraded: false,
            phase: AuditPhase::Pending,
            failure: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    fn advance(&mut self, to: AuditPhase) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.phase));
        }
        if self.phase.successor() != Some(to) {
            return Err(TransitionError::Illegal {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Record the decomposer's output and move to `Decomposed`.
    pub fn decomposed(&mut self, claims: Vec<Claim>) -> Result<(), TransitionError> {
        self.advance(AuditPhase::Decomposed)?;
        self.claims = claims;
        Ok(())
    }

    /// Mark evidence retrieval complete and move to `Retrieved`.
    pub fn retrieved(&mut self) -> Result<(), TransitionError> {
        self.advance(AuditPhase::Retrieved)
    }

    /// Record verification results and move to `Verified`.
    ///
    /// Enforces the invariant that every claim has exactly one
    /// verification, in claim order.
    pub fn verified(
        &mut self,
        verifications: Vec<ClaimVerification>,
        degraded: bool,
    ) -> Result<(), TransitionError> {
        if verifications.len() != self.claims.len() {
            return Err(TransitionError::LengthMismatch {
                claims: self.claims.len(),
                verifications: verifications.len(),
            });
        }
        self.advance(AuditPhase::Verified)?;
        self.verifications = verifications;
        self.degraded = degraded;
        Ok(())
    }

    /// Record the aggregate score and move to the terminal `Scored` phase.
    pub fn scored(
        &mut self,
        faithfulness_score: f64,
        hallucination_detected: bool,
        reasoning_trace: String,
    ) -> Result<(), TransitionError> {
        self.advance(AuditPhase::Scored)?;
        self.faithfulness_score = Some(faithfulness_score);
        self.hallucination_detected = hallucination_detected;
        self.reasoning_trace = reasoning_trace;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Move to the terminal `Failed` phase, from any non-terminal phase.
    pub fn failed(
        &mut self,
        stage: StageName,
        reason: impl Into<String>,
    ) -> Result<(), TransitionError> {
        if self.phase.is_terminal() {
            return Err(TransitionError::AlreadyTerminal(self.phase));
        }
        let reason = reason.into();
        tracing::warn!(job_id = %self.job_id, stage = %stage, reason = %reason, "audit failed");
        self.phase = AuditPhase::Failed;
        self.failure = Some(AuditFailure { stage, reason });
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}
