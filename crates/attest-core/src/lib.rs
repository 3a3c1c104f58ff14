//! # attest-core
//!
//! Deterministic data model and scoring for LLM faithfulness audits.
//!
//! An audit takes a user query, the LLM response given for it, and the
//! context documents the model had access to, then answers:
//! - Which factual claims does the response make?
//! - Which of those claims does the context actually support?
//! - How faithful is the response overall?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same verification input always produces the same
//!    score, flag, and reasoning trace
//! 2. **No LLM calls**: Claim extraction and verification live in
//!    `attest-runtime`; this crate only aggregates their results
//! 3. **Traceable**: Every record carries a human-readable reasoning trace
//!    listing each claim, its status, and its evidence
//! 4. **Monotonic**: An audit record only moves forward through its
//!    lifecycle; illegal transitions are rejected
//!
//! ## Example
//!
//! ```rust,ignore
//! use attest_core::{aggregate, ClaimVerification};
//!
//! let summary = aggregate(&verifications);
//! if summary.hallucination_detected {
//!     println!("unsupported content:\n{}", summary.reasoning_trace);
//! }
//! ```

pub mod record;
pub mod scoring;
pub mod types;

pub use record::{AuditFailure, AuditPhase, AuditRecord, StageName, TransitionError};
pub use scoring::{aggregate, quality_degraded, ScoreSummary};
pub use types::{
    AuditJob, Claim, ClaimVerification, Evidence, SourceSpan, VerificationStatus,
};
