//! The four-stage audit pipeline.
//!
//! `decompose → retrieve → verify → score`, executed in order by the
//! orchestrator over an exclusively-owned audit record.

mod decomposer;
mod orchestrator;
mod retriever;
mod verifier;

pub use decomposer::{ClaimDecomposer, DecompositionError};
pub use orchestrator::{AuditOrchestrator, CancelFlag};
pub use retriever::{EvidenceRetriever, RetrievalError};
pub use verifier::{ClaimVerifier, VerificationError};
