//! # attest-runtime
//!
//! Async execution layer for attest: the four-stage audit pipeline
//! (decompose → retrieve → verify → score), the dispatch pool that runs
//! many audits concurrently without blocking submitters, and the
//! broadcaster that streams finished records to live subscribers.
//!
//! The deterministic parts (data model, scoring) live in `attest-core`;
//! everything in this crate may call an LLM backend or block on I/O.
//!
//! ## Example
//!
//! ```rust,ignore
//! use attest_runtime::{AuditService, RuntimeConfig};
//! use attest_core::AuditJob;
//!
//! let config = RuntimeConfig::from_env();
//! let service = AuditService::start(config)?;
//!
//! let mut sub = service.broadcaster().subscribe();
//! let job_id = service.submit(AuditJob::new(query, response, context))?;
//!
//! while let Ok(msg) = sub.recv().await {
//!     println!("{msg:?}");
//! }
//! ```

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod store;

pub use broadcast::{BroadcastMessage, MetricSnapshot, ResultBroadcaster, Subscription};
pub use config::RuntimeConfig;
pub use dispatch::{AuditService, DispatchPool, JobStatus, SubmitError};
pub use pipeline::{
    AuditOrchestrator, CancelFlag, ClaimDecomposer, ClaimVerifier, DecompositionError,
    EvidenceRetriever, RetrievalError, VerificationError,
};
pub use providers::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, OllamaProvider,
    ProviderError, ProviderKind, ProviderSettings,
};
pub use retry::RetryPolicy;
pub use store::{EvidenceStore, LexicalIndex, ScoredPassage, StoreError};
