//! Claim verification.
//!
//! Natural-language inference over a claim and its evidence: does the
//! evidence entail the claim, contradict it, or not address it? Claims
//! verify independently of one another with no shared state, which is
//! what lets the orchestrator fan them out concurrently.

use std::sync::Arc;

use attest_core::{Claim, ClaimVerification, Evidence, VerificationStatus};
use thiserror::Error;

use crate::prompts::{verifier_prompt, VERIFIER_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::retry::RetryPolicy;

/// Errors from claim verification. Non-fatal for the job: the affected
/// claim degrades to Unknown.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),
}

/// LLM-backed claim verifier.
pub struct ClaimVerifier {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    retry: RetryPolicy,
}

impl ClaimVerifier {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            completion,
            retry,
        }
    }

    /// Verify one claim against its evidence.
    ///
    /// Decision policy:
    /// - no evidence → Unknown with confidence 0, no LLM call
    /// - full entailment → Supported, confidence = max evidence relevance
    /// - contradiction or no support → Unsupported
    /// - partial support of a compound claim → PartiallySupported
    ///
    /// Malformed verifier output degrades to Unknown; only an exhausted
    /// provider failure is surfaced as an error.
    pub async fn verify(
        &self,
        claim: Claim,
        evidence: Vec<Evidence>,
    ) -> Result<ClaimVerification, VerificationError> {
        if evidence.is_empty() {
            return Ok(ClaimVerification::unknown(claim));
        }

        let passages: Vec<String> = evidence.iter().map(|e| e.text.clone()).collect();
        let messages = vec![
            ChatMessage::system(VERIFIER_SYSTEM_PROMPT),
            ChatMessage::user(verifier_prompt(&claim.text, &passages)),
        ];

        let response = self
            .retry
            .run(|| {
                let messages = messages.clone();
                async move { self.provider.complete(messages, &self.completion).await }
            })
            .await
            .map_err(VerificationError::Provider)?;

        Ok(interpret(claim, evidence, &response.content))
    }
}

/// Map the verifier's JSON verdict onto a [`ClaimVerification`].
fn interpret(claim: Claim, evidence: Vec<Evidence>, content: &str) -> ClaimVerification {
    let verdict: serde_json::Value = match serde_json::from_str(content.trim()) {
        Ok(v) => v,
        Err(err) => {
            tracing::warn!(claim = %claim.text, error = %err, "unparseable verdict, degrading to unknown");
            return ClaimVerification {
                claim,
                status: VerificationStatus::Unknown,
                confidence: 0.0,
                evidence,
            };
        }
    };

    let status = match verdict.get("status").and_then(|s| s.as_str()) {
        Some("SUPPORTED") => VerificationStatus::Supported,
        Some("UNSUPPORTED") => VerificationStatus::Unsupported,
        Some("PARTIALLY_SUPPORTED") => VerificationStatus::PartiallySupported,
        other => {
            tracing::warn!(claim = %claim.text, status = ?other, "unrecognized verdict status");
            VerificationStatus::Unknown
        }
    };

    let max_relevance = evidence
        .iter()
        .map(|e| e.relevance_score)
        .fold(0.0_f64, f64::max);

    let confidence = match status {
        // A supported claim is only as trustworthy as its best evidence.
        VerificationStatus::Supported => max_relevance,
        VerificationStatus::Unknown => 0.0,
        _ => verdict
            .get("confidence")
            .and_then(|c| c.as_f64())
            .unwrap_or(0.5)
            .clamp(0.0, 1.0),
    };

    tracing::debug!(
        claim = %claim.text,
        status = ?status,
        confidence,
        "verified claim"
    );

    ClaimVerification {
        claim,
        status,
        confidence,
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::providers::CompletionResponse;

    struct FixedProvider(String);

    #[async_trait]
    impl LlmProvider for FixedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            Ok(CompletionResponse {
                content: self.0.clone(),
                model: "fixed".to_string(),
            })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DownProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for DownProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::Connection("refused".into()))
        }

        async fn health_check(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn verifier(content: &str) -> ClaimVerifier {
        ClaimVerifier::new(
            Arc::new(FixedProvider(content.to_string())),
            CompletionConfig::default(),
            RetryPolicy::new(Duration::from_millis(1)),
        )
    }

    fn claim(text: &str) -> Claim {
        Claim {
            text: text.to_string(),
            source_span: None,
        }
    }

    fn evidence(relevance: f64) -> Evidence {
        Evidence {
            text: "France's capital is Paris.".to_string(),
            relevance_score: relevance,
            source_doc_index: 0,
        }
    }

    #[tokio::test]
    async fn no_evidence_is_unknown_without_llm_call() {
        let v = ClaimVerifier::new(
            Arc::new(DownProvider {
                calls: AtomicUsize::new(0),
            }),
            CompletionConfig::default(),
            RetryPolicy::new(Duration::from_millis(1)),
        );

        let result = v
            .verify(claim("Paris is the capital of France"), vec![])
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Unknown);
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn supported_confidence_is_max_evidence_relevance() {
        let v = verifier(r#"{"status":"SUPPORTED","confidence":0.99,"reasoning":"entailed"}"#);

        let result = v
            .verify(
                claim("Paris is the capital of France"),
                vec![evidence(0.62), evidence(0.87)],
            )
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Supported);
        assert!((result.confidence - 0.87).abs() < 1e-9);
    }

    #[tokio::test]
    async fn unsupported_keeps_model_confidence() {
        let v = verifier(r#"{"status":"UNSUPPORTED","confidence":0.8,"reasoning":"contradicted"}"#);

        let result = v
            .verify(claim("Paris was founded by Romans"), vec![evidence(0.5)])
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Unsupported);
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn malformed_verdict_degrades_to_unknown_keeping_evidence() {
        let v = verifier("I think it's probably true");

        let result = v
            .verify(claim("Paris was founded by Romans"), vec![evidence(0.5)])
            .await
            .unwrap();

        assert_eq!(result.status, VerificationStatus::Unknown);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.evidence.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_backend_failure_is_an_error_after_one_retry() {
        let provider = Arc::new(DownProvider {
            calls: AtomicUsize::new(0),
        });
        let v = ClaimVerifier::new(
            provider.clone(),
            CompletionConfig::default(),
            RetryPolicy::new(Duration::from_millis(1)),
        );

        let err = v
            .verify(claim("Paris was founded by Romans"), vec![evidence(0.5)])
            .await
            .unwrap_err();

        assert!(matches!(err, VerificationError::Provider(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn confidence_is_clamped_to_unit_interval() {
        let v = verifier(r#"{"status":"PARTIALLY_SUPPORTED","confidence":3.5}"#);
        let result = v
            .verify(claim("compound claim here"), vec![evidence(0.4)])
            .await
            .unwrap();
        assert_eq!(result.confidence, 1.0);
    }
}
