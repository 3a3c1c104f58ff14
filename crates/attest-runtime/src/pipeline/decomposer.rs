//! Claim decomposition.
//!
//! Breaks an LLM response into atomic, independently verifiable claims.
//! A response like "Paris is the capital of France and was founded in
//! 250 BC" carries two claims that must be verified separately, or a
//! partial hallucination slips through.

use std::sync::Arc;

use attest_core::Claim;
use thiserror::Error;

use crate::cache::DecompositionCache;
use crate::prompts::{decomposer_prompt, DECOMPOSER_SYSTEM_PROMPT};
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider, ProviderError};
use crate::retry::RetryPolicy;

/// Claims shorter than this are extraction noise, not facts.
const MIN_CLAIM_LEN: usize = 6;

/// Errors from claim decomposition. All of these are fatal for the job.
#[derive(Error, Debug)]
pub enum DecompositionError {
    #[error("extractor returned empty output for non-empty input")]
    EmptyExtraction,

    #[error("provider failure: {0}")]
    Provider(#[from] ProviderError),
}

/// LLM-backed claim extractor.
///
/// Deterministic for identical input: completion runs at temperature 0
/// and results are cached by response text.
pub struct ClaimDecomposer {
    provider: Arc<dyn LlmProvider>,
    completion: CompletionConfig,
    retry: RetryPolicy,
    cache: DecompositionCache,
}

impl ClaimDecomposer {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        completion: CompletionConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            completion,
            retry,
            cache: DecompositionCache::default(),
        }
    }

    /// Extract the ordered claim list from a response.
    ///
    /// Empty extractor output for a non-empty response is retried once,
    /// then reported as [`DecompositionError::EmptyExtraction`]. A valid
    /// empty JSON array is not an error: some responses ("Hello.") simply
    /// make no factual claims.
    pub async fn decompose(&self, response: &str) -> Result<Vec<Claim>, DecompositionError> {
        if response.trim().is_empty() {
            return Ok(Vec::new());
        }

        if let Some(claims) = self.cache.get(response).await {
            tracing::debug!(claims = claims.len(), "decomposition cache hit");
            return Ok(claims);
        }

        let mut content = self.extract(response).await?;
        if content.trim().is_empty() {
            tracing::warn!("extractor returned empty output, retrying once");
            content = self.extract(response).await?;
            if content.trim().is_empty() {
                return Err(DecompositionError::EmptyExtraction);
            }
        }

        let claims = parse_claims(&content, response);
        tracing::info!(claims = claims.len(), "decomposed response into claims");

        self.cache.insert(response, claims.clone()).await;
        Ok(claims)
    }

    async fn extract(&self, response: &str) -> Result<String, ProviderError> {
        let messages = vec![
            ChatMessage::system(DECOMPOSER_SYSTEM_PROMPT),
            ChatMessage::user(decomposer_prompt(response)),
        ];

        self.retry
            .run(|| {
                let messages = messages.clone();
                async move { self.provider.complete(messages, &self.completion).await }
            })
            .await
            .map(|r| r.content)
    }
}

/// Parse the extractor's JSON array into located claims.
///
/// Unparseable output falls back to treating the whole response as one
/// claim rather than failing the audit on a formatting slip.
fn parse_claims(content: &str, response: &str) -> Vec<Claim> {
    let texts: Vec<String> = match serde_json::from_str(content.trim()) {
        Ok(texts) => texts,
        Err(err) => {
            tracing::warn!(error = %err, "claims were not a JSON array, treating response as a single claim");
            vec![response.to_string()]
        }
    };

    let mut claims: Vec<Claim> = texts
        .iter()
        .map(|t| t.trim())
        .filter(|t| t.len() >= MIN_CLAIM_LEN)
        .map(|t| Claim::locate(t, response))
        .collect();

    // Restore response order when every claim was located verbatim.
    if claims.iter().all(|c| c.source_span.is_some()) {
        claims.sort_by_key(|c| c.source_span.map(|s| s.start));
    }

    claims
}
