//! Evidence store.
//!
//! The retriever asks an [`EvidenceStore`] for the passages most relevant
//! to a claim. The scoring model behind a store is a black box to the
//! pipeline; the contract only binds on descending order and threshold
//! behavior.
//!
//! [`LexicalIndex`] is the built-in store: a per-job index over the
//! submitted context documents using cosine similarity of term-frequency
//! vectors. An external vector database can be plugged in by implementing
//! the trait.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Errors from evidence search.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("evidence backend unavailable: {0}")]
    Unavailable(String),
}

/// A passage returned from a search, with its relevance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPassage {
    /// The passage text
    pub text: String,

    /// Relevance in [0, 1], higher is more relevant
    pub score: f64,

    /// Index of the source document in the indexed corpus
    pub doc_index: usize,
}

/// Capability interface for evidence search backends.
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// Return up to `k` passages with relevance at or above `threshold`,
    /// sorted by descending relevance. An empty result is a valid,
    /// meaningful outcome, never an error.
    async fn search(
        &self,
        query: &str,
        k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredPassage>, StoreError>;
}

/// In-memory lexical index over a job's context documents.
///
/// Each document becomes a term-frequency vector over lowercased
/// alphanumeric tokens; relevance is the cosine between the query vector
/// and the document vector. Cheap, deterministic, and good enough to
/// honor the ordering/threshold contract without an embedding service.
#[derive(Debug, Clone)]
pub struct LexicalIndex {
    docs: Vec<(String, HashMap<String, f64>)>,
}

impl LexicalIndex {
    /// Build an index over `context_docs`. Blank documents are kept (so
    /// document indices stay aligned) but never match anything.
    pub fn build(context_docs: &[String]) -> Self {
        let docs = context_docs
            .iter()
            .map(|doc| (doc.clone(), term_frequencies(doc)))
            .collect();
        Self { docs }
    }

    /// Number of indexed documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Whether the index holds no documents.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

#[async_trait]
impl EvidenceStore for LexicalIndex {
    async fn search(
        &self,
        query: &str,
        k: usize,
        threshold: f64,
    ) -> Result<Vec<ScoredPassage>, StoreError> {
        let query_tf = term_frequencies(query);
        if query_tf.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<ScoredPassage> = self
            .docs
            .iter()
            .enumerate()
            .filter_map(|(doc_index, (text, tf))| {
                let score = cosine(&query_tf, tf);
                (score >= threshold).then(|| ScoredPassage {
                    text: text.clone(),
                    score,
                    doc_index,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        Ok(hits)
    }
}

fn term_frequencies(text: &str) -> HashMap<String, f64> {
    let mut tf = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *tf.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    tf
}

fn cosine(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, wa)| b.get(term).map(|wb| wa * wb))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let norm_a: f64 = a.values().map(|w| w * w).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|w| w * w).sum::<f64>().sqrt();
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn most_relevant_document_ranks_first() {
        let index = LexicalIndex::build(&docs(&[
            "The Eiffel Tower is in Paris.",
            "France's capital is Paris, founded in 3rd century BC.",
            "Rust is a systems programming language.",
        ]));

        let hits = index
            .search("Paris is the capital of France", 3, 0.1)
            .await
            .unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].doc_index, 1);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn threshold_filters_weak_matches() {
        let index = LexicalIndex::build(&docs(&["completely unrelated text about chemistry"]));
        let hits = index
            .search("Paris is the capital of France", 3, 0.3)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn empty_corpus_yields_empty_not_error() {
        let index = LexicalIndex::build(&[]);
        let hits = index.search("any claim", 3, 0.0).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn top_k_truncates() {
        let index = LexicalIndex::build(&docs(&[
            "paris paris paris",
            "paris france",
            "paris city",
            "paris tour",
        ]));
        let hits = index.search("paris", 2, 0.0).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn identical_texts_have_unit_similarity() {
        let a = term_frequencies("Paris is the capital");
        let b = term_frequencies("Paris is the capital");
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-9);
    }
}
