//! In-memory document retriever
//!
//! Documents are split into paragraph passages and scored by query-term
//! coverage. The index sits behind a RwLock so concurrent requests only
//! take read locks; ingestion is the sole writer.

use crate::agents::RetrieverAgent;
use crate::models::{Document, Excerpt, RetrievalResult};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 5;

/// Weight of the best passage in the aggregate confidence; the rest comes
/// from the mean of all returned passages.
const TOP_SCORE_WEIGHT: f64 = 0.7;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from",
    "how", "in", "is", "it", "its", "me", "of", "on", "or", "the", "this", "that",
    "to", "was", "what", "when", "which", "who", "why", "with", "latest", "tell",
    "about", "please", "give", "show",
];

/// Query-only noise: instructions and filing form names describe what to do
/// with a document, not what it says. Dropped from query terms unless that
/// would leave nothing to match.
const QUERY_NOISE: &[&str] = &[
    "summarize", "summarise", "summary", "compare", "explain", "describe",
    "list", "find", "outline", "highlight", "discuss", "mention", "mentioned",
    "say", "said", "new", "any", "10-k", "10-q", "8-k", "20-f", "filing",
    "filings", "filed", "report", "reports", "annual", "quarterly", "sec",
];

struct Passage {
    source_id: String,
    text: String,
    terms: HashSet<String>,
}

pub struct InMemoryRetriever {
    passages: RwLock<Vec<Passage>>,
    top_k: usize,
}

impl InMemoryRetriever {
    pub fn new(top_k: usize) -> Self {
        Self {
            passages: RwLock::new(Vec::new()),
            top_k: top_k.max(1),
        }
    }

    pub async fn with_documents(top_k: usize, documents: Vec<Document>) -> Self {
        let retriever = Self::new(top_k);
        retriever.add_documents(documents).await;
        retriever
    }

    async fn add_documents(&self, documents: Vec<Document>) -> usize {
        let new_passages: Vec<Passage> = documents.iter().flat_map(chunk_document).collect();
        let added = new_passages.len();

        let mut passages = self.passages.write().await;
        passages.extend(new_passages);

        info!(documents = documents.len(), passages = added, total = passages.len(), "Retriever index updated");
        added
    }

    pub async fn passage_count(&self) -> usize {
        self.passages.read().await.len()
    }
}

impl Default for InMemoryRetriever {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_K)
    }
}

#[async_trait]
impl RetrieverAgent for InMemoryRetriever {
    async fn retrieve(&self, query_text: &str) -> Result<RetrievalResult> {
        let query_terms = query_terms(query_text);
        if query_terms.is_empty() {
            return Ok(RetrievalResult::empty());
        }

        let passages = self.passages.read().await;

        let mut excerpts: Vec<Excerpt> = passages
            .iter()
            .filter_map(|p| {
                let hits = query_terms.iter().filter(|t| p.terms.contains(*t)).count();
                (hits > 0).then(|| Excerpt {
                    text: p.text.clone(),
                    source_id: p.source_id.clone(),
                    score: hits as f64 / query_terms.len() as f64,
                })
            })
            .collect();

        excerpts.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.source_id.cmp(&b.source_id))
                .then_with(|| a.text.cmp(&b.text))
        });
        excerpts.truncate(self.top_k);

        let aggregate_confidence = aggregate(&excerpts);

        debug!(
            query_terms = query_terms.len(),
            excerpts = excerpts.len(),
            aggregate_confidence,
            "Retrieval complete"
        );

        Ok(RetrievalResult {
            excerpts,
            aggregate_confidence,
        })
    }

    async fn ingest(&self, documents: Vec<Document>) -> Result<usize> {
        Ok(self.add_documents(documents).await)
    }
}

/// Load a JSON array of `{source_id, text}` documents
pub fn load_corpus(path: &Path) -> Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&raw)?;
    Ok(documents)
}

fn aggregate(excerpts: &[Excerpt]) -> f64 {
    let Some(top) = excerpts.first() else {
        return 0.0;
    };
    let mean = excerpts.iter().map(|e| e.score).sum::<f64>() / excerpts.len() as f64;
    (TOP_SCORE_WEIGHT * top.score + (1.0 - TOP_SCORE_WEIGHT) * mean).clamp(0.0, 1.0)
}

fn chunk_document(document: &Document) -> Vec<Passage> {
    document
        .text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| Passage {
            source_id: document.source_id.clone(),
            text: p.to_string(),
            terms: tokenize(p),
        })
        .collect()
}

fn query_terms(query_text: &str) -> HashSet<String> {
    let terms = tokenize(query_text);
    let content: HashSet<String> = terms
        .iter()
        .filter(|t| !QUERY_NOISE.contains(&t.as_str()))
        .cloned()
        .collect();
    if content.is_empty() {
        terms
    } else {
        content
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '&'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| t.len() > 1 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Document> {
        vec![
            Document {
                source_id: "aapl-10k-2023".into(),
                text: "Risk factors include supply chain concentration in Asia.\n\nThe company depends on third-party manufacturing partners.".into(),
            },
            Document {
                source_id: "msft-10q-q2".into(),
                text: "Cloud revenue grew 22 percent year over year.".into(),
            },
        ]
    }

    #[tokio::test]
    async fn test_ranked_excerpts() {
        let retriever = InMemoryRetriever::with_documents(5, corpus()).await;
        assert_eq!(retriever.passage_count().await, 3);

        let result = retriever.retrieve("supply chain risk factors").await.unwrap();
        assert!(!result.excerpts.is_empty());
        assert_eq!(result.excerpts[0].source_id, "aapl-10k-2023");
        assert!((result.excerpts[0].score - 1.0).abs() < f64::EPSILON);
        assert!(result.aggregate_confidence > 0.9);

        for pair in result.excerpts.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_no_results_is_empty_not_error() {
        let retriever = InMemoryRetriever::with_documents(5, corpus()).await;

        let result = retriever.retrieve("cryptocurrency staking yields").await.unwrap();
        assert!(result.excerpts.is_empty());
        assert_eq!(result.aggregate_confidence, 0.0);

        let empty_index = InMemoryRetriever::default();
        let result = empty_index.retrieve("anything at all").await.unwrap();
        assert!(result.excerpts.is_empty());

        let result = retriever.retrieve("the of and").await.unwrap();
        assert_eq!(result.aggregate_confidence, 0.0);
    }

    #[tokio::test]
    async fn test_partial_match_lowers_confidence() {
        let retriever = InMemoryRetriever::with_documents(5, corpus()).await;
        let result = retriever.retrieve("cloud margins dividends buybacks").await.unwrap();
        assert_eq!(result.excerpts.len(), 1);
        assert!(result.aggregate_confidence < 0.5);
    }

    #[tokio::test]
    async fn test_top_k_truncates() {
        let documents = (0..10)
            .map(|i| Document {
                source_id: format!("doc-{}", i),
                text: "liquidity risk disclosure".into(),
            })
            .collect();
        let retriever = InMemoryRetriever::with_documents(3, documents).await;
        let result = retriever.retrieve("liquidity risk").await.unwrap();
        assert_eq!(result.excerpts.len(), 3);
        assert_eq!(result.excerpts[0].source_id, "doc-0");
    }

    #[tokio::test]
    async fn test_instruction_words_do_not_dilute_coverage() {
        let retriever = InMemoryRetriever::with_documents(
            5,
            vec![Document {
                source_id: "aapl-10k-2023".into(),
                text: "Item 1A. Risk Factors. The company's risk factors include supply chain concentration in Asia.".into(),
            }],
        )
        .await;

        let result = retriever
            .retrieve("Summarize risk factors in the latest 10-K")
            .await
            .unwrap();
        assert_eq!(result.excerpts.len(), 1);
        assert!((result.excerpts[0].score - 1.0).abs() < f64::EPSILON);
        assert!(result.aggregate_confidence >= 0.6);

        // A query made only of noise still matches on what it has
        let result = retriever.retrieve("summarize the 10-K").await.unwrap();
        assert!(result.excerpts.is_empty());
        assert_eq!(result.aggregate_confidence, 0.0);
    }

    #[tokio::test]
    async fn test_ingest_through_trait() {
        let retriever = InMemoryRetriever::default();
        let added = retriever.ingest(corpus()).await.unwrap();
        assert_eq!(added, 3);
    }
}
