//! Agent capability traits
//!
//! One trait per role. Concrete agents are built once at startup and
//! injected into the orchestrator; they are never reconfigured afterwards.

use crate::config::AppConfig;
use crate::error::OrchestrationError;
use crate::gemini::GeminiClient;
use crate::models::{AnalysisResult, AudioClip, Document, MarketData, RetrievalResult};
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub mod analysis;
pub mod language;
pub mod market;
pub mod retriever;
pub mod voice;

#[cfg(test)]
pub mod testing;

pub use analysis::RuleBasedAnalysisAgent;
pub use language::{GeminiLanguageAgent, TemplateLanguageAgent};
pub use market::AlphaVantageAgent;
pub use retriever::InMemoryRetriever;
pub use voice::HttpVoiceAgent;

/// Speech in, speech out
#[async_trait]
pub trait VoiceAgent: Send + Sync {
    /// Fails with `InputError` when the audio is unintelligible.
    async fn speech_to_text(&self, audio: &[u8]) -> Result<String>;

    /// Fails with `SynthesisFailure`.
    async fn text_to_speech(&self, text: &str) -> Result<AudioClip>;
}

#[async_trait]
pub trait MarketDataAgent: Send + Sync {
    /// `NotFound` for unrecognized instruments, `UpstreamUnavailable` on outage.
    async fn fetch_market_data(&self, instrument_id: &str) -> Result<MarketData>;
}

#[async_trait]
pub trait RetrieverAgent: Send + Sync {
    /// No results is not an error: returns empty excerpts with confidence 0.
    async fn retrieve(&self, query_text: &str) -> Result<RetrievalResult>;

    /// Add documents to the index. Read-only retrievers reject this.
    async fn ingest(&self, _documents: Vec<Document>) -> Result<usize> {
        Err(OrchestrationError::InputError(
            "this retriever does not accept documents".to_string(),
        ))
    }
}

#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Requires at least one input; `InsufficientInput` otherwise.
    async fn analyze(
        &self,
        market_data: Option<&MarketData>,
        retrieval: Option<&RetrievalResult>,
    ) -> Result<AnalysisResult>;
}

#[async_trait]
pub trait LanguageAgent: Send + Sync {
    /// Always returns non-empty text.
    async fn compose(&self, analysis: &AnalysisResult) -> String;
}

/// The full set of agents wired into an orchestrator
#[derive(Clone)]
pub struct AgentSet {
    pub voice: Arc<dyn VoiceAgent>,
    pub market: Arc<dyn MarketDataAgent>,
    pub retriever: Arc<dyn RetrieverAgent>,
    pub analysis: Arc<dyn AnalysisAgent>,
    pub language: Arc<dyn LanguageAgent>,
}

impl AgentSet {
    /// Build the production agents. Missing credentials are tolerated here
    /// and surface as branch failures at request time.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        if config.alpha_vantage_api_key.is_empty() {
            warn!("ALPHA_VANTAGE_API_KEY not set; market data queries will degrade");
        }
        let market = AlphaVantageAgent::new(
            config.alpha_vantage_api_key.clone(),
            config.alpha_vantage_base_url.clone(),
        )?;

        let voice = HttpVoiceAgent::new(config.stt_endpoint.clone(), config.tts_endpoint.clone())?;

        let documents = match &config.corpus_path {
            Some(path) => retriever::load_corpus(path)?,
            None => Vec::new(),
        };
        let retriever = InMemoryRetriever::with_documents(config.retrieval_top_k, documents).await;
        info!(passages = retriever.passage_count().await, "Retriever ready");

        let language: Arc<dyn LanguageAgent> = if config.gemini_api_key.is_empty() {
            warn!("GEMINI_API_KEY not set; using templated summaries");
            Arc::new(TemplateLanguageAgent)
        } else {
            let client = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_model)?;
            Arc::new(GeminiLanguageAgent::new(client))
        };

        Ok(Self {
            voice: Arc::new(voice),
            market: Arc::new(market),
            retriever: Arc::new(retriever),
            analysis: Arc::new(RuleBasedAnalysisAgent),
            language,
        })
    }
}
