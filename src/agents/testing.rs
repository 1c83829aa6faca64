//! Scriptable agents for tests

use super::*;
use crate::models::Excerpt;
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct MockVoice {
    /// `None` simulates unintelligible audio
    pub transcript: Option<String>,
    pub tts_delay: Duration,
    pub tts_fails: bool,
    pub stt_calls: AtomicUsize,
    pub tts_calls: AtomicUsize,
}

impl MockVoice {
    pub fn hearing(transcript: &str) -> Self {
        Self {
            transcript: Some(transcript.to_string()),
            tts_delay: Duration::ZERO,
            tts_fails: false,
            stt_calls: AtomicUsize::new(0),
            tts_calls: AtomicUsize::new(0),
        }
    }

    pub fn unintelligible() -> Self {
        Self {
            transcript: None,
            ..Self::hearing("")
        }
    }

    pub fn slow_tts(mut self, delay: Duration) -> Self {
        self.tts_delay = delay;
        self
    }

    pub fn failing_tts(mut self) -> Self {
        self.tts_fails = true;
        self
    }
}

#[async_trait]
impl VoiceAgent for MockVoice {
    async fn speech_to_text(&self, _audio: &[u8]) -> Result<String> {
        self.stt_calls.fetch_add(1, Ordering::SeqCst);
        self.transcript
            .clone()
            .ok_or_else(|| OrchestrationError::InputError("unintelligible audio".into()))
    }

    async fn text_to_speech(&self, text: &str) -> Result<AudioClip> {
        self.tts_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.tts_delay).await;
        if self.tts_fails {
            return Err(OrchestrationError::SynthesisFailure("voice model crashed".into()));
        }
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
            content_type: "audio/wav".into(),
        })
    }
}

pub enum MarketBehavior {
    Quote,
    NotFound,
    Unavailable,
    /// Fails with a retryable error this many times, then quotes
    FlakyThenQuote(usize),
}

pub struct MockMarket {
    pub behavior: MarketBehavior,
    pub calls: AtomicUsize,
}

impl MockMarket {
    pub fn new(behavior: MarketBehavior) -> Self {
        Self {
            behavior,
            calls: AtomicUsize::new(0),
        }
    }
}

pub fn sample_market_data(instrument_id: &str) -> MarketData {
    let mut fields = BTreeMap::new();
    fields.insert("price".to_string(), json!(189.84));
    fields.insert("change".to_string(), json!(1.23));
    fields.insert("change_percent".to_string(), json!(0.65));
    fields.insert("previous_close".to_string(), json!(188.61));
    fields.insert("pe_ratio".to_string(), json!(29.45));
    MarketData {
        instrument_id: instrument_id.to_string(),
        fields,
        timestamp: Utc::now(),
    }
}

#[async_trait]
impl MarketDataAgent for MockMarket {
    async fn fetch_market_data(&self, instrument_id: &str) -> Result<MarketData> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            MarketBehavior::Quote => Ok(sample_market_data(instrument_id)),
            MarketBehavior::NotFound => Err(OrchestrationError::NotFound(instrument_id.to_string())),
            MarketBehavior::Unavailable => {
                Err(OrchestrationError::UpstreamUnavailable("market feed down".into()))
            }
            MarketBehavior::FlakyThenQuote(failures) if call < failures => {
                Err(OrchestrationError::UpstreamUnavailable("transient".into()))
            }
            MarketBehavior::FlakyThenQuote(_) => Ok(sample_market_data(instrument_id)),
        }
    }
}

pub struct MockRetriever {
    /// `None` simulates an outage
    pub result: Option<RetrievalResult>,
    pub calls: AtomicUsize,
}

impl MockRetriever {
    pub fn with_confidence(confidence: f64) -> Self {
        Self {
            result: Some(RetrievalResult {
                excerpts: vec![Excerpt {
                    text: "Risk factors include supply chain concentration.".into(),
                    source_id: "10k-2023".into(),
                    score: confidence,
                }],
                aggregate_confidence: confidence,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            result: None,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RetrieverAgent for MockRetriever {
    async fn retrieve(&self, _query_text: &str) -> Result<RetrievalResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .clone()
            .ok_or_else(|| OrchestrationError::UpstreamUnavailable("index offline".into()))
    }
}

/// Wraps the rule-based agent and records what it was given
#[derive(Default)]
pub struct RecordingAnalysis {
    /// (had market data, had retrieval) per call
    pub calls: Mutex<Vec<(bool, bool)>>,
}

impl RecordingAnalysis {
    pub fn call_log(&self) -> Vec<(bool, bool)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl AnalysisAgent for RecordingAnalysis {
    async fn analyze(
        &self,
        market_data: Option<&MarketData>,
        retrieval: Option<&RetrievalResult>,
    ) -> Result<AnalysisResult> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((market_data.is_some(), retrieval.is_some()));
        }
        RuleBasedAnalysisAgent.analyze(market_data, retrieval).await
    }
}

/// Handles to every mock so tests can inspect calls after wiring
pub struct MockAgents {
    pub voice: Arc<MockVoice>,
    pub market: Arc<MockMarket>,
    pub retriever: Arc<MockRetriever>,
    pub analysis: Arc<RecordingAnalysis>,
}

impl MockAgents {
    pub fn new(voice: MockVoice, market: MockMarket, retriever: MockRetriever) -> Self {
        Self {
            voice: Arc::new(voice),
            market: Arc::new(market),
            retriever: Arc::new(retriever),
            analysis: Arc::new(RecordingAnalysis::default()),
        }
    }

    pub fn agent_set(&self) -> AgentSet {
        AgentSet {
            voice: self.voice.clone(),
            market: self.market.clone(),
            retriever: self.retriever.clone(),
            analysis: self.analysis.clone(),
            language: Arc::new(TemplateLanguageAgent),
        }
    }
}
