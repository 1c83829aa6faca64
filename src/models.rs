//! Core data models for the orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

//
// ================= Request =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Text,
    Voice,
}

/// What the caller actually sent
#[derive(Debug, Clone)]
pub enum RawInput {
    Text(String),
    Audio(Vec<u8>),
}

/// An inbound query. Immutable once built; `query_text` is derived during
/// normalization by the orchestrator.
#[derive(Debug, Clone)]
pub struct Request {
    pub request_id: Uuid,
    pub raw_input: RawInput,
    /// Synthesize speech even for text requests
    pub voice_output: bool,
    pub received_at: DateTime<Utc>,
}

impl Request {
    pub fn text(query: impl Into<String>) -> Self {
        Self::new(RawInput::Text(query.into()))
    }

    pub fn voice(audio: Vec<u8>) -> Self {
        Self::new(RawInput::Audio(audio))
    }

    fn new(raw_input: RawInput) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            raw_input,
            voice_output: false,
            received_at: Utc::now(),
        }
    }

    pub fn with_voice_output(mut self, enabled: bool) -> Self {
        self.voice_output = enabled;
        self
    }

    pub fn modality(&self) -> Modality {
        match self.raw_input {
            RawInput::Text(_) => Modality::Text,
            RawInput::Audio(_) => Modality::Voice,
        }
    }
}

//
// ================= Routing =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    MarketData,
    DocumentQuery,
    Mixed,
    Unknown,
}

impl RouteKind {
    pub fn wants_market_data(&self) -> bool {
        !matches!(self, RouteKind::DocumentQuery)
    }

    pub fn wants_documents(&self) -> bool {
        !matches!(self, RouteKind::MarketData)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteDecision {
    pub kind: RouteKind,
    /// Ticker symbol detected in (or resolved from) the query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instrument: Option<String>,
}

//
// ================= Agent Outputs =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Excerpt {
    pub text: String,
    pub source_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    /// Ordered by descending score
    pub excerpts: Vec<Excerpt>,
    pub aggregate_confidence: f64,
}

impl RetrievalResult {
    pub fn empty() -> Self {
        Self {
            excerpts: Vec::new(),
            aggregate_confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketData {
    pub instrument_id: String,
    pub fields: BTreeMap<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl MarketData {
    pub fn number(&self, field: &str) -> Option<f64> {
        self.fields.get(field).and_then(Value::as_f64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub summary_text: String,
    pub supporting_facts: Vec<String>,
    pub confidence: f64,
}

/// Document accepted by the retriever index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,
    pub text: String,
}

/// Synthesized speech
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

//
// ================= Response =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AudioStatus {
    None,
    Pending,
    Ready,
}

/// Per-request pipeline states. Ordering is by `rank`; a request only ever
/// moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    Normalized,
    Routed,
    Fetching,
    Gated,
    Analyzed,
    Responded,
    Degraded,
    VoiceScheduled,
}

impl PipelineStage {
    pub fn rank(&self) -> u8 {
        match self {
            PipelineStage::Received => 0,
            PipelineStage::Normalized => 1,
            PipelineStage::Routed => 2,
            PipelineStage::Fetching => 3,
            PipelineStage::Gated => 4,
            PipelineStage::Analyzed => 5,
            PipelineStage::Responded | PipelineStage::Degraded => 6,
            PipelineStage::VoiceScheduled => 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: Uuid,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_ref: Option<Uuid>,
    pub audio_status: AudioStatus,
    pub route_taken: RouteDecision,
    pub degraded: bool,
    pub notices: Vec<String>,
    pub stages: Vec<PipelineStage>,
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RouteKind::MarketData => "market_data",
            RouteKind::DocumentQuery => "document_query",
            RouteKind::Mixed => "mixed",
            RouteKind::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modality::Text => "text",
            Modality::Voice => "voice",
        };
        write!(f, "{}", s)
    }
}
