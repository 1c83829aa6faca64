//! Request pipeline
//!
//! RECEIVED → NORMALIZED → ROUTED → FETCHING → GATED → ANALYZED → RESPONDED | DEGRADED → VOICE_SCHEDULED
//!
//! Branches of a mixed route run concurrently inside the request's task and
//! fail independently. Speech synthesis is detached; the caller gets an
//! audio ref to poll.

use crate::agents::AgentSet;
use crate::audio::AudioStore;
use crate::audit::{query_fingerprint, AuditLog, BranchFailure, GateDecision, PipelineRecord};
use crate::config::AppConfig;
use crate::error::OrchestrationError;
use crate::gate::{gate, low_confidence_notice, GateOutcome, DEFAULT_CONFIDENCE_THRESHOLD};
use crate::models::{
    AudioStatus, MarketData, Modality, PipelineStage, RawInput, Request, Response,
    RetrievalResult, RouteDecision,
};
use crate::retry::RetryPolicy;
use crate::router::QueryRouter;
use crate::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const NO_USABLE_INPUT_TEXT: &str =
    "I could not gather enough reliable information to answer that question.";

/// Knobs the pipeline reads on every request
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub confidence_threshold: f64,
    pub voice_output_enabled: bool,
    pub retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            voice_output_enabled: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&AppConfig> for PipelineSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            voice_output_enabled: config.voice_output_enabled,
            retry: config.retry.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Branch {
    MarketData,
    Documents,
}

impl Branch {
    fn as_str(&self) -> &'static str {
        match self {
            Branch::MarketData => "market_data",
            Branch::Documents => "retrieval",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Branch::MarketData => "Market data",
            Branch::Documents => "Document search",
        }
    }
}

/// User-facing explanation of a failed branch. Never echoes upstream detail.
fn branch_notice(branch: Branch, error: &OrchestrationError) -> String {
    let reason = match error {
        OrchestrationError::NotFound(_) => "the instrument was not recognized",
        OrchestrationError::InputError(_) => {
            "no ticker or company could be identified in the question"
        }
        OrchestrationError::UpstreamUnavailable(_) | OrchestrationError::HttpError(_) => {
            "the data source is currently unavailable"
        }
        OrchestrationError::ConfigError(_) => "the data source is not configured",
        _ => "an internal error occurred",
    };
    format!("{} could not be included: {}.", branch.label(), reason)
}

/// Forward-only record of the stages a request has passed through
struct StageTracker {
    request_id: Uuid,
    stages: Vec<PipelineStage>,
}

impl StageTracker {
    fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            stages: vec![PipelineStage::Received],
        }
    }

    fn current(&self) -> PipelineStage {
        self.stages
            .last()
            .copied()
            .unwrap_or(PipelineStage::Received)
    }

    fn advance(&mut self, next: PipelineStage) -> Result<()> {
        let current = self.current();
        if next.rank() <= current.rank() {
            return Err(OrchestrationError::InvalidTransition(format!(
                "request {} cannot move from {:?} to {:?}",
                self.request_id, current, next
            )));
        }
        debug!(request_id = %self.request_id, from = ?current, to = ?next, "Stage transition");
        self.stages.push(next);
        Ok(())
    }
}

/// Outcome of the fetch and gate stages
#[derive(Default)]
struct Gathered {
    market_data: Option<MarketData>,
    retrieval: Option<RetrievalResult>,
    gate: Option<GateDecision>,
    failures: Vec<BranchFailure>,
    notices: Vec<String>,
}

impl Gathered {
    fn degraded(&self) -> bool {
        !self.failures.is_empty()
            || matches!(&self.gate, Some(g) if g.outcome == GateOutcome::Degrade)
    }

    fn has_usable_input(&self) -> bool {
        self.market_data.is_some() || self.retrieval.is_some()
    }
}

/// Coordinates the agents for a single request
pub struct Orchestrator {
    agents: AgentSet,
    settings: PipelineSettings,
    audio: Arc<AudioStore>,
    audit: Arc<AuditLog>,
}

impl Orchestrator {
    pub fn new(
        agents: AgentSet,
        settings: PipelineSettings,
        audio: Arc<AudioStore>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            agents,
            settings,
            audio,
            audit,
        }
    }

    pub fn agents(&self) -> &AgentSet {
        &self.agents
    }

    pub fn audio(&self) -> &Arc<AudioStore> {
        &self.audio
    }

    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Run the full pipeline for one request
    pub async fn handle(&self, request: Request) -> Result<Response> {
        let start_time = Instant::now();
        let request_id = request.request_id;
        let modality = request.modality();
        let mut tracker = StageTracker::new(request_id);

        info!(request_id = %request_id, modality = %modality, "Request received");

        // === NORMALIZE ===
        let query_text = match self.normalize(&request).await {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    request_id = %request_id,
                    stage = "normalize",
                    kind = e.kind(),
                    error = %e,
                    "Request rejected"
                );
                return Err(e);
            }
        };
        tracker.advance(PipelineStage::Normalized)?;

        // === ROUTE ===
        let route = QueryRouter::route(&query_text);
        tracker.advance(PipelineStage::Routed)?;
        info!(
            request_id = %request_id,
            route = %route.kind,
            instrument = route.instrument.as_deref().unwrap_or("-"),
            "Query routed"
        );

        // === FETCH + GATE ===
        tracker.advance(PipelineStage::Fetching)?;
        let mut gathered = self.gather(request_id, &route, &query_text).await;
        if gathered.gate.is_some() {
            tracker.advance(PipelineStage::Gated)?;
        }
        let degraded = gathered.degraded();

        // === ANALYZE + COMPOSE ===
        let mut text = if gathered.has_usable_input() {
            let analysis = self
                .agents
                .analysis
                .analyze(gathered.market_data.as_ref(), gathered.retrieval.as_ref())
                .await
                .map_err(|e| {
                    error!(
                        request_id = %request_id,
                        route = %route.kind,
                        stage = "analysis",
                        kind = e.kind(),
                        error = %e,
                        "Analysis failed"
                    );
                    e
                })?;
            tracker.advance(PipelineStage::Analyzed)?;
            self.agents.language.compose(&analysis).await
        } else {
            warn!(
                request_id = %request_id,
                route = %route.kind,
                stage = "analysis",
                "No usable input; skipping analysis"
            );
            NO_USABLE_INPUT_TEXT.to_string()
        };

        for notice in &gathered.notices {
            text.push_str("\n\n");
            text.push_str(notice);
        }

        tracker.advance(if degraded {
            PipelineStage::Degraded
        } else {
            PipelineStage::Responded
        })?;

        // === VOICE ===
        let wants_voice = modality == Modality::Voice
            || request.voice_output
            || self.settings.voice_output_enabled;

        let (audio_ref, audio_status) = if wants_voice {
            let audio_ref = self.schedule_voice(request_id, text.clone()).await;
            tracker.advance(PipelineStage::VoiceScheduled)?;
            (Some(audio_ref), AudioStatus::Pending)
        } else {
            (None, AudioStatus::None)
        };

        // === AUDIT ===
        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        self.audit
            .record(PipelineRecord {
                request_id,
                query_fingerprint: query_fingerprint(&query_text),
                route: route.clone(),
                gate: gathered.gate.take(),
                failures: std::mem::take(&mut gathered.failures),
                degraded,
                stages: tracker.stages.clone(),
                execution_time_ms,
                created_at: Utc::now(),
            })
            .await;

        info!(
            request_id = %request_id,
            route = %route.kind,
            degraded,
            audio = audio_ref.is_some(),
            execution_time_ms,
            "Request completed"
        );

        Ok(Response {
            request_id,
            text,
            audio_ref,
            audio_status,
            route_taken: route,
            degraded,
            notices: gathered.notices,
            stages: tracker.stages,
        })
    }

    /// Turn the raw input into non-empty query text
    async fn normalize(&self, request: &Request) -> Result<String> {
        let text = match &request.raw_input {
            RawInput::Text(text) => text.trim().to_string(),
            RawInput::Audio(audio) => {
                if audio.is_empty() {
                    return Err(OrchestrationError::InputError(
                        "empty audio payload".to_string(),
                    ));
                }
                let voice = &self.agents.voice;
                let transcript = self
                    .settings
                    .retry
                    .execute("speech_to_text", move || voice.speech_to_text(audio))
                    .await?;
                debug!(request_id = %request.request_id, transcript = %transcript, "Voice normalized");
                transcript.trim().to_string()
            }
        };

        if text.is_empty() {
            return Err(OrchestrationError::InputError("query text is empty".to_string()));
        }
        Ok(text)
    }

    /// Run the planned branches concurrently and apply the confidence gate
    async fn gather(&self, request_id: Uuid, route: &RouteDecision, query_text: &str) -> Gathered {
        let market_branch = async {
            if !route.kind.wants_market_data() {
                return None;
            }
            Some(self.fetch_market(route.instrument.as_deref()).await)
        };
        let document_branch = async {
            if !route.kind.wants_documents() {
                return None;
            }
            let retriever = &self.agents.retriever;
            Some(
                self.settings
                    .retry
                    .execute("retrieve", move || retriever.retrieve(query_text))
                    .await,
            )
        };

        let (market, documents) = tokio::join!(market_branch, document_branch);
        let mut gathered = Gathered::default();

        match market {
            None => {}
            Some(Ok(data)) => gathered.market_data = Some(data),
            Some(Err(e)) => self.record_failure(&mut gathered, request_id, route, Branch::MarketData, e),
        }

        match documents {
            None => {}
            Some(Err(e)) => self.record_failure(&mut gathered, request_id, route, Branch::Documents, e),
            Some(Ok(result)) => {
                let threshold = self.settings.confidence_threshold;
                let confidence = result.aggregate_confidence;
                let outcome = gate(&result, threshold);

                info!(
                    request_id = %request_id,
                    route = %route.kind,
                    stage = "gate",
                    confidence,
                    threshold,
                    outcome = ?outcome,
                    excerpts = result.excerpts.len(),
                    "Gate decision"
                );

                gathered.gate = Some(GateDecision {
                    confidence,
                    threshold,
                    outcome,
                });
                match outcome {
                    GateOutcome::Pass => gathered.retrieval = Some(result),
                    GateOutcome::Degrade => gathered
                        .notices
                        .push(low_confidence_notice(confidence, threshold)),
                }
            }
        }

        gathered
    }

    async fn fetch_market(&self, instrument: Option<&str>) -> Result<MarketData> {
        let instrument = instrument.ok_or_else(|| {
            OrchestrationError::InputError("no instrument could be identified".to_string())
        })?;
        let market = &self.agents.market;
        self.settings
            .retry
            .execute("fetch_market_data", move || market.fetch_market_data(instrument))
            .await
    }

    fn record_failure(
        &self,
        gathered: &mut Gathered,
        request_id: Uuid,
        route: &RouteDecision,
        branch: Branch,
        error: OrchestrationError,
    ) {
        warn!(
            request_id = %request_id,
            route = %route.kind,
            branch = branch.as_str(),
            stage = "fetching",
            kind = error.kind(),
            error = %error,
            "Branch failed"
        );
        gathered.notices.push(branch_notice(branch, &error));
        gathered.failures.push(BranchFailure {
            branch: branch.as_str().to_string(),
            stage: "fetching".to_string(),
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
    }

    /// Spawn detached synthesis and return the ref that will resolve to it
    async fn schedule_voice(&self, request_id: Uuid, text: String) -> Uuid {
        let (audio_ref, slot) = self.audio.reserve().await;
        let voice = self.agents.voice.clone();

        tokio::spawn(async move {
            let outcome = voice.text_to_speech(&text).await.map(Arc::new).map_err(|e| {
                warn!(
                    request_id = %request_id,
                    audio_ref = %audio_ref,
                    stage = "voice",
                    kind = e.kind(),
                    error = %e,
                    "Speech synthesis failed"
                );
                e.to_string()
            });

            match slot.upgrade() {
                Some(slot) => {
                    if slot.fill(outcome) {
                        debug!(request_id = %request_id, audio_ref = %audio_ref, "Audio slot filled");
                    }
                }
                None => {
                    info!(
                        request_id = %request_id,
                        audio_ref = %audio_ref,
                        "Audio discarded before synthesis finished"
                    );
                }
            }
        });

        audio_ref
    }
}
