//! REST API for the market brief orchestrator
//!
//! Queries go in through `POST /query`; synthesized speech is collected
//! later through `GET /audio/:audio_ref`.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::audio::AudioPoll;
use crate::error::OrchestrationError;
use crate::models::{Document, Modality, Request};
use crate::orchestrator::Orchestrator;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct QueryRequest {
    pub text: Option<String>,
    /// Base64-encoded audio, required for voice queries
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub modality: Modality,
    #[serde(default)]
    pub voice_output: bool,
}

impl QueryRequest {
    fn into_request(self) -> crate::Result<Request> {
        let request = match self.modality {
            Modality::Text => {
                let text = self.text.unwrap_or_default();
                if text.trim().is_empty() {
                    return Err(OrchestrationError::InputError(
                        "text is required for text queries".to_string(),
                    ));
                }
                Request::text(text)
            }
            Modality::Voice => {
                let encoded = self.audio_base64.unwrap_or_default();
                if encoded.trim().is_empty() {
                    return Err(OrchestrationError::InputError(
                        "audio_base64 is required for voice queries".to_string(),
                    ));
                }
                let audio = BASE64.decode(encoded.trim()).map_err(|e| {
                    OrchestrationError::InputError(format!("audio_base64 is not valid base64: {}", e))
                })?;
                Request::voice(audio)
            }
        };
        Ok(request.with_voice_output(self.voice_output))
    }
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Client errors carry their message; everything else is masked
fn error_reply(e: &OrchestrationError) -> (StatusCode, Json<ApiResponse>) {
    match e {
        OrchestrationError::InputError(_) => {
            (StatusCode::BAD_REQUEST, Json(ApiResponse::error(e.to_string())))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::error(
                "The request could not be processed".to_string(),
            )),
        ),
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<Orchestrator>,
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Query Endpoint
/// =============================

async fn run_query(
    State(state): State<ApiState>,
    Json(req): Json<QueryRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!(modality = %req.modality, voice_output = req.voice_output, "Received query");

    let request = match req.into_request() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected malformed query");
            return error_reply(&e);
        }
    };

    match state.orchestrator.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::success(response))),
        Err(e) => {
            if !matches!(e, OrchestrationError::InputError(_)) {
                error!(kind = e.kind(), error = %e, "Query failed");
            }
            error_reply(&e)
        }
    }
}

/// =============================
/// Audio Endpoint
/// =============================

async fn get_audio(
    State(state): State<ApiState>,
    Path(audio_ref): Path<String>,
) -> HttpResponse {
    // Malformed refs are indistinguishable from unknown ones
    let poll = match Uuid::parse_str(&audio_ref) {
        Ok(id) => state.orchestrator.audio().poll(id).await,
        Err(_) => AudioPoll::NotFound,
    };

    let status = match &poll {
        AudioPoll::Ready(clip) => {
            return (
                StatusCode::OK,
                [(header::CONTENT_TYPE, clip.content_type.clone())],
                clip.bytes.clone(),
            )
                .into_response();
        }
        AudioPoll::Pending => StatusCode::ACCEPTED,
        AudioPoll::Failed(_) => StatusCode::BAD_GATEWAY,
        AudioPoll::Discarded => StatusCode::GONE,
        AudioPoll::NotFound => StatusCode::NOT_FOUND,
    };

    let body = match &poll {
        AudioPoll::Failed(reason) => ApiResponse {
            success: false,
            data: Some(serde_json::json!({ "audio_ref": audio_ref, "status": poll.label() })),
            error: Some(format!("Speech synthesis failed: {}", reason)),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
        AudioPoll::Pending => ApiResponse::success(serde_json::json!({
            "audio_ref": audio_ref,
            "status": poll.label(),
        })),
        _ => ApiResponse {
            success: false,
            data: Some(serde_json::json!({ "audio_ref": audio_ref, "status": poll.label() })),
            error: Some(format!("Audio {}", poll.label().replace('_', " "))),
            timestamp: chrono::Utc::now().to_rfc3339(),
        },
    };

    (status, Json(body)).into_response()
}

/// =============================
/// Document Ingestion Endpoint
/// =============================

async fn ingest_documents(
    State(state): State<ApiState>,
    Json(documents): Json<Vec<Document>>,
) -> (StatusCode, Json<ApiResponse>) {
    if documents.iter().any(|d| d.text.trim().is_empty()) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiResponse::error("documents must have non-empty text".into())),
        );
    }

    let count = documents.len();
    match state.orchestrator.agents().retriever.ingest(documents).await {
        Ok(passages) => {
            info!(documents = count, passages, "Documents ingested");
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "documents": count,
                    "passages": passages,
                }))),
            )
        }
        Err(e) => {
            warn!(kind = e.kind(), error = %e, "Document ingestion failed");
            error_reply(&e)
        }
    }
}

/// =============================
/// Gate Audit Endpoint
/// =============================

async fn gate_stats(State(state): State<ApiState>) -> Json<ApiResponse> {
    let stats = state.orchestrator.audit().gate_stats().await;
    Json(ApiResponse::success(stats))
}

/// =============================
/// Router
/// =============================

pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    let state = ApiState { orchestrator };

    Router::new()
        .route("/health", get(health))
        .route("/query", post(run_query))
        .route("/audio/:audio_ref", get(get_audio))
        .route("/documents", post(ingest_documents))
        .route("/audit/gates", get(gate_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    orchestrator: Arc<Orchestrator>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(orchestrator);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::{MarketBehavior, MockAgents, MockMarket, MockRetriever, MockVoice};
    use crate::agents::InMemoryRetriever;
    use crate::audio::AudioStore;
    use crate::audit::AuditLog;
    use crate::orchestrator::PipelineSettings;
    use crate::retry::RetryPolicy;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn orchestrator_with(mocks: &MockAgents) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            mocks.agent_set(),
            PipelineSettings {
                confidence_threshold: 0.5,
                retry: RetryPolicy::fast(),
                ..PipelineSettings::default()
            },
            Arc::new(AudioStore::default()),
            Arc::new(AuditLog::new()),
        ))
    }

    fn default_mocks() -> MockAgents {
        MockAgents::new(
            MockVoice::hearing("What is AAPL's P/E ratio?"),
            MockMarket::new(MarketBehavior::Quote),
            MockRetriever::with_confidence(0.2),
        )
    }

    fn post_json(uri: &str, body: Value) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: HttpResponse) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(orchestrator_with(&default_mocks()));
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_text_query() {
        let app = create_router(orchestrator_with(&default_mocks()));
        let response = app
            .oneshot(post_json("/query", json!({ "text": "What is AAPL's P/E ratio?" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["data"]["route_taken"]["kind"], json!("market_data"));
        assert_eq!(body["data"]["degraded"], json!(false));
        assert_eq!(body["data"]["audio_status"], json!("none"));
        assert!(body["data"].get("audio_ref").is_none());
    }

    #[tokio::test]
    async fn test_degraded_query_is_still_ok() {
        let app = create_router(orchestrator_with(&default_mocks()));
        let response = app
            .oneshot(post_json(
                "/query",
                json!({ "text": "Summarize risk factors in the latest 10-K" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["degraded"], json!(true));
        assert!(body["data"]["text"].as_str().unwrap().contains("Low-confidence"));
    }

    #[tokio::test]
    async fn test_input_errors_are_bad_requests() {
        let app = create_router(orchestrator_with(&default_mocks()));

        let empty = app
            .clone()
            .oneshot(post_json("/query", json!({ "text": "  " })))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);

        let bad_audio = app
            .oneshot(post_json(
                "/query",
                json!({ "modality": "voice", "audio_base64": "not base64!!" }),
            ))
            .await
            .unwrap();
        assert_eq!(bad_audio.status(), StatusCode::BAD_REQUEST);
        let body = json_body(bad_audio).await;
        assert_eq!(body["success"], json!(false));
    }

    #[tokio::test]
    async fn test_unintelligible_voice_is_bad_request() {
        let mocks = MockAgents::new(
            MockVoice::unintelligible(),
            MockMarket::new(MarketBehavior::Quote),
            MockRetriever::with_confidence(0.9),
        );
        let app = create_router(orchestrator_with(&mocks));

        let response = app
            .oneshot(post_json(
                "/query",
                json!({ "modality": "voice", "audio_base64": BASE64.encode([1u8, 2, 3]) }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_voice_query_then_poll_audio() {
        let app = create_router(orchestrator_with(&default_mocks()));

        let response = app
            .clone()
            .oneshot(post_json(
                "/query",
                json!({ "modality": "voice", "audio_base64": BASE64.encode(b"RIFF") }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["audio_status"], json!("pending"));
        let audio_ref = body["data"]["audio_ref"].as_str().unwrap().to_string();

        let mut status = StatusCode::ACCEPTED;
        for _ in 0..200 {
            let poll = app
                .clone()
                .oneshot(get_request(&format!("/audio/{}", audio_ref)))
                .await
                .unwrap();
            status = poll.status();
            if status != StatusCode::ACCEPTED {
                assert_eq!(poll.headers()[header::CONTENT_TYPE], "audio/wav");
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_audio_status_codes() {
        let orchestrator = orchestrator_with(&default_mocks());
        let app = create_router(orchestrator.clone());

        let (pending_ref, _slot) = orchestrator.audio().reserve().await;
        let pending = app
            .clone()
            .oneshot(get_request(&format!("/audio/{}", pending_ref)))
            .await
            .unwrap();
        assert_eq!(pending.status(), StatusCode::ACCEPTED);

        let (failed_ref, slot) = orchestrator.audio().reserve().await;
        if let Some(slot) = slot.upgrade() {
            slot.fill(Err("voice model crashed".into()));
        }
        let failed = app
            .clone()
            .oneshot(get_request(&format!("/audio/{}", failed_ref)))
            .await
            .unwrap();
        assert_eq!(failed.status(), StatusCode::BAD_GATEWAY);

        orchestrator.audio().discard(pending_ref).await;
        let discarded = app
            .clone()
            .oneshot(get_request(&format!("/audio/{}", pending_ref)))
            .await
            .unwrap();
        assert_eq!(discarded.status(), StatusCode::GONE);

        let unknown = app
            .clone()
            .oneshot(get_request(&format!("/audio/{}", Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let malformed = app.oneshot(get_request("/audio/not-a-ref")).await.unwrap();
        assert_eq!(malformed.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_document_ingestion() {
        let mocks = default_mocks();
        let mut agents = mocks.agent_set();
        agents.retriever = Arc::new(InMemoryRetriever::new(5));
        let orchestrator = Arc::new(Orchestrator::new(
            agents,
            PipelineSettings::default(),
            Arc::new(AudioStore::default()),
            Arc::new(AuditLog::new()),
        ));
        let app = create_router(orchestrator);

        let response = app
            .clone()
            .oneshot(post_json(
                "/documents",
                json!([{
                    "source_id": "10k-2023",
                    "text": "Risk factors include supply chain concentration.\n\nRevenue grew in services."
                }]),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["documents"], json!(1));
        assert_eq!(body["data"]["passages"], json!(2));

        let empty = app
            .oneshot(post_json("/documents", json!([{ "source_id": "x", "text": " " }])))
            .await
            .unwrap();
        assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_read_only_retriever_rejects_documents() {
        let app = create_router(orchestrator_with(&default_mocks()));
        let response = app
            .oneshot(post_json("/documents", json!([{ "source_id": "a", "text": "b" }])))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_gate_stats_endpoint() {
        let app = create_router(orchestrator_with(&default_mocks()));

        app.clone()
            .oneshot(post_json(
                "/query",
                json!({ "text": "Summarize risk factors in the latest 10-K" }),
            ))
            .await
            .unwrap();

        let response = app.oneshot(get_request("/audit/gates")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["data"]["degrades"], json!(1));
        assert_eq!(body["data"]["passes"], json!(0));
    }
}
