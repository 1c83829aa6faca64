//! Market Brief Orchestrator
//!
//! A multi-agent financial assistant that:
//! - Accepts text or voice queries
//! - Routes each query to market data, filing retrieval, or both
//! - Gates weak retrieval on a confidence threshold instead of summarizing it
//! - Composes a concise market brief from deterministic analysis
//! - Synthesizes speech in the background behind a pollable audio ref
//!
//! PIPELINE:
//! NORMALIZE → ROUTE → FETCH → GATE → ANALYZE → COMPOSE → (VOICE)

pub mod agents;
pub mod api;
pub mod audio;
pub mod audit;
pub mod config;
pub mod error;
pub mod gate;
pub mod gemini;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod router;

pub use error::Result;

// Re-export common types
pub use config::AppConfig;
pub use models::*;
pub use orchestrator::{Orchestrator, PipelineSettings};
pub use router::QueryRouter;
