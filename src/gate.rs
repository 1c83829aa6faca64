//! Confidence gate for retrieval results
//!
//! Deterministic check run before retrieved text may feed analysis.

use crate::models::RetrievalResult;
use serde::{Deserialize, Serialize};

/// Default threshold. Favors precision: weak retrieval is dropped rather
/// than summarized.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateOutcome {
    Pass,
    Degrade,
}

/// Pass iff `aggregate_confidence >= threshold`. NaN never passes.
pub fn gate(result: &RetrievalResult, threshold: f64) -> GateOutcome {
    if result.aggregate_confidence >= threshold {
        GateOutcome::Pass
    } else {
        GateOutcome::Degrade
    }
}

/// User-facing notice attached to a degraded response
pub fn low_confidence_notice(confidence: f64, threshold: f64) -> String {
    format!(
        "Low-confidence retrieval: the documents found matched the question with confidence {:.2}, below the required {:.2}, so they were not used for analysis.",
        confidence, threshold
    )
}
