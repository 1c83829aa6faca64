//! Audit trail of routing and gate decisions
//!
//! Kept in memory to support tuning of the confidence threshold.
//! Identical queries share a fingerprint so repeat runs can be compared.

use crate::gate::GateOutcome;
use crate::models::{PipelineStage, RouteDecision};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Oldest records are evicted past this count
const MAX_RECORDS: usize = 10_000;
/// Confidences reported by `gate_stats`
const RECENT_CONFIDENCES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub confidence: f64,
    pub threshold: f64,
    pub outcome: GateOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchFailure {
    pub branch: String,
    pub stage: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub request_id: Uuid,
    pub query_fingerprint: String,
    pub route: RouteDecision,
    pub gate: Option<GateDecision>,
    pub failures: Vec<BranchFailure>,
    pub degraded: bool,
    pub stages: Vec<PipelineStage>,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GateStats {
    pub passes: usize,
    pub degrades: usize,
    /// Most recent first
    pub recent_confidences: Vec<f64>,
}

pub struct AuditLog {
    records: RwLock<AuditRecords>,
}

#[derive(Default)]
struct AuditRecords {
    by_id: HashMap<Uuid, PipelineRecord>,
    order: VecDeque<Uuid>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(AuditRecords::default()),
        }
    }

    pub async fn record(&self, record: PipelineRecord) -> Uuid {
        let request_id = record.request_id;
        let mut records = self.records.write().await;

        if records.by_id.insert(request_id, record).is_none() {
            records.order.push_back(request_id);
        }

        while records.order.len() > MAX_RECORDS {
            if let Some(oldest) = records.order.pop_front() {
                records.by_id.remove(&oldest);
            }
        }

        request_id
    }

    pub async fn get(&self, request_id: Uuid) -> Option<PipelineRecord> {
        self.records.read().await.by_id.get(&request_id).cloned()
    }

    /// Request ids that carried the same normalized query, oldest first
    pub async fn with_fingerprint(&self, fingerprint: &str) -> Vec<Uuid> {
        let records = self.records.read().await;
        records
            .order
            .iter()
            .filter(|id| {
                records
                    .by_id
                    .get(*id)
                    .map(|r| r.query_fingerprint == fingerprint)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub async fn gate_stats(&self) -> GateStats {
        let records = self.records.read().await;
        let mut stats = GateStats::default();

        for id in records.order.iter().rev() {
            let Some(gate) = records.by_id.get(id).and_then(|r| r.gate.as_ref()) else {
                continue;
            };
            match gate.outcome {
                GateOutcome::Pass => stats.passes += 1,
                GateOutcome::Degrade => stats.degrades += 1,
            }
            if stats.recent_confidences.len() < RECENT_CONFIDENCES {
                stats.recent_confidences.push(gate.confidence);
            }
        }

        stats
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// SHA256 of the whitespace-normalized query. Case is kept: tickers route
/// by case, so equal fingerprints must imply equal routes.
pub fn query_fingerprint(query_text: &str) -> String {
    let normalized = query_text.split_whitespace().collect::<Vec<_>>().join(" ");

    hex::encode(Sha256::digest(normalized.as_bytes()))
}
