//! Detached voice synthesis results
//!
//! Each scheduled synthesis owns a write-once slot. The store holds the only
//! strong reference; the background task holds a `Weak`, so a slot that was
//! discarded before the task finished simply drops the result.

use crate::models::AudioClip;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_AUDIO_RETENTION: Duration = Duration::from_secs(600);

type SlotOutcome = std::result::Result<Arc<AudioClip>, String>;

/// Result slot written exactly once by the synthesis task
pub struct AudioSlot {
    outcome: OnceLock<SlotOutcome>,
}

impl AudioSlot {
    fn new() -> Self {
        Self {
            outcome: OnceLock::new(),
        }
    }

    /// Returns false if the slot was already filled
    pub fn fill(&self, outcome: SlotOutcome) -> bool {
        self.outcome.set(outcome).is_ok()
    }
}

/// What a poll for an audio ref observes
#[derive(Debug, Clone)]
pub enum AudioPoll {
    Pending,
    Ready(Arc<AudioClip>),
    Failed(String),
    /// Expired or explicitly dropped before anyone collected it
    Discarded,
    NotFound,
}

impl AudioPoll {
    pub fn label(&self) -> &'static str {
        match self {
            AudioPoll::Pending => "pending",
            AudioPoll::Ready(_) => "ready",
            AudioPoll::Failed(_) => "failed",
            AudioPoll::Discarded => "discarded",
            AudioPoll::NotFound => "not_found",
        }
    }
}

enum AudioEntry {
    Live { slot: Arc<AudioSlot>, created_at: Instant },
    Discarded { since: Instant },
}

pub struct AudioStore {
    entries: RwLock<HashMap<Uuid, AudioEntry>>,
    retention: Duration,
}

impl AudioStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Allocate a slot; the returned `Weak` goes to the synthesis task
    pub async fn reserve(&self) -> (Uuid, Weak<AudioSlot>) {
        let audio_ref = Uuid::new_v4();
        let slot = Arc::new(AudioSlot::new());
        let weak = Arc::downgrade(&slot);

        let mut entries = self.entries.write().await;
        entries.insert(
            audio_ref,
            AudioEntry::Live {
                slot,
                created_at: Instant::now(),
            },
        );

        (audio_ref, weak)
    }

    pub async fn poll(&self, audio_ref: Uuid) -> AudioPoll {
        let entries = self.entries.read().await;

        match entries.get(&audio_ref) {
            None => AudioPoll::NotFound,
            Some(AudioEntry::Discarded { .. }) => AudioPoll::Discarded,
            Some(AudioEntry::Live { slot, .. }) => match slot.outcome.get() {
                None => AudioPoll::Pending,
                Some(Ok(clip)) => AudioPoll::Ready(clip.clone()),
                Some(Err(reason)) => AudioPoll::Failed(reason.clone()),
            },
        }
    }

    /// Drop a slot. Later polls report `Discarded`; an in-flight task's
    /// result is thrown away. Returns false for unknown refs.
    pub async fn discard(&self, audio_ref: Uuid) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&audio_ref) {
            Some(entry) => {
                *entry = AudioEntry::Discarded {
                    since: Instant::now(),
                };
                true
            }
            None => false,
        }
    }

    /// Expire live slots older than the retention window and forget
    /// tombstones older than another window. Returns slots expired.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut expired = 0;

        entries.retain(|_, entry| match entry {
            AudioEntry::Discarded { since } => now.duration_since(*since) < self.retention,
            AudioEntry::Live { .. } => true,
        });

        for entry in entries.values_mut() {
            if let AudioEntry::Live { created_at, .. } = entry {
                if now.duration_since(*created_at) >= self.retention {
                    *entry = AudioEntry::Discarded { since: now };
                    expired += 1;
                }
            }
        }

        if expired > 0 {
            info!(expired, remaining = entries.len(), "Expired synthesized audio");
        } else {
            debug!(remaining = entries.len(), "Audio purge found nothing to expire");
        }

        expired
    }
}

impl Default for AudioStore {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_RETENTION)
    }
}
