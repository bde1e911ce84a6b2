//! Entry model - one submitted resonance record.

use crate::error::{StoreError, StoreResult};
use crate::score::ScoreEngine;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// An entry before any store has accepted it: no id, no timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDraft {
    /// Intent / projection text
    pub x: String,

    /// Tone / reception label
    pub y: String,

    /// Resolution text from the score engine
    pub z: String,

    /// Coherence score, 0..=100
    pub score: u8,
}

impl EntryDraft {
    /// Score an intent/tone pair into a draft.
    pub fn compute(intent: &str, tone: &str) -> Self {
        let response = ScoreEngine::compute_response(intent, tone);
        Self {
            x: intent.to_string(),
            y: tone.to_string(),
            z: response.text.to_string(),
            score: response.score,
        }
    }

    /// Check the payload rules shared by every store. Field length is not
    /// limited here; a node may bound it on its own wire.
    pub fn validate(&self) -> StoreResult<()> {
        if self.x.trim().is_empty() {
            return Err(StoreError::Rejected("intent is empty".into()));
        }
        if self.score > 100 {
            return Err(StoreError::Rejected(format!(
                "score {} outside 0..=100",
                self.score
            )));
        }
        Ok(())
    }
}

/// An accepted entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Assigned by a durable store; absent for local-only entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub x: String,
    pub y: String,
    pub z: String,
    pub score: u8,

    /// Milliseconds since the Unix epoch, set at acceptance
    pub timestamp: u64,
}

impl Entry {
    /// Accept a draft with the given identity and acceptance time.
    pub fn accept(draft: EntryDraft, id: Option<String>, timestamp: u64) -> Self {
        Self {
            id,
            x: draft.x,
            y: draft.y,
            z: draft.z,
            score: draft.score,
            timestamp,
        }
    }

    /// Whether two entries describe the same record.
    ///
    /// Ids decide when both sides have one; otherwise every field but the
    /// id must match.
    pub fn same_record(&self, other: &Entry) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a == b,
            _ => {
                self.timestamp == other.timestamp
                    && self.score == other.score
                    && self.x == other.x
                    && self.y == other.y
                    && self.z == other.z
            }
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
