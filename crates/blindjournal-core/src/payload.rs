//! Plaintext journal payload schema
//!
//! [`JournalPayload`] is the strongly-typed record an agent seals into an
//! envelope: a fixed set of required fields plus an open metadata map.
//! It exists only client-side in memory and is never persisted
//! unencrypted.
//!
//! Serialization must be canonical: two semantically-equal payloads have
//! to produce identical bytes, because the content commitment (and with
//! it relay-side deduplication) is a hash over those bytes. postcard is
//! deterministic for a given value, and the metadata map is a `BTreeMap`
//! so key order can never vary.

use crate::error::{SealError, SealResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A plaintext journal entry before sealing.
///
/// ## Example
///
/// ```
/// use blindjournal_core::JournalPayload;
///
/// let payload = JournalPayload::new("message_sent", "bob", "hi")
///     .with_metadata("channel", "general");
/// assert_eq!(payload.action, "message_sent");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalPayload {
    /// What the agent did (e.g. "message_sent", "task_completed")
    pub action: String,

    /// Who or what the action was directed at
    pub target_id: String,

    /// Short human-readable summary of the activity
    pub summary: String,

    /// Open extension map; BTreeMap keeps the canonical encoding stable
    pub metadata: BTreeMap<String, String>,

    /// When the activity happened (author's clock)
    pub timestamp: DateTime<Utc>,
}

impl JournalPayload {
    /// Create a payload with the current timestamp and empty metadata.
    pub fn new(
        action: impl Into<String>,
        target_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            target_id: target_id.into(),
            summary: summary.into(),
            metadata: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Add a metadata key/value pair (builder style).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set an explicit timestamp (builder style).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Validate the payload at the serialization boundary.
    ///
    /// # Errors
    ///
    /// Returns `SealError::Format` if the required fields are empty.
    pub fn validate(&self) -> SealResult<()> {
        if self.action.trim().is_empty() {
            return Err(SealError::Format("Payload action cannot be empty".to_string()));
        }
        if self.target_id.trim().is_empty() {
            return Err(SealError::Format(
                "Payload target_id cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Serialize to the canonical byte encoding (postcard).
    ///
    /// Validation runs first so no malformed payload ever gets committed
    /// or encrypted.
    pub fn encode(&self) -> SealResult<Vec<u8>> {
        self.validate()?;
        postcard::to_allocvec(self)
            .map_err(|e| SealError::Serialization(format!("Failed to encode payload: {}", e)))
    }

    /// Deserialize from the canonical byte encoding.
    pub fn decode(bytes: &[u8]) -> SealResult<Self> {
        postcard::from_bytes(bytes)
            .map_err(|e| SealError::Serialization(format!("Failed to decode payload: {}", e)))
    }

    /// Compute the content commitment: a BLAKE3 hash of the canonical
    /// plaintext encoding.
    ///
    /// Computed before encryption, so the relay can deduplicate
    /// content-addressed entries without ever decrypting them. The same
    /// payload always yields the same commitment.
    pub fn commitment(&self) -> SealResult<[u8; 32]> {
        let bytes = self.encode()?;
        Ok(*blake3::hash(&bytes).as_bytes())
    }
}
