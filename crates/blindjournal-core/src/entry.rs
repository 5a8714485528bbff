//! The sealed envelope carried by the relay
//!
//! [`SecureEntry`] is the wire/storage representation of one journal
//! entry. The relay sees exactly this: an opaque ciphertext, the hashes
//! and signature that let it order/deduplicate/authenticate, and the
//! small set of attributes the author chose to disclose for indexing.
//! It is immutable once sealed; mutating any field invalidates the
//! signature and chain verification.
//!
//! ## Wire Format
//!
//! Envelopes serialize with postcard. The signature covers the
//! canonical byte encoding produced by [`SecureEntry::signed_data`]:
//!
//! ```text
//! version || id || agent_id || sequence_le || commitment || chain_link
//!         || nonce || ciphertext || disclosed_attributes || access_policy
//! ```
//!
//! with every variable-length field length-prefixed (u32 LE), so the
//! encoding is injective and deterministic.

use crate::cipher::NONCE_SIZE;
use crate::error::{SealError, SealResult};
use crate::keys::AgentId;
use crate::policy::AccessPolicy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

/// Current envelope protocol version
pub const ENVELOPE_VERSION: u8 = 1;

/// Ed25519 signature length in bytes
pub const SIGNATURE_SIZE: usize = 64;

/// Author-assigned unique entry identifier.
///
/// ULIDs sort lexicographically by creation time, which gives relays a
/// cheap secondary ordering without revealing payload content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(pub Ulid);

impl EntryId {
    /// Create a new EntryId with the current timestamp
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse from the canonical ULID string form
    pub fn parse(s: &str) -> SealResult<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| SealError::Format(format!("Invalid entry id: {}", e)))
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Plaintext attributes the author deliberately discloses for
/// relay-side indexing (e.g. target type). Everything else about the
/// payload stays inside the ciphertext.
pub type DisclosedAttributes = BTreeMap<String, String>;

/// A sealed, chain-linked, signed journal entry.
///
/// Exactly one `SecureEntry` may exist per `(agent_id, sequence_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureEntry {
    /// Protocol version for forward compatibility
    pub version: u8,

    /// Author-assigned unique identifier
    pub id: EntryId,

    /// Author identity
    pub agent_id: AgentId,

    /// Monotonically increasing per-agent position (starts at 1)
    pub sequence_number: u64,

    /// BLAKE3 hash of the canonical plaintext payload, computed before
    /// encryption (content-addressed dedup without decryption)
    pub content_commitment: [u8; 32],

    /// Hash binding this entry to its predecessor
    pub chain_link: [u8; 32],

    /// XChaCha20-Poly1305 nonce (derived, see `cipher`)
    pub nonce: [u8; NONCE_SIZE],

    /// Encrypted payload (canonical encoding, then AEAD)
    pub ciphertext: Vec<u8>,

    /// Ed25519 signature over `signed_data()` (64 bytes)
    pub signature: Vec<u8>,

    /// Deliberately disclosed plaintext attributes
    pub disclosed_attributes: DisclosedAttributes,

    /// Per-grantee wrapped entry keys
    pub access_policy: AccessPolicy,
}

impl SecureEntry {
    /// Canonical byte encoding of every envelope field except the
    /// signature itself.
    ///
    /// Deterministic and injective: each variable-length field is
    /// length-prefixed with u32 LE, map entries are emitted in BTreeMap
    /// order, and fixed-width fields are emitted raw.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut data = Vec::new();

        // Version (1 byte)
        data.push(self.version);

        // Entry id (16 bytes, fixed)
        data.extend_from_slice(&self.id.0.to_bytes());

        // Agent id (length-prefixed)
        push_prefixed(&mut data, self.agent_id.as_bytes());

        // Sequence number (8 bytes LE)
        data.extend_from_slice(&self.sequence_number.to_le_bytes());

        // Commitment and chain link (32 bytes each, fixed)
        data.extend_from_slice(&self.content_commitment);
        data.extend_from_slice(&self.chain_link);

        // Nonce (24 bytes, fixed)
        data.extend_from_slice(&self.nonce);

        // Ciphertext (length-prefixed)
        push_prefixed(&mut data, &self.ciphertext);

        // Disclosed attributes (count, then ordered key/value pairs)
        data.extend_from_slice(&(self.disclosed_attributes.len() as u32).to_le_bytes());
        for (key, value) in &self.disclosed_attributes {
            push_prefixed(&mut data, key.as_bytes());
            push_prefixed(&mut data, value.as_bytes());
        }

        // Access policy (count, then each grant's fields)
        data.extend_from_slice(&(self.access_policy.grants.len() as u32).to_le_bytes());
        for grant in &self.access_policy.grants {
            data.extend_from_slice(&grant.grantee_id_hash);
            data.extend_from_slice(&grant.ephemeral_public_key);
            data.extend_from_slice(&grant.nonce);
            push_prefixed(&mut data, &grant.wrapped_key);
        }

        data
    }

    /// Encode the envelope to bytes for transmission or storage.
    pub fn to_bytes(&self) -> SealResult<Vec<u8>> {
        postcard::to_allocvec(self)
            .map_err(|e| SealError::Serialization(format!("Failed to encode entry: {}", e)))
    }

    /// Decode an envelope from bytes.
    ///
    /// # Errors
    ///
    /// - `SealError::Serialization` if deserialization fails
    /// - `SealError::VersionUnsupported` for unknown protocol versions
    /// - `SealError::Format` if the signature field has the wrong length
    pub fn from_bytes(bytes: &[u8]) -> SealResult<Self> {
        let entry: Self = postcard::from_bytes(bytes)
            .map_err(|e| SealError::Serialization(format!("Failed to decode entry: {}", e)))?;
        if entry.version != ENVELOPE_VERSION {
            return Err(SealError::VersionUnsupported(entry.version));
        }
        if entry.signature.len() != SIGNATURE_SIZE {
            return Err(SealError::Format(format!(
                "Signature must be {} bytes, got {}",
                SIGNATURE_SIZE,
                entry.signature.len()
            )));
        }
        Ok(entry)
    }

    /// Return only the disclosed (unencrypted) attribute subset.
    ///
    /// This is the entirety of what a relay may index; it never touches
    /// ciphertext or key material.
    pub fn disclosed(&self) -> &DisclosedAttributes {
        &self.disclosed_attributes
    }
}

fn push_prefixed(data: &mut Vec<u8>, bytes: &[u8]) {
    data.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(bytes);
}
