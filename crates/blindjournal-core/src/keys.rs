//! Deterministic agent key derivation
//!
//! All of an agent's key material is derived from its [`MasterSecret`]
//! with HKDF-SHA256, using the agent identifier as the derivation context.
//! Nothing here is ever persisted: re-deriving with the same
//! `(secret, agent_id)` always yields bit-identical keys, which is what
//! makes key recovery possible without any private-key storage.
//!
//! ## Key Types
//!
//! | Key | Purpose | Algorithm |
//! |-----|---------|-----------|
//! | Signing | Envelope signatures | Ed25519 |
//! | Exchange | Access-policy key wrapping | X25519 |
//! | Encryption root | Per-entry payload keys | HKDF-SHA256 chain |
//!
//! Only the Ed25519 verifying key and the X25519 public key are ever
//! safe to publish.

use crate::error::SealError;
use crate::secret::MasterSecret;
use ed25519_dalek::{SigningKey, VerifyingKey};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use x25519_dalek::{PublicKey as ExchangePublicKey, StaticSecret as ExchangeSecret};

/// Domain separation prefix for all HKDF info strings in this module
const HKDF_INFO: &[u8] = b"blindjournal-keys-v1";

/// Opaque agent identity string.
///
/// Chosen by the agent (or the surrounding registration system) and used
/// as HKDF context, so two agents sharing one master secret store never
/// derive colliding keys. The relay sees this value in the clear on every
/// envelope; it carries no key material.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create an agent id, rejecting empty or whitespace-only input.
    pub fn new(id: impl Into<String>) -> Result<Self, SealError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SealError::Format("Agent id cannot be empty".to_string()));
        }
        Ok(Self(id))
    }

    /// Get the agent id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the raw bytes used as derivation context
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AgentId {
    type Err = SealError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The full derived key set for one agent identity.
///
/// Recomputable at any time from `(MasterSecret, AgentId)`; never stored.
/// Holds private material, so Debug output is redacted and no serde
/// support is provided.
pub struct AgentKeys {
    agent_id: AgentId,
    signing: SigningKey,
    exchange: ExchangeSecret,
    encryption_root: [u8; 32],
}

impl AgentKeys {
    /// Derive the key set for an agent.
    ///
    /// Deterministic: calling twice with the same inputs yields identical
    /// keys. Each key gets its own HKDF info string so the signing seed,
    /// exchange secret, and encryption root are mutually independent.
    pub fn derive(secret: &MasterSecret, agent_id: &AgentId) -> Self {
        let signing_seed = expand_key(secret.as_bytes(), b"signing", agent_id.as_bytes());
        let exchange_seed = expand_key(secret.as_bytes(), b"exchange", agent_id.as_bytes());
        let encryption_root = expand_key(secret.as_bytes(), b"encryption-root", agent_id.as_bytes());

        Self {
            agent_id: agent_id.clone(),
            signing: SigningKey::from_bytes(&signing_seed),
            exchange: ExchangeSecret::from(exchange_seed),
            encryption_root,
        }
    }

    /// Get the agent id these keys belong to
    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Get the Ed25519 verifying key: the only signing material ever
    /// safe to publish (e.g. registered with the relay for identity
    /// binding).
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing.verifying_key()
    }

    /// Get the X25519 public key grantors use to wrap entry keys for
    /// this agent.
    pub fn exchange_public_key(&self) -> ExchangePublicKey {
        ExchangePublicKey::from(&self.exchange)
    }

    /// Export the verifying key as lowercase hex
    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.verifying_key().as_bytes())
    }

    /// Get the Ed25519 signing key (private)
    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    /// Get the X25519 static secret (private)
    pub(crate) fn exchange_secret(&self) -> &ExchangeSecret {
        &self.exchange
    }

    /// Get the symmetric encryption root key (private)
    pub(crate) fn encryption_root(&self) -> &[u8; 32] {
        &self.encryption_root
    }
}

impl fmt::Debug for AgentKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentKeys")
            .field("agent_id", &self.agent_id)
            .field("verifying_key", &self.verifying_key_hex())
            .finish_non_exhaustive()
    }
}

/// Parse a hex-encoded Ed25519 verifying key.
///
/// # Errors
///
/// Returns `SealError::Format` on malformed hex, wrong length, or a
/// point that is not on the curve.
pub fn verifying_key_from_hex(s: &str) -> Result<VerifyingKey, SealError> {
    let bytes = hex::decode(s.trim())
        .map_err(|e| SealError::Format(format!("Invalid hex in verifying key: {}", e)))?;
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SealError::Format("Verifying key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&arr)
        .map_err(|e| SealError::Format(format!("Invalid Ed25519 verifying key: {}", e)))
}

/// Expand one labeled 32-byte key from the master secret with HKDF-SHA256.
///
/// The info string is `HKDF_INFO || label || agent_id`, keeping every
/// derived key domain-separated per agent.
fn expand_key(ikm: &[u8], label: &[u8], context: &[u8]) -> [u8; 32] {
    let mut info = Vec::with_capacity(HKDF_INFO.len() + 1 + label.len() + context.len());
    info.extend_from_slice(HKDF_INFO);
    info.push(b'/');
    info.extend_from_slice(label);
    info.extend_from_slice(context);

    let hkdf = Hkdf::<Sha256>::new(None, ikm);
    let mut output = [0u8; 32];
    hkdf.expand(&info, &mut output)
        .expect("HKDF expand should never fail with 32-byte output");
    output
}
