//! Payload encryption with XChaCha20-Poly1305
//!
//! Each entry gets its own symmetric key, HKDF-derived from the agent's
//! encryption root key and the entry's chain position. Compromise of one
//! entry key therefore never exposes another entry, yet no per-entry key
//! is ever stored anywhere.
//!
//! ## Nonce discipline
//!
//! Nonces are 24 bytes and DERIVED from `(agent_id, sequence_number)`,
//! never drawn at random. Because the entry key is itself unique per
//! sequence number, nonce reuse under one key is structurally
//! impossible, including across process restarts and key re-derivation.

use crate::error::{SealError, SealResult};
use crate::keys::AgentId;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use sha2::Sha256;

/// Nonce size for XChaCha20-Poly1305 (24 bytes)
pub const NONCE_SIZE: usize = 24;

/// Domain separation string for entry key derivation
const ENTRY_KEY_INFO: &[u8] = b"blindjournal-entry-key-v1";

/// Domain separation string for nonce derivation
const NONCE_CONTEXT: &str = "blindjournal-entry-nonce-v1";

/// A per-entry symmetric key.
///
/// Wraps the raw 32 bytes so key material moves through the access
/// policy and cipher layers as one opaque unit. Debug output is
/// redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct EntryKey([u8; 32]);

impl EntryKey {
    /// Derive the symmetric key for one entry.
    ///
    /// HKDF-SHA256 over the agent's encryption root key, with the agent
    /// id and sequence number in the info string.
    pub fn derive(encryption_root: &[u8; 32], agent_id: &AgentId, sequence: u64) -> Self {
        let mut info =
            Vec::with_capacity(ENTRY_KEY_INFO.len() + agent_id.as_bytes().len() + 8);
        info.extend_from_slice(ENTRY_KEY_INFO);
        info.extend_from_slice(agent_id.as_bytes());
        info.extend_from_slice(&sequence.to_le_bytes());

        let hkdf = Hkdf::<Sha256>::new(None, encryption_root);
        let mut key = [0u8; 32];
        hkdf.expand(&info, &mut key)
            .expect("HKDF expand should never fail with 32-byte output");
        Self(key)
    }

    /// Wrap raw key bytes recovered from an access policy.
    pub(crate) fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes.
    pub(crate) fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EntryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EntryKey(..)")
    }
}

/// Derive the 24-byte nonce for one entry position.
///
/// `blake3::derive_key` over `agent_id || sequence_le`, truncated to the
/// XChaCha20 nonce width.
pub fn derive_entry_nonce(agent_id: &AgentId, sequence: u64) -> [u8; NONCE_SIZE] {
    let mut input = Vec::with_capacity(agent_id.as_bytes().len() + 8);
    input.extend_from_slice(agent_id.as_bytes());
    input.extend_from_slice(&sequence.to_le_bytes());

    let digest = blake3::derive_key(NONCE_CONTEXT, &input);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&digest[..NONCE_SIZE]);
    nonce
}

/// Encrypt a canonical payload encoding under an entry key.
///
/// The nonce is supplied by the caller (derived via
/// [`derive_entry_nonce`]) and is NOT prepended to the ciphertext; the
/// envelope carries it as a separate field.
///
/// # Errors
///
/// Returns `SealError::Encryption` if the cipher fails.
pub fn encrypt_payload(
    plaintext: &[u8],
    key: &EntryKey,
    nonce: &[u8; NONCE_SIZE],
) -> SealResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .encrypt(XNonce::from_slice(nonce), plaintext)
        .map_err(|e| SealError::Encryption(format!("{}", e)))
}

/// Decrypt an entry's ciphertext.
///
/// # Errors
///
/// Returns `SealError::Authentication` if the Poly1305 tag does not
/// verify (wrong key, corrupted ciphertext, or tampering). No partial
/// plaintext is ever returned.
pub fn decrypt_payload(
    ciphertext: &[u8],
    key: &EntryKey,
    nonce: &[u8; NONCE_SIZE],
) -> SealResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|e| SealError::Authentication(format!("{}", e)))
}
