//! Envelope signing and verification
//!
//! The signature covers the canonical encoding of every envelope field
//! except the signature itself ([`SecureEntry::signed_data`]), so a
//! relay (or any third party) can neither forge an entry nor silently
//! alter one after sealing.

use crate::entry::{SecureEntry, SIGNATURE_SIZE};
use crate::error::{SealError, SealResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Sign the entry's canonical byte encoding.
///
/// Returns the 64-byte Ed25519 signature; the entry's own `signature`
/// field is ignored by the canonical encoding, so sealing can sign an
/// envelope holding a placeholder.
pub fn sign_entry(entry: &SecureEntry, signing_key: &SigningKey) -> Vec<u8> {
    signing_key.sign(&entry.signed_data()).to_vec()
}

/// Verify the entry's signature against the author's public key.
///
/// Returns `false` for a malformed or non-verifying signature rather
/// than erroring, so callers can fold the outcome into a structured
/// verification result. dalek's verification is constant-time; any
/// signed field mutated after sealing makes this fail.
pub fn verify_entry_signature(entry: &SecureEntry, verifying_key: &VerifyingKey) -> bool {
    if entry.signature.len() != SIGNATURE_SIZE {
        return false;
    }
    let sig_bytes: [u8; SIGNATURE_SIZE] = match entry.signature.as_slice().try_into() {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key
        .verify(&entry.signed_data(), &signature)
        .is_ok()
}

/// Strict variant returning the error taxonomy instead of a boolean.
///
/// # Errors
///
/// Returns `SealError::SignatureInvalid` when verification fails.
pub fn require_valid_signature(
    entry: &SecureEntry,
    verifying_key: &VerifyingKey,
) -> SealResult<()> {
    if verify_entry_signature(entry, verifying_key) {
        Ok(())
    } else {
        Err(SealError::SignatureInvalid(format!(
            "Signature verification failed for agent {} entry {}",
            entry.agent_id, entry.id
        )))
    }
}
