//! Master secret generation and backup encoding
//!
//! The [`MasterSecret`] is the sole root of trust for one agent identity.
//! Every key the agent ever uses (signing, key exchange, payload
//! encryption) is re-derivable from this one value, so it is the only
//! thing an agent must back up. It is exported as lowercase hex for
//! out-of-band storage and is never transmitted.

use crate::error::SealError;
use rand::RngCore;

/// Length of a master secret in bytes (64 hex characters when exported)
pub const MASTER_SECRET_SIZE: usize = 32;

/// The root secret for one agent identity.
///
/// High-entropy 32-byte value. All of the agent's keys are derived from
/// it with HKDF, so possession of the secret is equivalent to owning the
/// identity. Debug output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecret([u8; MASTER_SECRET_SIZE]);

impl MasterSecret {
    /// Generate a fresh master secret from the OS entropy source.
    ///
    /// # Errors
    ///
    /// Returns `SealError::Entropy` if the entropy source fails. There is
    /// no fallback; callers must treat this as fatal.
    pub fn generate() -> Result<Self, SealError> {
        let mut bytes = [0u8; MASTER_SECRET_SIZE];
        getrandom::getrandom(&mut bytes)
            .map_err(|e| SealError::Entropy(format!("getrandom failed: {}", e)))?;
        Ok(Self(bytes))
    }

    /// Generate a master secret using the thread-local CSPRNG.
    ///
    /// Convenience for tests and tools; `generate` is preferred where the
    /// entropy failure must be observable.
    pub fn random() -> Self {
        let mut bytes = [0u8; MASTER_SECRET_SIZE];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create a master secret from raw bytes.
    pub fn from_bytes(bytes: [u8; MASTER_SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Import a master secret from its lowercase hex backup form.
    ///
    /// The round trip `from_hex(to_hex())` is lossless.
    ///
    /// # Errors
    ///
    /// Returns `SealError::Format` on malformed hex or wrong length.
    pub fn from_hex(s: &str) -> Result<Self, SealError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| SealError::Format(format!("Invalid hex in master secret: {}", e)))?;
        if bytes.len() != MASTER_SECRET_SIZE {
            return Err(SealError::Format(format!(
                "Master secret must be {} bytes, got {}",
                MASTER_SECRET_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; MASTER_SECRET_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Export the master secret as lowercase hex for out-of-band backup.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Get the raw bytes (input key material for HKDF).
    pub(crate) fn as_bytes(&self) -> &[u8; MASTER_SECRET_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secret material
        write!(f, "MasterSecret(..)")
    }
}
